use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs1::{DecodeRsaPublicKey, EncodeRsaPublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use tracing::debug;

use crate::error::{RamDbError, Result};

// OAEP overhead with SHA-256: two digests plus two bytes
const OAEP_SHA256_OVERHEAD: usize = 2 * 32 + 2;

/// An RSA key used by one side of a [`SecureChannel`].
///
/// A locally generated key holds both halves and can decrypt, a key received from the peer holds
/// only the public half and can only encrypt.
///
/// Messages longer than one OAEP block are split into chunks of [`chunk_size`](RsaKey::chunk_size)
/// bytes, each encrypted into its own modulus sized block.
pub struct RsaKey {
    private: Option<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl RsaKey {
    /// generates a new key pair with a modulus of `bits` bits
    pub fn generate(bits: usize) -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| RamDbError::Crypto(format!("could not generate a {} bit key: {}", bits, e)))?;
        let public = RsaPublicKey::from(&private);
        debug!(bits, "generated RSA key pair");
        Ok(RsaKey {
            private: Some(private),
            public,
        })
    }

    /// loads a peer's public key from its PKCS#1 PEM text
    pub fn from_public_pem(pem: &str) -> Result<Self> {
        let public = RsaPublicKey::from_pkcs1_pem(pem)
            .map_err(|e| RamDbError::Crypto(format!("invalid public key: {}", e)))?;
        Ok(RsaKey { private: None, public })
    }

    /// the public half as PKCS#1 PEM text
    pub fn public_pem(&self) -> Result<String> {
        self.public
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| RamDbError::Crypto(format!("could not encode public key: {}", e)))
    }

    /// modulus size in bytes, also the size of one ciphertext block
    pub fn block_size(&self) -> usize {
        self.public.size()
    }

    /// largest plaintext chunk one block can carry
    pub fn chunk_size(&self) -> usize {
        self.block_size().saturating_sub(OAEP_SHA256_OVERHEAD)
    }

    /// encrypts `plaintext` for the holder of the private half
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let chunk_size = self.chunk_size();
        if chunk_size == 0 {
            return Err(RamDbError::Crypto(format!(
                "a {} byte key is too small for OAEP",
                self.block_size()
            )));
        }

        let mut rng = OsRng;
        let mut ciphertext = Vec::with_capacity((plaintext.len() / chunk_size + 1) * self.block_size());
        // an empty message still produces one block
        let chunks: Vec<&[u8]> = if plaintext.is_empty() {
            vec![plaintext]
        } else {
            plaintext.chunks(chunk_size).collect()
        };
        for chunk in chunks {
            let block = self
                .public
                .encrypt(&mut rng, Oaep::new::<Sha256>(), chunk)
                .map_err(|e| RamDbError::Crypto(format!("encryption failed: {}", e)))?;
            ciphertext.extend_from_slice(&block);
        }
        Ok(ciphertext)
    }

    /// decrypts a message produced by [`encrypt`](RsaKey::encrypt) with this key's public half
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| RamDbError::Crypto("a peer's public key can't decrypt".to_string()))?;
        let block_size = self.block_size();
        if ciphertext.is_empty() || ciphertext.len() % block_size != 0 {
            return Err(RamDbError::Crypto(format!(
                "ciphertext of {} bytes is not a whole number of {} byte blocks",
                ciphertext.len(),
                block_size
            )));
        }

        let mut plaintext = Vec::with_capacity(ciphertext.len());
        for block in ciphertext.chunks(block_size) {
            let chunk = private
                .decrypt(Oaep::new::<Sha256>(), block)
                .map_err(|e| RamDbError::Crypto(format!("decryption failed: {}", e)))?;
            plaintext.extend_from_slice(&chunk);
        }
        Ok(plaintext)
    }
}

impl std::fmt::Debug for RsaKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RsaKey")
            .field("bits", &(self.block_size() * 8))
            .field("private", &self.private.is_some())
            .finish()
    }
}

/// The established encryption state of one connection: our own key pair and the peer's public
/// key.
#[derive(Debug, Clone)]
pub struct SecureChannel {
    local: Arc<RsaKey>,
    peer: Arc<RsaKey>,
}

impl SecureChannel {
    /// `local` must hold a private key, `peer` is the public key received from the other side
    pub fn new(local: Arc<RsaKey>, peer: RsaKey) -> Self {
        SecureChannel {
            local,
            peer: Arc::new(peer),
        }
    }

    /// encrypts an outgoing message with the peer's public key
    pub fn encrypt_for_peer(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.peer.encrypt(plaintext)
    }

    /// decrypts an incoming message with our private key
    pub fn decrypt_from_peer(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.local.decrypt(ciphertext)
    }
}
