//! The two layers every connection runs on: [`FramedStream`] turns a TCP stream into discrete
//! messages, and [`SecureChannel`] encrypts them once both sides have exchanged RSA public keys.
mod secure;
mod transport;

pub use self::secure::{RsaKey, SecureChannel};
pub use self::transport::{FramedStream, DEFAULT_MAX_MESSAGE_SIZE, MAX_PUBLIC_KEY_SIZE};
