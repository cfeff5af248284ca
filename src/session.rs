//! The server side of one connection.
//!
//! A [`Session`] walks through
//!
//! ```text
//! AwaitingChannel --keys exchanged--> AwaitingAuth --credentials ok--> Ready --CLOSE/error--> Closed
//! ```
//!
//! Each handshake receive is bounded by the auth timeout. Once `Ready`, the session waits for
//! the next command indefinitely; a silent client keeps its worker thread busy for as long as
//! the socket stays open.
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, info, info_span, warn};

use crate::channel::{FramedStream, RsaKey, SecureChannel, DEFAULT_MAX_MESSAGE_SIZE, MAX_PUBLIC_KEY_SIZE};
use crate::command::{self, arg, ticks_to_duration, CommandError, Keyword, Request, LOCK_PREFIX};
use crate::config::Credentials;
use crate::engine::{Accumulate, RamEngine};
use crate::error::{RamDbError, Result};
use crate::typed::WireValue;

/// Server wide settings every session reads
#[derive(Debug)]
pub(crate) struct SessionSettings {
    pub(crate) credentials: Credentials,
    pub(crate) server_key: Arc<RsaKey>,
    pub(crate) auth_timeout: Duration,
}

/// Where a session is in its lifecycle
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// greeting sent, waiting for the client's public key
    AwaitingChannel,
    /// keys exchanged, waiting for credentials
    AwaitingAuth,
    /// authenticated, serving commands
    Ready,
    /// finished, the socket is shut down
    Closed,
}

/// One accepted connection being driven through handshake, authentication and commands
pub(crate) struct Session<E: RamEngine> {
    engine: E,
    transport: FramedStream,
    settings: Arc<SessionSettings>,
    channel: Option<SecureChannel>,
    state: SessionState,
}

impl<E: RamEngine> Session<E> {
    pub(crate) fn new(engine: E, stream: TcpStream, settings: Arc<SessionSettings>) -> Result<Self> {
        Ok(Session {
            engine,
            transport: FramedStream::new(stream)?,
            settings,
            channel: None,
            state: SessionState::AwaitingChannel,
        })
    }

    /// Runs the session to completion and shuts the socket down.
    ///
    /// Returns `Ok` when the client closed the session or failed to authenticate, and the
    /// error that ended it otherwise.
    pub(crate) fn run(mut self) -> Result<()> {
        let span = info_span!("session", peer = %self.transport.peer_addr());
        let _guard = span.enter();

        let result = self.drive();
        self.state = SessionState::Closed;
        self.transport.shutdown();
        debug!(state = ?self.state, "session ended");
        result
    }

    fn drive(&mut self) -> Result<()> {
        self.establish_channel()?;
        if !self.authenticate()? {
            return Ok(());
        }
        match self.serve_commands() {
            // hanging up without CLOSE is still a normal end once authenticated
            Err(RamDbError::ConnectionClosed) => {
                debug!("client disconnected");
                Ok(())
            }
            result => result,
        }
    }

    /// HI, then swap public keys. The client's key arrives in the clear, ours goes back
    /// encrypted with it.
    fn establish_channel(&mut self) -> Result<()> {
        self.transport.send(command::HI.as_bytes())?;

        let timeout = Some(self.settings.auth_timeout);
        let client_pem = String::from_utf8(self.transport.receive(MAX_PUBLIC_KEY_SIZE, timeout)?)?;
        let client_key = RsaKey::from_public_pem(&client_pem)?;
        let channel = SecureChannel::new(Arc::clone(&self.settings.server_key), client_key);

        let server_pem = self.settings.server_key.public_pem()?;
        self.transport.send(&channel.encrypt_for_peer(server_pem.as_bytes())?)?;
        self.channel = Some(channel);
        self.state = SessionState::AwaitingAuth;
        debug!("secure channel established");
        Ok(())
    }

    /// expects `HI <username> <password>`, anything else is answered with `NOT_AUTHORIZED`
    fn authenticate(&mut self) -> Result<bool> {
        let greeting = self.receive_text(Some(self.settings.auth_timeout))?;
        let authorized = greeting.starts_with(command::HI)
            && match (arg(&greeting, 1), arg(&greeting, 2)) {
                (Some(username), Some(password)) => self.settings.credentials.matches(&username, &password),
                _ => false,
            };

        if !authorized {
            warn!("authentication failed");
            self.send_text(command::NOT_AUTHORIZED)?;
            return Ok(false);
        }

        self.send_text(command::OK)?;
        self.state = SessionState::Ready;
        info!("client authenticated");
        Ok(true)
    }

    fn serve_commands(&mut self) -> Result<()> {
        loop {
            let line = self.receive_text(None)?;
            let keyword = match Keyword::detect(&line) {
                Some(keyword) => keyword,
                None => {
                    let err = CommandError::unknown(&line);
                    debug!(%err, "unrecognized command");
                    self.send_text(&err.to_string())?;
                    continue;
                }
            };

            let request = Request::parse(keyword, &line);
            // the follow-up message is read even if the request line is bad, otherwise it
            // would be mistaken for the next command
            let payload = if keyword.has_payload() {
                Some(self.receive_text(None)?)
            } else {
                None
            };

            match request {
                Ok(Request::Close) => {
                    debug!("client closed the session");
                    return Ok(());
                }
                Ok(request) => self.execute(request, payload.unwrap_or_default())?,
                Err(err) => {
                    debug!(%err, "malformed command");
                    self.send_text(&err.to_string())?;
                }
            }
        }
    }

    fn execute(&mut self, request: Request, payload: String) -> Result<()> {
        debug!(?request, "executing");
        match request {
            Request::Get { key } => match self.engine.get(&key) {
                Some(value) => self.send_all(&[command::FOUND, value.as_str(), command::END]),
                None => self.send_all(&[command::NOT_FOUND, command::END]),
            },
            Request::Set { key, ticks } => {
                let ttl = ticks_to_duration(ticks);
                // a held lock is never overwritten, an expired one is free to take
                let added = if key.starts_with(LOCK_PREFIX) {
                    self.engine.set_if_vacant(key, payload, ttl)
                } else {
                    self.engine.set(key, payload, ttl)
                };
                let status = if added { command::ADDED } else { command::UPDATED };
                self.send_all(&[status, command::END])
            }
            Request::Delete { key } => {
                self.engine.remove(&key);
                self.send_text(command::END)
            }
            Request::Increment { key } => self.accumulate(Keyword::Increment, &key, &payload, Accumulate::Increment),
            Request::Decrement { key } => self.accumulate(Keyword::Decrement, &key, &payload, Accumulate::Decrement),
            Request::Close => Ok(()),
        }
    }

    fn accumulate(&mut self, keyword: Keyword, key: &str, payload: &str, op: Accumulate) -> Result<()> {
        let delta = match Decimal::from_wire(payload) {
            Ok(delta) => delta,
            Err(e) => return self.send_text(&CommandError::new(keyword, "GetData", e.to_string()).to_string()),
        };

        match self.engine.accumulate(key, delta, op) {
            Ok(value) => self.send_all(&[value.to_wire().as_str(), command::END]),
            Err(e @ RamDbError::NotANumber { .. }) | Err(e @ RamDbError::Overflow { .. }) => {
                self.send_text(&CommandError::new(keyword, "SetValue", e.to_string()).to_string())
            }
            Err(e) => Err(e),
        }
    }

    fn channel(&self) -> Result<&SecureChannel> {
        self.channel
            .as_ref()
            .ok_or_else(|| RamDbError::Crypto("secure channel not established".to_string()))
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        let ciphertext = self.channel()?.encrypt_for_peer(text.as_bytes())?;
        self.transport.send(&ciphertext)
    }

    fn send_all(&mut self, messages: &[&str]) -> Result<()> {
        for message in messages {
            self.send_text(message)?;
        }
        Ok(())
    }

    fn receive_text(&mut self, timeout: Option<Duration>) -> Result<String> {
        let ciphertext = self.transport.receive(DEFAULT_MAX_MESSAGE_SIZE, timeout)?;
        let plaintext = self.channel()?.decrypt_from_peer(&ciphertext)?;
        Ok(String::from_utf8(plaintext)?)
    }
}
