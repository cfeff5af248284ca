use std::net::{TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{debug, trace};

use crate::channel::{FramedStream, RsaKey, SecureChannel, DEFAULT_MAX_MESSAGE_SIZE};
use crate::command::{self, duration_to_ticks, Request, LOCK_PREFIX};
use crate::config::Credentials;
use crate::typed::WireValue;
use crate::{RamDbError, Result};

/// value stored under a lock key
const LOCK_SENTINEL: &str = "L";

/// pause between two attempts to take a held lock
const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// `RamDbClient` contains the functionality for communication with a [`RamDbServer`]
///
/// All requests on one client are serialized: a request and its full response sequence finish
/// before the next request is sent, so a client can be shared between threads.
///
/// [`RamDbServer`]: ./struct.RamDbServer.html
pub struct RamDbClient {
    conn: Mutex<Option<Connection>>,
}

impl RamDbClient {
    /// Connects to the server at `addr`, exchanges keys of `key_bits` bits and authenticates.
    ///
    /// # Errors
    /// `InvalidCredentials` if the username or password contain `<` or `>`, `NotAuthorized` if
    /// the server rejected them, `WrongProtocol` if the server does not speak this protocol, and
    /// any transport error.
    pub fn connect<A: ToSocketAddrs>(addr: A, username: &str, password: &str, key_bits: usize) -> Result<Self> {
        let conn = Connection::open(addr, username, password, key_bits)?;
        Ok(RamDbClient {
            conn: Mutex::new(Some(conn)),
        })
    }

    /// gets the value of the specified `key` from the server
    /// ## Returns
    /// `Ok<Some<String>>` if a live value was found for the key.
    /// `Ok<None>` if there is no value associated with the key or it has expired
    /// `Err<RamDbError::Server>` if the server could not process the request
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            conn.send_request(&Request::Get { key: key.to_string() })?;
            let status = conn.receive_text()?;
            match status.as_str() {
                command::FOUND => {
                    let value = conn.receive_text()?;
                    conn.expect(command::END)?;
                    Ok(Some(value))
                }
                command::NOT_FOUND => {
                    conn.expect(command::END)?;
                    Ok(None)
                }
                other => Err(unexpected("FOUND or NOT_FOUND", other.to_string())),
            }
        })
    }

    /// sets `key` to `value`, expiring `ttl` from now
    /// # Returns
    /// `Ok<true>` if the key did not exist before, `Ok<false>` if an existing value was replaced
    pub fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        self.with_conn(|conn| {
            conn.send_request(&Request::Set {
                key: key.to_string(),
                ticks: duration_to_ticks(ttl),
            })?;
            conn.send_text(value)?;
            let status = conn.receive_text()?;
            let added = match status.as_str() {
                command::ADDED => true,
                command::UPDATED => false,
                other => return Err(unexpected("ADDED or UPDATED", other.to_string())),
            };
            conn.expect(command::END)?;
            Ok(added)
        })
    }

    /// removes a key and its associated value from the store, removing an absent key succeeds
    pub fn remove(&self, key: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.send_request(&Request::Delete { key: key.to_string() })?;
            conn.expect(command::END)
        })
    }

    /// adds `delta` to the decimal at `key` and returns the new value
    ///
    /// an absent key starts at `delta`
    pub fn increment(&self, key: &str, delta: Decimal) -> Result<Decimal> {
        self.accumulate(Request::Increment { key: key.to_string() }, delta)
    }

    /// subtracts `delta` from the decimal at `key` and returns the new value
    ///
    /// an absent key starts at `delta`
    pub fn decrement(&self, key: &str, delta: Decimal) -> Result<Decimal> {
        self.accumulate(Request::Decrement { key: key.to_string() }, delta)
    }

    fn accumulate(&self, request: Request, delta: Decimal) -> Result<Decimal> {
        self.with_conn(|conn| {
            conn.send_request(&request)?;
            conn.send_text(&delta.to_wire())?;
            let reply = conn.receive_text()?;
            let value = Decimal::from_wire(&reply).map_err(|_| unexpected("a decimal value", reply))?;
            conn.expect(command::END)?;
            Ok(value)
        })
    }

    /// gets the value at `key` decoded as a `T`
    pub fn get_as<T: WireValue>(&self, key: &str) -> Result<Option<T>> {
        self.get(key)?.map(|text| T::from_wire(&text)).transpose()
    }

    /// sets `key` to the text encoding of `value`, see [`set`](RamDbClient::set)
    pub fn set_as<T: WireValue>(&self, key: &str, value: &T, ttl: Duration) -> Result<bool> {
        self.set(key, &value.to_wire(), ttl)
    }

    /// Blocks until the lock `name` is taken by this caller.
    ///
    /// The lock is an entry under a reserved key, set only if absent. Attempts repeat every
    /// millisecond with no fairness between waiters and no upper bound on the wait. `ttl` caps
    /// how long the lock is held if it is never released.
    pub fn lock(&self, name: &str, ttl: Duration) -> Result<()> {
        let key = lock_key(name);
        let mut attempts = 0_u64;
        while !self.set(&key, LOCK_SENTINEL, ttl)? {
            attempts += 1;
            thread::sleep(LOCK_RETRY_INTERVAL);
        }
        trace!(%name, attempts, "lock acquired");
        Ok(())
    }

    /// Releases the lock `name`. Releasing a lock that is not held is not an error.
    pub fn unlock(&self, name: &str) -> Result<()> {
        self.remove(&lock_key(name))
    }

    /// Ends the session with `CLOSE` and drops the connection.
    pub fn close(self) -> Result<()> {
        let conn = self.lock_conn()?.take();
        match conn {
            Some(mut conn) => conn.close(),
            None => Ok(()),
        }
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| RamDbError::StringErr("client connection lock poisoned".to_string()))
    }

    /// runs one request/response exchange with exclusive use of the connection
    fn with_conn<T>(&self, exchange: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut guard = self.lock_conn()?;
        let conn = guard.as_mut().ok_or(RamDbError::ConnectionClosed)?;
        exchange(conn)
    }
}

impl Drop for RamDbClient {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.conn.lock() {
            if let Some(mut conn) = guard.take() {
                let _ = conn.close();
            }
        }
    }
}

fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_PREFIX, name)
}

/// maps a reply that breaks the protocol to an error, passing `ERROR` replies through verbatim
fn unexpected(expected: &'static str, received: String) -> RamDbError {
    if received.starts_with(command::ERROR) {
        RamDbError::Server(received)
    } else {
        RamDbError::WrongProtocol { expected, received }
    }
}

/// The client end of an authenticated session
pub(crate) struct Connection {
    transport: FramedStream,
    channel: SecureChannel,
}

impl Connection {
    /// the client half of the handshake
    pub(crate) fn open<A: ToSocketAddrs>(addr: A, username: &str, password: &str, key_bits: usize) -> Result<Self> {
        let credentials = Credentials::new(username, password)?;
        let mut transport = FramedStream::new(TcpStream::connect(addr)?)?;

        let greeting = String::from_utf8(transport.receive(DEFAULT_MAX_MESSAGE_SIZE, None)?)?;
        if greeting != command::HI {
            return Err(RamDbError::WrongProtocol {
                expected: command::HI,
                received: greeting,
            });
        }

        let client_key = Arc::new(RsaKey::generate(key_bits)?);
        transport.send(client_key.public_pem()?.as_bytes())?;
        let server_pem = String::from_utf8(client_key.decrypt(&transport.receive(DEFAULT_MAX_MESSAGE_SIZE, None)?)?)?;
        let channel = SecureChannel::new(client_key, RsaKey::from_public_pem(&server_pem)?);

        let mut conn = Connection { transport, channel };
        conn.send_text(&format!(
            "{} <{}> <{}>",
            command::HI,
            credentials.username,
            credentials.password
        ))?;
        let reply = conn.receive_text()?;
        match reply.as_str() {
            command::OK => {
                debug!(peer = %conn.transport.peer_addr(), "connected");
                Ok(conn)
            }
            command::NOT_AUTHORIZED => Err(RamDbError::NotAuthorized),
            other => Err(RamDbError::WrongProtocol {
                expected: "OK or NOT_AUTHORIZED",
                received: other.to_string(),
            }),
        }
    }

    fn send_request(&mut self, request: &Request) -> Result<()> {
        self.send_text(&request.to_line())
    }

    pub(crate) fn send_text(&mut self, text: &str) -> Result<()> {
        let ciphertext = self.channel.encrypt_for_peer(text.as_bytes())?;
        self.transport.send(&ciphertext)
    }

    pub(crate) fn receive_text(&mut self) -> Result<String> {
        let ciphertext = self.transport.receive(DEFAULT_MAX_MESSAGE_SIZE, None)?;
        Ok(String::from_utf8(self.channel.decrypt_from_peer(&ciphertext)?)?)
    }

    /// receives the next message and fails unless it is exactly `token`
    fn expect(&mut self, token: &'static str) -> Result<()> {
        let received = self.receive_text()?;
        if received == token {
            Ok(())
        } else {
            Err(unexpected(token, received))
        }
    }

    fn close(&mut self) -> Result<()> {
        let result = self.send_request(&Request::Close);
        self.transport.shutdown();
        result
    }
}
