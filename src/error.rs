use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// type alias for all operations in this crate that could fail with a [`RamDbError`]
pub type Result<T> = std::result::Result<T, RamDbError>;

/// The Error variants used by the ramdb server, client and store.
///
/// Transport level variants (`Io`, `Timeout`, `ConnectionClosed`, `FrameTooLarge`, `Crypto`)
/// are fatal to the connection they occurred on. `Server` carries the text of an `ERROR` reply
/// and leaves the connection usable.
#[derive(Error, Debug)]
pub enum RamDbError {
    /// variant for errors caused by socket or file IO
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// a receive did not complete before its timeout elapsed
    #[error("timed out waiting for a message")]
    Timeout,

    /// the peer closed the connection
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// a peer announced a message larger than the receiver accepts
    #[error("message of {size} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// announced message size
        size: usize,
        /// maximum size the receiver accepts
        max: usize,
    },

    /// key generation, key exchange, encryption or decryption failed
    #[error("secure channel error: {0}")]
    Crypto(String),

    /// the server rejected the username/password
    #[error("NOT_AUTHORIZED - Not authorized!")]
    NotAuthorized,

    /// the peer sent a token other than the one the protocol requires
    #[error("Wrong protocol! expected {expected}, received {received:?}")]
    WrongProtocol {
        /// what the protocol required at this point
        expected: &'static str,
        /// what was actually received
        received: String,
    },

    /// the server answered a request with an `ERROR` reply, kept verbatim
    #[error("{0}")]
    Server(String),

    /// usernames and passwords can't contain the argument delimiters
    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// the stored value that an increment/decrement targets is not a decimal number
    #[error("value {value:?} stored at {key:?} is not a decimal number")]
    NotANumber {
        /// key being accumulated
        key: String,
        /// the offending stored value
        value: String,
    },

    /// an increment/decrement left the representable decimal range
    #[error("decimal overflow while accumulating {key:?}")]
    Overflow {
        /// key being accumulated
        key: String,
    },

    /// a value or argument could not be parsed
    #[error("parse error: {0}")]
    Parsing(String),

    /// the server configuration is invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// Serde Error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// a message was not valid UTF-8 text
    #[error("invalid UTF-8 in message: {0}")]
    Utf8(#[from] FromUtf8Error),

    /// catch all for errors from third party crates that only provide a message
    #[error("{0}")]
    StringErr(String),
}
