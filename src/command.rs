//! The text protocol spoken over an established secure channel.
//!
//! Every message is UTF-8 text. Requests have the shape `KEYWORD <arg1> <arg2>`; arguments are
//! wrapped in `<` `>` and extracted by splitting on `<` then on `>`, so an argument can never
//! contain either character. Keys are not validated: a key containing `<` or `>` is truncated
//! or shifted when the server parses it.
//!
//! | Request                   | Follow-up message | Responses                                   |
//! |---------------------------|-------------------|---------------------------------------------|
//! | `GET_VALUE <key>`         |                   | `FOUND`, value, `END` or `NOT_FOUND`, `END` |
//! | `SET_VALUE <key> <ticks>` | value             | `ADDED` or `UPDATED`, `END`                 |
//! | `DELETE_VALUE <key>`      |                   | `END`                                       |
//! | `INCREMENT_VALUE <key>`   | decimal delta     | new value, `END`                            |
//! | `DECREMENT_VALUE <key>`   | decimal delta     | new value, `END`                            |
//! | `CLOSE`                   |                   |                                             |
//!
//! A request that fails to parse is answered with a single
//! `ERROR <CLIENT_COMMAND.Stage> "diagnostic"` message instead, e.g.
//! `ERROR <CLIENT_GET_VALUE.GetKey> "missing <key> argument"`. An unknown keyword is tagged with
//! its raw first token and the `Dispatch` stage.
use std::fmt;
use std::time::Duration;

/// greeting sent by the server on accept, and keyword of the client's credentials message
pub const HI: &str = "HI";
/// credentials rejected
pub const NOT_AUTHORIZED: &str = "NOT_AUTHORIZED";
/// credentials accepted
pub const OK: &str = "OK";
/// GET found no live entry
pub const NOT_FOUND: &str = "NOT_FOUND";
/// GET found a live entry, the value follows
pub const FOUND: &str = "FOUND";
/// SET created a new entry
pub const ADDED: &str = "ADDED";
/// SET replaced an existing entry
pub const UPDATED: &str = "UPDATED";
/// terminates every successful response sequence
pub const END: &str = "END";
/// prefix of every error reply
pub const ERROR: &str = "ERROR";
/// prefix of a request keyword when it names the failing command in an error reply
pub const CLIENT_TAG_PREFIX: &str = "CLIENT_";

/// Reserved key prefix marking lock entries
pub const LOCK_PREFIX: &str = "LOCK__";

/// number of 100ns ticks in one second
pub const TICKS_PER_SECOND: i64 = 10_000_000;

/// The request keywords a client may send once authenticated.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Keyword {
    /// `GET_VALUE`
    Get,
    /// `SET_VALUE`
    Set,
    /// `DELETE_VALUE`
    Delete,
    /// `INCREMENT_VALUE`
    Increment,
    /// `DECREMENT_VALUE`
    Decrement,
    /// `CLOSE`
    Close,
}

impl Keyword {
    const ALL: [Keyword; 6] = [
        Keyword::Get,
        Keyword::Set,
        Keyword::Delete,
        Keyword::Increment,
        Keyword::Decrement,
        Keyword::Close,
    ];

    /// the token as it appears on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::Get => "GET_VALUE",
            Keyword::Set => "SET_VALUE",
            Keyword::Delete => "DELETE_VALUE",
            Keyword::Increment => "INCREMENT_VALUE",
            Keyword::Decrement => "DECREMENT_VALUE",
            Keyword::Close => "CLOSE",
        }
    }

    /// finds the keyword a request line starts with
    pub fn detect(line: &str) -> Option<Keyword> {
        Keyword::ALL
            .iter()
            .copied()
            .find(|keyword| line.starts_with(keyword.as_str()))
    }

    /// true if the client sends a second message (value or delta) after the request line
    pub fn has_payload(self) -> bool {
        matches!(self, Keyword::Set | Keyword::Increment | Keyword::Decrement)
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// These are the request "commands" that can be made to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// get a live value from the store
    Get {
        /// the key to search for
        key: String,
    },
    /// set a key/value in the store, the value follows in its own message
    Set {
        /// the key to set
        key: String,
        /// time to live as a count of 100ns ticks
        ticks: i64,
    },
    /// delete a key/value from the store
    Delete {
        /// the key to delete
        key: String,
    },
    /// add the decimal delta that follows in its own message
    Increment {
        /// the key to accumulate into
        key: String,
    },
    /// subtract the decimal delta that follows in its own message
    Decrement {
        /// the key to accumulate into
        key: String,
    },
    /// end the session
    Close,
}

impl Request {
    /// parses a request line whose keyword has already been detected
    pub fn parse(keyword: Keyword, line: &str) -> Result<Request, CommandError> {
        let key = || arg(line, 1).ok_or_else(|| CommandError::missing(keyword, "GetKey", "key"));
        match keyword {
            Keyword::Get => Ok(Request::Get { key: key()? }),
            Keyword::Set => {
                let key = key()?;
                let ticks = arg(line, 2)
                    .ok_or_else(|| CommandError::missing(keyword, "GetTime", "time"))?;
                let ticks = ticks.trim().parse::<i64>().map_err(|e| {
                    CommandError::new(keyword, "GetTime", format!("invalid tick count {:?}: {}", ticks, e))
                })?;
                Ok(Request::Set { key, ticks })
            }
            Keyword::Delete => Ok(Request::Delete { key: key()? }),
            Keyword::Increment => Ok(Request::Increment { key: key()? }),
            Keyword::Decrement => Ok(Request::Decrement { key: key()? }),
            Keyword::Close => Ok(Request::Close),
        }
    }

    /// encodes this request as a request line
    pub fn to_line(&self) -> String {
        match self {
            Request::Get { key } => format!("{} <{}>", Keyword::Get, key),
            Request::Set { key, ticks } => format!("{} <{}> <{}>", Keyword::Set, key, ticks),
            Request::Delete { key } => format!("{} <{}>", Keyword::Delete, key),
            Request::Increment { key } => format!("{} <{}>", Keyword::Increment, key),
            Request::Decrement { key } => format!("{} <{}>", Keyword::Decrement, key),
            Request::Close => Keyword::Close.to_string(),
        }
    }
}

/// A request that could not be parsed. Its [`Display`](fmt::Display) form is the `ERROR` reply
/// sent back to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandError {
    /// tag of the request that failed, `CLIENT_<KEYWORD>` for known keywords
    pub command: String,
    /// the parsing step that failed, e.g. `GetKey`
    pub stage: &'static str,
    /// human readable diagnostic
    pub message: String,
}

impl CommandError {
    /// builds an error for a known keyword, tagged `CLIENT_<KEYWORD>`
    pub fn new(keyword: Keyword, stage: &'static str, message: impl Into<String>) -> Self {
        CommandError {
            command: format!("{}{}", CLIENT_TAG_PREFIX, keyword),
            stage,
            message: message.into(),
        }
    }

    fn missing(keyword: Keyword, stage: &'static str, what: &str) -> Self {
        CommandError::new(keyword, stage, format!("missing <{}> argument", what))
    }

    /// builds the error for a request line that starts with no known keyword
    pub fn unknown(line: &str) -> Self {
        let command = line.split_whitespace().next().unwrap_or_default();
        CommandError {
            command: command.to_string(),
            stage: "Dispatch",
            message: format!("unrecognized command {:?}", command),
        }
    }
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} <{}.{}> \"{}\"",
            ERROR,
            self.command,
            self.stage,
            self.message.replace('"', "\\\"")
        )
    }
}

/// extracts the `n`th `<argument>` (1 based) of a message
///
/// returns `None` if the message has fewer than `n` opening delimiters
pub fn arg(line: &str, n: usize) -> Option<String> {
    line.split('<')
        .nth(n)
        .and_then(|rest| rest.split('>').next())
        .map(String::from)
}

/// converts a duration into the 100ns tick count sent on the wire, saturating at `i64::MAX`
pub fn duration_to_ticks(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos() / 100).unwrap_or(i64::MAX)
}

/// converts a wire tick count back into a duration. Negative counts become a zero duration,
/// an entry stored with it is expired as soon as it is written.
pub fn ticks_to_duration(ticks: i64) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    let secs = (ticks / TICKS_PER_SECOND) as u64;
    let nanos = ((ticks % TICKS_PER_SECOND) * 100) as u32;
    Duration::new(secs, nanos)
}
