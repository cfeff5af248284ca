//! Textual encodings for typed values.
//!
//! The store only holds text. [`WireValue`] is the conversion layer the client uses to read and
//! write numbers, booleans and durations as text the other side (and the increment/decrement
//! commands) can parse back.
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::command::{duration_to_ticks, ticks_to_duration};
use crate::error::{RamDbError, Result};

/// A value that can be stored as text
pub trait WireValue: Sized {
    /// encodes the value as stored text
    fn to_wire(&self) -> String;

    /// decodes stored text
    ///
    /// # Errors
    /// returns [`RamDbError::Parsing`] if `text` is not a valid encoding of `Self`
    fn from_wire(text: &str) -> Result<Self>;
}

impl WireValue for String {
    fn to_wire(&self) -> String {
        self.clone()
    }

    fn from_wire(text: &str) -> Result<Self> {
        Ok(text.to_string())
    }
}

impl WireValue for bool {
    fn to_wire(&self) -> String {
        String::from(if *self { "True" } else { "False" })
    }

    fn from_wire(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.eq_ignore_ascii_case("true") {
            Ok(true)
        } else if text.eq_ignore_ascii_case("false") {
            Ok(false)
        } else {
            Err(RamDbError::Parsing(format!("{:?} is not a boolean", text)))
        }
    }
}

macro_rules! impl_wire_value {
    ($($ty:ty),* $(,)?) => {
        $(
            impl WireValue for $ty {
                fn to_wire(&self) -> String {
                    self.to_string()
                }

                fn from_wire(text: &str) -> Result<Self> {
                    text.trim().parse::<$ty>().map_err(|e| {
                        RamDbError::Parsing(format!(
                            "{:?} is not a valid {}: {}",
                            text,
                            stringify!($ty),
                            e
                        ))
                    })
                }
            }
        )*
    };
}

impl_wire_value!(u8, i8, u16, i16, u32, i32, u64, i64, u128, i128, f32, f64);

impl WireValue for Decimal {
    fn to_wire(&self) -> String {
        self.to_string()
    }

    /// accepts plain notation (`-12.50`) only, exponents like `1.25e3` are rejected
    fn from_wire(text: &str) -> Result<Self> {
        let text = text.trim();
        Decimal::from_str(text)
            .map_err(|e| RamDbError::Parsing(format!("{:?} is not a decimal: {}", text, e)))
    }
}

/// durations travel as a 100ns tick count
impl WireValue for Duration {
    fn to_wire(&self) -> String {
        duration_to_ticks(*self).to_string()
    }

    fn from_wire(text: &str) -> Result<Self> {
        i64::from_wire(text).map(ticks_to_duration)
    }
}
