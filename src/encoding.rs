//! Single-channel result encoding.
//!
//! A result is `<flag-or-number>,<errorCode>[,<tail>]`. The flag is the
//! literal `true` or `false`, numbers are decimal, and a trailing string
//! field is appended raw: decoders take it as the rest of the string.
//! Binary payloads never appear here; they ride in the out-of-band slots of
//! [`EncodedResult`].

use std::fmt::{Display, Write as _};

use crate::buffer::TransferredBuffer;
use crate::error::{code, BridgeError, ErrorCode, Result};

pub const DELIMITER: char = ',';

/// Ceiling for handle, flag and count results.
pub const STATUS_CEILING: usize = 260;
/// Ceiling for the host descriptor triple.
pub const HOST_DETAILS_CEILING: usize = 750;
/// Ceiling for results carrying a command response or base64 text.
pub const PAYLOAD_CEILING: usize = 256 * 1024;

/// Builder for one encoded result string.
#[derive(Debug)]
pub struct ResultText {
    text: String,
    ceiling: usize,
}

impl ResultText {
    pub fn flag(ok: bool, code: ErrorCode) -> Self {
        Self::number(ok, code)
    }

    pub fn number(value: impl Display, code: ErrorCode) -> Self {
        let mut text = String::with_capacity(32);
        let _ = write!(text, "{value}{DELIMITER}{code}");
        Self {
            text,
            ceiling: STATUS_CEILING,
        }
    }

    /// A result with no error-code field, e.g. base64 and host details.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut text = String::new();
        for (i, field) in fields.into_iter().enumerate() {
            if i > 0 {
                text.push(DELIMITER);
            }
            text.push_str(field.as_ref());
        }
        Self {
            text,
            ceiling: STATUS_CEILING,
        }
    }

    pub fn with_ceiling(mut self, ceiling: usize) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Append the trailing rest-of-string field.
    pub fn tail(mut self, tail: &str) -> Self {
        self.text.push(DELIMITER);
        self.text.push_str(tail);
        self
    }

    /// Finish the result, refusing to truncate one that outgrew its ceiling.
    pub fn finish(self) -> Result<String> {
        if self.text.len() > self.ceiling {
            return Err(BridgeError::ResultCeiling {
                len: self.text.len(),
                ceiling: self.ceiling,
            });
        }
        Ok(self.text)
    }
}

/// `true,0` / `false,0` / `false,<code>`.
pub fn encode_flag(result: &Result<bool>) -> String {
    match result {
        Ok(ok) => status(*ok, code::NO_ERROR),
        Err(e) => status(false, e.code()),
    }
}

/// `true,0` on success, `false,<code>` otherwise.
pub fn encode_done(result: &Result<()>) -> String {
    match result {
        Ok(()) => status(true, code::NO_ERROR),
        Err(e) => status(false, e.code()),
    }
}

/// `<value>,0` on success, `0,<code>` otherwise. Used for handles, sizes, pids.
pub fn encode_number<T: Display>(result: &Result<T>) -> String {
    let text = match result {
        Ok(value) => ResultText::number(value, code::NO_ERROR),
        Err(e) => ResultText::number(0, e.code()),
    };
    // numbers and codes are at most 20 digits each
    text.text
}

/// `true,0,<tail>` on success, `false,<code>,` otherwise.
///
/// A tail that would push the result past `ceiling` turns the whole result
/// into `false,159,` rather than being cut short.
pub fn encode_reply(result: &Result<String>, ceiling: usize) -> String {
    let encoded = match result {
        Ok(tail) => ResultText::flag(true, code::NO_ERROR)
            .with_ceiling(ceiling)
            .tail(tail)
            .finish(),
        Err(e) => Ok(failed_reply(e.code())),
    };
    encoded.unwrap_or_else(|e| failed_reply(e.code()))
}

fn failed_reply(code: ErrorCode) -> String {
    format!("false{DELIMITER}{code}{DELIMITER}")
}

fn status(ok: bool, code: ErrorCode) -> String {
    format!("{ok}{DELIMITER}{code}")
}

/// The short fixed-size result tuple: encoded text plus up to two buffers.
#[derive(Debug)]
pub struct EncodedResult {
    pub text: String,
    pub first: Option<TransferredBuffer>,
    pub second: Option<TransferredBuffer>,
}

impl EncodedResult {
    pub fn text(text: String) -> Self {
        Self {
            text,
            first: None,
            second: None,
        }
    }

    /// Encode a single-value read: the value travels in the first slot.
    pub fn from_read(result: Result<Option<TransferredBuffer>>) -> Self {
        match result {
            Ok(Some(value)) => Self {
                text: status(true, code::NO_ERROR),
                first: Some(value),
                second: None,
            },
            Ok(None) => Self::text(status(false, code::NO_ERROR)),
            Err(e) => Self::text(status(false, e.code())),
        }
    }

    /// Encode an iteration step: key in the first slot, value in the second.
    pub fn from_entry(result: Result<Option<(TransferredBuffer, TransferredBuffer)>>) -> Self {
        match result {
            Ok(Some((key, value))) => Self {
                text: status(true, code::NO_ERROR),
                first: Some(key),
                second: Some(value),
            },
            Ok(None) => Self::text(status(false, code::NO_ERROR)),
            Err(e) => Self::text(status(false, e.code())),
        }
    }
}

/// Caller-side view of an encoded result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedResult<'a> {
    pub head: &'a str,
    pub code: ErrorCode,
    pub rest: Option<&'a str>,
}

impl<'a> DecodedResult<'a> {
    /// Split `<head>,<code>[,<rest>]`; `rest` keeps any further delimiters.
    pub fn parse(text: &'a str) -> Option<Self> {
        let mut parts = text.splitn(3, DELIMITER);
        let head = parts.next()?;
        let code = parts.next()?.parse().ok()?;
        Some(Self {
            head,
            code,
            rest: parts.next(),
        })
    }

    pub fn flag(&self) -> Option<bool> {
        self.head.parse().ok()
    }

    pub fn number(&self) -> Option<u64> {
        self.head.parse().ok()
    }
}
