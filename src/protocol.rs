//! Factor protocol parser and reply formatter.
//!
//! Requests are single text lines of the form:
//!
//! ```text
//! factor <target> <low> <high>
//! ```
//!
//! with three base-10 non-negative integer fields of arbitrary precision.
//! Replies are `found <target> <factor>` once per factor occurrence,
//! terminated by exactly one `done <target> <low> <high>`, or the single
//! line `invalid` when a request fails validation.

use num_bigint::BigUint;
use std::fmt;

/// A validated factor request: factor `target` over candidates in
/// `[low, high]`.
///
/// Only `target >= 2` is validated. `low <= high` and `low >= 2` are
/// deliberately unchecked: an inverted range yields an empty factor list
/// and bounds below 2 are never prime, so both flow through harmlessly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorRequest {
    pub target: BigUint,
    pub low: BigUint,
    pub high: BigUint,
}

/// Request parsing and validation errors.
///
/// Every variant is answered on the wire with the single reply `invalid`;
/// the distinct variants exist for server-side logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Line does not start with the `factor` keyword.
    UnknownKeyword(String),
    /// Wrong number of fields after the keyword (expected 3).
    WrongFieldCount(usize),
    /// A field contains something other than ASCII digits.
    NotANumber(String),
    /// Target is below 2.
    TargetTooSmall(BigUint),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::UnknownKeyword(word) => write!(f, "Unknown keyword: {}", word),
            ParseError::WrongFieldCount(count) => {
                write!(f, "Expected 3 fields, got {}", count)
            }
            ParseError::NotANumber(field) => write!(f, "Not a number: {}", field),
            ParseError::TargetTooSmall(target) => {
                write!(f, "Target must be at least 2, got {}", target)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse and validate one request line (line terminator already stripped).
pub fn parse_request(line: &str) -> Result<FactorRequest, ParseError> {
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some("factor") => {}
        other => {
            return Err(ParseError::UnknownKeyword(
                other.unwrap_or_default().to_string(),
            ))
        }
    }

    let fields: Vec<&str> = tokens.collect();
    if fields.len() != 3 {
        return Err(ParseError::WrongFieldCount(fields.len()));
    }

    let target = parse_field(fields[0])?;
    let low = parse_field(fields[1])?;
    let high = parse_field(fields[2])?;

    if target < BigUint::from(2u32) {
        return Err(ParseError::TargetTooSmall(target));
    }

    Ok(FactorRequest { target, low, high })
}

/// Parse one base-10 non-negative integer field. Signs, radix prefixes and
/// non-ASCII digits are all rejected.
fn parse_field(field: &str) -> Result<BigUint, ParseError> {
    if !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::NotANumber(field.to_string()));
    }
    field
        .parse()
        .map_err(|_| ParseError::NotANumber(field.to_string()))
}

/// A server reply; each reply is one line on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// One prime factor occurrence of the target.
    Found { target: BigUint, factor: BigUint },
    /// Terminates the reply sequence for a request.
    Done {
        target: BigUint,
        low: BigUint,
        high: BigUint,
    },
    /// The request failed validation.
    Invalid,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Found { target, factor } => write!(f, "found {} {}", target, factor),
            Reply::Done { target, low, high } => {
                write!(f, "done {} {} {}", target, low, high)
            }
            Reply::Invalid => write!(f, "invalid"),
        }
    }
}
