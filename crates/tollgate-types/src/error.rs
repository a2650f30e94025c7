//! Error type shared across the Tollgate crates.

use std::fmt;

pub type TgResult<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
	/// Malformed input that was rejected before use
	ValidationError(String),
	/// Invalid configuration (bad rule, bad regex)
	ConfigError(String),
	/// Binary or textual decoding failed
	Parse,
	Internal(String),
}

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Error::ValidationError(msg) => write!(f, "validation error: {}", msg),
			Error::ConfigError(msg) => write!(f, "configuration error: {}", msg),
			Error::Parse => write!(f, "parse error"),
			Error::Internal(msg) => write!(f, "internal error: {}", msg),
		}
	}
}

impl std::error::Error for Error {}

impl From<regex::Error> for Error {
	fn from(err: regex::Error) -> Self {
		Error::ConfigError(format!("invalid path pattern: {}", err))
	}
}


// vim: ts=4
