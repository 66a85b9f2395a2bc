use core::fmt;
use std::{
    error::Error,
    fmt::{Debug, Display, Formatter},
};

use yaml_lite::YamlError;

/// The crate-wide error type. Used only at the two points where setup
/// failure must propagate out of the engine: configuration loading and
/// reactor setup (bind/listen/multiplexer registration). Everything past
/// that boundary is handled locally and turned into an HTTP status or a
/// connection close, never this type.
pub struct ServerError(pub Box<dyn Error>);

impl Debug for ServerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "\r\x1b[K{}", self)
    }
}

impl Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\x1b[31mERROR\x1b[0m: {}", self.0)
    }
}

impl Error for ServerError {}

impl From<YamlError> for ServerError {
    fn from(e: YamlError) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<crate::config::ConfigError> for ServerError {
    fn from(e: crate::config::ConfigError) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<std::io::Error> for ServerError {
    fn from(e: std::io::Error) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<std::net::AddrParseError> for ServerError {
    fn from(e: std::net::AddrParseError) -> Self {
        ServerError(Box::new(e))
    }
}

impl From<String> for ServerError {
    fn from(s: String) -> Self {
        ServerError(Box::new(YamlError::Generic(s)))
    }
}

impl From<&str> for ServerError {
    fn from(s: &str) -> Self {
        ServerError(Box::new(YamlError::Generic(s.to_string())))
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;
