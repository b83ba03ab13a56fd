use std::fmt;
use std::io;

/// The errors that can occur while serving a plugin exchange.
///
/// `Framing` and `NoMatchingIdentity` are fatal to an exchange; the
/// remaining variants are reported per-item through error stanzas and let
/// the exchange continue.
#[derive(Debug)]
pub enum Error {
    /// The underlying pipe failed.
    Io(io::Error),
    /// The stanza stream violated the framing rules.
    Framing(String),
    /// A recipient or identity string could not be decoded.
    Decode(String),
    /// The string was minted by a different plugin.
    InvalidPluginName(String),
    /// No registered identity matches the tag on a wrapped stanza.
    NoMatchingIdentity(String),
    /// The secret manager could not produce the key material.
    KeyFetch(String),
    /// The fetched secret is not a usable SSH private key.
    UnsupportedKey(String),
    /// A cryptographic wrap or unwrap failed.
    Crypto(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => e.fmt(f),
            Error::Framing(msg)
            | Error::Decode(msg)
            | Error::KeyFetch(msg)
            | Error::UnsupportedKey(msg)
            | Error::Crypto(msg) => f.write_str(msg),
            Error::InvalidPluginName(name) => write!(f, "invalid plugin name: {}", name),
            Error::NoMatchingIdentity(tag) => {
                write!(f, "no matching identity found for tag: {}", tag)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
