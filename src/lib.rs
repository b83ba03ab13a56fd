//! age plugin for SSH keys held in a 1Password vault.
//!
//! Identities minted by this plugin carry an `op://` item path rather than
//! key material. The private key behind an identity is fetched from the
//! vault for the duration of a single wrap or unwrap call and is never
//! persisted; losing the identity file loses nothing but a pointer.
//!
//! The plugin speaks the standard age plugin IPC: stanzas over
//! stdin/stdout, one state machine per invocation.
//!
//! # Example interactions
//!
//! - `A`: age implementation
//! - `P`: plugin
//!
//! ## Key wrapping (`--age-plugin=recipient-v1`)
//!
//! ```text
//! A --> P | -> add-recipient age1op1...
//!         |
//! A --> P | -> wrap-file-key
//!         | Base64(FILE_KEY)
//! A --> P | -> done
//!         |
//! A <-- P | -> recipient-stanza 0 ssh-ed25519 Base64(TAG) Base64(FPR) Base64(EPK)
//!         | Base64(WRAPPED_FILE_KEY)
//! A <-- P | -> done
//! ```
//!
//! ## Key unwrapping (`--age-plugin=identity-v1`)
//!
//! ```text
//! A --> P | -> add-identity AGE-PLUGIN-OP-1...
//!         |
//! A --> P | -> recipient-stanza 0 ssh-ed25519 Base64(TAG) Base64(FPR) Base64(EPK)
//!         | Base64(WRAPPED_FILE_KEY)
//! A --> P | --- Base64(MAC)
//!         |
//! A <-- P | -> file-key 0
//!         | Base64(FILE_KEY)
//! A <-- P | -> done
//! ```
//!
//! The `TAG` argument is the first four bytes of the SHA-256 hash of the
//! item path; it routes a wrapped stanza to the identity that can unwrap
//! it without trial-decrypting against every configured identity. It is a
//! routing hint, not a commitment: distinct paths can collide, in which
//! case the first matching identity wins.

use std::fmt;

use secrecy::{ExposeSecret, SecretVec};

mod envelope;
mod error;
mod format;
mod identity;
mod op;
mod primitives;
mod protocol;
mod recipient;
mod ssh;
mod util;

pub use secrecy;

pub use error::Error;
pub use format::{Stanza, StanzaReader};
pub use identity::Identity;
pub use op::{OpCli, SecretSource};
pub use protocol::{run_identity_v1, run_recipient_v1};
pub use recipient::Recipient;

/// Name this plugin is registered under. Determines the Bech32
/// human-readable parts of its recipient and identity encodings.
pub const PLUGIN_NAME: &str = "op";

/// A file key in transit between wrap and unwrap.
pub struct FileKey(pub(crate) SecretVec<u8>);

impl From<Vec<u8>> for FileKey {
    fn from(file_key: Vec<u8>) -> Self {
        FileKey(SecretVec::new(file_key))
    }
}

impl ExposeSecret<Vec<u8>> for FileKey {
    fn expose_secret(&self) -> &Vec<u8> {
        self.0.expose_secret()
    }
}

/// Sink for the trace a protocol handler emits while serving an exchange.
///
/// Handlers take the sink by injection so tests can capture or discard
/// the trace without process-global state.
pub trait LogSink {
    /// Records one trace line.
    fn line(&mut self, message: fmt::Arguments<'_>);
}

/// Discards the trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct NopLog;

impl LogSink for NopLog {
    fn line(&mut self, _: fmt::Arguments<'_>) {}
}

/// Forwards the trace to the `log` crate at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct DebugLog;

impl LogSink for DebugLog {
    fn line(&mut self, message: fmt::Arguments<'_>) {
        log::debug!("{}", message);
    }
}
