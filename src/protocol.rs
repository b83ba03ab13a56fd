//! The two plugin state machines.
//!
//! Each handler runs an exchange in two phases: a parsing phase that
//! drains the frontend's input into a typed collection, and a pure
//! resolution phase that turns the collection into output stanzas. Errors
//! scoped to one input item are accumulated; a single decision point at
//! the end emits either every success or every error, never a mix.

mod identity_v1;
mod recipient_v1;

pub use identity_v1::run_identity_v1;
pub use recipient_v1::run_recipient_v1;

use std::io::Write;

use crate::error::Error;
use crate::format::{write::write_stanza, Stanza};

/// Error stanza for a failure tied to the input item at `index`.
pub(crate) fn indexed_error_stanza(kind: &str, index: usize, err: &Error) -> Stanza {
    Stanza {
        tag: "error".to_owned(),
        args: vec![kind.to_owned(), index.to_string()],
        body: err.to_string().into_bytes(),
    }
}

/// Error stanza for a failure not attributable to a single input item.
pub(crate) fn internal_error_stanza(err: &Error) -> Stanza {
    Stanza {
        tag: "error".to_owned(),
        args: vec!["internal".to_owned()],
        body: err.to_string().into_bytes(),
    }
}

/// What a resolution phase produced, successes and per-item errors kept
/// apart until the output decision.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    pub(crate) stanzas: Vec<Stanza>,
    pub(crate) errors: Vec<Stanza>,
}

/// Writes the exchange response: every error if any item failed, otherwise
/// every success, then the closing `done`.
pub(crate) fn respond<W: Write>(mut output: W, outcome: &Outcome) -> Result<(), Error> {
    let stanzas = if outcome.errors.is_empty() {
        &outcome.stanzas
    } else {
        &outcome.errors
    };
    for stanza in stanzas {
        write_stanza(stanza, &mut output)?;
    }
    output.write_all(b"-> done\n\n")?;
    output.flush()?;
    Ok(())
}
