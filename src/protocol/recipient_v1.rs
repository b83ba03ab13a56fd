//! The recipient-v1 state machine: collect recipients, identities, and
//! file keys, then wrap every file key to every resolved recipient.

use std::io::{BufRead, Write};

use super::{indexed_error_stanza, internal_error_stanza, respond, Outcome};
use crate::{
    error::Error,
    format::{decode_string, Stanza},
    identity::Identity,
    op::SecretSource,
    recipient::Recipient,
    util::write::encoded,
    FileKey, LogSink,
};

/// Everything the frontend sent before `done`, still as opaque strings.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct Collected {
    pub(crate) recipients: Vec<String>,
    pub(crate) identities: Vec<String>,
    pub(crate) file_keys: Vec<String>,
}

enum State {
    Command,
    FileKey,
}

/// Phase 1: drain the command stream into a [`Collected`].
///
/// Commands arrive one per line with an optional `-> ` stanza prefix;
/// blank body-separator lines between commands are skipped. The line after
/// `wrap-file-key` is always the base64 file key, blank or not.
pub(crate) fn collect<R: BufRead>(input: R, log: &mut impl LogSink) -> Result<Collected, Error> {
    let mut collected = Collected::default();
    let mut state = State::Command;

    for line in input.lines() {
        let line = line?;
        match state {
            State::FileKey => {
                log.line(format_args!("wrap-file-key: {}", line));
                collected.file_keys.push(line);
                state = State::Command;
            }
            State::Command => {
                if line.is_empty() {
                    continue;
                }
                let entry = line.strip_prefix("-> ").unwrap_or(&line);
                let mut split = entry.splitn(2, ' ');
                let command = split.next().expect("splitn yields at least one token");
                match (command, split.next()) {
                    ("add-recipient", Some(arg)) => {
                        log.line(format_args!("add-recipient: {}", arg));
                        collected.recipients.push(arg.to_owned());
                    }
                    ("add-identity", Some(arg)) => {
                        log.line(format_args!("add-identity: {}", arg));
                        collected.identities.push(arg.to_owned());
                    }
                    ("wrap-file-key", _) => state = State::FileKey,
                    ("done", _) => break,
                    _ => log.line(format_args!("ignoring command: {}", command)),
                }
            }
        }
    }

    Ok(collected)
}

/// Phase 2: decode the collected strings and wrap every file key to every
/// resolved recipient. Pure with respect to the pipe; all I/O is the
/// secret fetches behind `keys`.
pub(crate) fn resolve(
    collected: &Collected,
    keys: &impl SecretSource,
    log: &mut impl LogSink,
) -> Outcome {
    let mut outcome = Outcome::default();

    // Combined target order: recipient tokens first, then the recipients
    // derived from identity tokens. Indices are fixed before any skips so
    // they still line up with what the frontend sent.
    let mut recipients: Vec<(usize, Recipient)> = Vec::new();
    for (index, token) in collected.recipients.iter().enumerate() {
        match token.parse::<Recipient>() {
            Ok(recipient) => recipients.push((index, recipient)),
            Err(err) => {
                log.line(format_args!("failed to decode recipient: {}", err));
                outcome
                    .errors
                    .push(indexed_error_stanza("recipient", index, &err));
            }
        }
    }
    let offset = collected.recipients.len();
    for (index, token) in collected.identities.iter().enumerate() {
        match token.parse::<Identity>() {
            // Deriving a recipient needs only the path, not the secret.
            Ok(identity) => recipients.push((offset + index, identity.to_recipient())),
            Err(err) => {
                log.line(format_args!("failed to decode identity: {}", err));
                outcome
                    .errors
                    .push(indexed_error_stanza("identity", index, &err));
            }
        }
    }

    for file_key_b64 in &collected.file_keys {
        let file_key = match decode_string(file_key_b64) {
            Ok(bytes) => FileKey::from(bytes),
            Err(err) => {
                outcome.errors.push(internal_error_stanza(&err));
                continue;
            }
        };

        for (target, recipient) in &recipients {
            match recipient.wrap_file_key(&file_key, keys) {
                Ok(inner_stanzas) => {
                    for inner in inner_stanzas {
                        let Stanza { tag, args, body } = inner;
                        let mut wrapped_args =
                            vec![target.to_string(), tag, encoded(recipient.tag())];
                        wrapped_args.extend(args);
                        outcome.stanzas.push(Stanza {
                            tag: "recipient-stanza".to_owned(),
                            args: wrapped_args,
                            body,
                        });
                    }
                }
                Err(err) => {
                    log.line(format_args!("failed to wrap file key: {}", err));
                    outcome.errors.push(internal_error_stanza(&err));
                }
            }
        }
    }

    outcome
}

/// Serves one complete recipient-v1 exchange.
pub fn run_recipient_v1<R, W, S, L>(input: R, output: W, keys: &S, log: &mut L) -> Result<(), Error>
where
    R: BufRead,
    W: Write,
    S: SecretSource,
    L: LogSink,
{
    let collected = collect(input, log)?;
    let outcome = resolve(&collected, keys, log);
    respond(output, &outcome)
}
