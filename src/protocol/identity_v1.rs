//! The identity-v1 state machine: parse a header of recipients,
//! identities, and wrapped stanzas, route each wrapped stanza to the
//! matching identity by tag, and unwrap.

use std::io::{BufRead, Write};

use secrecy::ExposeSecret;

use super::{indexed_error_stanza, internal_error_stanza, respond, Outcome};
use crate::{
    error::Error,
    format::{decode_string, HeaderEntry, Stanza, StanzaReader},
    identity::Identity,
    op::SecretSource,
    recipient::Recipient,
    ssh::{SSH_ED25519_STANZA_TAG, SSH_RSA_STANZA_TAG},
    LogSink,
};

const MAC_LEN_BYTES: usize = 32;

/// Header entries collected before the footer, still unresolved.
#[derive(Debug, Default)]
pub(crate) struct Collected {
    pub(crate) recipients: Vec<Stanza>,
    pub(crate) identities: Vec<Stanza>,
    pub(crate) wrapped: Vec<Stanza>,
}

/// Phase 1: parse the header up to `done` or the MAC footer. Any framing
/// failure here is fatal to the exchange.
pub(crate) fn collect<R: BufRead>(
    reader: &mut StanzaReader<R>,
    log: &mut impl LogSink,
) -> Result<Collected, Error> {
    let mut collected = Collected::default();

    loop {
        match reader.read_header_entry()? {
            HeaderEntry::Footer(args) => {
                if args.len() != 1 {
                    return Err(Error::Framing(format!(
                        "malformed closing line: {:?}",
                        args
                    )));
                }
                let mac = decode_string(&args[0])?;
                if mac.len() != MAC_LEN_BYTES {
                    return Err(Error::Framing(
                        "malformed closing line: bad MAC length".to_owned(),
                    ));
                }
                break;
            }
            HeaderEntry::Stanza(stanza) => match stanza.tag.as_str() {
                "add-recipient" => {
                    log.line(format_args!("add-recipient: {:?}", stanza.args));
                    collected.recipients.push(stanza);
                }
                "add-identity" => {
                    log.line(format_args!("add-identity: {:?}", stanza.args));
                    collected.identities.push(stanza);
                }
                "recipient-stanza" => {
                    log.line(format_args!("recipient-stanza: {:?}", stanza.args));
                    collected.wrapped.push(stanza);
                }
                "done" => break,
                other => log.line(format_args!("ignoring stanza: {}", other)),
            },
        }
    }

    Ok(collected)
}

/// Phase 2: resolve identities, route each wrapped stanza to its identity
/// by tag, and unwrap.
pub(crate) fn resolve(
    collected: &Collected,
    keys: &impl SecretSource,
    log: &mut impl LogSink,
) -> Result<Outcome, Error> {
    let mut outcome = Outcome::default();

    let mut identities: Vec<Identity> = Vec::new();
    for (index, stanza) in collected.recipients.iter().enumerate() {
        let parsed = stanza
            .args
            .get(0)
            .ok_or_else(|| Error::Decode("add-recipient is missing its argument".to_owned()))
            .and_then(|arg| arg.parse::<Recipient>());
        match parsed {
            Ok(recipient) => identities.push(Identity::new(recipient.key_path().to_owned())),
            Err(err) => {
                log.line(format_args!("failed to decode recipient: {}", err));
                outcome
                    .errors
                    .push(indexed_error_stanza("recipient", index, &err));
            }
        }
    }
    for (index, stanza) in collected.identities.iter().enumerate() {
        let parsed = stanza
            .args
            .get(0)
            .ok_or_else(|| Error::Decode("add-identity is missing its argument".to_owned()))
            .and_then(|arg| arg.parse::<Identity>());
        match parsed {
            Ok(identity) => identities.push(identity),
            Err(err) => {
                log.line(format_args!("failed to decode identity: {}", err));
                outcome
                    .errors
                    .push(indexed_error_stanza("identity", index, &err));
            }
        }
    }

    for (index, wrapped) in collected.wrapped.iter().enumerate() {
        if wrapped.args.len() < 4 {
            return Err(Error::Framing(format!(
                "malformed recipient-stanza: {:?}",
                wrapped.args
            )));
        }

        let inner_type = wrapped.args[1].as_str();
        if inner_type != SSH_RSA_STANZA_TAG && inner_type != SSH_ED25519_STANZA_TAG {
            log.line(format_args!("not an ssh stanza: {}", inner_type));
            continue;
        }

        // The tag and session key arguments are structural; a stream that
        // garbles them cannot be trusted any further.
        let tag = decode_string(&wrapped.args[2])
            .map_err(|err| Error::Framing(format!("failed to base64 decode tag: {}", err)))?;
        decode_string(&wrapped.args[3]).map_err(|err| {
            Error::Framing(format!("failed to base64 decode session key: {}", err))
        })?;

        // First registered identity with a matching tag wins; 4-byte tags
        // can collide and no further disambiguation is attempted.
        let identity = identities
            .iter()
            .find(|identity| identity.to_recipient().tag()[..] == tag[..])
            .ok_or_else(|| Error::NoMatchingIdentity(wrapped.args[2].clone()))?;

        let inner = Stanza {
            tag: inner_type.to_owned(),
            args: wrapped.args[3..].to_vec(),
            body: wrapped.body.clone(),
        };
        match identity.unwrap_file_key(&inner, keys) {
            Ok(file_key) => outcome.stanzas.push(Stanza {
                tag: "file-key".to_owned(),
                args: vec![index.to_string()],
                body: file_key.expose_secret().clone(),
            }),
            Err(err) => {
                log.line(format_args!("failed to unwrap file key: {}", err));
                outcome.errors.push(internal_error_stanza(&err));
            }
        }
    }

    Ok(outcome)
}

/// Serves one complete identity-v1 exchange. Structural failures abort the
/// exchange with no closing `done`.
pub fn run_identity_v1<R, W, S, L>(input: R, output: W, keys: &S, log: &mut L) -> Result<(), Error>
where
    R: BufRead,
    W: Write,
    S: SecretSource,
    L: LogSink,
{
    let mut reader = StanzaReader::new(input);
    let collected = collect(&mut reader, log)?;
    let outcome = resolve(&collected, keys, log)?;
    respond(output, &outcome)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::collect;
    use crate::format::StanzaReader;
    use crate::NopLog;

    fn reader(input: &str) -> StanzaReader<Cursor<Vec<u8>>> {
        StanzaReader::new(Cursor::new(input.as_bytes().to_vec()))
    }

    #[test]
    fn collect_stops_at_the_footer() {
        let mac = "A".repeat(43);
        let input = format!(
            "-> add-identity AGE-PLUGIN-OP-TEST\n\n-> recipient-stanza 0 ssh-rsa dGFn c2Vz\nQUJD\n--- {}\n",
            mac
        );
        let collected = collect(&mut reader(&input), &mut NopLog).unwrap();
        assert_eq!(collected.identities.len(), 1);
        assert_eq!(collected.wrapped.len(), 1);
        assert_eq!(collected.wrapped[0].body, b"ABC");
    }

    #[test]
    fn collect_stops_at_done_without_a_footer() {
        let input = "-> add-recipient age1op1test\n\n-> done\n\n";
        let collected = collect(&mut reader(input), &mut NopLog).unwrap();
        assert_eq!(collected.recipients.len(), 1);
    }

    #[test]
    fn short_mac_is_fatal() {
        let input = "--- QUJD\n";
        assert!(collect(&mut reader(input), &mut NopLog).is_err());
    }

    #[test]
    fn extra_footer_arguments_are_fatal() {
        let mac = "A".repeat(43);
        let input = format!("--- {} extra\n", mac);
        assert!(collect(&mut reader(&input), &mut NopLog).is_err());
    }
}
