//! The Bech32 envelopes that make recipients and identities shareable text.
//!
//! Recipients use the lowercase `age1<name>` human-readable part;
//! identities use `age-plugin-<name>-` and are rendered uppercase. The
//! payload layout inside the envelope is the caller's contract.

use bech32::{FromBase32, ToBase32};

use crate::error::Error;

const RECIPIENT_PREFIX: &str = "age1";
const IDENTITY_PREFIX: &str = "age-plugin-";

pub(crate) fn encode_recipient(plugin_name: &str, data: &[u8]) -> String {
    bech32::encode(&format!("{}{}", RECIPIENT_PREFIX, plugin_name), data.to_base32())
        .expect("HRP is valid")
}

pub(crate) fn encode_identity(plugin_name: &str, data: &[u8]) -> String {
    bech32::encode(
        &format!("{}{}-", IDENTITY_PREFIX, plugin_name),
        data.to_base32(),
    )
    .expect("HRP is valid")
    .to_uppercase()
}

fn decode(s: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data) =
        bech32::decode(s).map_err(|e| Error::Decode(format!("invalid bech32: {}", e)))?;
    let data =
        Vec::from_base32(&data).map_err(|e| Error::Decode(format!("invalid bech32: {}", e)))?;
    Ok((hrp.to_lowercase(), data))
}

/// Splits a recipient string into its plugin name and payload.
pub(crate) fn parse_recipient(s: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data) = decode(s)?;
    if hrp.starts_with(RECIPIENT_PREFIX) && hrp.len() > RECIPIENT_PREFIX.len() {
        Ok((hrp[RECIPIENT_PREFIX.len()..].to_owned(), data))
    } else {
        Err(Error::Decode(format!("not a plugin recipient: {:?}", s)))
    }
}

/// Splits an identity string into its plugin name and payload.
pub(crate) fn parse_identity(s: &str) -> Result<(String, Vec<u8>), Error> {
    let (hrp, data) = decode(s)?;
    if hrp.starts_with(IDENTITY_PREFIX) && hrp.ends_with('-') && hrp.len() > IDENTITY_PREFIX.len()
    {
        Ok((hrp[IDENTITY_PREFIX.len()..hrp.len() - 1].to_owned(), data))
    } else {
        Err(Error::Decode(format!("not a plugin identity: {:?}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::{encode_identity, encode_recipient, parse_identity, parse_recipient};

    #[test]
    fn recipient_envelope_roundtrips() {
        let encoded = encode_recipient("op", b"op://Personal/key/private key");
        assert!(encoded.starts_with("age1op1"));
        let (name, payload) = parse_recipient(&encoded).unwrap();
        assert_eq!(name, "op");
        assert_eq!(payload, b"op://Personal/key/private key");
    }

    #[test]
    fn identity_envelope_roundtrips() {
        let encoded = encode_identity("op", b"\x01op://Personal/key/private key");
        assert!(encoded.starts_with("AGE-PLUGIN-OP-1"));
        let (name, payload) = parse_identity(&encoded).unwrap();
        assert_eq!(name, "op");
        assert_eq!(payload, b"\x01op://Personal/key/private key");
    }

    #[test]
    fn envelopes_are_not_interchangeable() {
        let recipient = encode_recipient("op", b"path");
        let identity = encode_identity("op", b"path");
        assert!(parse_identity(&recipient).is_err());
        assert!(parse_recipient(&identity).is_err());
    }
}
