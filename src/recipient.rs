use std::fmt;
use std::str::FromStr;

use secrecy::ExposeSecret;
use sha2::{Digest, Sha256};

use crate::{
    envelope,
    error::Error,
    format::Stanza,
    op::SecretSource,
    ssh::SshKey,
    FileKey, PLUGIN_NAME,
};

pub(crate) const TAG_BYTES: usize = 4;

/// Routing fingerprint of a vault item path.
pub(crate) fn key_path_tag(key_path: &str) -> [u8; TAG_BYTES] {
    let digest = Sha256::digest(key_path.as_bytes());
    let mut tag = [0; TAG_BYTES];
    tag.copy_from_slice(&digest[..TAG_BYTES]);
    tag
}

/// The capability to wrap file keys to the SSH key stored at a vault item
/// path.
///
/// The tag is how wrapped stanzas are later routed back to the matching
/// identity. Four bytes of SHA-256 is a hint, not a commitment: distinct
/// paths can collide, and the matching layer takes the first hit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recipient {
    key_path: String,
    tag: [u8; TAG_BYTES],
}

impl Recipient {
    pub fn new(key_path: String) -> Self {
        let tag = key_path_tag(&key_path);
        Recipient { key_path, tag }
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    pub fn tag(&self) -> &[u8; TAG_BYTES] {
        &self.tag
    }

    /// Wraps `file_key` to the underlying SSH key. Key material is fetched
    /// for the duration of this one call and dropped on return.
    pub fn wrap_file_key(
        &self,
        file_key: &FileKey,
        keys: &impl SecretSource,
    ) -> Result<Vec<Stanza>, Error> {
        let material = keys.fetch(&self.key_path)?;
        let ssh_key = SshKey::parse(material.expose_secret())?;
        ssh_key.wrap_file_key(file_key)
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&envelope::encode_recipient(
            PLUGIN_NAME,
            self.key_path.as_bytes(),
        ))
    }
}

impl FromStr for Recipient {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (name, payload) = envelope::parse_recipient(s)?;
        if name != PLUGIN_NAME {
            return Err(Error::InvalidPluginName(name));
        }
        let key_path = String::from_utf8(payload)
            .map_err(|_| Error::Decode("recipient key path is not valid UTF-8".to_owned()))?;
        Ok(Recipient::new(key_path))
    }
}

#[cfg(test)]
mod tests {
    use sha2::{Digest, Sha256};

    use super::{key_path_tag, Recipient};
    use crate::error::Error;

    #[test]
    fn tag_is_the_sha256_prefix_of_the_path() {
        let path = "op://Personal/wxrzetxonuggniebjzruxycq/private key";
        let digest = Sha256::digest(path.as_bytes());
        assert_eq!(key_path_tag(path), digest[..4]);
        assert_eq!(Recipient::new(path.to_owned()).tag()[..], digest[..4]);
    }

    #[test]
    fn recipient_string_roundtrips() {
        for path in &[
            "",
            "op://Personal/key/private key",
            "op://Personal/ключ/私有鍵",
        ] {
            let recipient = Recipient::new((*path).to_owned());
            let parsed: Recipient = recipient.to_string().parse().unwrap();
            assert_eq!(parsed, recipient);
        }
    }

    #[test]
    fn foreign_plugin_recipients_are_rejected() {
        let foreign = bech32::encode("age1yubikey", {
            use bech32::ToBase32;
            b"payload".to_base32()
        })
        .unwrap();
        match foreign.parse::<Recipient>() {
            Err(Error::InvalidPluginName(name)) => assert_eq!(name, "yubikey"),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
