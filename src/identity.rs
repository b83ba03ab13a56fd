use std::fmt;
use std::str::FromStr;

use secrecy::ExposeSecret;

use crate::{
    envelope,
    error::Error,
    format::Stanza,
    op::SecretSource,
    recipient::Recipient,
    ssh::SshKey,
    FileKey, PLUGIN_NAME,
};

/// Identity format version emitted by this plugin.
const IDENTITY_VERSION: u8 = 1;

/// The capability to unwrap file keys wrapped to the SSH key stored at a
/// vault item path.
///
/// Holds no key material: every unwrap re-fetches the key from the vault,
/// so the secret never outlives a single call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Identity {
    version: u8,
    key_path: String,
}

impl Identity {
    pub fn new(key_path: String) -> Self {
        Identity {
            version: IDENTITY_VERSION,
            key_path,
        }
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn key_path(&self) -> &str {
        &self.key_path
    }

    /// The recipient this identity can unwrap for.
    pub fn to_recipient(&self) -> Recipient {
        Recipient::new(self.key_path.clone())
    }

    /// Unwraps one inner SSH stanza with freshly fetched key material.
    pub fn unwrap_file_key(
        &self,
        stanza: &Stanza,
        keys: &impl SecretSource,
    ) -> Result<FileKey, Error> {
        let material = keys.fetch(&self.key_path)?;
        let ssh_key = SshKey::parse(material.expose_secret())?;
        ssh_key.unwrap_file_key(stanza)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(1 + self.key_path.len());
        payload.push(self.version);
        payload.extend_from_slice(self.key_path.as_bytes());
        f.write_str(&envelope::encode_identity(PLUGIN_NAME, &payload))
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let (name, payload) = envelope::parse_identity(s)?;
        if name != PLUGIN_NAME {
            return Err(Error::InvalidPluginName(name));
        }
        let (version, path) = payload
            .split_first()
            .ok_or_else(|| Error::Decode("empty identity payload".to_owned()))?;
        let key_path = String::from_utf8(path.to_vec())
            .map_err(|_| Error::Decode("identity key path is not valid UTF-8".to_owned()))?;
        Ok(Identity {
            version: *version,
            key_path,
        })
    }
}
