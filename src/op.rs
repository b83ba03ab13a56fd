//! Key material retrieval through the 1Password CLI.

use std::process::Command;

use secrecy::SecretVec;

use crate::error::Error;

/// Source of SSH private keys addressed by vault item paths.
///
/// Every fetch is an independent call; implementations must not cache key
/// material between calls, so a secret never outlives the single wrap or
/// unwrap that needed it.
pub trait SecretSource {
    /// Fetches the raw private key stored at `key_path`.
    fn fetch(&self, key_path: &str) -> Result<SecretVec<u8>, Error>;
}

/// Fetches keys with `op read`, one subprocess per call.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpCli;

impl SecretSource for OpCli {
    fn fetch(&self, key_path: &str) -> Result<SecretVec<u8>, Error> {
        let output = Command::new("op")
            .arg("read")
            .arg(key_path)
            .output()
            .map_err(|e| {
                Error::KeyFetch(format!("could not read private key from 1Password: {}", e))
            })?;

        if !output.status.success() {
            return Err(Error::KeyFetch(format!(
                "could not read private key from 1Password: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(SecretVec::new(output.stdout))
    }
}
