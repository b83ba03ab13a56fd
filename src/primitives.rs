//! Thin wrappers over the AEAD and KDF primitives shared by the SSH paths.

use chacha20poly1305::{
    aead::{Aead, NewAead},
    ChaCha20Poly1305,
};
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::Error;

/// ChaCha20-Poly1305 with a zero nonce. Each key is derived fresh per
/// wrapped file key and never reused.
pub(crate) fn aead_encrypt(key: &[u8; 32], plaintext: &[u8]) -> Vec<u8> {
    let c = ChaCha20Poly1305::new((*key).into());
    c.encrypt(&[0; 12].into(), plaintext)
        .expect("we won't overflow the ChaCha20 block counter")
}

pub(crate) fn aead_decrypt(key: &[u8; 32], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    let c = ChaCha20Poly1305::new((*key).into());
    c.decrypt(&[0; 12].into(), ciphertext)
        .map_err(|_| Error::Crypto("decryption failed".to_owned()))
}

/// HKDF-SHA256, one 32-byte output block.
pub(crate) fn hkdf(salt: &[u8], label: &[u8], ikm: &[u8]) -> [u8; 32] {
    let mut okm = [0; 32];
    Hkdf::<Sha256>::new(Some(salt), ikm)
        .expand(label, &mut okm)
        .expect("okm is the correct length");
    okm
}

#[cfg(test)]
mod tests {
    use super::{aead_decrypt, aead_encrypt, hkdf};

    #[test]
    fn aead_roundtrip() {
        let key = hkdf(b"salt", b"label", b"ikm");
        let ciphertext = aead_encrypt(&key, b"file key bytes!!");
        assert_eq!(ciphertext.len(), 16 + 16);
        assert_eq!(aead_decrypt(&key, &ciphertext).unwrap(), b"file key bytes!!");
    }

    #[test]
    fn aead_rejects_tampering() {
        let key = hkdf(b"salt", b"label", b"ikm");
        let mut ciphertext = aead_encrypt(&key, b"file key bytes!!");
        ciphertext[0] ^= 1;
        assert!(aead_decrypt(&key, &ciphertext).is_err());
    }
}
