//! Encrypt-then-MAC sealing of client-held values.
//!
//! ```text
//! token = b64url(version || nonce || ciphertext) "." b64url(HMAC-SHA256(label || 0 || body))
//! ```
//!
//! The ciphertext is AES-256-GCM under a key derived from the encryption
//! secret, with the label as associated data. The MAC uses the independent
//! signature secret and is checked, in constant time, before anything is
//! decrypted. The label separates token kinds so a state token can never be
//! replayed as a session cookie.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::error::CookieError;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_VERSION: u8 = 1;
const NONCE_LEN: usize = 12;
const KEY_CONTEXT: &[u8] = b"spoa-auth cookie encryption v1";

/// Seals and opens tokens with a fixed pair of secrets.
#[derive(Clone)]
pub struct Sealer {
    cipher: Aes256Gcm,
    mac_key: Vec<u8>,
}

impl std::fmt::Debug for Sealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sealer").finish_non_exhaustive()
    }
}

impl Sealer {
    pub fn new(encryption_secret: &[u8], signature_secret: &[u8]) -> Self {
        let derived: [u8; 32] = Sha256::new()
            .chain_update(KEY_CONTEXT)
            .chain_update([0u8])
            .chain_update(encryption_secret)
            .finalize()
            .into();
        Self {
            cipher: Aes256Gcm::new(&Key::<Aes256Gcm>::from(derived)),
            mac_key: signature_secret.to_vec(),
        }
    }

    fn mac(&self, label: &str, body: &[u8]) -> Result<HmacSha256, CookieError> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac_key)
            .map_err(|_| CookieError::Invalid)?;
        mac.update(label.as_bytes());
        mac.update(&[0]);
        mac.update(body);
        Ok(mac)
    }

    /// Encrypt and sign `plaintext` under `label`.
    pub fn seal(&self, label: &str, plaintext: &[u8]) -> Result<String, CookieError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| CookieError::Invalid)?;

        let mut raw = Vec::with_capacity(1 + NONCE_LEN + ciphertext.len());
        raw.push(FORMAT_VERSION);
        raw.extend_from_slice(&nonce);
        raw.extend_from_slice(&ciphertext);
        let body = URL_SAFE_NO_PAD.encode(raw);

        let tag = self.mac(label, body.as_bytes())?.finalize().into_bytes();
        Ok(format!("{}.{}", body, URL_SAFE_NO_PAD.encode(tag)))
    }

    /// Verify and decrypt a token produced by [`Sealer::seal`] with the same label.
    pub fn open(&self, label: &str, token: &str) -> Result<Vec<u8>, CookieError> {
        let (body, tag) = token
            .split_once('.')
            .ok_or(CookieError::InvalidSignature)?;
        let tag = URL_SAFE_NO_PAD
            .decode(tag)
            .map_err(|_| CookieError::InvalidSignature)?;
        self.mac(label, body.as_bytes())?
            .verify_slice(&tag)
            .map_err(|_| CookieError::InvalidSignature)?;

        let raw = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|_| CookieError::Invalid)?;
        let (&version, rest) = raw.split_first().ok_or(CookieError::Invalid)?;
        if version != FORMAT_VERSION || rest.len() < NONCE_LEN {
            return Err(CookieError::Invalid);
        }
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: label.as_bytes(),
                },
            )
            .map_err(|_| CookieError::Invalid)
    }
}
