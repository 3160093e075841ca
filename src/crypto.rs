//! Transmission encryption for identity documents sent to the bureaus.
//!
//! AES-256-CBC with PKCS#7 padding and a fresh random IV per call. The key is
//! derived with scrypt from an operator-supplied secret and a per-deployment
//! salt; neither is compiled into the binary.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CryptoError;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

// scrypt cost parameters: N = 2^14, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

/// A derived 256-bit transmission key.
#[derive(Clone)]
pub struct TransmissionKey {
    bytes: [u8; KEY_LEN],
}

impl TransmissionKey {
    /// Derives the key from the configured secret and salt.
    pub fn derive(secret: &str, salt: &str) -> Result<Self, CryptoError> {
        let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        let mut bytes = [0u8; KEY_LEN];
        scrypt::scrypt(secret.as_bytes(), salt.as_bytes(), &params, &mut bytes)
            .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

        Ok(Self { bytes })
    }
}

impl fmt::Debug for TransmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TransmissionKey([REDACTED])")
    }
}

/// Hex-encoded ciphertext and the IV it was produced with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedPayload {
    pub iv: String,
    pub encrypted_data: String,
}

/// Encrypts `plaintext` under `key` with a freshly generated IV.
pub fn encrypt(plaintext: &str, key: &TransmissionKey) -> EncryptedPayload {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let ciphertext = Aes256CbcEnc::new(&key.bytes.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

    EncryptedPayload {
        iv: hex::encode(iv),
        encrypted_data: hex::encode(ciphertext),
    }
}

/// Reverses [`encrypt`] given the hex ciphertext and hex IV.
pub fn decrypt(
    encrypted_data: &str,
    iv: &str,
    key: &TransmissionKey,
) -> Result<String, CryptoError> {
    let iv_bytes = hex::decode(iv)?;
    let iv: [u8; IV_LEN] = iv_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::InvalidIv(iv_bytes.len()))?;
    let ciphertext = hex::decode(encrypted_data)?;

    let plaintext = Aes256CbcDec::new(&key.bytes.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;

    Ok(String::from_utf8(plaintext)?)
}
