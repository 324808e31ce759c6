/// AES-128-CBC with key-derived IV
///
/// Keys of any length are normalized to 16 bytes. The normalized key is also
/// used as the IV. This is weak (identical plaintexts under one key produce
/// identical ciphertexts) but every issued license key depends on it, so it
/// must not change without a new key format version.
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::Pkcs7};
use base64::{Engine as _, engine::general_purpose};
use md5::{Digest, Md5};

use crate::error::{LicenseError, LicenseResult};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// AES-128 key size in bytes
pub const KEY_LENGTH: usize = 16;

/// Normalize a key string to exactly 16 bytes
///
/// A key that is already 16 bytes long is used verbatim, anything else is
/// replaced by its MD5 digest.
pub fn normalize_key(key: &str) -> [u8; KEY_LENGTH] {
    let mut out = [0u8; KEY_LENGTH];
    if key.len() == KEY_LENGTH {
        out.copy_from_slice(key.as_bytes());
    } else {
        out.copy_from_slice(&Md5::digest(key.as_bytes()));
    }
    out
}

/// Encrypt a string
///
/// # Arguments
/// * `plaintext` - UTF-8 text to encrypt
/// * `key` - Key string (normalized to 16 bytes)
///
/// # Returns
/// Standard base64 of the ciphertext
pub fn encrypt(plaintext: &str, key: &str) -> LicenseResult<String> {
    let key_bytes = normalize_key(key);
    let cipher = Aes128CbcEnc::new_from_slices(&key_bytes, &key_bytes)
        .map_err(|e| LicenseError::Cipher(format!("cipher init failed: {}", e)))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    Ok(general_purpose::STANDARD.encode(ciphertext))
}

/// Decrypt a base64 string produced by [`encrypt`]
pub fn decrypt(ciphertext_b64: &str, key: &str) -> LicenseResult<String> {
    let ciphertext = general_purpose::STANDARD
        .decode(ciphertext_b64)
        .map_err(|e| LicenseError::Cipher(format!("base64 decode failed: {}", e)))?;

    let key_bytes = normalize_key(key);
    let cipher = Aes128CbcDec::new_from_slices(&key_bytes, &key_bytes)
        .map_err(|e| LicenseError::Cipher(format!("cipher init failed: {}", e)))?;
    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| LicenseError::Cipher("bad padding or wrong key".to_string()))?;

    String::from_utf8(plaintext)
        .map_err(|_| LicenseError::Cipher("plaintext is not valid UTF-8".to_string()))
}
