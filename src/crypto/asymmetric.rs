/// RSA (PKCS#1 v1.5) for the online channel secrets
///
/// Keys travel as base64 DER: PKCS#8 for private keys and
/// SubjectPublicKeyInfo for public keys.
use base64::{Engine as _, engine::general_purpose};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};

use crate::error::{LicenseError, LicenseResult};

/// Default modulus size for generated key pairs
pub const DEFAULT_KEY_BITS: usize = 2048;

/// Base64-encoded key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public_key: String,
    pub private_key: String,
}

/// Generate a new RSA key pair
pub fn generate_key_pair(bits: usize) -> LicenseResult<KeyPair> {
    let mut rng = rand::thread_rng();
    let private = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| LicenseError::Cipher(format!("key generation failed: {}", e)))?;
    let public = RsaPublicKey::from(&private);

    let private_der = private
        .to_pkcs8_der()
        .map_err(|e| LicenseError::Cipher(format!("private key encoding failed: {}", e)))?;
    let public_der = public
        .to_public_key_der()
        .map_err(|e| LicenseError::Cipher(format!("public key encoding failed: {}", e)))?;

    Ok(KeyPair {
        public_key: general_purpose::STANDARD.encode(public_der.as_bytes()),
        private_key: general_purpose::STANDARD.encode(private_der.as_bytes()),
    })
}

/// Encrypt with a base64 public key
pub fn encrypt(plaintext: &str, public_key_b64: &str) -> LicenseResult<String> {
    let der = decode_b64(public_key_b64, "public key")?;
    let public = RsaPublicKey::from_public_key_der(&der)
        .map_err(|e| LicenseError::Cipher(format!("invalid public key: {}", e)))?;

    let mut rng = rand::thread_rng();
    let ciphertext = public
        .encrypt(&mut rng, Pkcs1v15Encrypt, plaintext.as_bytes())
        .map_err(|e| LicenseError::Cipher(format!("RSA encryption failed: {}", e)))?;
    Ok(general_purpose::STANDARD.encode(ciphertext))
}

/// Decrypt with a base64 private key
pub fn decrypt(ciphertext_b64: &str, private_key_b64: &str) -> LicenseResult<String> {
    let der = decode_b64(private_key_b64, "private key")?;
    let private = RsaPrivateKey::from_pkcs8_der(&der)
        .map_err(|e| LicenseError::Cipher(format!("invalid private key: {}", e)))?;

    let ciphertext = decode_b64(ciphertext_b64, "ciphertext")?;
    let plaintext = private
        .decrypt(Pkcs1v15Encrypt, &ciphertext)
        .map_err(|e| LicenseError::Cipher(format!("RSA decryption failed: {}", e)))?;

    String::from_utf8(plaintext)
        .map_err(|_| LicenseError::Cipher("plaintext is not valid UTF-8".to_string()))
}

fn decode_b64(input: &str, what: &str) -> LicenseResult<Vec<u8>> {
    general_purpose::STANDARD
        .decode(input.trim())
        .map_err(|e| LicenseError::Cipher(format!("{} is not valid base64: {}", what, e)))
}
