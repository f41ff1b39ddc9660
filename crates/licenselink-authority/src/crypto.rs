//! RSA wrapping of license tokens.
//!
//! A plaintext token is a hex string. Wrapping decodes it to raw bytes,
//! encrypts them with the authority's public key (PKCS#1 v1.5) and
//! hex-encodes the ciphertext. Only the holder of the private key can turn
//! a wrapped token back into the lookup key, which is what makes a wrapped
//! token a redemption proof.
//!
//! Every unwrap failure is reported as the same [`CryptoError::Decrypt`] so
//! callers cannot tell malformed input from a wrong key or bad padding.

use rand::rngs::OsRng;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fmt;
use thiserror::Error;

/// Errors from token wrapping.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// No public key was supplied to wrap with.
    #[error("No public key supplied")]
    MissingKey,
    /// The plaintext token is not valid hex.
    #[error("Token is not valid hex")]
    InvalidToken,
    /// Encryption failed (e.g. the token is longer than the modulus allows).
    #[error("Encryption failed: {0}")]
    Encrypt(String),
    /// Any unwrap failure. Deliberately carries no detail.
    #[error("Decryption failed")]
    Decrypt,
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),
}

/// An authority's RSA key pair.
pub struct KeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a fresh key pair with a `bits`-bit modulus.
    pub fn generate(bits: usize) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = RsaPublicKey::from(&private);
        Ok(Self { private, public })
    }

    /// Rebuild a key pair from an existing private key.
    pub fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        Self { private, public }
    }

    pub fn public(&self) -> &RsaPublicKey {
        &self.public
    }

    pub fn private(&self) -> &RsaPrivateKey {
        &self.private
    }

    /// Modulus size in bits.
    pub fn bits(&self) -> usize {
        self.public.size() * 8
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("bits", &self.bits())
            .finish_non_exhaustive()
    }
}

/// Encrypt the raw bytes of `token_hex` under `public_key`.
pub fn wrap(token_hex: &str, public_key: Option<&RsaPublicKey>) -> Result<String, CryptoError> {
    let public_key = public_key.ok_or(CryptoError::MissingKey)?;
    let raw = hex::decode(token_hex).map_err(|_| CryptoError::InvalidToken)?;
    let encrypted = public_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, &raw)
        .map_err(|e| CryptoError::Encrypt(e.to_string()))?;
    Ok(hex::encode(encrypted))
}

/// Recover the lowercase hex token from a wrapped token.
pub fn unwrap(ciphertext_hex: &str, private_key: &RsaPrivateKey) -> Result<String, CryptoError> {
    let ciphertext = hex::decode(ciphertext_hex).map_err(|_| CryptoError::Decrypt)?;
    let plain = private_key
        .decrypt(Pkcs1v15Encrypt, &ciphertext)
        .map_err(|_| CryptoError::Decrypt)?;
    Ok(hex::encode(plain))
}
