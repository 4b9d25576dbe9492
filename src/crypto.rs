// ABOUTME: AES-256-GCM encryption of persisted secrets with a passphrase-derived key
// ABOUTME: AAD binds each ciphertext to its owning row so copied ciphertexts fail to open
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Channelscope Project

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};

use crate::errors::{AppError, AppResult};

/// Symmetric cipher over persisted secrets.
///
/// Stored format is base64 of `nonce || ciphertext || tag` with a fresh
/// random nonce per encryption.
#[derive(Clone)]
pub struct SecretCipher {
    key: Vec<u8>,
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher").finish_non_exhaustive()
    }
}

impl SecretCipher {
    /// Derive the AES-256 key from an operator-supplied passphrase
    #[must_use]
    pub fn from_passphrase(passphrase: &str) -> Self {
        let key = digest::digest(&digest::SHA256, passphrase.as_bytes());
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    /// Encrypt a secret with no additional context
    ///
    /// # Errors
    ///
    /// Returns an error if key setup or nonce generation fails.
    pub fn encrypt(&self, plaintext: &str) -> AppResult<String> {
        self.seal(plaintext, b"")
    }

    /// Decrypt a secret produced by [`Self::encrypt`]
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` on any tampering, truncation, or key
    /// mismatch.
    pub fn decrypt(&self, encoded: &str) -> AppResult<String> {
        self.open(encoded, b"")
    }

    /// Encrypt a secret bound to a context string.
    ///
    /// The same context must be supplied on decrypt; a ciphertext moved to
    /// a different row fails authentication.
    ///
    /// # Errors
    ///
    /// Returns an error if key setup or nonce generation fails.
    pub fn encrypt_with_aad(&self, plaintext: &str, aad: &str) -> AppResult<String> {
        self.seal(plaintext, aad.as_bytes())
    }

    /// Decrypt a secret bound to a context string
    ///
    /// # Errors
    ///
    /// Returns `DecryptionFailed` on tampering, a wrong key, or an AAD
    /// mismatch.
    pub fn decrypt_with_aad(&self, encoded: &str, aad: &str) -> AppResult<String> {
        self.open(encoded, aad.as_bytes())
    }

    fn sealing_key(&self) -> AppResult<LessSafeKey> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.key)
            .map_err(|_| AppError::internal("cipher key setup failed"))?;
        Ok(LessSafeKey::new(unbound))
    }

    fn seal(&self, plaintext: &str, aad: &[u8]) -> AppResult<String> {
        let key = self.sealing_key()?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| AppError::internal("nonce generation failed"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_bytes);

        let mut in_out = plaintext.as_bytes().to_vec();
        key.seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| AppError::internal("encryption failed"))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + in_out.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);
        Ok(STANDARD.encode(blob))
    }

    fn open(&self, encoded: &str, aad: &[u8]) -> AppResult<String> {
        let blob = STANDARD
            .decode(encoded)
            .map_err(|_| AppError::decryption_failed("ciphertext is not valid base64"))?;
        if blob.len() <= NONCE_LEN {
            return Err(AppError::decryption_failed("ciphertext too short"));
        }

        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_LEN);
        let nonce_array: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| AppError::decryption_failed("malformed nonce"))?;
        let nonce = Nonce::assume_unique_for_key(nonce_array);

        let key = self.sealing_key()?;
        let mut in_out = ciphertext.to_vec();
        let plaintext = key
            .open_in_place(nonce, Aad::from(aad), &mut in_out)
            .map_err(|_| AppError::decryption_failed("ciphertext failed authentication"))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| AppError::decryption_failed("decrypted payload is not UTF-8"))
    }
}
