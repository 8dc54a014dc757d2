// Copyright 2025 Juan Miguel Giraldo
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! Cryptographic primitives: RSA key pairs for wrapping per-layer symmetric
//! keys, AES-256-GCM for the layer bodies, and the base64 text codec used
//! on the wire. Pure and stateless; no protocol knowledge.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use thiserror::Error;

pub const RSA_BITS: usize = 2048;
pub const AES_KEY_SIZE: usize = 32;
pub const AES_NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("key generation failed: {0}")]
    KeyGeneration(rsa::Error),
    #[error("asymmetric encryption failed: {0}")]
    AsymmetricEncrypt(rsa::Error),
    #[error("asymmetric decryption failed: {0}")]
    AsymmetricDecrypt(rsa::Error),
    #[error("symmetric encryption failed")]
    SymmetricEncrypt,
    #[error("symmetric decryption failed")]
    SymmetricDecrypt,
    #[error("symmetric key must be {AES_KEY_SIZE} bytes")]
    InvalidKeyLength,
    #[error("ciphertext shorter than the nonce")]
    TruncatedCiphertext,
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),
}

pub fn generate_rsa_keys() -> Result<RsaPrivateKey, CryptoError> {
    RsaPrivateKey::new(&mut OsRng, RSA_BITS).map_err(CryptoError::KeyGeneration)
}

/// Encrypts a short block (a symmetric key) under `pub_key`. PKCS#1 v1.5
/// padding is randomized, so ciphertexts are non-deterministic. Fails if
/// `data` exceeds the padding capacity of the modulus.
pub fn rsa_encrypt(pub_key: &RsaPublicKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    pub_key
        .encrypt(&mut OsRng, Pkcs1v15Encrypt, data)
        .map_err(CryptoError::AsymmetricEncrypt)
}

pub fn rsa_decrypt(priv_key: &RsaPrivateKey, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    priv_key
        .decrypt(Pkcs1v15Encrypt, data)
        .map_err(CryptoError::AsymmetricDecrypt)
}

pub fn generate_aes_key() -> [u8; AES_KEY_SIZE] {
    rand::random()
}

/// Reconstructs a symmetric key from its raw exported form.
pub fn import_aes_key(bytes: &[u8]) -> Result<[u8; AES_KEY_SIZE], CryptoError> {
    bytes.try_into().map_err(|_| CryptoError::InvalidKeyLength)
}

/// Encrypts `data` with a fresh random nonce per call; the nonce is carried
/// after the ciphertext (`ciphertext || nonce`). Encrypting the same
/// plaintext twice under the same key yields different ciphertexts.
pub fn aes_encrypt(key: &[u8; AES_KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));

    let nonce_bytes = rand::random::<[u8; AES_NONCE_SIZE]>();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut out = cipher
        .encrypt(nonce, data)
        .map_err(|_| CryptoError::SymmetricEncrypt)?;
    out.extend_from_slice(&nonce_bytes);
    Ok(out)
}

/// Splits the trailing nonce and decrypts. GCM authenticates, so a wrong
/// key or a tampered ciphertext fails here rather than yielding garbage.
pub fn aes_decrypt(key: &[u8; AES_KEY_SIZE], data: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if data.len() < AES_NONCE_SIZE {
        return Err(CryptoError::TruncatedCiphertext);
    }
    let (ciphertext, nonce_bytes) = data.split_at(data.len() - AES_NONCE_SIZE);

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| CryptoError::SymmetricDecrypt)
}

pub fn encode_b64(data: &[u8]) -> String {
    BASE64.encode(data)
}

pub fn decode_b64(data: impl AsRef<[u8]>) -> Result<Vec<u8>, CryptoError> {
    Ok(BASE64.decode(data)?)
}
