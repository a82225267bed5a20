//! Low-level crypto primitives over byte buffers.
//!
//! Everything here is deterministic and allocation-based; callers own the
//! policy (prefix handling, key derivation schedules, error demotion).
//! AES-CBC decryption never unpads implicitly: [`pkcs7_unpad`] is a separate
//! step because the attachment envelope truncates to a declared size
//! instead of trusting the padding.

use cbc::cipher::block_padding::{NoPadding, Pkcs7};
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use sha2::Sha256;

use crate::error::CryptoError;

pub const AES_BLOCK_SIZE: usize = 16;
pub const GCM_NONCE_SIZE: usize = 12;
pub const GCM_TAG_SIZE: usize = 16;
pub const HMAC_SHA256_SIZE: usize = 32;

pub type HmacSha1 = Hmac<Sha1>;
pub type HmacSha256 = Hmac<Sha256>;

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;

/// PBKDF2-HMAC-SHA1 key derivation.
pub fn pbkdf2_sha1(password: &[u8], salt: &[u8], iterations: u32, dk_len: usize) -> Vec<u8> {
    let mut key = vec![0u8; dk_len];
    // Infallible for any output length that fits in memory.
    let _ = pbkdf2::pbkdf2::<HmacSha1>(password, salt, iterations, &mut key);
    key
}

/// AES-CBC decryption without unpadding.
///
/// The key selects AES-128 or AES-256 by its length. The ciphertext must be
/// a whole number of blocks.
pub fn aes_cbc_decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != AES_BLOCK_SIZE || ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BadLength);
    }
    let mut buf = ciphertext.to_vec();
    match key.len() {
        16 => {
            Aes128CbcDec::new_from_slices(key, iv)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| CryptoError::BadLength)?;
        }
        32 => {
            Aes256CbcDec::new_from_slices(key, iv)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
                .decrypt_padded_mut::<NoPadding>(&mut buf)
                .map_err(|_| CryptoError::BadLength)?;
        }
        n => return Err(CryptoError::InvalidKey(format!("invalid key length: {n}"))),
    }
    Ok(buf)
}

/// AES-CBC encryption with PKCS#7 padding.
pub fn aes_cbc_encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if iv.len() != AES_BLOCK_SIZE {
        return Err(CryptoError::BadLength);
    }
    match key.len() {
        16 => Ok(Aes128CbcEnc::new_from_slices(key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        32 => Ok(Aes256CbcEnc::new_from_slices(key, iv)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)),
        n => Err(CryptoError::InvalidKey(format!("invalid key length: {n}"))),
    }
}

/// Strip PKCS#7 padding.
///
/// Fails on a zero pad byte, a pad byte larger than the block size or the
/// buffer, and on any inconsistent byte in the padding run. An empty buffer
/// is returned unchanged.
pub fn pkcs7_unpad(data: &[u8], block_size: usize) -> Result<&[u8], CryptoError> {
    let Some(&last) = data.last() else {
        return Ok(data);
    };
    let n = last as usize;
    if n == 0 || n > block_size || n > data.len() {
        return Err(CryptoError::PaddingError);
    }
    if data[data.len() - n..].iter().any(|&b| b != last) {
        return Err(CryptoError::PaddingError);
    }
    Ok(&data[..data.len() - n])
}

/// AES-256-GCM open. `ciphertext` carries the 16-byte tag at its end.
pub fn aes_gcm_open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    use aes_gcm::aead::Aead;
    use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

    if nonce.len() != GCM_NONCE_SIZE || ciphertext.len() < GCM_TAG_SIZE {
        return Err(CryptoError::BadLength);
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthFailure)
}

/// AES-256-GCM seal. Returns `ciphertext || tag(16)`.
pub fn aes_gcm_seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    use aes_gcm::aead::Aead;
    use aes_gcm::{Aes256Gcm, KeyInit, Nonce};

    if nonce.len() != GCM_NONCE_SIZE {
        return Err(CryptoError::BadLength);
    }
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|_| CryptoError::AuthFailure)
}

/// HMAC-SHA256 over the concatenation of `parts`.
pub fn hmac_sha256(key: &[u8], parts: &[&[u8]]) -> Result<[u8; HMAC_SHA256_SIZE], CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    Ok(mac.finalize().into_bytes().into())
}

/// Constant-time HMAC-SHA256 verification.
pub fn hmac_sha256_verify(key: &[u8], parts: &[&[u8]], tag: &[u8]) -> Result<(), CryptoError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(tag).map_err(|_| CryptoError::MacMismatch)
}
