//! Attachment envelope decryption.
//!
//! Modern attachment blobs (record version >= 2) are stored as
//! `iv(16) || ciphertext || mac(32)` where `mac = HMAC-SHA256(macKey,
//! iv || ciphertext)`. The per-file key material lives base64-encoded in
//! the database as `cipherKey(32) || macKey(32)`. The MAC is verified in
//! constant time before any plaintext is produced, and the decrypted data
//! is truncated to the declared plaintext size (the CBC padding is never
//! trusted).

use base64::prelude::*;
use zeroize::Zeroizing;

use crate::cipher::{aes_cbc_decrypt, hmac_sha256_verify, AES_BLOCK_SIZE, HMAC_SHA256_SIZE};
use crate::error::CryptoError;

const CIPHER_KEY_SIZE: usize = 32;
const MAC_KEY_SIZE: usize = 32;
const IV_SIZE: usize = AES_BLOCK_SIZE;
const MAC_SIZE: usize = HMAC_SHA256_SIZE;

/// Decoded length of a valid `localKey` value.
pub const LOCAL_KEY_SIZE: usize = CIPHER_KEY_SIZE + MAC_KEY_SIZE;

/// Minimum length of a valid attachment file (empty ciphertext).
pub const MIN_FILE_SIZE: usize = IV_SIZE + MAC_SIZE;

/// Decrypt an attachment blob.
///
/// `local_key` is the base64-encoded key pair from the attachment record,
/// `data` the raw file contents, and `size` the declared plaintext size.
pub fn decrypt(local_key: &str, data: &[u8], size: u64) -> Result<Vec<u8>, CryptoError> {
    let keys = Zeroizing::new(
        BASE64_STANDARD
            .decode(local_key)
            .map_err(|e| CryptoError::InvalidKey(format!("cannot decode keys: {e}")))?,
    );
    if keys.len() != LOCAL_KEY_SIZE {
        return Err(CryptoError::InvalidKey("invalid keys length".into()));
    }
    let (cipher_key, mac_key) = keys.split_at(CIPHER_KEY_SIZE);

    if data.len() < MIN_FILE_SIZE {
        return Err(CryptoError::BadLength);
    }
    let (iv, rest) = data.split_at(IV_SIZE);
    let (ciphertext, their_mac) = rest.split_at(rest.len() - MAC_SIZE);
    if ciphertext.len() % AES_BLOCK_SIZE != 0 {
        return Err(CryptoError::BadLength);
    }

    hmac_sha256_verify(mac_key, &[iv, ciphertext], their_mac)?;

    let mut plaintext = aes_cbc_decrypt(cipher_key, iv, ciphertext)?;
    if (plaintext.len() as u64) < size {
        return Err(CryptoError::BadLength);
    }
    plaintext.truncate(size as usize);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::{aes_cbc_encrypt, hmac_sha256};

    fn build_file(cipher_key: &[u8], mac_key: &[u8], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
        let ciphertext = aes_cbc_encrypt(cipher_key, iv, plaintext).unwrap();
        let mac = hmac_sha256(mac_key, &[iv, &ciphertext]).unwrap();
        let mut file = iv.to_vec();
        file.extend_from_slice(&ciphertext);
        file.extend_from_slice(&mac);
        file
    }

    fn local_key(cipher_key: &[u8], mac_key: &[u8]) -> String {
        let mut keys = cipher_key.to_vec();
        keys.extend_from_slice(mac_key);
        BASE64_STANDARD.encode(keys)
    }

    #[test]
    fn decrypts_and_truncates_to_declared_size() {
        let cipher_key = [0x01u8; 32];
        let mac_key = [0x01u8; 32];
        let iv = [0x02u8; 16];
        let file = build_file(&cipher_key, &mac_key, &iv, b"HELLO");
        let keys = local_key(&cipher_key, &mac_key);

        let plaintext = decrypt(&keys, &file, 5).unwrap();
        assert_eq!(plaintext, b"HELLO");
    }

    #[test]
    fn any_flipped_bit_causes_mac_mismatch() {
        let cipher_key = [0x01u8; 32];
        let mac_key = [0x01u8; 32];
        let iv = [0x02u8; 16];
        let file = build_file(&cipher_key, &mac_key, &iv, b"HELLO");
        let keys = local_key(&cipher_key, &mac_key);

        // Flip one bit in the ciphertext and one in the MAC.
        for index in [file.len() - MAC_SIZE - 1, file.len() - 1] {
            let mut tampered = file.clone();
            tampered[index] ^= 0x01;
            assert!(matches!(
                decrypt(&keys, &tampered, 5),
                Err(CryptoError::MacMismatch)
            ));
        }
    }

    #[test]
    fn rejects_short_files() {
        let keys = local_key(&[0u8; 32], &[0u8; 32]);
        assert!(matches!(
            decrypt(&keys, &[0u8; MIN_FILE_SIZE - 1], 0),
            Err(CryptoError::BadLength)
        ));
    }

    #[test]
    fn rejects_ragged_ciphertext_length() {
        let keys = local_key(&[0u8; 32], &[0u8; 32]);
        // 16 (iv) + 15 (ragged ct) + 32 (mac)
        assert!(matches!(
            decrypt(&keys, &[0u8; 63], 0),
            Err(CryptoError::BadLength)
        ));
    }

    #[test]
    fn rejects_bad_local_key() {
        assert!(matches!(
            decrypt("!!!", &[0u8; 64], 0),
            Err(CryptoError::InvalidKey(_))
        ));
        let short = BASE64_STANDARD.encode([0u8; 32]);
        assert!(matches!(
            decrypt(&short, &[0u8; 64], 0),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn rejects_declared_size_larger_than_plaintext() {
        let cipher_key = [0x05u8; 32];
        let mac_key = [0x06u8; 32];
        let iv = [0x07u8; 16];
        let file = build_file(&cipher_key, &mac_key, &iv, b"HELLO");
        let keys = local_key(&cipher_key, &mac_key);

        // Padded plaintext is 16 bytes; anything above that is impossible.
        assert!(matches!(
            decrypt(&keys, &file, 17),
            Err(CryptoError::BadLength)
        ));
    }
}
