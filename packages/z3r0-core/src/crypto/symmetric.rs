//! AES in the two modes OpenPGP uses: CFB (legacy) and GCM (AEAD).

use aes::{Aes128, Aes192, Aes256};
use aes_gcm::{
    aead::{consts::U12, Aead, KeyInit, Nonce, Payload},
    AesGcm,
};
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

use super::SymmetricAlgorithm;
use crate::error::{Error, Result};

/// Size of the GCM nonce in bytes (96 bits)
pub const GCM_NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag in bytes (128 bits)
pub const GCM_TAG_SIZE: usize = 16;

type Aes128Gcm = AesGcm<Aes128, U12>;
type Aes192Gcm = AesGcm<Aes192, U12>;
type Aes256Gcm = AesGcm<Aes256, U12>;

/// Decrypt in place with AES-CFB (full-block feedback, no resync)
pub fn cfb_decrypt(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) -> Result<()> {
    match algorithm {
        SymmetricAlgorithm::Aes128 => cfb_mode::Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .decrypt(data),
        SymmetricAlgorithm::Aes192 => cfb_mode::Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .decrypt(data),
        SymmetricAlgorithm::Aes256 => cfb_mode::Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .decrypt(data),
        other => {
            return Err(Error::UnknownAlgorithm(format!(
                "symmetric cipher {:?}",
                other
            )))
        }
    }
    Ok(())
}

/// Encrypt in place with AES-CFB. Only legacy fixtures need this.
#[cfg(test)]
pub fn cfb_encrypt(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) -> Result<()> {
    match algorithm {
        SymmetricAlgorithm::Aes128 => cfb_mode::Encryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .encrypt(data),
        SymmetricAlgorithm::Aes192 => cfb_mode::Encryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .encrypt(data),
        SymmetricAlgorithm::Aes256 => cfb_mode::Encryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(|_| invalid_length(algorithm))?
            .encrypt(data),
        other => {
            return Err(Error::UnknownAlgorithm(format!(
                "symmetric cipher {:?}",
                other
            )))
        }
    }
    Ok(())
}

/// Encrypt with AES-GCM, returning ciphertext || tag
pub fn gcm_encrypt(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    match algorithm {
        SymmetricAlgorithm::Aes128 => seal::<Aes128Gcm>(key, nonce, aad, plaintext),
        SymmetricAlgorithm::Aes192 => seal::<Aes192Gcm>(key, nonce, aad, plaintext),
        SymmetricAlgorithm::Aes256 => seal::<Aes256Gcm>(key, nonce, aad, plaintext),
        other => Err(Error::UnknownAlgorithm(format!(
            "symmetric cipher {:?}",
            other
        ))),
    }
}

/// Decrypt and authenticate AES-GCM ciphertext || tag
///
/// Tag mismatch is `IntegrityCheckFailed`; callers that protect keys map
/// it to `WrongPassphrase`.
pub fn gcm_decrypt(
    algorithm: SymmetricAlgorithm,
    key: &[u8],
    nonce: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    match algorithm {
        SymmetricAlgorithm::Aes128 => open::<Aes128Gcm>(key, nonce, aad, ciphertext),
        SymmetricAlgorithm::Aes192 => open::<Aes192Gcm>(key, nonce, aad, ciphertext),
        SymmetricAlgorithm::Aes256 => open::<Aes256Gcm>(key, nonce, aad, ciphertext),
        other => Err(Error::UnknownAlgorithm(format!(
            "symmetric cipher {:?}",
            other
        ))),
    }
}

fn seal<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    check_nonce(nonce)?;
    let cipher = C::new_from_slice(key)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;
    cipher
        .encrypt(Nonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))
}

fn open<C: KeyInit + Aead>(key: &[u8], nonce: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    check_nonce(nonce)?;
    let cipher = C::new_from_slice(key)
        .map_err(|_| Error::IntegrityCheckFailed("invalid session key length".into()))?;
    cipher
        .decrypt(Nonce::<C>::from_slice(nonce), Payload { msg, aad })
        .map_err(|_| Error::IntegrityCheckFailed("authentication tag mismatch".into()))
}

fn check_nonce(nonce: &[u8]) -> Result<()> {
    if nonce.len() == GCM_NONCE_SIZE {
        Ok(())
    } else {
        Err(Error::Internal(format!(
            "GCM nonce must be {} octets, got {}",
            GCM_NONCE_SIZE,
            nonce.len()
        )))
    }
}

fn invalid_length(algorithm: SymmetricAlgorithm) -> Error {
    Error::Internal(format!("invalid key or IV length for {:?}", algorithm))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcm_round_trip() {
        let key = [7u8; 32];
        let nonce = [1u8; GCM_NONCE_SIZE];
        let ct = gcm_encrypt(SymmetricAlgorithm::Aes256, &key, &nonce, b"aad", b"hello").unwrap();
        assert_eq!(ct.len(), 5 + GCM_TAG_SIZE);

        let pt = gcm_decrypt(SymmetricAlgorithm::Aes256, &key, &nonce, b"aad", &ct).unwrap();
        assert_eq!(pt, b"hello");
    }

    #[test]
    fn test_gcm_wrong_aad_fails() {
        let key = [7u8; 16];
        let nonce = [1u8; GCM_NONCE_SIZE];
        let ct = gcm_encrypt(SymmetricAlgorithm::Aes128, &key, &nonce, b"aad", b"hello").unwrap();
        assert!(matches!(
            gcm_decrypt(SymmetricAlgorithm::Aes128, &key, &nonce, b"other", &ct),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_gcm_tampered_fails() {
        let key = [9u8; 24];
        let nonce = [2u8; GCM_NONCE_SIZE];
        let mut ct =
            gcm_encrypt(SymmetricAlgorithm::Aes192, &key, &nonce, b"", b"hello").unwrap();
        ct[0] ^= 1;
        assert!(gcm_decrypt(SymmetricAlgorithm::Aes192, &key, &nonce, b"", &ct).is_err());
    }

    #[test]
    fn test_cfb_round_trip() {
        let key = [3u8; 16];
        let iv = [0u8; 16];
        let mut data = b"cipher feedback mode, 35 octets!!!".to_vec();
        let original = data.clone();

        cfb_encrypt(SymmetricAlgorithm::Aes128, &key, &iv, &mut data).unwrap();
        assert_ne!(data, original);
        cfb_decrypt(SymmetricAlgorithm::Aes128, &key, &iv, &mut data).unwrap();
        assert_eq!(data, original);
    }

    #[test]
    fn test_unimplemented_cipher() {
        let mut data = [0u8; 8];
        assert!(matches!(
            cfb_decrypt(SymmetricAlgorithm::Cast5, &[0; 16], &[0; 8], &mut data),
            Err(Error::UnknownAlgorithm(_))
        ));
    }
}
