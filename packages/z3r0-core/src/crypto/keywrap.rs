//! RFC 3394 AES key wrap, used to carry session keys to ECDH and X25519
//! recipients.

use aes::cipher::generic_array::GenericArray;
use aes_kw::{KekAes128, KekAes192, KekAes256};
use zeroize::Zeroizing;

use super::SymmetricAlgorithm;
use crate::error::{Error, Result};

/// Octets added by wrapping
pub const WRAP_OVERHEAD: usize = 8;

/// Wrap `data` (a multiple of 8 octets, at least 16) under `kek`
pub fn wrap(cipher: SymmetricAlgorithm, kek: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    check_kek(cipher, kek)?;
    let mut out = vec![0u8; data.len() + WRAP_OVERHEAD];
    let result = match cipher {
        SymmetricAlgorithm::Aes128 => KekAes128::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        SymmetricAlgorithm::Aes192 => KekAes192::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        SymmetricAlgorithm::Aes256 => KekAes256::new(GenericArray::from_slice(kek)).wrap(data, &mut out),
        other => return Err(unsupported(other)),
    };
    result.map_err(|e| Error::EncryptionFailed(format!("AES key wrap: {}", e)))?;
    Ok(out)
}

/// Unwrap and check the RFC 3394 integrity value
///
/// A failed check is `IntegrityCheckFailed`.
pub fn unwrap(cipher: SymmetricAlgorithm, kek: &[u8], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    check_kek(cipher, kek)?;
    if data.len() < 16 + WRAP_OVERHEAD || data.len() % 8 != 0 {
        return Err(Error::IntegrityCheckFailed(format!(
            "wrapped key of {} octets is malformed",
            data.len()
        )));
    }
    let mut out = Zeroizing::new(vec![0u8; data.len() - WRAP_OVERHEAD]);
    let result = match cipher {
        SymmetricAlgorithm::Aes128 => KekAes128::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        SymmetricAlgorithm::Aes192 => KekAes192::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        SymmetricAlgorithm::Aes256 => KekAes256::new(GenericArray::from_slice(kek)).unwrap(data, &mut out),
        other => return Err(unsupported(other)),
    };
    result.map_err(|_| Error::IntegrityCheckFailed("AES key unwrap integrity check failed".into()))?;
    Ok(out)
}

fn check_kek(cipher: SymmetricAlgorithm, kek: &[u8]) -> Result<()> {
    let expected = cipher.key_size()?;
    if kek.len() != expected {
        return Err(Error::Internal(format!(
            "KEK for {:?} must be {} octets, got {}",
            cipher,
            expected,
            kek.len()
        )));
    }
    Ok(())
}

fn unsupported(cipher: SymmetricAlgorithm) -> Error {
    Error::UnknownAlgorithm(format!("key wrap with {:?}", cipher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3394_vector() {
        // RFC 3394 section 4.1: 128-bit key data with a 128-bit KEK
        let kek = hex::decode("000102030405060708090A0B0C0D0E0F").unwrap();
        let data = hex::decode("00112233445566778899AABBCCDDEEFF").unwrap();
        let wrapped = wrap(SymmetricAlgorithm::Aes128, &kek, &data).unwrap();
        assert_eq!(
            hex::encode_upper(&wrapped),
            "1FA68B0A8112B447AEF34BD8FB5A7B829D3E862371D2CFE5"
        );
        assert_eq!(
            unwrap(SymmetricAlgorithm::Aes128, &kek, &wrapped).unwrap().as_slice(),
            data.as_slice()
        );
    }

    #[test]
    fn test_unwrap_with_wrong_kek_fails() {
        let wrapped = wrap(SymmetricAlgorithm::Aes256, &[1; 32], &[9; 40]).unwrap();
        assert!(matches!(
            unwrap(SymmetricAlgorithm::Aes256, &[2; 32], &wrapped),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_rejects_bad_kek_length() {
        assert!(wrap(SymmetricAlgorithm::Aes192, &[0; 16], &[0; 16]).is_err());
    }
}
