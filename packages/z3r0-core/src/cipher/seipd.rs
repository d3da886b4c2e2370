//! Symmetrically Encrypted Integrity Protected Data (tag 18).
//!
//! ```text
//!  v2: 02 | cipher | aead | c | salt (32) | chunk_0 .. chunk_n-1 | final tag
//!
//!      info      = D2 02 cipher aead c
//!      key || iv = HKDF-SHA256(salt, session key, info)
//!      chunk_i   = AEAD(key, iv || BE64(i), info, 2^(c+6) octets)
//!      final     = AEAD(key, iv || BE64(n), info || BE64(total), "")
//!
//!  v1: 01 | CFB(zero IV, prefix || repeat2 || payload || D3 14 || SHA1(..))
//! ```
//!
//! Nothing is released until every tag (or the MDC) has verified.

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use super::pkesk::SessionKey;
use crate::config::MAX_CHUNK_SIZE_OCTET;
use crate::crypto::hash::sha1;
use crate::crypto::{kdf, random_array, symmetric, AeadAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::packet::{Packet, Tag};

/// Legacy CFB + MDC version
pub const SEIPD_V1: u8 = 1;

/// Chunked AEAD version
pub const SEIPD_V2: u8 = 2;

/// AEAD mode written by this codec
const AEAD_MODE: AeadAlgorithm = AeadAlgorithm::Gcm;

const SALT_LEN: usize = 32;

/// Header of the MDC packet embedded at the end of v1 plaintext
const MDC_HEADER: [u8; 2] = [0xD3, 0x14];

const MDC_LEN: usize = 22;

/// Packet version octet
pub(crate) fn version(packet: &Packet) -> Result<u8> {
    packet
        .body()
        .first()
        .copied()
        .ok_or_else(|| Error::InvalidMessage("empty encrypted data packet".into()))
}

fn chunk_info(cipher: SymmetricAlgorithm, aead: AeadAlgorithm, chunk_size_octet: u8) -> [u8; 5] {
    [
        0xC0 | u8::from(Tag::SymEncryptedProtectedData),
        SEIPD_V2,
        u8::from(cipher),
        u8::from(aead),
        chunk_size_octet,
    ]
}

fn chunk_nonce(iv: &[u8], index: u64) -> Vec<u8> {
    let mut nonce = Vec::with_capacity(iv.len() + 8);
    nonce.extend_from_slice(iv);
    nonce.extend_from_slice(&index.to_be_bytes());
    nonce
}

/// Encrypt `plaintext` into a v2 packet
pub(crate) fn encrypt_v2(
    session_key: &[u8],
    cipher: SymmetricAlgorithm,
    chunk_size_octet: u8,
    plaintext: &[u8],
) -> Result<Packet> {
    if chunk_size_octet > MAX_CHUNK_SIZE_OCTET {
        return Err(Error::InvalidInput(format!(
            "chunk size octet {} is above {}",
            chunk_size_octet, MAX_CHUNK_SIZE_OCTET
        )));
    }
    let key_len = cipher.key_size()?;
    if session_key.len() != key_len {
        return Err(Error::Internal("session key does not match cipher".into()));
    }
    let salt: [u8; SALT_LEN] = random_array();
    let info = chunk_info(cipher, AEAD_MODE, chunk_size_octet);
    let iv_len = AEAD_MODE.nonce_size()? - 8;
    let (key, iv) = kdf::seipd_v2_keys(session_key, &salt, &info, key_len, iv_len)?;

    let chunk_size = 1usize << (chunk_size_octet + 6);
    let tag_size = AEAD_MODE.tag_size()?;
    let chunks = plaintext.len().div_ceil(chunk_size);
    let mut body = Vec::with_capacity(4 + SALT_LEN + plaintext.len() + (chunks + 1) * tag_size);
    body.extend_from_slice(&info[1..]);
    body.extend_from_slice(&salt);

    let mut index = 0u64;
    for chunk in plaintext.chunks(chunk_size) {
        let sealed = symmetric::gcm_encrypt(cipher, &key, &chunk_nonce(&iv, index), &info, chunk)?;
        body.extend_from_slice(&sealed);
        index += 1;
    }

    let mut final_aad = info.to_vec();
    final_aad.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
    let final_tag = symmetric::gcm_encrypt(cipher, &key, &chunk_nonce(&iv, index), &final_aad, &[])?;
    body.extend_from_slice(&final_tag);

    Packet::new(Tag::SymEncryptedProtectedData, body)
}

/// Decrypt and authenticate a v1 or v2 packet
///
/// The session key is already recovered at this point. Every header octet
/// feeds the key derivation or the AAD, so a header the key cannot open
/// (version, cipher, AEAD mode, chunk size) is `IntegrityCheckFailed`.
pub(crate) fn decrypt(packet: &Packet, session: &SessionKey) -> Result<Zeroizing<Vec<u8>>> {
    match version(packet)? {
        SEIPD_V2 => decrypt_v2(packet, session),
        SEIPD_V1 => decrypt_v1(packet, session),
        other => Err(header_mismatch(format!("version {}", other))),
    }
}

fn header_mismatch(field: String) -> Error {
    Error::IntegrityCheckFailed(format!(
        "encrypted data header ({}) does not fit the session key",
        field
    ))
}

fn decrypt_v2(packet: &Packet, session: &SessionKey) -> Result<Zeroizing<Vec<u8>>> {
    let mut reader = packet.reader();
    let _version = reader.u8()?;
    let cipher = SymmetricAlgorithm::from(reader.u8()?);
    let aead = AeadAlgorithm::from(reader.u8()?);
    let chunk_size_octet = reader.u8()?;
    let salt: [u8; SALT_LEN] = reader.array()?;
    let data = reader.rest();

    if chunk_size_octet > MAX_CHUNK_SIZE_OCTET {
        return Err(header_mismatch(format!("chunk size octet {}", chunk_size_octet)));
    }
    if aead != AeadAlgorithm::Gcm {
        return Err(header_mismatch(format!("AEAD mode {:?}", aead)));
    }
    let key_len = cipher
        .key_size()
        .map_err(|_| header_mismatch(format!("cipher {:?}", cipher)))?;
    if session.key.len() != key_len {
        return Err(Error::IntegrityCheckFailed(format!(
            "session key of {} octets does not fit {:?}",
            session.key.len(),
            cipher
        )));
    }

    let tag_size = aead.tag_size()?;
    if data.len() < tag_size {
        return Err(Error::IntegrityCheckFailed(
            "encrypted data is missing its final tag".into(),
        ));
    }
    let info = chunk_info(cipher, aead, chunk_size_octet);
    let iv_len = aead.nonce_size()? - 8;
    let (key, iv) = kdf::seipd_v2_keys(&session.key, &salt, &info, key_len, iv_len)?;

    let (chunks, final_tag) = data.split_at(data.len() - tag_size);
    let step = (1usize << (chunk_size_octet + 6)) + tag_size;
    let mut plaintext = Zeroizing::new(Vec::with_capacity(chunks.len()));
    let mut index = 0u64;
    for chunk in chunks.chunks(step) {
        if chunk.len() <= tag_size {
            return Err(Error::IntegrityCheckFailed(format!("chunk {} is truncated", index)));
        }
        let opened = Zeroizing::new(symmetric::gcm_decrypt(
            cipher,
            &key,
            &chunk_nonce(&iv, index),
            &info,
            chunk,
        )?);
        plaintext.extend_from_slice(&opened);
        index += 1;
    }

    let mut final_aad = info.to_vec();
    final_aad.extend_from_slice(&(plaintext.len() as u64).to_be_bytes());
    symmetric::gcm_decrypt(cipher, &key, &chunk_nonce(&iv, index), &final_aad, final_tag)?;

    Ok(plaintext)
}

fn decrypt_v1(packet: &Packet, session: &SessionKey) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = session
        .cipher
        .ok_or_else(|| header_mismatch("version 1 without a version 3 session key".into()))?;
    let block_size = cipher.block_size()?;
    let ciphertext = &packet.body()[1..];
    if ciphertext.len() < block_size + 2 + MDC_LEN {
        return Err(Error::IntegrityCheckFailed("encrypted data is truncated".into()));
    }

    let mut data = Zeroizing::new(ciphertext.to_vec());
    symmetric::cfb_decrypt(cipher, &session.key, &vec![0u8; block_size], &mut data)?;

    let hashed_len = data.len() - 20;
    let header_ok = data[hashed_len - 2..hashed_len].ct_eq(&MDC_HEADER[..]);
    let digest_ok = sha1(&data[..hashed_len])[..].ct_eq(&data[hashed_len..]);
    if !bool::from(header_ok & digest_ok) {
        return Err(Error::IntegrityCheckFailed(
            "modification detection code mismatch".into(),
        ));
    }

    Ok(Zeroizing::new(data[block_size + 2..data.len() - MDC_LEN].to_vec()))
}

/// v1 packet as produced by RFC 4880 implementations
#[cfg(test)]
pub(crate) fn encrypt_v1(session_key: &[u8], cipher: SymmetricAlgorithm, plaintext: &[u8]) -> Result<Packet> {
    let block_size = cipher.block_size()?;
    let mut data = crate::crypto::random_bytes(block_size).to_vec();
    let repeat = [data[block_size - 2], data[block_size - 1]];
    data.extend_from_slice(&repeat);
    data.extend_from_slice(plaintext);
    data.extend_from_slice(&MDC_HEADER);
    let digest = sha1(&data);
    data.extend_from_slice(&digest);
    symmetric::cfb_encrypt(cipher, session_key, &vec![0u8; block_size], &mut data)?;

    let mut body = vec![SEIPD_V1];
    body.extend_from_slice(&data);
    Packet::new(Tag::SymEncryptedProtectedData, body)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn session(cipher: Option<SymmetricAlgorithm>, key: &[u8]) -> SessionKey {
        SessionKey {
            cipher,
            key: Zeroizing::new(key.to_vec()),
        }
    }

    #[test]
    fn test_v2_round_trip_across_chunk_boundaries() {
        let key = [3u8; 32];
        // c = 0 gives 64-octet chunks
        for len in [0usize, 1, 63, 64, 65, 200] {
            let plaintext: Vec<u8> = (0..len).map(|i| i as u8).collect();
            let packet = encrypt_v2(&key, SymmetricAlgorithm::Aes256, 0, &plaintext).unwrap();
            let opened = decrypt(&packet, &session(None, &key)).unwrap();
            assert_eq!(opened.as_slice(), plaintext.as_slice(), "length {}", len);
        }
    }

    #[test]
    fn test_v2_header_layout() {
        let packet = encrypt_v2(&[0u8; 16], SymmetricAlgorithm::Aes128, 12, b"hi").unwrap();
        let body = packet.body();
        assert_eq!(&body[..4], &[2, 7, 3, 12]);
        // salt + one chunk (2 + 16) + final tag
        assert_eq!(body.len(), 4 + 32 + 18 + 16);
    }

    #[test]
    fn test_v2_detects_tampering() {
        let key = [9u8; 32];
        let packet = encrypt_v2(&key, SymmetricAlgorithm::Aes256, 0, &[0x55; 100]).unwrap();
        for position in [4 + 32, packet.len() - 1, packet.len() / 2] {
            let mut body = packet.body().to_vec();
            body[position] ^= 0x01;
            let tampered = Packet::new(Tag::SymEncryptedProtectedData, body).unwrap();
            assert!(matches!(
                decrypt(&tampered, &session(None, &key)),
                Err(Error::IntegrityCheckFailed(_))
            ));
        }
    }

    #[test]
    fn test_v2_detects_dropped_chunk() {
        let key = [9u8; 32];
        let packet = encrypt_v2(&key, SymmetricAlgorithm::Aes256, 0, &[0x55; 128]).unwrap();
        let body = packet.body();
        // drop the second 80-octet sealed chunk
        let mut truncated = body[..36 + 80].to_vec();
        truncated.extend_from_slice(&body[36 + 160..]);
        let packet = Packet::new(Tag::SymEncryptedProtectedData, truncated).unwrap();
        assert!(matches!(
            decrypt(&packet, &session(None, &key)),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_v2_wrong_key() {
        let packet = encrypt_v2(&[1u8; 32], SymmetricAlgorithm::Aes256, 12, b"secret").unwrap();
        assert!(matches!(
            decrypt(&packet, &session(None, &[2u8; 32])),
            Err(Error::IntegrityCheckFailed(_))
        ));
        assert!(matches!(
            decrypt(&packet, &session(None, &[1u8; 16])),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_v2_rejects_huge_chunk_octet() {
        let mut body = encrypt_v2(&[1u8; 32], SymmetricAlgorithm::Aes256, 12, b"x")
            .unwrap()
            .body()
            .to_vec();
        body[3] = 17;
        let packet = Packet::new(Tag::SymEncryptedProtectedData, body).unwrap();
        assert!(matches!(
            decrypt(&packet, &session(None, &[1u8; 32])),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_v2_every_bit_flip_is_integrity_failure() {
        let key = [6u8; 32];
        let packet = encrypt_v2(&key, SymmetricAlgorithm::Aes256, 0, &[0x42; 70]).unwrap();
        for position in 0..packet.len() {
            for bit in 0..8 {
                let mut body = packet.body().to_vec();
                body[position] ^= 1 << bit;
                let tampered = Packet::new(Tag::SymEncryptedProtectedData, body).unwrap();
                let result = decrypt(&tampered, &session(None, &key));
                assert!(
                    matches!(result, Err(Error::IntegrityCheckFailed(_))),
                    "octet {} bit {}: {:?}",
                    position,
                    bit,
                    result.map(|p| p.len())
                );
            }
        }
    }

    #[test]
    fn test_v1_round_trip_and_mdc() {
        let key = [4u8; 16];
        let packet = encrypt_v1(&key, SymmetricAlgorithm::Aes128, b"legacy message").unwrap();
        let opened = decrypt(&packet, &session(Some(SymmetricAlgorithm::Aes128), &key)).unwrap();
        assert_eq!(opened.as_slice(), b"legacy message");

        let mut body = packet.body().to_vec();
        body[20] ^= 0x80;
        let tampered = Packet::new(Tag::SymEncryptedProtectedData, body).unwrap();
        assert!(matches!(
            decrypt(&tampered, &session(Some(SymmetricAlgorithm::Aes128), &key)),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_v1_needs_cipher() {
        let key = [4u8; 16];
        let packet = encrypt_v1(&key, SymmetricAlgorithm::Aes128, b"x").unwrap();
        assert!(matches!(
            decrypt(&packet, &session(None, &key)),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }
}
