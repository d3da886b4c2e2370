//! # Key Derivation Functions
//!
//! Every symmetric key the codec uses is derived here, from a shared secret,
//! a session key or a passphrase-derived key.
//!
//! ## Derivation Map
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       KEY DERIVATION PATHS                              │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ECDH shared point Z                     (RFC 6637 single-step KDF)     │
//! │       │                                                                 │
//! │       └──► H(00 00 00 01 || Z || param)  → AES key-wrap KEK             │
//! │            param = oid_len || oid || 18 || 03 01 hash cipher            │
//! │                    || "Anonymous Sender    " || fingerprint             │
//! │                                                                         │
//! │  X25519 shared secret                                                   │
//! │       │                                                                 │
//! │       └──► HKDF-SHA256(ephemeral || recipient || shared,                │
//! │                        info = "OpenPGP X25519")  → AES-128 KEK          │
//! │                                                                         │
//! │  Session key                             (SEIPD v2)                     │
//! │       │                                                                 │
//! │       └──► HKDF-SHA256(session key, salt = packet salt,                 │
//! │                        info = D2 02 cipher aead chunk)                  │
//! │                        → message key || IV prefix                       │
//! │                                                                         │
//! │  S2K output                              (AEAD secret-key protection)   │
//! │       │                                                                 │
//! │       └──► HKDF-SHA256(s2k key, info = C0|tag version cipher aead)      │
//! │                        → key-encryption key                             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | Recipient binding | fingerprint in ECDH param | KEK differs per recipient key |
//! | Packet binding | header octets as HKDF info | Algorithm downgrade changes the key |
//! | Key separation | packet tag in key-protection info | Primary and subkey KEKs differ |

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::ecc::EccCurve;
use super::hash::Hasher;
use super::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};

/// Domain separation strings fixed by OpenPGP
pub mod domain {
    /// HKDF info for X25519 session-key wrapping
    pub const X25519: &[u8] = b"OpenPGP X25519";

    /// Sender identity inside the ECDH KDF parameters (20 octets)
    pub const ANONYMOUS_SENDER: &[u8; 20] = b"Anonymous Sender    ";
}

/// KDF parameters for an ECDH recipient key
pub fn ecdh_param(
    curve: EccCurve,
    hash: HashAlgorithm,
    cipher: SymmetricAlgorithm,
    fingerprint: &[u8; 20],
) -> Vec<u8> {
    let oid = curve.oid();
    let mut param = Vec::with_capacity(1 + oid.len() + 5 + 20 + 20);
    param.push(oid.len() as u8);
    param.extend_from_slice(oid);
    param.push(u8::from(PublicKeyAlgorithm::Ecdh));
    param.extend_from_slice(&[0x03, 0x01, u8::from(hash), u8::from(cipher)]);
    param.extend_from_slice(domain::ANONYMOUS_SENDER);
    param.extend_from_slice(fingerprint);
    param
}

/// RFC 6637 KDF: leftmost `key_len` octets of H(00000001 || Z || param)
pub fn ecdh_kek(
    hash: HashAlgorithm,
    shared: &[u8],
    param: &[u8],
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let mut hasher = Hasher::new(hash)?;
    hasher.update(&[0, 0, 0, 1]);
    hasher.update(shared);
    hasher.update(param);
    let mut digest = Zeroizing::new(hasher.finalize());
    if digest.len() < key_len {
        return Err(Error::UnknownAlgorithm(format!(
            "ECDH KDF hash {:?} is too short for a {}-octet key",
            hash, key_len
        )));
    }
    digest.truncate(key_len);
    Ok(digest)
}

/// Key-encryption key for X25519 session-key wrapping
pub fn x25519_kek(
    ephemeral: &[u8; 32],
    recipient: &[u8; 32],
    shared: &[u8; 32],
) -> Result<Zeroizing<[u8; 16]>> {
    let mut ikm = Zeroizing::new([0u8; 96]);
    ikm[..32].copy_from_slice(ephemeral);
    ikm[32..64].copy_from_slice(recipient);
    ikm[64..].copy_from_slice(shared);

    let hkdf = Hkdf::<Sha256>::new(None, ikm.as_slice());
    let mut kek = Zeroizing::new([0u8; 16]);
    hkdf.expand(domain::X25519, &mut kek[..])
        .map_err(|_| Error::Internal("Failed to derive X25519 KEK".into()))?;
    Ok(kek)
}

/// SEIPD v2 message key and IV prefix
pub fn seipd_v2_keys(
    session_key: &[u8],
    salt: &[u8; 32],
    info: &[u8; 5],
    key_len: usize,
    iv_len: usize,
) -> Result<(Zeroizing<Vec<u8>>, Vec<u8>)> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), session_key);
    let mut okm = Zeroizing::new(vec![0u8; key_len + iv_len]);
    hkdf.expand(info, &mut okm)
        .map_err(|_| Error::Internal("Failed to derive message key".into()))?;
    let iv = okm[key_len..].to_vec();
    okm.truncate(key_len);
    Ok((okm, iv))
}

/// Key-encryption key for AEAD secret-key protection
pub fn secret_key_kek(s2k_key: &[u8], info: &[u8; 4], key_len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let hkdf = Hkdf::<Sha256>::new(None, s2k_key);
    let mut kek = Zeroizing::new(vec![0u8; key_len]);
    hkdf.expand(info, &mut kek)
        .map_err(|_| Error::Internal("Failed to derive key-encryption key".into()))?;
    Ok(kek)
}

// ============================================================================
// TESTS
// ============================================================================
