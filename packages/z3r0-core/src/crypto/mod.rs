//! # Cryptographic Primitives
//!
//! OpenPGP algorithm registries and the primitives the codec builds on.
//!
//! ## Primitive Map
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        CRYPTO PRIMITIVES                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Asymmetric                      Symmetric                              │
//! │  ──────────                      ─────────                              │
//! │  ecc   Ed25519, X25519,          symmetric  AES-128/192/256             │
//! │        P-256, P-384, P-521                  CFB (legacy), GCM (AEAD)    │
//! │  rsa   RSA-OAEP, PKCS#1 v1.5     keywrap    RFC 3394 AES key wrap       │
//! │                                                                         │
//! │  Derivation                      Digests                                │
//! │  ──────────                      ───────                                │
//! │  kdf   HKDF-SHA256,              hash  SHA-1 (fingerprints, MDC),       │
//! │        RFC 6637 ECDH KDF               SHA-224/256/384/512              │
//! │  s2k   Argon2, iterated+salted                                          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: derived keys and recovered secrets live in
//!    `Zeroizing` buffers or `ZeroizeOnDrop` types
//! 2. **Constant-Time Comparison**: MDC, SHA-1 key checksums and recovered
//!    public values are compared with `subtle`
//! 3. **Secure Random**: `rand::rngs::OsRng` for keys, salts, nonces and
//!    session keys

pub mod ecc;
pub mod hash;
pub mod kdf;
pub mod keywrap;
pub mod rsa;
pub mod s2k;
pub mod symmetric;

use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

wire_enum! {
    /// Public-key algorithm registry
    pub enum PublicKeyAlgorithm {
        /// RSA (encrypt or sign)
        Rsa = 1,
        /// RSA encrypt-only (deprecated)
        RsaEncryptOnly = 2,
        /// RSA sign-only (deprecated)
        RsaSignOnly = 3,
        /// Elgamal (encrypt-only)
        Elgamal = 16,
        /// DSA
        Dsa = 17,
        /// ECDH
        Ecdh = 18,
        /// ECDSA
        Ecdsa = 19,
        /// EdDSA with the legacy OID encoding
        EdDsaLegacy = 22,
        /// Native X25519
        X25519 = 25,
        /// Native X448
        X448 = 26,
        /// Native Ed25519
        Ed25519 = 27,
        /// Native Ed448
        Ed448 = 28,
    }
}

wire_enum! {
    /// Symmetric cipher registry
    pub enum SymmetricAlgorithm {
        /// Plaintext or unencrypted data
        Plaintext = 0,
        /// IDEA
        Idea = 1,
        /// TripleDES
        TripleDes = 2,
        /// CAST5
        Cast5 = 3,
        /// Blowfish
        Blowfish = 4,
        /// AES with 128-bit key
        Aes128 = 7,
        /// AES with 192-bit key
        Aes192 = 8,
        /// AES with 256-bit key
        Aes256 = 9,
        /// Twofish
        Twofish = 10,
        /// Camellia with 128-bit key
        Camellia128 = 11,
        /// Camellia with 192-bit key
        Camellia192 = 12,
        /// Camellia with 256-bit key
        Camellia256 = 13,
    }
}

impl SymmetricAlgorithm {
    /// Key size in octets, for the ciphers the codec implements
    pub fn key_size(self) -> Result<usize> {
        match self {
            SymmetricAlgorithm::Aes128 => Ok(16),
            SymmetricAlgorithm::Aes192 => Ok(24),
            SymmetricAlgorithm::Aes256 => Ok(32),
            other => Err(Error::UnknownAlgorithm(format!(
                "symmetric cipher {:?}",
                other
            ))),
        }
    }

    /// Block size in octets, for the ciphers the codec implements
    pub fn block_size(self) -> Result<usize> {
        self.key_size().map(|_| 16)
    }
}

wire_enum! {
    /// Hash algorithm registry
    pub enum HashAlgorithm {
        /// MD5 (not implemented)
        Md5 = 1,
        /// SHA-1
        Sha1 = 2,
        /// RIPEMD-160 (not implemented)
        Ripemd160 = 3,
        /// SHA2-256
        Sha256 = 8,
        /// SHA2-384
        Sha384 = 9,
        /// SHA2-512
        Sha512 = 10,
        /// SHA2-224
        Sha224 = 11,
        /// SHA3-256 (not implemented)
        Sha3_256 = 12,
        /// SHA3-512 (not implemented)
        Sha3_512 = 14,
    }
}

wire_enum! {
    /// AEAD mode registry
    pub enum AeadAlgorithm {
        /// EAX (not implemented)
        Eax = 1,
        /// OCB (not implemented)
        Ocb = 2,
        /// GCM
        Gcm = 3,
    }
}

impl AeadAlgorithm {
    /// Nonce size in octets
    pub fn nonce_size(self) -> Result<usize> {
        match self {
            AeadAlgorithm::Gcm => Ok(12),
            other => Err(Error::UnknownAlgorithm(format!("AEAD mode {:?}", other))),
        }
    }

    /// Authentication tag size in octets
    pub fn tag_size(self) -> Result<usize> {
        self.nonce_size().map(|_| 16)
    }
}

wire_enum! {
    /// Compression algorithm registry
    pub enum CompressionAlgorithm {
        /// Uncompressed
        Uncompressed = 0,
        /// ZIP (raw deflate)
        Zip = 1,
        /// ZLIB
        Zlib = 2,
        /// BZip2 (not implemented)
        Bzip2 = 3,
    }
}

/// Fill a fresh buffer from the OS RNG
pub(crate) fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
    let mut out = Zeroizing::new(vec![0u8; len]);
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

/// Fill a fixed-size array from the OS RNG
pub(crate) fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    rand::rngs::OsRng.fill_bytes(&mut out);
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_round_trip() {
        assert_eq!(PublicKeyAlgorithm::from(22), PublicKeyAlgorithm::EdDsaLegacy);
        assert_eq!(u8::from(PublicKeyAlgorithm::X25519), 25);
        assert_eq!(SymmetricAlgorithm::from(9), SymmetricAlgorithm::Aes256);
        assert_eq!(HashAlgorithm::from(200), HashAlgorithm::Unknown(200));
        assert_eq!(u8::from(HashAlgorithm::Unknown(200)), 200);
    }

    #[test]
    fn test_key_sizes() {
        assert_eq!(SymmetricAlgorithm::Aes128.key_size().unwrap(), 16);
        assert_eq!(SymmetricAlgorithm::Aes256.key_size().unwrap(), 32);
        assert!(matches!(
            SymmetricAlgorithm::Cast5.key_size(),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_aead_sizes() {
        assert_eq!(AeadAlgorithm::Gcm.nonce_size().unwrap(), 12);
        assert!(AeadAlgorithm::Ocb.nonce_size().is_err());
    }

    #[test]
    fn test_random_bytes_differ() {
        let a = random_array::<32>();
        let b = random_array::<32>();
        assert_ne!(a, b);
        assert_eq!(random_bytes(7).len(), 7);
    }
}
