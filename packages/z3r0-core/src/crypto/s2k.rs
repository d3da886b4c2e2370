//! # String-to-Key Specifiers
//!
//! Turns a passphrase into a symmetric key. New keys always use Argon2
//! (type 4). Simple, salted and iterated+salted specifiers are read so that
//! keys exported by other implementations can be unlocked.
//!
//! ```text
//! ┌──────────┬───────────────────────────────────────────────────────────┐
//! │ Type     │ Wire layout after the type octet                          │
//! ├──────────┼───────────────────────────────────────────────────────────┤
//! │ 0 simple │ hash                                                      │
//! │ 1 salted │ hash, salt[8]                                             │
//! │ 3 iter.  │ hash, salt[8], count  (octets = (16 + c&15) << (c>>4)+6)  │
//! │ 4 argon2 │ salt[16], t, p, encoded_m  (memory = 2^encoded_m KiB)     │
//! └──────────┴───────────────────────────────────────────────────────────┘
//! ```

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::hash::{digest_size, Hasher};
use super::HashAlgorithm;
use crate::config::{KdfLimits, KdfParams};
use crate::error::{Error, Result};
use crate::packet::BodyReader;

/// A parsed S2K specifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    /// Type 0: hash of the passphrase
    Simple {
        /// Digest used
        hash: HashAlgorithm,
    },
    /// Type 1: hash of salt || passphrase
    Salted {
        /// Digest used
        hash: HashAlgorithm,
        /// 8-octet salt
        salt: [u8; 8],
    },
    /// Type 3: salt || passphrase repeated up to a coded octet count
    Iterated {
        /// Digest used
        hash: HashAlgorithm,
        /// 8-octet salt
        salt: [u8; 8],
        /// Coded count octet
        count: u8,
    },
    /// Type 4: Argon2id
    Argon2 {
        /// 16-octet salt
        salt: [u8; 16],
        /// Number of passes
        passes: u8,
        /// Degree of parallelism
        parallelism: u8,
        /// Memory exponent (2^m KiB)
        memory_exponent: u8,
    },
    /// Any other type (GnuPG extensions, reserved values)
    Unknown(u8),
}

impl S2k {
    /// Fresh Argon2 specifier with a random salt
    pub fn new_argon2(params: &KdfParams) -> Self {
        S2k::Argon2 {
            salt: super::random_array(),
            passes: params.passes,
            parallelism: params.parallelism,
            memory_exponent: params.memory_exponent,
        }
    }

    /// Read a specifier
    ///
    /// Unknown types consume nothing past the type octet; the caller cannot
    /// continue parsing the enclosing packet and treats the key as unusable.
    pub fn parse(reader: &mut BodyReader<'_>) -> Result<Self> {
        let kind = reader.u8()?;
        let s2k = match kind {
            0 => S2k::Simple {
                hash: reader.u8()?.into(),
            },
            1 => S2k::Salted {
                hash: reader.u8()?.into(),
                salt: reader.array()?,
            },
            3 => S2k::Iterated {
                hash: reader.u8()?.into(),
                salt: reader.array()?,
                count: reader.u8()?,
            },
            4 => S2k::Argon2 {
                salt: reader.array()?,
                passes: reader.u8()?,
                parallelism: reader.u8()?,
                memory_exponent: reader.u8()?,
            },
            other => S2k::Unknown(other),
        };
        Ok(s2k)
    }

    /// Append the wire encoding
    pub fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            S2k::Simple { hash } => {
                out.push(0);
                out.push(u8::from(*hash));
            }
            S2k::Salted { hash, salt } => {
                out.push(1);
                out.push(u8::from(*hash));
                out.extend_from_slice(salt);
            }
            S2k::Iterated { hash, salt, count } => {
                out.push(3);
                out.push(u8::from(*hash));
                out.extend_from_slice(salt);
                out.push(*count);
            }
            S2k::Argon2 {
                salt,
                passes,
                parallelism,
                memory_exponent,
            } => {
                out.push(4);
                out.extend_from_slice(salt);
                out.push(*passes);
                out.push(*parallelism);
                out.push(*memory_exponent);
            }
            S2k::Unknown(kind) => out.push(*kind),
        }
    }

    /// Refuse Argon2 work factors beyond `limits`
    ///
    /// Runs before any memory is committed to the derivation.
    pub fn check_limits(&self, limits: &KdfLimits) -> Result<()> {
        if let S2k::Argon2 {
            passes,
            parallelism,
            memory_exponent,
            ..
        } = self
        {
            let params = KdfParams {
                passes: *passes,
                parallelism: *parallelism,
                memory_exponent: *memory_exponent,
            };
            if !limits.permits(&params) {
                return Err(Error::InvalidKeyFormat(format!(
                    "Argon2 parameters t={} p={} m=2^{} KiB exceed the configured limits",
                    passes, parallelism, memory_exponent
                )));
            }
        }
        Ok(())
    }

    /// Derive `key_len` octets from the passphrase
    pub fn derive(&self, passphrase: &[u8], key_len: usize) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            S2k::Simple { hash } => hashed_key(*hash, &[], passphrase, 0, key_len),
            S2k::Salted { hash, salt } => hashed_key(*hash, salt, passphrase, 0, key_len),
            S2k::Iterated { hash, salt, count } => {
                hashed_key(*hash, salt, passphrase, decode_count(*count), key_len)
            }
            S2k::Argon2 {
                salt,
                passes,
                parallelism,
                memory_exponent,
            } => {
                if *memory_exponent > 31 {
                    return Err(Error::InvalidKeyFormat(format!(
                        "Argon2 memory exponent {} out of range",
                        memory_exponent
                    )));
                }
                let params = Params::new(
                    1u32 << memory_exponent,
                    u32::from(*passes),
                    u32::from(*parallelism),
                    Some(key_len),
                )
                .map_err(|e| Error::InvalidKeyFormat(format!("Argon2 parameters: {}", e)))?;
                let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
                let mut out = Zeroizing::new(vec![0u8; key_len]);
                argon2
                    .hash_password_into(passphrase, salt, &mut out)
                    .map_err(|e| Error::Internal(format!("Argon2 failed: {}", e)))?;
                Ok(out)
            }
            S2k::Unknown(kind) => Err(Error::UnknownAlgorithm(format!("S2K type {}", kind))),
        }
    }
}

/// Octet count encoded by an iterated S2K count octet
pub fn decode_count(c: u8) -> usize {
    (16 + usize::from(c & 15)) << (usize::from(c >> 4) + 6)
}

/// Hash-based S2K (types 0, 1, 3)
///
/// With `count == 0` salt || passphrase is hashed once. Longer keys use
/// further hash contexts preloaded with 1, 2, ... zero octets.
fn hashed_key(
    hash: HashAlgorithm,
    salt: &[u8],
    passphrase: &[u8],
    count: usize,
    key_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let digest_len = digest_size(hash)?;
    let mut material = Zeroizing::new(Vec::with_capacity(salt.len() + passphrase.len()));
    material.extend_from_slice(salt);
    material.extend_from_slice(passphrase);

    let total = count.max(material.len());
    let mut out = Zeroizing::new(Vec::with_capacity(key_len + digest_len));
    let mut preload = 0usize;
    while out.len() < key_len {
        let mut hasher = Hasher::new(hash)?;
        hasher.update(&vec![0u8; preload]);
        let mut remaining = total;
        while remaining > 0 {
            let n = remaining.min(material.len());
            hasher.update(&material[..n]);
            remaining -= n;
        }
        out.extend_from_slice(&Zeroizing::new(hasher.finalize()));
        preload += 1;
    }
    out.truncate(key_len);
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Tag;

    #[test]
    fn test_decode_count() {
        assert_eq!(decode_count(0), 1024);
        assert_eq!(decode_count(0x60), 65536);
        assert_eq!(decode_count(0xFF), 65_011_712);
    }

    #[test]
    fn test_wire_round_trip() {
        let specs = [
            S2k::Simple {
                hash: HashAlgorithm::Sha256,
            },
            S2k::Iterated {
                hash: HashAlgorithm::Sha1,
                salt: [1; 8],
                count: 0x60,
            },
            S2k::new_argon2(&KdfParams::insecure_fast()),
        ];
        for s2k in specs {
            let mut out = Vec::new();
            s2k.write_to(&mut out);
            let mut reader = BodyReader::new(Tag::SecretKey, &out);
            assert_eq!(S2k::parse(&mut reader).unwrap(), s2k);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_simple_matches_plain_hash() {
        let s2k = S2k::Simple {
            hash: HashAlgorithm::Sha256,
        };
        let key = s2k.derive(b"secret", 32).unwrap();
        let expected = crate::crypto::hash::digest(HashAlgorithm::Sha256, b"secret").unwrap();
        assert_eq!(key.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_long_key_uses_preloaded_contexts() {
        let s2k = S2k::Salted {
            hash: HashAlgorithm::Sha1,
            salt: [9; 8],
        };
        let key = s2k.derive(b"pw", 32).unwrap();
        assert_eq!(key.len(), 32);

        let mut second = Vec::from([0u8]);
        second.extend_from_slice(&[9; 8]);
        second.extend_from_slice(b"pw");
        let tail = crate::crypto::hash::sha1(&second);
        assert_eq!(&key[20..], &tail[..12]);
    }

    #[test]
    fn test_iterated_short_count_hashes_once() {
        // The full salt || passphrase is hashed even when the count is smaller
        let iterated = S2k::Iterated {
            hash: HashAlgorithm::Sha256,
            salt: [4; 8],
            count: 0,
        };
        let salted = S2k::Salted {
            hash: HashAlgorithm::Sha256,
            salt: [4; 8],
        };
        let long_pass = vec![b'x'; 2000];
        assert_eq!(
            iterated.derive(&long_pass, 16).unwrap(),
            salted.derive(&long_pass, 16).unwrap()
        );
    }

    #[test]
    fn test_argon2_depends_on_passphrase_and_salt() {
        let s2k = S2k::new_argon2(&KdfParams::insecure_fast());
        let a = s2k.derive(b"correct-horse", 32).unwrap();
        let b = s2k.derive(b"wrong", 32).unwrap();
        assert_ne!(a, b);
        assert_eq!(a, s2k.derive(b"correct-horse", 32).unwrap());

        let other_salt = S2k::new_argon2(&KdfParams::insecure_fast());
        assert_ne!(a, other_salt.derive(b"correct-horse", 32).unwrap());
    }

    #[test]
    fn test_argon2_limits() {
        let limits = KdfLimits::default();
        assert!(S2k::new_argon2(&KdfParams::default()).check_limits(&limits).is_ok());

        let hostile = S2k::Argon2 {
            salt: [0; 16],
            passes: 1,
            parallelism: 1,
            memory_exponent: 30,
        };
        assert!(matches!(
            hostile.check_limits(&limits),
            Err(Error::InvalidKeyFormat(_))
        ));

        let slow = S2k::Argon2 {
            salt: [0; 16],
            passes: 255,
            parallelism: 1,
            memory_exponent: 10,
        };
        assert!(slow.check_limits(&limits).is_err());

        let iterated = S2k::Iterated {
            hash: HashAlgorithm::Sha256,
            salt: [0; 8],
            count: 0xFF,
        };
        assert!(iterated.check_limits(&limits).is_ok());
    }

    #[test]
    fn test_unknown_type() {
        let data = [101u8, 2, b'G', b'N', b'U'];
        let mut reader = BodyReader::new(Tag::SecretKey, &data);
        let s2k = S2k::parse(&mut reader).unwrap();
        assert_eq!(s2k, S2k::Unknown(101));
        assert!(matches!(
            s2k.derive(b"x", 16),
            Err(Error::UnknownAlgorithm(_))
        ));
    }
}
