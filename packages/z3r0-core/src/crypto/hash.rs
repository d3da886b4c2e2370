//! Digest dispatch over the OpenPGP hash registry.

use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

use super::HashAlgorithm;
use crate::error::{Error, Result};

/// Incremental hasher for the implemented hash algorithms
#[derive(Clone)]
pub enum Hasher {
    /// SHA-1
    Sha1(Sha1),
    /// SHA2-224
    Sha224(Sha224),
    /// SHA2-256
    Sha256(Sha256),
    /// SHA2-384
    Sha384(Sha384),
    /// SHA2-512
    Sha512(Sha512),
}

impl Hasher {
    /// Start a hash; unimplemented algorithms are `UnknownAlgorithm`
    pub fn new(algorithm: HashAlgorithm) -> Result<Self> {
        match algorithm {
            HashAlgorithm::Sha1 => Ok(Hasher::Sha1(Sha1::new())),
            HashAlgorithm::Sha224 => Ok(Hasher::Sha224(Sha224::new())),
            HashAlgorithm::Sha256 => Ok(Hasher::Sha256(Sha256::new())),
            HashAlgorithm::Sha384 => Ok(Hasher::Sha384(Sha384::new())),
            HashAlgorithm::Sha512 => Ok(Hasher::Sha512(Sha512::new())),
            other => Err(Error::UnknownAlgorithm(format!("hash {:?}", other))),
        }
    }

    /// Feed data
    pub fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha1(h) => h.update(data),
            Hasher::Sha224(h) => h.update(data),
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha384(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
        }
    }

    /// Finish and return the digest
    pub fn finalize(self) -> Vec<u8> {
        match self {
            Hasher::Sha1(h) => h.finalize().to_vec(),
            Hasher::Sha224(h) => h.finalize().to_vec(),
            Hasher::Sha256(h) => h.finalize().to_vec(),
            Hasher::Sha384(h) => h.finalize().to_vec(),
            Hasher::Sha512(h) => h.finalize().to_vec(),
        }
    }
}

/// Digest length in octets
pub fn digest_size(algorithm: HashAlgorithm) -> Result<usize> {
    match algorithm {
        HashAlgorithm::Sha1 => Ok(20),
        HashAlgorithm::Sha224 => Ok(28),
        HashAlgorithm::Sha256 => Ok(32),
        HashAlgorithm::Sha384 => Ok(48),
        HashAlgorithm::Sha512 => Ok(64),
        other => Err(Error::UnknownAlgorithm(format!("hash {:?}", other))),
    }
}

/// One-shot digest
pub fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>> {
    let mut hasher = Hasher::new(algorithm)?;
    hasher.update(data);
    Ok(hasher.finalize())
}

/// SHA-1 of `data`, for fingerprints and the MDC
pub fn sha1(data: &[u8]) -> [u8; 20] {
    Sha1::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_sizes_match_output() {
        for alg in [
            HashAlgorithm::Sha1,
            HashAlgorithm::Sha224,
            HashAlgorithm::Sha256,
            HashAlgorithm::Sha384,
            HashAlgorithm::Sha512,
        ] {
            assert_eq!(digest(alg, b"abc").unwrap().len(), digest_size(alg).unwrap());
        }
    }

    #[test]
    fn test_sha256_known_answer() {
        assert_eq!(
            hex::encode(digest(HashAlgorithm::Sha256, b"abc").unwrap()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha1_known_answer() {
        assert_eq!(
            hex::encode(sha1(b"abc")),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn test_unimplemented_hash() {
        assert!(matches!(
            Hasher::new(HashAlgorithm::Md5),
            Err(Error::UnknownAlgorithm(_))
        ));
    }
}
