//! RSA operations: OAEP session-key transport and PKCS#1 v1.5 signatures.
//!
//! OpenPGP stores the secret as `d, p, q, u` with `u = p^-1 mod q`. The
//! `rsa` crate's CRT coefficient is `q^-1 mod p` for its own `(p, q)`, so
//! the two primes swap places on the way in and out.

use ::rsa::traits::{PrivateKeyParts, PublicKeyParts};
use ::rsa::{BigUint, Oaep, Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use rand::rngs::OsRng;
use sha2::{Sha224, Sha256, Sha384, Sha512};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::HashAlgorithm;
use crate::error::{Error, Result};
use crate::packet::Mpi;

/// Smallest modulus accepted for new keys
pub const MIN_GENERATED_BITS: usize = 2048;

/// Public exponent written into new keys
pub const PUBLIC_EXPONENT: u32 = 65537;

/// Secret components in OpenPGP order
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RsaSecretParts {
    /// Private exponent
    pub d: Mpi,
    /// First prime
    pub p: Mpi,
    /// Second prime
    pub q: Mpi,
    /// p^-1 mod q
    pub u: Mpi,
}

/// Generate a key: ((n, e), secret parts)
pub(crate) fn generate(bits: usize) -> Result<((Mpi, Mpi), RsaSecretParts)> {
    let key = RsaPrivateKey::new_with_exp(&mut OsRng, bits, &BigUint::from(PUBLIC_EXPONENT))
        .map_err(|e| Error::KeyGenerationFailed(format!("RSA: {}", e)))?;
    let primes = key.primes();
    if primes.len() != 2 {
        return Err(Error::KeyGenerationFailed("RSA key must have two primes".into()));
    }
    let u = key
        .crt_coefficient()
        .ok_or_else(|| Error::KeyGenerationFailed("RSA CRT coefficient missing".into()))?;

    let public = (mpi(key.n()), mpi(key.e()));
    let secret = RsaSecretParts {
        d: mpi(key.d()),
        p: mpi(&primes[1]),
        q: mpi(&primes[0]),
        u: mpi(&u),
    };
    Ok((public, secret))
}

fn mpi(value: &BigUint) -> Mpi {
    Mpi::from_slice(&Zeroizing::new(value.to_bytes_be()))
}

fn uint(value: &Mpi) -> BigUint {
    BigUint::from_bytes_be(value.as_bytes())
}

fn public_key(n: &Mpi, e: &Mpi) -> Result<RsaPublicKey> {
    RsaPublicKey::new(uint(n), uint(e))
        .map_err(|e| Error::InvalidKeyFormat(format!("RSA public key: {}", e)))
}

/// Rebuild and validate the private key
///
/// Fails when the components are inconsistent with `(n, e)`.
pub(crate) fn private_key(n: &Mpi, e: &Mpi, secret: &RsaSecretParts) -> Result<RsaPrivateKey> {
    let key = RsaPrivateKey::from_components(
        uint(n),
        uint(e),
        uint(&secret.d),
        vec![uint(&secret.q), uint(&secret.p)],
    )
    .map_err(|e| Error::InvalidKeyFormat(format!("RSA private key: {}", e)))?;
    key.validate()
        .map_err(|e| Error::InvalidKeyFormat(format!("RSA private key: {}", e)))?;
    Ok(key)
}

/// RSA-OAEP(SHA-256) encryption of a session-key payload
pub(crate) fn encrypt(n: &Mpi, e: &Mpi, payload: &[u8]) -> Result<Mpi> {
    let key = public_key(n, e)?;
    let ciphertext = key
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), payload)
        .map_err(|e| Error::EncryptionFailed(format!("RSA-OAEP: {}", e)))?;
    Ok(Mpi::from_slice(&ciphertext))
}

/// RSA-OAEP(SHA-256) decryption; any failure is an integrity failure
pub(crate) fn decrypt(key: &RsaPrivateKey, ciphertext: &Mpi) -> Result<Zeroizing<Vec<u8>>> {
    let padded = ciphertext
        .to_padded(key.size())
        .ok_or_else(|| Error::IntegrityCheckFailed("RSA ciphertext too long".into()))?;
    key.decrypt(Oaep::new::<Sha256>(), &padded)
        .map(Zeroizing::new)
        .map_err(|_| Error::IntegrityCheckFailed("RSA-OAEP decoding failed".into()))
}

fn pkcs1v15(hash: HashAlgorithm) -> Result<Pkcs1v15Sign> {
    match hash {
        HashAlgorithm::Sha224 => Ok(Pkcs1v15Sign::new::<Sha224>()),
        HashAlgorithm::Sha256 => Ok(Pkcs1v15Sign::new::<Sha256>()),
        HashAlgorithm::Sha384 => Ok(Pkcs1v15Sign::new::<Sha384>()),
        HashAlgorithm::Sha512 => Ok(Pkcs1v15Sign::new::<Sha512>()),
        other => Err(Error::UnknownAlgorithm(format!(
            "hash {:?} for RSA signatures",
            other
        ))),
    }
}

/// PKCS#1 v1.5 signature over a digest
pub(crate) fn sign(key: &RsaPrivateKey, hash: HashAlgorithm, digest: &[u8]) -> Result<Mpi> {
    let signature = key
        .sign(pkcs1v15(hash)?, digest)
        .map_err(|e| Error::Internal(format!("RSA signing failed: {}", e)))?;
    Ok(Mpi::from_slice(&signature))
}

/// Verify a PKCS#1 v1.5 signature over a digest
pub(crate) fn verify(n: &Mpi, e: &Mpi, hash: HashAlgorithm, digest: &[u8], signature: &Mpi) -> Result<()> {
    let key = public_key(n, e)?;
    let padded = signature
        .to_padded(key.size())
        .ok_or_else(|| Error::BadSelfSignature("RSA signature too long".into()))?;
    key.verify(pkcs1v15(hash)?, digest, &padded)
        .map_err(|_| Error::BadSelfSignature("RSA signature mismatch".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash::digest;

    // 1024-bit keys keep the tests quick; generation enforces 2048 elsewhere
    fn small_key() -> ((Mpi, Mpi), RsaSecretParts) {
        generate(1024).unwrap()
    }

    #[test]
    fn test_components_round_trip() {
        let ((n, e), secret) = small_key();
        let key = private_key(&n, &e, &secret).unwrap();
        assert_eq!(mpi(key.n()), n);
        assert_eq!(e.as_bytes(), &[0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_openpgp_crt_coefficient() {
        let (_, secret) = small_key();
        // u * p == 1 (mod q)
        let product = (uint(&secret.u) * uint(&secret.p)) % uint(&secret.q);
        assert_eq!(product, BigUint::from(1u32));
    }

    #[test]
    fn test_oaep_round_trip() {
        let ((n, e), secret) = small_key();
        let key = private_key(&n, &e, &secret).unwrap();
        let ciphertext = encrypt(&n, &e, b"session key || checksum").unwrap();
        assert_eq!(
            decrypt(&key, &ciphertext).unwrap().as_slice(),
            b"session key || checksum"
        );
    }

    #[test]
    fn test_oaep_tamper_is_integrity_failure() {
        let ((n, e), secret) = small_key();
        let key = private_key(&n, &e, &secret).unwrap();
        let ciphertext = encrypt(&n, &e, b"payload").unwrap();
        let mut bytes = ciphertext.as_bytes().to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 1;
        assert!(matches!(
            decrypt(&key, &Mpi::from_slice(&bytes)),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_sign_verify() {
        let ((n, e), secret) = small_key();
        let key = private_key(&n, &e, &secret).unwrap();
        let hashed = digest(HashAlgorithm::Sha256, b"certification").unwrap();
        let signature = sign(&key, HashAlgorithm::Sha256, &hashed).unwrap();
        assert!(verify(&n, &e, HashAlgorithm::Sha256, &hashed, &signature).is_ok());

        let other = digest(HashAlgorithm::Sha256, b"tampered").unwrap();
        assert!(verify(&n, &e, HashAlgorithm::Sha256, &other, &signature).is_err());
    }

    #[test]
    fn test_inconsistent_components_rejected() {
        let ((n, e), mut secret) = small_key();
        secret.d = Mpi::from_slice(&[3]);
        assert!(private_key(&n, &e, &secret).is_err());
    }
}
