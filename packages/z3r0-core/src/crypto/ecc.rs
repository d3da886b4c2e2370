//! # Elliptic Curves
//!
//! Curve registry (OIDs) and the curve operations behind ECDSA, EdDSA and
//! ECDH key material.
//!
//! ## Wire Encodings
//!
//! ```text
//! ┌──────────────────┬────────────────────────────┬──────────────────────────┐
//! │ Curve            │ Public point MPI           │ Secret MPI               │
//! ├──────────────────┼────────────────────────────┼──────────────────────────┤
//! │ Ed25519Legacy    │ 0x40 || 32-octet key       │ 32-octet seed            │
//! │ Curve25519Legacy │ 0x40 || 32-octet u-coord   │ secret, octets reversed  │
//! │ P-256/384/521    │ 0x04 || X || Y (SEC1)      │ scalar, big-endian       │
//! └──────────────────┴────────────────────────────┴──────────────────────────┘
//! ```
//!
//! Native X25519 and Ed25519 keys (algorithms 25 and 27) carry raw 32-octet
//! values instead and use the `x25519_*` / `ed25519_*` helpers directly.

use ed25519_dalek::{Signer, Verifier};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use super::{HashAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};

/// Prefix octet of a native (25519) point inside an MPI
pub const NATIVE_POINT_PREFIX: u8 = 0x40;

/// Curves the codec implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EccCurve {
    /// Ed25519 in the legacy EdDSA encoding
    Ed25519Legacy,
    /// Curve25519 in the legacy ECDH encoding
    Curve25519Legacy,
    /// NIST P-256
    NistP256,
    /// NIST P-384
    NistP384,
    /// NIST P-521
    NistP521,
}

const OID_ED25519_LEGACY: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];
const OID_CURVE25519_LEGACY: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];
const OID_NIST_P256: &[u8] = &[0x2A, 0x86, 0x48, 0xCE, 0x3D, 0x03, 0x01, 0x07];
const OID_NIST_P384: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x22];
const OID_NIST_P521: &[u8] = &[0x2B, 0x81, 0x04, 0x00, 0x23];

impl EccCurve {
    /// DER OID body (without tag and length)
    pub fn oid(self) -> &'static [u8] {
        match self {
            EccCurve::Ed25519Legacy => OID_ED25519_LEGACY,
            EccCurve::Curve25519Legacy => OID_CURVE25519_LEGACY,
            EccCurve::NistP256 => OID_NIST_P256,
            EccCurve::NistP384 => OID_NIST_P384,
            EccCurve::NistP521 => OID_NIST_P521,
        }
    }

    /// Look a curve up by OID
    pub fn from_oid(oid: &[u8]) -> Option<Self> {
        [
            EccCurve::Ed25519Legacy,
            EccCurve::Curve25519Legacy,
            EccCurve::NistP256,
            EccCurve::NistP384,
            EccCurve::NistP521,
        ]
        .into_iter()
        .find(|curve| curve.oid() == oid)
    }

    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            EccCurve::Ed25519Legacy => "Ed25519",
            EccCurve::Curve25519Legacy => "Curve25519",
            EccCurve::NistP256 => "NIST P-256",
            EccCurve::NistP384 => "NIST P-384",
            EccCurve::NistP521 => "NIST P-521",
        }
    }

    /// Secret scalar / field element size in octets
    pub fn field_size(self) -> usize {
        match self {
            EccCurve::Ed25519Legacy | EccCurve::Curve25519Legacy => 32,
            EccCurve::NistP256 => nist_p256::FIELD_SIZE,
            EccCurve::NistP384 => nist_p384::FIELD_SIZE,
            EccCurve::NistP521 => nist_p521::FIELD_SIZE,
        }
    }

    /// KDF hash and key-wrap cipher written into new ECDH keys
    pub fn ecdh_kdf_defaults(self) -> (HashAlgorithm, SymmetricAlgorithm) {
        match self {
            EccCurve::NistP384 => (HashAlgorithm::Sha384, SymmetricAlgorithm::Aes192),
            EccCurve::NistP521 => (HashAlgorithm::Sha512, SymmetricAlgorithm::Aes256),
            _ => (HashAlgorithm::Sha256, SymmetricAlgorithm::Aes128),
        }
    }

    /// Hash for self-signatures made with this curve
    pub fn signature_hash(self) -> HashAlgorithm {
        match self {
            EccCurve::NistP384 => HashAlgorithm::Sha384,
            EccCurve::NistP521 => HashAlgorithm::Sha512,
            _ => HashAlgorithm::Sha256,
        }
    }

    /// Whether ECDH is defined for the curve in OpenPGP
    pub fn supports_ecdh(self) -> bool {
        self != EccCurve::Ed25519Legacy
    }

    /// Whether ECDSA / EdDSA is defined for the curve in OpenPGP
    pub fn supports_signing(self) -> bool {
        self != EccCurve::Curve25519Legacy
    }
}

// ============================================================================
// CURVE DISPATCH
// ============================================================================

/// Generate a key pair: (secret MPI octets, public point MPI octets)
pub(crate) fn generate(curve: EccCurve) -> (Zeroizing<Vec<u8>>, Vec<u8>) {
    match curve {
        EccCurve::Ed25519Legacy => {
            let (seed, public) = ed25519_generate();
            (Zeroizing::new(seed.to_vec()), prefixed(&public))
        }
        EccCurve::Curve25519Legacy => {
            let (secret, public) = x25519_generate();
            let mut reversed = Zeroizing::new(secret.to_vec());
            reversed.reverse();
            (reversed, prefixed(&public))
        }
        EccCurve::NistP256 => nist_p256::generate(),
        EccCurve::NistP384 => nist_p384::generate(),
        EccCurve::NistP521 => nist_p521::generate(),
    }
}

/// Public point for a secret MPI
pub(crate) fn public_point(curve: EccCurve, secret: &[u8]) -> Result<Vec<u8>> {
    match curve {
        EccCurve::Ed25519Legacy => Ok(prefixed(&ed25519_public(&*fixed32(secret)?))),
        EccCurve::Curve25519Legacy => Ok(prefixed(&x25519_public(&*curve25519_native(secret)?))),
        EccCurve::NistP256 => nist_p256::public_point(secret),
        EccCurve::NistP384 => nist_p384::public_point(secret),
        EccCurve::NistP521 => nist_p521::public_point(secret),
    }
}

/// Sender side ECDH: (ephemeral point, shared secret)
pub(crate) fn ecdh_ephemeral(
    curve: EccCurve,
    recipient: &[u8],
) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
    match curve {
        EccCurve::Curve25519Legacy => {
            let (ephemeral, shared) = x25519_ephemeral(&native_point(recipient)?)?;
            Ok((prefixed(&ephemeral), Zeroizing::new(shared.to_vec())))
        }
        EccCurve::NistP256 => nist_p256::ecdh_ephemeral(recipient),
        EccCurve::NistP384 => nist_p384::ecdh_ephemeral(recipient),
        EccCurve::NistP521 => nist_p521::ecdh_ephemeral(recipient),
        EccCurve::Ed25519Legacy => Err(Error::UnknownAlgorithm(
            "ECDH is not defined for Ed25519".into(),
        )),
    }
}

/// Recipient side ECDH: shared secret from our secret and the ephemeral point
pub(crate) fn ecdh_shared(
    curve: EccCurve,
    secret: &[u8],
    ephemeral: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    match curve {
        EccCurve::Curve25519Legacy => {
            let ephemeral = native_point(ephemeral)
                .map_err(|_| Error::IntegrityCheckFailed("invalid ephemeral point".into()))?;
            let shared = x25519_shared(&*curve25519_native(secret)?, &ephemeral)?;
            Ok(Zeroizing::new(shared.to_vec()))
        }
        EccCurve::NistP256 => nist_p256::ecdh_shared(secret, ephemeral),
        EccCurve::NistP384 => nist_p384::ecdh_shared(secret, ephemeral),
        EccCurve::NistP521 => nist_p521::ecdh_shared(secret, ephemeral),
        EccCurve::Ed25519Legacy => Err(Error::UnknownAlgorithm(
            "ECDH is not defined for Ed25519".into(),
        )),
    }
}

/// Sign a digest: (r, s)
pub(crate) fn sign(curve: EccCurve, secret: &[u8], digest: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    match curve {
        EccCurve::Ed25519Legacy => {
            let sig = ed25519_sign(&*fixed32(secret)?, digest);
            Ok((sig[..32].to_vec(), sig[32..].to_vec()))
        }
        EccCurve::NistP256 => nist_p256::sign(secret, digest),
        EccCurve::NistP384 => nist_p384::sign(secret, digest),
        EccCurve::NistP521 => nist_p521::sign(secret, digest),
        EccCurve::Curve25519Legacy => Err(Error::UnknownAlgorithm(
            "signing is not defined for Curve25519".into(),
        )),
    }
}

/// Verify (r, s) over a digest
pub(crate) fn verify(curve: EccCurve, point: &[u8], digest: &[u8], r: &[u8], s: &[u8]) -> Result<()> {
    match curve {
        EccCurve::Ed25519Legacy => {
            let mut sig = [0u8; 64];
            sig[..32].copy_from_slice(&pad(r, 32)?);
            sig[32..].copy_from_slice(&pad(s, 32)?);
            ed25519_verify(&native_point(point)?, digest, &sig)
        }
        EccCurve::NistP256 => nist_p256::verify(point, digest, r, s),
        EccCurve::NistP384 => nist_p384::verify(point, digest, r, s),
        EccCurve::NistP521 => nist_p521::verify(point, digest, r, s),
        EccCurve::Curve25519Legacy => Err(Error::UnknownAlgorithm(
            "signing is not defined for Curve25519".into(),
        )),
    }
}

// ============================================================================
// 25519 HELPERS
// ============================================================================

/// Fresh clamped X25519 secret and its public key
pub(crate) fn x25519_generate() -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let mut secret = Zeroizing::new(super::random_array::<32>());
    secret[0] &= 248;
    secret[31] &= 127;
    secret[31] |= 64;
    let public = x25519_public(&secret);
    (secret, public)
}

/// X25519 public key for a native secret
pub(crate) fn x25519_public(secret: &[u8; 32]) -> [u8; 32] {
    let secret = x25519_dalek::StaticSecret::from(*secret);
    x25519_dalek::PublicKey::from(&secret).to_bytes()
}

/// Ephemeral X25519 towards `recipient`: (ephemeral public, shared)
pub(crate) fn x25519_ephemeral(recipient: &[u8; 32]) -> Result<([u8; 32], Zeroizing<[u8; 32]>)> {
    let ephemeral = x25519_dalek::StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral).to_bytes();
    let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(*recipient));
    if !shared.was_contributory() {
        return Err(Error::InvalidKeyFormat(
            "recipient X25519 key is a low-order point".into(),
        ));
    }
    Ok((ephemeral_public, Zeroizing::new(shared.to_bytes())))
}

/// X25519 shared secret from a native secret and the sender's ephemeral key
///
/// An ephemeral key with bit 255 set is refused: X25519 would ignore that
/// bit, leaving the altered key unnoticed.
pub(crate) fn x25519_shared(secret: &[u8; 32], ephemeral: &[u8; 32]) -> Result<Zeroizing<[u8; 32]>> {
    if ephemeral[31] & 0x80 != 0 {
        return Err(Error::IntegrityCheckFailed(
            "ephemeral X25519 key has its unused top bit set".into(),
        ));
    }
    let secret = x25519_dalek::StaticSecret::from(*secret);
    let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(*ephemeral));
    if !shared.was_contributory() {
        return Err(Error::IntegrityCheckFailed(
            "ephemeral X25519 key is a low-order point".into(),
        ));
    }
    Ok(Zeroizing::new(shared.to_bytes()))
}

/// Fresh Ed25519 seed and its public key
pub(crate) fn ed25519_generate() -> (Zeroizing<[u8; 32]>, [u8; 32]) {
    let signing = ed25519_dalek::SigningKey::generate(&mut OsRng);
    (
        Zeroizing::new(signing.to_bytes()),
        signing.verifying_key().to_bytes(),
    )
}

/// Ed25519 public key for a seed
pub(crate) fn ed25519_public(seed: &[u8; 32]) -> [u8; 32] {
    ed25519_dalek::SigningKey::from_bytes(seed)
        .verifying_key()
        .to_bytes()
}

/// Ed25519 signature over `message`
pub(crate) fn ed25519_sign(seed: &[u8; 32], message: &[u8]) -> [u8; 64] {
    ed25519_dalek::SigningKey::from_bytes(seed)
        .sign(message)
        .to_bytes()
}

/// Verify an Ed25519 signature over `message`
pub(crate) fn ed25519_verify(public: &[u8; 32], message: &[u8], signature: &[u8; 64]) -> Result<()> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(public)
        .map_err(|_| Error::InvalidKeyFormat("invalid Ed25519 public key".into()))?;
    let signature = ed25519_dalek::Signature::from_bytes(signature);
    key.verify(message, &signature)
        .map_err(|_| Error::BadSelfSignature("Ed25519 signature mismatch".into()))
}

fn prefixed(native: &[u8; 32]) -> Vec<u8> {
    let mut point = Vec::with_capacity(33);
    point.push(NATIVE_POINT_PREFIX);
    point.extend_from_slice(native);
    point
}

/// Strip the 0x40 prefix from a 25519 point MPI
pub(crate) fn native_point(point: &[u8]) -> Result<[u8; 32]> {
    match point.split_first() {
        Some((&NATIVE_POINT_PREFIX, rest)) if rest.len() == 32 => {
            let mut out = [0u8; 32];
            out.copy_from_slice(rest);
            Ok(out)
        }
        _ => Err(Error::InvalidKeyFormat(
            "25519 point must be 0x40 followed by 32 octets".into(),
        )),
    }
}

/// Native little-endian secret from a Curve25519Legacy secret MPI
fn curve25519_native(secret: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let mut native = fixed32(secret)?;
    native.reverse();
    Ok(native)
}

fn fixed32(bytes: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let padded = pad(bytes, 32)?;
    let mut out = Zeroizing::new([0u8; 32]);
    out.copy_from_slice(&padded);
    Ok(out)
}

/// Left-pad big-endian octets to `len`
pub(crate) fn pad(bytes: &[u8], len: usize) -> Result<Zeroizing<Vec<u8>>> {
    let bytes = &bytes[bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len())..];
    if bytes.len() > len {
        return Err(Error::InvalidKeyFormat(format!(
            "value of {} octets exceeds field size {}",
            bytes.len(),
            len
        )));
    }
    let mut out = Zeroizing::new(vec![0u8; len]);
    out[len - bytes.len()..].copy_from_slice(bytes);
    Ok(out)
}

// ============================================================================
// NIST CURVES
// ============================================================================

macro_rules! nist_curve {
    ($module:ident, $krate:ident, $field:expr) => {
        mod $module {
            use $krate::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
            use $krate::ecdsa::{Signature, SigningKey, VerifyingKey};
            use $krate::elliptic_curve::sec1::ToEncodedPoint;
            use $krate::{FieldBytes, PublicKey, SecretKey};
            use rand::rngs::OsRng;
            use zeroize::Zeroizing;

            use super::pad;
            use crate::error::{Error, Result};

            pub(super) const FIELD_SIZE: usize = $field;

            pub(super) fn generate() -> (Zeroizing<Vec<u8>>, Vec<u8>) {
                let secret = SecretKey::random(&mut OsRng);
                let point = secret
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                (Zeroizing::new(secret.to_bytes().to_vec()), point)
            }

            fn secret_key(secret: &[u8]) -> Result<SecretKey> {
                SecretKey::from_slice(&pad(secret, FIELD_SIZE)?)
                    .map_err(|_| Error::InvalidKeyFormat("invalid secret scalar".into()))
            }

            fn public_key(point: &[u8]) -> Result<PublicKey> {
                PublicKey::from_sec1_bytes(point)
                    .map_err(|_| Error::InvalidKeyFormat("invalid curve point".into()))
            }

            pub(super) fn public_point(secret: &[u8]) -> Result<Vec<u8>> {
                Ok(secret_key(secret)?
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec())
            }

            pub(super) fn ecdh_ephemeral(
                recipient: &[u8],
            ) -> Result<(Vec<u8>, Zeroizing<Vec<u8>>)> {
                let recipient = public_key(recipient)?;
                let ephemeral = $krate::ecdh::EphemeralSecret::random(&mut OsRng);
                let point = ephemeral
                    .public_key()
                    .to_encoded_point(false)
                    .as_bytes()
                    .to_vec();
                let shared = ephemeral.diffie_hellman(&recipient);
                Ok((point, Zeroizing::new(shared.raw_secret_bytes().to_vec())))
            }

            pub(super) fn ecdh_shared(
                secret: &[u8],
                ephemeral: &[u8],
            ) -> Result<Zeroizing<Vec<u8>>> {
                let secret = secret_key(secret)?;
                let ephemeral = public_key(ephemeral)
                    .map_err(|_| Error::IntegrityCheckFailed("invalid ephemeral point".into()))?;
                let shared =
                    $krate::ecdh::diffie_hellman(secret.to_nonzero_scalar(), ephemeral.as_affine());
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }

            pub(super) fn sign(secret: &[u8], digest: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
                let key = SigningKey::from_slice(&pad(secret, FIELD_SIZE)?)
                    .map_err(|_| Error::InvalidKeyFormat("invalid secret scalar".into()))?;
                let signature: Signature = key
                    .sign_prehash(digest)
                    .map_err(|e| Error::Internal(format!("ECDSA signing failed: {}", e)))?;
                let (r, s) = signature.split_bytes();
                Ok((r.to_vec(), s.to_vec()))
            }

            pub(super) fn verify(point: &[u8], digest: &[u8], r: &[u8], s: &[u8]) -> Result<()> {
                let key = VerifyingKey::from_sec1_bytes(point)
                    .map_err(|_| Error::InvalidKeyFormat("invalid curve point".into()))?;
                let signature = Signature::from_scalars(
                    FieldBytes::clone_from_slice(&pad(r, FIELD_SIZE)?),
                    FieldBytes::clone_from_slice(&pad(s, FIELD_SIZE)?),
                )
                .map_err(|_| Error::BadSelfSignature("malformed ECDSA signature".into()))?;
                key.verify_prehash(digest, &signature)
                    .map_err(|_| Error::BadSelfSignature("ECDSA signature mismatch".into()))
            }
        }
    };
}

nist_curve!(nist_p256, p256, 32);
nist_curve!(nist_p384, p384, 48);
nist_curve!(nist_p521, p521, 66);

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EccCurve; 5] = [
        EccCurve::Ed25519Legacy,
        EccCurve::Curve25519Legacy,
        EccCurve::NistP256,
        EccCurve::NistP384,
        EccCurve::NistP521,
    ];

    #[test]
    fn test_oid_lookup() {
        for curve in ALL {
            assert_eq!(EccCurve::from_oid(curve.oid()), Some(curve));
        }
        assert_eq!(EccCurve::from_oid(&[0x2B, 0x24]), None);
    }

    #[test]
    fn test_generated_point_matches_secret() {
        for curve in ALL {
            let (secret, point) = generate(curve);
            assert_eq!(public_point(curve, &secret).unwrap(), point, "{:?}", curve);
        }
    }

    #[test]
    fn test_point_encodings() {
        let (_, point) = generate(EccCurve::Curve25519Legacy);
        assert_eq!(point.len(), 33);
        assert_eq!(point[0], NATIVE_POINT_PREFIX);

        let (_, point) = generate(EccCurve::NistP384);
        assert_eq!(point.len(), 1 + 2 * 48);
        assert_eq!(point[0], 0x04);
    }

    #[test]
    fn test_ecdh_agreement() {
        for curve in ALL.into_iter().filter(|c| c.supports_ecdh()) {
            let (secret, point) = generate(curve);
            let (ephemeral, sender_shared) = ecdh_ephemeral(curve, &point).unwrap();
            let recipient_shared = ecdh_shared(curve, &secret, &ephemeral).unwrap();
            assert_eq!(sender_shared, recipient_shared, "{:?}", curve);
        }
    }

    #[test]
    fn test_sign_verify() {
        for curve in ALL.into_iter().filter(|c| c.supports_signing()) {
            let (secret, point) = generate(curve);
            let digest =
                crate::crypto::hash::digest(curve.signature_hash(), b"self-signature").unwrap();
            let (r, s) = sign(curve, &secret, &digest).unwrap();
            assert!(verify(curve, &point, &digest, &r, &s).is_ok(), "{:?}", curve);

            let mut other = digest.clone();
            other[0] ^= 1;
            assert!(verify(curve, &point, &other, &r, &s).is_err(), "{:?}", curve);
        }
    }

    #[test]
    fn test_curve_capabilities() {
        assert!(sign(EccCurve::Curve25519Legacy, &[1; 32], &[0; 32]).is_err());
        assert!(ecdh_ephemeral(EccCurve::Ed25519Legacy, &[0x40; 33]).is_err());
    }

    #[test]
    fn test_x25519_rejects_low_order_point() {
        assert!(x25519_ephemeral(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_x25519_rejects_top_bit() {
        let (secret, _) = x25519_generate();
        let (_, ephemeral) = x25519_generate();
        assert!(x25519_shared(&secret, &ephemeral).is_ok());

        let mut altered = ephemeral;
        altered[31] |= 0x80;
        assert!(matches!(
            x25519_shared(&secret, &altered),
            Err(Error::IntegrityCheckFailed(_))
        ));
    }

    #[test]
    fn test_native_point_requires_prefix() {
        assert!(native_point(&[0x04; 33]).is_err());
        assert!(native_point(&[0x40; 32]).is_err());
        assert!(native_point(&[0x40; 33]).is_ok());
    }
}
