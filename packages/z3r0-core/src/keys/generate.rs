//! Key pair generation.
//!
//! Every generated key is a v4 certificate: a certify+sign primary, one
//! self-certified user ID per input, and one encryption subkey. Secrets are
//! protected with a single Argon2 S2K specifier (fresh random salt) shared
//! by the primary and the subkey.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::CodecConfig;
use crate::crypto::ecc::{self, EccCurve};
use crate::crypto::s2k::S2k;
use crate::crypto::{rsa, AeadAlgorithm, CompressionAlgorithm, HashAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::packet::{Mpi, Packet, Tag};
use crate::time::now_pgp_timestamp;

use super::public::{PublicKeyPacket, PublicParams};
use super::secret::{SecretKeyPacket, SecretParams, PROTECTION_CIPHER};
use super::signature::{KeyFlags, SignatureBuilder, SignatureType, SignedData, SubpacketType};
use super::{PrivateKeyMaterial, PublicKeyMaterial};

/// Features subpacket: SEIPD v1 (0x01) and SEIPD v2 (0x08)
const FEATURES: u8 = 0x01 | 0x08;

// ============================================================================
// ALGORITHM
// ============================================================================

/// Key algorithm families offered at the boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// EdDSA (legacy) primary, Curve25519 ECDH subkey
    Curve25519,
    /// Native Ed25519 primary, native X25519 subkey
    Ed25519,
    /// NIST P-256 ECDSA primary, ECDH subkey
    P256,
    /// NIST P-384 ECDSA primary, ECDH subkey
    P384,
    /// NIST P-521 ECDSA primary, ECDH subkey
    P521,
    /// RSA 2048
    Rsa2048,
    /// RSA 3072
    Rsa3072,
    /// RSA 4096
    Rsa4096,
}

impl Algorithm {
    /// Every supported family
    pub const ALL: [Algorithm; 8] = [
        Algorithm::Curve25519,
        Algorithm::Ed25519,
        Algorithm::P256,
        Algorithm::P384,
        Algorithm::P521,
        Algorithm::Rsa2048,
        Algorithm::Rsa3072,
        Algorithm::Rsa4096,
    ];

    /// Boundary name
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Curve25519 => "curve25519",
            Algorithm::Ed25519 => "ed25519",
            Algorithm::P256 => "p256",
            Algorithm::P384 => "p384",
            Algorithm::P521 => "p521",
            Algorithm::Rsa2048 => "rsa2048",
            Algorithm::Rsa3072 => "rsa3072",
            Algorithm::Rsa4096 => "rsa4096",
        }
    }

    /// Whether this is an RSA family (slow to generate)
    pub fn is_rsa(self) -> bool {
        matches!(self, Algorithm::Rsa2048 | Algorithm::Rsa3072 | Algorithm::Rsa4096)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase();
        Algorithm::ALL
            .into_iter()
            .find(|alg| alg.as_str() == name)
            .ok_or_else(|| {
                let names: Vec<&str> = Algorithm::ALL.iter().map(|alg| alg.as_str()).collect();
                Error::UnknownAlgorithm(format!(
                    "'{}' (expected one of {})",
                    s.trim(),
                    names.join(", ")
                ))
            })
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cooperative cancellation flag for key generation
///
/// Clones share the flag. Generation checks it between steps; a cancelled
/// run drops everything it built (zeroizing the secrets) and returns
/// `Cancelled`.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, uncancelled token
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            debug!("Key generation cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }
}

// ============================================================================
// GENERATION
// ============================================================================

struct KeyHalf {
    public: PublicKeyPacket,
    secret: SecretParams,
}

fn ecc_half(curve: EccCurve, created: u32, encryption: bool) -> Result<KeyHalf> {
    let (secret, point) = ecc::generate(curve);
    let point = Mpi::from_slice(&point);
    let params = match (encryption, curve) {
        (true, _) => {
            let (hash, cipher) = curve.ecdh_kdf_defaults();
            PublicParams::Ecdh {
                curve,
                point,
                hash,
                cipher,
            }
        }
        (false, EccCurve::Ed25519Legacy) => PublicParams::EdDsaLegacy { curve, point },
        (false, _) => PublicParams::Ecdsa { curve, point },
    };
    Ok(KeyHalf {
        public: PublicKeyPacket::new(created, params)?,
        secret: SecretParams::Ecc(Mpi::from_slice(&secret)),
    })
}

fn rsa_half(bits: usize, created: u32) -> Result<KeyHalf> {
    let ((n, e), parts) = rsa::generate(bits)?;
    Ok(KeyHalf {
        public: PublicKeyPacket::new(created, PublicParams::Rsa { n, e })?,
        secret: SecretParams::Rsa(parts),
    })
}

fn primary_half(algorithm: Algorithm, created: u32) -> Result<KeyHalf> {
    match algorithm {
        Algorithm::Curve25519 => ecc_half(EccCurve::Ed25519Legacy, created, false),
        Algorithm::Ed25519 => {
            let (seed, public) = ecc::ed25519_generate();
            Ok(KeyHalf {
                public: PublicKeyPacket::new(created, PublicParams::Ed25519 { public })?,
                secret: SecretParams::Ed25519(*seed),
            })
        }
        Algorithm::P256 => ecc_half(EccCurve::NistP256, created, false),
        Algorithm::P384 => ecc_half(EccCurve::NistP384, created, false),
        Algorithm::P521 => ecc_half(EccCurve::NistP521, created, false),
        Algorithm::Rsa2048 => rsa_half(2048, created),
        Algorithm::Rsa3072 => rsa_half(3072, created),
        Algorithm::Rsa4096 => rsa_half(4096, created),
    }
}

fn subkey_half(algorithm: Algorithm, created: u32) -> Result<KeyHalf> {
    match algorithm {
        Algorithm::Curve25519 => ecc_half(EccCurve::Curve25519Legacy, created, true),
        Algorithm::Ed25519 => {
            let (secret, public) = ecc::x25519_generate();
            Ok(KeyHalf {
                public: PublicKeyPacket::new(created, PublicParams::X25519 { public })?,
                secret: SecretParams::X25519(*secret),
            })
        }
        Algorithm::P256 => ecc_half(EccCurve::NistP256, created, true),
        Algorithm::P384 => ecc_half(EccCurve::NistP384, created, true),
        Algorithm::P521 => ecc_half(EccCurve::NistP521, created, true),
        Algorithm::Rsa2048 => rsa_half(2048, created),
        Algorithm::Rsa3072 => rsa_half(3072, created),
        Algorithm::Rsa4096 => rsa_half(4096, created),
    }
}

/// Algorithm preferences written into every certification
fn with_preferences(builder: SignatureBuilder) -> SignatureBuilder {
    builder
        .subpacket(
            SubpacketType::PreferredSymmetric,
            vec![
                u8::from(SymmetricAlgorithm::Aes256),
                u8::from(SymmetricAlgorithm::Aes192),
                u8::from(SymmetricAlgorithm::Aes128),
            ],
        )
        .subpacket(
            SubpacketType::PreferredHash,
            vec![
                u8::from(HashAlgorithm::Sha512),
                u8::from(HashAlgorithm::Sha384),
                u8::from(HashAlgorithm::Sha256),
            ],
        )
        .subpacket(
            SubpacketType::PreferredCompression,
            vec![
                u8::from(CompressionAlgorithm::Zlib),
                u8::from(CompressionAlgorithm::Zip),
                u8::from(CompressionAlgorithm::Uncompressed),
            ],
        )
        .subpacket(
            SubpacketType::PreferredAead,
            vec![
                u8::from(SymmetricAlgorithm::Aes256),
                u8::from(AeadAlgorithm::Gcm),
                u8::from(SymmetricAlgorithm::Aes128),
                u8::from(AeadAlgorithm::Gcm),
            ],
        )
        .subpacket(SubpacketType::Features, vec![FEATURES])
}

fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidInput("User ID must not be empty".into()));
    }
    if user_id.contains(['\r', '\n']) {
        return Err(Error::InvalidInput("User ID must be a single line".into()));
    }
    Ok(())
}

/// Generate a new key pair
///
/// An empty passphrase produces an unprotected key, which requires
/// `allow_unprotected_keys`. The random source is used only for key
/// material, salts and nonces.
pub fn generate(
    user_ids: &[&str],
    passphrase: &str,
    algorithm: Algorithm,
    config: &CodecConfig,
    cancel: &CancelToken,
) -> Result<(PublicKeyMaterial, PrivateKeyMaterial)> {
    config.validate()?;
    if user_ids.is_empty() {
        return Err(Error::InvalidInput("At least one user ID is required".into()));
    }
    for user_id in user_ids {
        validate_user_id(user_id)?;
    }
    if passphrase.is_empty() && !config.allow_unprotected_keys {
        return Err(Error::InvalidInput(
            "A passphrase is required to protect the private key".into(),
        ));
    }

    let created = now_pgp_timestamp();
    cancel.check()?;
    let primary = primary_half(algorithm, created)?;
    cancel.check()?;
    let subkey = subkey_half(algorithm, created)?;
    cancel.check()?;

    let hash = primary.public.signature_hash();
    let mut signed = Vec::with_capacity(user_ids.len() * 2 + 2);
    for (index, user_id) in user_ids.iter().enumerate() {
        let mut builder = with_preferences(
            SignatureBuilder::new(SignatureType::PositiveCertification, hash, created)
                .key_flags(KeyFlags::CERTIFY | KeyFlags::SIGN),
        );
        if index == 0 {
            builder = builder.subpacket(SubpacketType::PrimaryUserId, vec![1]);
        }
        let certification = builder.sign(
            &primary.public,
            &primary.secret,
            &SignedData::UserId {
                primary: &primary.public,
                user_id: user_id.as_bytes(),
            },
        )?;
        signed.push(Packet::new(Tag::UserId, user_id.as_bytes().to_vec())?);
        signed.push(certification.to_packet()?);
    }

    let binding = SignatureBuilder::new(SignatureType::SubkeyBinding, hash, created)
        .key_flags(KeyFlags::ENCRYPT_COMMUNICATIONS | KeyFlags::ENCRYPT_STORAGE)
        .sign(
            &primary.public,
            &primary.secret,
            &SignedData::Subkey {
                primary: &primary.public,
                subkey: &subkey.public,
            },
        )?;

    let s2k = (!passphrase.is_empty()).then(|| S2k::new_argon2(&config.kdf));
    let s2k_key = match &s2k {
        Some(s2k) => Some(s2k.derive(passphrase.as_bytes(), PROTECTION_CIPHER.key_size()?)?),
        None => None,
    };
    cancel.check()?;
    let protection = s2k.as_ref().zip(s2k_key.as_deref().map(Vec::as_slice));

    let mut packets = Vec::with_capacity(signed.len() + 3);
    packets.push(SecretKeyPacket::protect(
        Tag::SecretKey,
        &primary.public,
        &primary.secret,
        protection,
    )?);
    packets.extend(signed);
    packets.push(SecretKeyPacket::protect(
        Tag::SecretSubkey,
        &subkey.public,
        &subkey.secret,
        protection,
    )?);
    packets.push(binding.to_packet()?);

    let private = PrivateKeyMaterial::from_packets(packets, config)?;
    let public = private.public().clone();
    info!(
        fingerprint = %public.fingerprint(),
        algorithm = %algorithm,
        protected = s2k.is_some(),
        "Generated key pair"
    );
    Ok((public, private))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyState;

    #[test]
    fn test_algorithm_names() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.as_str().parse::<Algorithm>().unwrap(), algorithm);
            assert_eq!(algorithm.to_string(), algorithm.as_str());
        }
        assert_eq!(" Curve25519 ".parse::<Algorithm>().unwrap(), Algorithm::Curve25519);
        assert!(matches!(
            "dsa".parse::<Algorithm>(),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_every_ecc_family_generates_and_unlocks() {
        let config = CodecConfig::insecure_fast();
        for algorithm in [
            Algorithm::Curve25519,
            Algorithm::Ed25519,
            Algorithm::P256,
            Algorithm::P384,
            Algorithm::P521,
        ] {
            let (public, private) = generate(
                &["<a@example.com>"],
                "correct-horse",
                algorithm,
                &config,
                &CancelToken::new(),
            )
            .unwrap();
            assert_eq!(public.algorithm(), Some(algorithm), "{}", algorithm);
            assert!(public.encryption_key().is_ok(), "{}", algorithm);
            let key = private.unlock("correct-horse").unwrap();
            assert_eq!(key.state(), KeyState::Unlocked);
        }
    }

    #[test]
    fn test_multiple_user_ids() {
        let (public, _) = generate(
            &["Alice <a@example.com>", "<alice@example.org>"],
            "pw",
            Algorithm::Ed25519,
            &CodecConfig::insecure_fast(),
            &CancelToken::new(),
        )
        .unwrap();
        let values: Vec<&str> = public.user_ids().iter().map(|uid| uid.value()).collect();
        assert_eq!(values, vec!["Alice <a@example.com>", "<alice@example.org>"]);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancelToken::new();
        let clone = cancel.clone();
        clone.cancel();
        assert!(cancel.is_cancelled());

        let err = generate(
            &["<a@example.com>"],
            "pw",
            Algorithm::Ed25519,
            &CodecConfig::insecure_fast(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_input_validation() {
        let config = CodecConfig::insecure_fast();
        let cancel = CancelToken::new();
        assert!(matches!(
            generate(&[], "pw", Algorithm::Ed25519, &config, &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            generate(&["  "], "pw", Algorithm::Ed25519, &config, &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            generate(&["a\nb"], "pw", Algorithm::Ed25519, &config, &cancel),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            generate(&["<a@example.com>"], "", Algorithm::Ed25519, &config, &cancel),
            Err(Error::InvalidInput(_))
        ));
    }
}
