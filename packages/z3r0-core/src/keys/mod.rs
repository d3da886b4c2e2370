//! # Key Material Manager
//!
//! Builds, parses, locks and unlocks OpenPGP certificates and private keys.
//!
//! ## Certificate Structure
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        KEY BLOCK (version 4)                            │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Public-Key / Secret-Key          primary: certify + sign               │
//! │    [Signature 0x1F / 0x20]        direct key / key revocation           │
//! │  User ID "<a@example.com>"                                              │
//! │    Signature 0x13                 positive certification                │
//! │  Public-Subkey / Secret-Subkey    encryption subkey                     │
//! │    Signature 0x18                 subkey binding (flags 0x0C)           │
//! │    [Signature 0x28]               subkey revocation                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Private Key Lifecycle
//!
//! ```text
//!   parse / generate            unlock(passphrase)            wipe / drop
//!  ──────────────────▶ Locked ─────────────────────▶ Unlocked ─────────────▶ Wiped
//!                        ▲  │
//!                        └──┘ WrongPassphrase
//! ```
//!
//! `PrivateKeyMaterial` only ever holds protected secrets. `unlock` returns
//! an [`UnlockedKey`] that owns the recovered secrets and zeroizes them when
//! it is wiped or dropped. [`PrivateKeyMaterial::with_unlocked`] scopes
//! that lifetime to a closure.
//!
//! ## Design Decisions
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | Packet storage | Original packets kept verbatim | Armor round trips are exact |
//! | Unusable subkeys | Kept, skipped for encryption | Foreign keys still parse |
//! | Self-signatures | Verified on parse (configurable) | Reject forged bindings |
//! | Encryption key | Newest usable subkey | Matches common key rotation |

mod generate;
mod public;
mod secret;
mod signature;

pub use generate::{generate, Algorithm, CancelToken};
pub use public::{Fingerprint, KeyId, PublicKeyPacket, PublicParams};
pub use secret::{KeyState, ProtectionMode, SecretKeyPacket, UnlockedKey};
pub use signature::{KeyFlags, Signature, SignatureType, Subpacket, SubpacketType};

pub(crate) use secret::{SecretParams, UnlockedSecret};

use tracing::{debug, info, warn};

use crate::armor::{self, BlockType};
use crate::config::{CodecConfig, KdfLimits};
use crate::crypto::ecc::EccCurve;
use crate::error::{Error, Result};
use crate::packet::{self, Packet, Tag};
use crate::time::now_timestamp;
use secret::DerivedKeys;
use signature::SignedData;

// ============================================================================
// INPUT DECODING
// ============================================================================

/// Packets from binary input or (tolerantly parsed) armored text
///
/// Input whose first octet has the high bit set is a binary packet stream;
/// anything else must be UTF-8 armor of the `expected` block type.
pub(crate) fn decode_input(input: &[u8], expected: BlockType) -> Result<Vec<Packet>> {
    if input.first().map_or(false, |b| b & 0x80 != 0) {
        debug!(len = input.len(), "Reading binary packet input");
        return packet::parse_all(input);
    }
    let text = std::str::from_utf8(input).map_err(|_| {
        Error::MalformedArmor("input is neither binary packets nor UTF-8 text".into())
    })?;
    armor::dearmor_tolerant(text, expected)
}

// ============================================================================
// CERTIFICATE COMPONENTS
// ============================================================================

/// A user ID and its newest valid self-certification
#[derive(Debug, Clone)]
pub struct UserId {
    value: String,
    certification: Option<Signature>,
}

impl UserId {
    /// User ID text (lossy UTF-8)
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Self-certification, if one was found
    pub fn certification(&self) -> Option<&Signature> {
        self.certification.as_ref()
    }
}

/// A subkey and its binding state
#[derive(Debug, Clone)]
pub struct Subkey {
    key: PublicKeyPacket,
    binding: Option<Signature>,
    revoked: bool,
}

impl Subkey {
    /// Public key
    pub fn key(&self) -> &PublicKeyPacket {
        &self.key
    }

    /// Binding signature, if one was found
    pub fn binding(&self) -> Option<&Signature> {
        self.binding.as_ref()
    }

    /// Key flags from the binding signature
    pub fn flags(&self) -> Option<KeyFlags> {
        self.binding.as_ref().and_then(Signature::key_flags)
    }

    /// Whether a subkey revocation was found
    pub fn is_revoked(&self) -> bool {
        self.revoked
    }

    /// Expiry time, if the binding sets one
    pub fn expires_at(&self) -> Option<i64> {
        expiry(&self.key, self.binding.as_ref())
    }

    /// Why the subkey cannot receive messages, if it cannot
    fn unusable_reason(&self, now: i64, bindings_verified: bool) -> Option<&'static str> {
        if !self.key.is_supported() {
            Some("unsupported algorithm")
        } else if !self.key.can_encrypt() {
            Some("not an encryption algorithm")
        } else if self.revoked {
            Some("revoked")
        } else if self.binding.is_none() && bindings_verified {
            Some("no valid binding signature")
        } else if self.flags().map_or(false, |flags| !flags.can_encrypt()) {
            Some("not flagged for encryption")
        } else if self.expires_at().map_or(false, |at| at <= now) {
            Some("expired")
        } else {
            None
        }
    }
}

fn expiry(key: &PublicKeyPacket, sig: Option<&Signature>) -> Option<i64> {
    match sig.and_then(Signature::key_expiration) {
        Some(0) | None => None,
        Some(secs) => Some(i64::from(key.created()) + i64::from(secs)),
    }
}

/// Parsed view of one certificate
#[derive(Debug, Clone)]
struct Certificate {
    primary: PublicKeyPacket,
    primary_sig: Option<Signature>,
    revoked: bool,
    user_ids: Vec<UserId>,
    subkeys: Vec<Subkey>,
    verified: bool,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Role {
    Public,
    Private,
}

/// Packets collected for one component while walking the key block
struct RawComponent<T> {
    item: T,
    signatures: Vec<Signature>,
}

enum Current {
    Primary,
    UserId,
    Subkey,
    Ignored,
}

/// Result of walking a key block
struct Walk {
    certificate: Certificate,
    secrets: Vec<secret::SecretKeyPacket>,
    packets: Vec<Packet>,
    public_packets: Vec<Packet>,
}

fn walk(packets: Vec<Packet>, role: Role, config: &CodecConfig) -> Result<Walk> {
    let first = packets
        .first()
        .ok_or_else(|| Error::InvalidKeyFormat("key block contains no packets".into()))?;

    let mut secrets = Vec::new();
    let mut public_packets = Vec::with_capacity(packets.len());
    let primary = match (role, first.tag()) {
        (Role::Public, Tag::PublicKey) => {
            public_packets.push(first.clone());
            PublicKeyPacket::from_packet(first)?
        }
        (Role::Private, Tag::SecretKey) => {
            let key = SecretKeyPacket::from_packet(first)?;
            let public = key.public().clone();
            public_packets.push(public.to_packet(Tag::PublicKey)?);
            secrets.push(key);
            public
        }
        (Role::Public, Tag::SecretKey) => {
            return Err(Error::InvalidKeyFormat(
                "expected a public key but found a private key".into(),
            ))
        }
        (Role::Private, Tag::PublicKey) => {
            return Err(Error::InvalidKeyFormat(
                "expected a private key but found a public key".into(),
            ))
        }
        (_, other) => {
            return Err(Error::InvalidKeyFormat(format!(
                "key block must start with a key packet, found {:?}",
                other
            )))
        }
    };
    if !primary.is_supported() {
        return Err(Error::UnknownAlgorithm(format!(
            "primary key algorithm {:?}",
            primary.algorithm()
        )));
    }

    let mut direct = Vec::new();
    let mut user_ids: Vec<RawComponent<String>> = Vec::new();
    let mut subkeys: Vec<RawComponent<PublicKeyPacket>> = Vec::new();
    let mut current = Current::Primary;
    let mut end = packets.len();

    for (index, packet) in packets.iter().enumerate().skip(1) {
        match packet.tag() {
            Tag::PublicKey | Tag::SecretKey => {
                warn!(count = packets.len() - index, "Ignoring packets after the first key");
                end = index;
                break;
            }
            Tag::UserId => {
                user_ids.push(RawComponent {
                    item: String::from_utf8_lossy(packet.body()).into_owned(),
                    signatures: Vec::new(),
                });
                current = Current::UserId;
            }
            Tag::UserAttribute => current = Current::Ignored,
            Tag::PublicSubkey => {
                let key = PublicKeyPacket::from_packet(packet)?;
                if !key.is_supported() {
                    warn!(algorithm = ?key.algorithm(), "Keeping subkey with unsupported algorithm");
                }
                subkeys.push(RawComponent {
                    item: key,
                    signatures: Vec::new(),
                });
                current = Current::Subkey;
            }
            Tag::SecretSubkey => {
                if role == Role::Public {
                    return Err(Error::InvalidKeyFormat(
                        "public key block contains secret subkey material".into(),
                    ));
                }
                let key = SecretKeyPacket::from_packet(packet)?;
                let public = key.public().clone();
                if !public.is_supported() {
                    warn!(algorithm = ?public.algorithm(), "Keeping subkey with unsupported algorithm");
                }
                public_packets.push(public.to_packet(Tag::PublicSubkey)?);
                secrets.push(key);
                subkeys.push(RawComponent {
                    item: public,
                    signatures: Vec::new(),
                });
                current = Current::Subkey;
                continue;
            }
            Tag::Signature => match Signature::from_packet(packet) {
                Ok(sig) => match current {
                    Current::Primary => direct.push(sig),
                    Current::UserId => {
                        if let Some(uid) = user_ids.last_mut() {
                            uid.signatures.push(sig);
                        }
                    }
                    Current::Subkey => {
                        if let Some(subkey) = subkeys.last_mut() {
                            subkey.signatures.push(sig);
                        }
                    }
                    Current::Ignored => {}
                },
                Err(e) => warn!(error = %e, "Skipping unreadable signature"),
            },
            Tag::Trust | Tag::Marker | Tag::Padding => {}
            other => debug!(tag = ?other, "Ignoring packet inside key block"),
        }
        public_packets.push(packet.clone());
    }

    let mut packets = packets;
    packets.truncate(end);

    let verify = config.verify_self_signatures;
    let revoked = select_self_signature(
        &direct,
        |t| t == SignatureType::KeyRevocation,
        &primary,
        &SignedData::Key { primary: &primary },
        verify,
    )
    .unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unverifiable key revocation");
        None
    })
    .is_some();

    let mut primary_sig = select_self_signature(
        &direct,
        |t| t == SignatureType::DirectKey,
        &primary,
        &SignedData::Key { primary: &primary },
        verify,
    )?
    .cloned();

    let mut certified_user_ids = Vec::with_capacity(user_ids.len());
    for uid in user_ids {
        let certification = select_self_signature(
            &uid.signatures,
            SignatureType::is_certification,
            &primary,
            &SignedData::UserId {
                primary: &primary,
                user_id: uid.item.as_bytes(),
            },
            verify,
        )?
        .cloned();
        if certification.is_none() {
            warn!(user_id = %uid.item, "User ID has no self-certification");
        }
        if primary_sig.is_none() {
            primary_sig = certification.clone();
        }
        certified_user_ids.push(UserId {
            value: uid.item,
            certification,
        });
    }

    let mut bound_subkeys = Vec::with_capacity(subkeys.len());
    for subkey in subkeys {
        let target = SignedData::Subkey {
            primary: &primary,
            subkey: &subkey.item,
        };
        let binding = if subkey.item.is_supported() {
            select_self_signature(
                &subkey.signatures,
                |t| t == SignatureType::SubkeyBinding,
                &primary,
                &target,
                verify,
            )?
            .cloned()
        } else {
            None
        };
        let revoked = select_self_signature(
            &subkey.signatures,
            |t| t == SignatureType::SubkeyRevocation,
            &primary,
            &target,
            verify,
        )
        .unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unverifiable subkey revocation");
            None
        })
        .is_some();
        bound_subkeys.push(Subkey {
            key: subkey.item,
            binding,
            revoked,
        });
    }

    Ok(Walk {
        certificate: Certificate {
            primary,
            primary_sig,
            revoked,
            user_ids: certified_user_ids,
            subkeys: bound_subkeys,
            verified: verify,
        },
        secrets,
        packets,
        public_packets,
    })
}

/// Newest signature of the wanted kind issued by `primary`
///
/// With verification on, signatures over unimplemented hashes are skipped;
/// if every candidate fails to verify, the last failure is returned.
fn select_self_signature<'a>(
    signatures: &'a [Signature],
    wanted: impl Fn(SignatureType) -> bool,
    primary: &PublicKeyPacket,
    target: &SignedData<'_>,
    verify: bool,
) -> Result<Option<&'a Signature>> {
    let mut newest: Option<&Signature> = None;
    let mut failure = None;
    for sig in signatures
        .iter()
        .filter(|sig| wanted(sig.sig_type()) && sig.may_be_issued_by(primary))
    {
        if verify {
            match sig.verify(primary, target) {
                Ok(()) => {}
                Err(Error::UnknownAlgorithm(reason)) => {
                    warn!(reason = %reason, "Skipping signature that cannot be verified");
                    continue;
                }
                Err(e) => {
                    failure = Some(e);
                    continue;
                }
            }
        }
        if newest.map_or(true, |current| sig.created() >= current.created()) {
            newest = Some(sig);
        }
    }
    match (newest, failure) {
        (None, Some(e)) => Err(e),
        (newest, _) => Ok(newest),
    }
}

// ============================================================================
// PUBLIC KEY MATERIAL
// ============================================================================

/// A parsed public certificate
#[derive(Debug, Clone)]
pub struct PublicKeyMaterial {
    certificate: Certificate,
    packets: Vec<Packet>,
}

impl PublicKeyMaterial {
    /// Parse binary packets or (tolerantly) armored text
    pub fn parse(input: impl AsRef<[u8]>, config: &CodecConfig) -> Result<Self> {
        Self::from_packets(decode_input(input.as_ref(), BlockType::PublicKey)?, config)
    }

    /// Build from an already framed packet sequence
    pub fn from_packets(packets: Vec<Packet>, config: &CodecConfig) -> Result<Self> {
        let walk = walk(packets, Role::Public, config)?;
        debug!(fingerprint = %walk.certificate.primary.fingerprint(), "Parsed public key");
        Ok(Self {
            certificate: walk.certificate,
            packets: walk.packets,
        })
    }

    /// Packets in certificate order
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Binary transferable public key
    pub fn to_bytes(&self) -> Vec<u8> {
        packet::serialize(&self.packets)
    }

    /// `PUBLIC KEY BLOCK` armor
    pub fn to_armored(&self, comment: Option<&str>) -> String {
        armor::armor(&self.packets, BlockType::PublicKey, comment)
    }

    /// Primary key
    pub fn primary(&self) -> &PublicKeyPacket {
        &self.certificate.primary
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.certificate.primary.fingerprint()
    }

    /// Primary key creation time
    pub fn created(&self) -> u32 {
        self.certificate.primary.created()
    }

    /// User IDs in certificate order
    pub fn user_ids(&self) -> &[UserId] {
        &self.certificate.user_ids
    }

    /// Subkeys in certificate order, including unusable ones
    pub fn subkeys(&self) -> &[Subkey] {
        &self.certificate.subkeys
    }

    /// Whether the primary key carries a key revocation
    pub fn is_revoked(&self) -> bool {
        self.certificate.revoked
    }

    /// Primary key expiry time, if set
    pub fn expires_at(&self) -> Option<i64> {
        expiry(&self.certificate.primary, self.certificate.primary_sig.as_ref())
    }

    /// Algorithm family under its boundary name, when it is one of them
    pub fn algorithm(&self) -> Option<Algorithm> {
        match self.certificate.primary.params() {
            PublicParams::EdDsaLegacy { .. } => Some(Algorithm::Curve25519),
            PublicParams::Ed25519 { .. } => Some(Algorithm::Ed25519),
            PublicParams::Ecdsa { curve, .. } => match curve {
                EccCurve::NistP256 => Some(Algorithm::P256),
                EccCurve::NistP384 => Some(Algorithm::P384),
                EccCurve::NistP521 => Some(Algorithm::P521),
                _ => None,
            },
            PublicParams::Rsa { n, .. } => match n.bit_len() {
                2048 => Some(Algorithm::Rsa2048),
                3072 => Some(Algorithm::Rsa3072),
                4096 => Some(Algorithm::Rsa4096),
                _ => None,
            },
            _ => None,
        }
    }

    /// Key that should receive session keys: the newest usable subkey, or
    /// the primary when it can encrypt and no subkey can
    pub fn encryption_key(&self) -> Result<&PublicKeyPacket> {
        let cert = &self.certificate;
        let fingerprint = cert.primary.fingerprint();
        if cert.revoked {
            return Err(Error::InvalidKeyFormat(format!("key {} has been revoked", fingerprint)));
        }
        let now = now_timestamp();
        if self.expires_at().map_or(false, |at| at <= now) {
            return Err(Error::InvalidKeyFormat(format!("key {} has expired", fingerprint)));
        }

        let mut chosen: Option<&Subkey> = None;
        for subkey in &cert.subkeys {
            match subkey.unusable_reason(now, cert.verified) {
                Some(reason) => warn!(
                    subkey = %subkey.key.fingerprint(),
                    reason,
                    "Skipping subkey for encryption"
                ),
                None => {
                    if chosen.map_or(true, |best| subkey.key.created() >= best.key.created()) {
                        chosen = Some(subkey);
                    }
                }
            }
        }
        if let Some(subkey) = chosen {
            return Ok(&subkey.key);
        }

        let primary_flags = cert.primary_sig.as_ref().and_then(Signature::key_flags);
        if cert.primary.can_encrypt() && primary_flags.map_or(true, KeyFlags::can_encrypt) {
            return Ok(&cert.primary);
        }
        Err(Error::InvalidKeyFormat(format!(
            "key {} has no usable encryption key",
            fingerprint
        )))
    }
}

// ============================================================================
// PRIVATE KEY MATERIAL
// ============================================================================

/// A parsed, locked private key
#[derive(Clone)]
pub struct PrivateKeyMaterial {
    public: PublicKeyMaterial,
    secrets: Vec<SecretKeyPacket>,
    packets: Vec<Packet>,
    allow_unprotected: bool,
    kdf_limits: KdfLimits,
}

impl std::fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKeyMaterial")
            .field("fingerprint", &self.fingerprint())
            .field("secrets", &self.secrets)
            .finish()
    }
}

impl PrivateKeyMaterial {
    /// Parse binary packets or (tolerantly) armored text
    pub fn parse(input: impl AsRef<[u8]>, config: &CodecConfig) -> Result<Self> {
        Self::from_packets(decode_input(input.as_ref(), BlockType::PrivateKey)?, config)
    }

    /// Build from an already framed packet sequence
    ///
    /// Cleartext secrets are refused unless `allow_unprotected_keys` is set.
    pub fn from_packets(packets: Vec<Packet>, config: &CodecConfig) -> Result<Self> {
        let walk = walk(packets, Role::Private, config)?;
        if !config.allow_unprotected_keys
            && walk
                .secrets
                .iter()
                .any(|key| key.protection() == ProtectionMode::Unprotected)
        {
            return Err(Error::UnprotectedKey);
        }
        debug!(
            fingerprint = %walk.certificate.primary.fingerprint(),
            secrets = walk.secrets.len(),
            "Parsed private key"
        );
        Ok(Self {
            public: PublicKeyMaterial {
                certificate: walk.certificate,
                packets: walk.public_packets,
            },
            secrets: walk.secrets,
            packets: walk.packets,
            allow_unprotected: config.allow_unprotected_keys,
            kdf_limits: config.kdf_limits,
        })
    }

    /// Packets in key order (secret packets stay protected)
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// `PRIVATE KEY BLOCK` armor
    pub fn to_armored(&self, comment: Option<&str>) -> String {
        armor::armor(&self.packets, BlockType::PrivateKey, comment)
    }

    /// The matching public certificate
    pub fn public(&self) -> &PublicKeyMaterial {
        &self.public
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.public.fingerprint()
    }

    /// Secret key packets, primary first
    pub fn secret_keys(&self) -> &[SecretKeyPacket] {
        &self.secrets
    }

    /// Always `Locked`: recovered secrets live only in [`UnlockedKey`]
    pub fn state(&self) -> KeyState {
        KeyState::Locked
    }

    /// Whether every secret is passphrase protected
    pub fn is_protected(&self) -> bool {
        self.secrets
            .iter()
            .all(|key| key.protection() != ProtectionMode::Unprotected)
    }

    /// Recover every usable secret
    ///
    /// Secrets the codec cannot open (unsupported algorithms, GnuPG stubs)
    /// are skipped. Fails with `WrongPassphrase` if any usable secret does
    /// not open; nothing recovered so far survives the failure. Argon2 work
    /// factors beyond the configured `kdf_limits` are `InvalidKeyFormat`.
    pub fn unlock(&self, passphrase: &str) -> Result<UnlockedKey> {
        let fingerprint = self.fingerprint();
        let mut keys = DerivedKeys::new(self.kdf_limits);
        let mut unlocked = Vec::with_capacity(self.secrets.len());
        for key in &self.secrets {
            match key.unlock(passphrase.as_bytes(), self.allow_unprotected, &mut keys) {
                Ok(secret) => unlocked.push(UnlockedSecret {
                    public: key.public().clone(),
                    secret,
                }),
                Err(Error::UnknownAlgorithm(reason)) => {
                    warn!(key = %key.public().fingerprint(), reason = %reason, "Skipping secret key");
                }
                Err(e) => return Err(e),
            }
        }
        if unlocked.is_empty() {
            return Err(Error::UnknownAlgorithm(format!(
                "key {} has no secret material this codec can use",
                fingerprint
            )));
        }
        info!(fingerprint = %fingerprint, secrets = unlocked.len(), "Unlocked private key");
        Ok(UnlockedKey::new(fingerprint, unlocked))
    }

    /// Unlock, run `f`, and wipe the secrets on every exit path
    pub fn with_unlocked<T>(
        &self,
        passphrase: &str,
        f: impl FnOnce(&UnlockedKey) -> Result<T>,
    ) -> Result<T> {
        let mut key = self.unlock(passphrase)?;
        let result = f(&key);
        key.wipe();
        result
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CodecConfig {
        CodecConfig::insecure_fast()
    }

    fn generated(algorithm: Algorithm) -> (PublicKeyMaterial, PrivateKeyMaterial) {
        generate(
            &["<a@example.com>"],
            "correct-horse",
            algorithm,
            &config(),
            &CancelToken::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_generated_structure() {
        let (public, private) = generated(Algorithm::Curve25519);
        assert_eq!(public.fingerprint(), private.fingerprint());
        assert_eq!(public.user_ids().len(), 1);
        assert_eq!(public.user_ids()[0].value(), "<a@example.com>");
        assert!(public.user_ids()[0].certification().is_some());
        assert_eq!(public.subkeys().len(), 1);
        assert!(public.subkeys()[0].flags().unwrap().can_encrypt());
        assert_eq!(public.algorithm(), Some(Algorithm::Curve25519));
        assert_eq!(private.secret_keys().len(), 2);
        assert!(private.is_protected());
        assert_eq!(private.state(), KeyState::Locked);

        let tags: Vec<Tag> = public.packets().iter().map(Packet::tag).collect();
        assert_eq!(
            tags,
            vec![Tag::PublicKey, Tag::UserId, Tag::Signature, Tag::PublicSubkey, Tag::Signature]
        );
    }

    #[test]
    fn test_encryption_key_is_subkey() {
        let (public, _) = generated(Algorithm::Ed25519);
        let key = public.encryption_key().unwrap();
        assert_eq!(key.fingerprint(), public.subkeys()[0].key().fingerprint());
    }

    #[test]
    fn test_public_round_trip_through_armor() {
        let (public, _) = generated(Algorithm::P256);
        let armored = public.to_armored(None);
        let parsed = PublicKeyMaterial::parse(&armored, &config()).unwrap();
        assert_eq!(parsed.fingerprint(), public.fingerprint());
        assert_eq!(parsed.to_armored(None), armored);
    }

    #[test]
    fn test_binary_input_is_accepted() {
        let (public, _) = generated(Algorithm::Ed25519);
        let parsed = PublicKeyMaterial::parse(public.to_bytes(), &config()).unwrap();
        assert_eq!(parsed.fingerprint(), public.fingerprint());
    }

    #[test]
    fn test_private_exposes_matching_public() {
        let (public, private) = generated(Algorithm::Curve25519);
        assert_eq!(private.public().to_bytes(), public.to_bytes());
    }

    #[test]
    fn test_role_mismatch() {
        let (public, private) = generated(Algorithm::Ed25519);
        assert!(matches!(
            PublicKeyMaterial::from_packets(private.packets().to_vec(), &config()),
            Err(Error::InvalidKeyFormat(_))
        ));
        assert!(matches!(
            PrivateKeyMaterial::from_packets(public.packets().to_vec(), &config()),
            Err(Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_unlock_and_wrong_passphrase() {
        let (_, private) = generated(Algorithm::Curve25519);
        assert!(matches!(private.unlock("wrong"), Err(Error::WrongPassphrase)));
        // still locked and still unlockable after a failure
        assert_eq!(private.state(), KeyState::Locked);

        let key = private.unlock("correct-horse").unwrap();
        assert_eq!(key.state(), KeyState::Unlocked);
        assert_eq!(key.fingerprint(), private.fingerprint());
        assert_eq!(key.key_ids().len(), 2);
    }

    #[test]
    fn test_with_unlocked_scopes_secrets() {
        let (_, private) = generated(Algorithm::Ed25519);
        let ids = private
            .with_unlocked("correct-horse", |key| Ok(key.key_ids()))
            .unwrap();
        assert_eq!(ids.len(), 2);

        let err = private
            .with_unlocked("correct-horse", |_| -> Result<()> {
                Err(Error::InvalidInput("boom".into()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_tampered_binding_is_rejected() {
        let (public, _) = generated(Algorithm::Ed25519);
        let mut packets = public.packets().to_vec();
        let mut body = packets[4].body().to_vec();
        let last = body.len() - 1;
        body[last] ^= 0x01;
        packets[4] = Packet::new(Tag::Signature, body).unwrap();

        let err = PublicKeyMaterial::from_packets(packets.clone(), &config()).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidKeyFormat);

        let lenient = CodecConfig {
            verify_self_signatures: false,
            ..config()
        };
        assert!(PublicKeyMaterial::from_packets(packets, &lenient).is_ok());
    }

    #[test]
    fn test_unknown_subkey_is_kept_but_skipped() {
        let (public, _) = generated(Algorithm::Ed25519);
        let mut packets = public.packets().to_vec();
        // DSA subkey with opaque fields
        let dsa = Packet::new(Tag::PublicSubkey, vec![4, 0, 0, 0, 9, 17, 0, 8, 0xFF]).unwrap();
        packets.push(dsa);

        let parsed = PublicKeyMaterial::from_packets(packets, &config()).unwrap();
        assert_eq!(parsed.subkeys().len(), 2);
        assert!(!parsed.subkeys()[1].key().is_supported());
        assert_eq!(
            parsed.encryption_key().unwrap().fingerprint(),
            public.subkeys()[0].key().fingerprint()
        );
        assert_eq!(parsed.packets().len(), public.packets().len() + 1);
    }

    #[test]
    fn test_subkey_without_binding_is_unusable() {
        let (public, _) = generated(Algorithm::Ed25519);
        let packets = public.packets()[..4].to_vec();
        let parsed = PublicKeyMaterial::from_packets(packets, &config()).unwrap();
        assert!(matches!(
            parsed.encryption_key(),
            Err(Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_only_first_key_is_used() {
        let (a, _) = generated(Algorithm::Ed25519);
        let (b, _) = generated(Algorithm::Ed25519);
        let mut packets = a.packets().to_vec();
        packets.extend_from_slice(b.packets());
        let parsed = PublicKeyMaterial::from_packets(packets, &config()).unwrap();
        assert_eq!(parsed.fingerprint(), a.fingerprint());
        assert_eq!(parsed.packets().len(), a.packets().len());
    }

    #[test]
    fn test_unknown_primary_algorithm() {
        let dsa = Packet::new(Tag::PublicKey, vec![4, 0, 0, 0, 9, 17, 0, 8, 0xFF]).unwrap();
        assert!(matches!(
            PublicKeyMaterial::from_packets(vec![dsa], &config()),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_empty_and_garbage_input() {
        assert!(matches!(
            PublicKeyMaterial::from_packets(Vec::new(), &config()),
            Err(Error::InvalidKeyFormat(_))
        ));
        assert!(matches!(
            PublicKeyMaterial::parse([0x41, 0xFF, 0xFE], &config()),
            Err(Error::MalformedArmor(_))
        ));
    }

    #[test]
    fn test_unprotected_private_key_policy() {
        let permissive = CodecConfig {
            allow_unprotected_keys: true,
            ..config()
        };
        let (_, private) = generate(
            &["<u@example.com>"],
            "",
            Algorithm::Ed25519,
            &permissive,
            &CancelToken::new(),
        )
        .unwrap();
        assert!(!private.is_protected());
        assert!(private.unlock("").is_ok());

        assert!(matches!(
            PrivateKeyMaterial::from_packets(private.packets().to_vec(), &config()),
            Err(Error::UnprotectedKey)
        ));
    }
}
