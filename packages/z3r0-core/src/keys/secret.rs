//! Secret-Key and Secret-Subkey packets: passphrase protection and unlock.
//!
//! ## Protection Modes
//!
//! | S2K usage | Mode | Integrity | Written |
//! |-----------|------|-----------|---------|
//! | 253 | AES-GCM under an HKDF-derived KEK | AEAD tag | yes |
//! | 254 | AES-CFB | SHA-1 of the cleartext | read only |
//! | 255 | AES-CFB | 16-bit sum | read only |
//! | 0 | none | 16-bit sum | only with `allow_unprotected_keys` |
//!
//! Every secret recovered by an unlock is checked against its public key
//! before it is handed out, so a wrong passphrase can never produce a
//! usable but wrong secret.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::config::KdfLimits;
use crate::crypto::hash::sha1;
use crate::crypto::rsa::RsaSecretParts;
use crate::crypto::s2k::S2k;
use crate::crypto::{ecc, kdf, rsa, symmetric, AeadAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::packet::{BodyReader, Packet, Tag};

use super::public::{Fingerprint, KeyId, PublicKeyPacket, PublicParams, KEY_VERSION};

/// Cipher used when protecting new keys
pub const PROTECTION_CIPHER: SymmetricAlgorithm = SymmetricAlgorithm::Aes256;

const USAGE_UNPROTECTED: u8 = 0;
const USAGE_AEAD: u8 = 253;
const USAGE_CFB_SHA1: u8 = 254;
const USAGE_CFB_SUM16: u8 = 255;

// ============================================================================
// SECRET PARAMETERS
// ============================================================================

/// Cleartext secret key fields
///
/// Only ever held by [`UnlockedKey`] or transiently during generation.
pub(crate) enum SecretParams {
    /// RSA d, p, q, u
    Rsa(RsaSecretParts),
    /// ECDSA / EdDSA / ECDH scalar
    Ecc(crate::packet::Mpi),
    /// Native X25519 secret
    X25519([u8; 32]),
    /// Native Ed25519 seed
    Ed25519([u8; 32]),
}

impl Drop for SecretParams {
    fn drop(&mut self) {
        match self {
            SecretParams::Rsa(parts) => parts.zeroize(),
            SecretParams::Ecc(scalar) => scalar.zeroize(),
            SecretParams::X25519(secret) | SecretParams::Ed25519(secret) => secret.zeroize(),
        }
    }
}

impl ZeroizeOnDrop for SecretParams {}

impl fmt::Debug for SecretParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            SecretParams::Rsa(_) => "Rsa",
            SecretParams::Ecc(_) => "Ecc",
            SecretParams::X25519(_) => "X25519",
            SecretParams::Ed25519(_) => "Ed25519",
        };
        write!(f, "SecretParams::{}([REDACTED])", kind)
    }
}

impl SecretParams {
    fn parse(public: &PublicKeyPacket, reader: &mut BodyReader<'_>) -> Result<Self> {
        Ok(match public.params() {
            PublicParams::Rsa { .. } => SecretParams::Rsa(RsaSecretParts {
                d: reader.mpi()?,
                p: reader.mpi()?,
                q: reader.mpi()?,
                u: reader.mpi()?,
            }),
            PublicParams::Ecdsa { .. } | PublicParams::EdDsaLegacy { .. } | PublicParams::Ecdh { .. } => {
                SecretParams::Ecc(reader.mpi()?)
            }
            PublicParams::X25519 { .. } => SecretParams::X25519(reader.array()?),
            PublicParams::Ed25519 { .. } => SecretParams::Ed25519(reader.array()?),
            PublicParams::Unknown { algorithm, .. } => {
                return Err(Error::UnknownAlgorithm(format!(
                    "secret key algorithm {:?}",
                    algorithm
                )))
            }
        })
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            SecretParams::Rsa(parts) => {
                parts.d.write_to(out);
                parts.p.write_to(out);
                parts.q.write_to(out);
                parts.u.write_to(out);
            }
            SecretParams::Ecc(scalar) => scalar.write_to(out),
            SecretParams::X25519(secret) | SecretParams::Ed25519(secret) => {
                out.extend_from_slice(secret)
            }
        }
    }

    /// Whether the secret belongs to `public`
    ///
    /// Derived public values are compared in constant time.
    fn matches(&self, public: &PublicKeyPacket) -> bool {
        match (self, public.params()) {
            (SecretParams::Rsa(parts), PublicParams::Rsa { n, e }) => {
                rsa::private_key(n, e, parts).is_ok()
            }
            (SecretParams::Ecc(scalar), PublicParams::Ecdsa { curve, point })
            | (SecretParams::Ecc(scalar), PublicParams::EdDsaLegacy { curve, point })
            | (SecretParams::Ecc(scalar), PublicParams::Ecdh { curve, point, .. }) => {
                match ecc::public_point(*curve, scalar.as_bytes()) {
                    Ok(derived) => derived.ct_eq(point.as_bytes()).into(),
                    Err(_) => false,
                }
            }
            (SecretParams::X25519(secret), PublicParams::X25519 { public }) => {
                ecc::x25519_public(secret)[..].ct_eq(&public[..]).into()
            }
            (SecretParams::Ed25519(seed), PublicParams::Ed25519 { public }) => {
                ecc::ed25519_public(seed)[..].ct_eq(&public[..]).into()
            }
            _ => false,
        }
    }

    fn encode(&self) -> Zeroizing<Vec<u8>> {
        let mut out = Zeroizing::new(Vec::new());
        self.write_to(&mut out);
        out
    }
}

fn checksum16(data: &[u8]) -> [u8; 2] {
    let sum = data
        .iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(u16::from(*byte)));
    sum.to_be_bytes()
}

// ============================================================================
// PROTECTION
// ============================================================================

/// How a secret key packet protects its secret fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtectionMode {
    /// Cleartext (usage 0)
    Unprotected,
    /// AEAD (usage 253)
    Aead,
    /// CFB with SHA-1 check (usage 254)
    CfbSha1,
    /// CFB with 16-bit checksum (usage 255)
    CfbChecksum,
    /// Secret fields the codec cannot open
    Unsupported,
}

#[derive(Clone)]
enum Protection {
    Cleartext(Zeroizing<Vec<u8>>),
    Aead {
        cipher: SymmetricAlgorithm,
        aead: AeadAlgorithm,
        s2k: S2k,
        nonce: Vec<u8>,
        ciphertext: Vec<u8>,
    },
    Cfb {
        cipher: SymmetricAlgorithm,
        s2k: S2k,
        iv: Vec<u8>,
        ciphertext: Vec<u8>,
        sha1: bool,
    },
    Unsupported(String),
}

impl Protection {
    fn parse(public: &PublicKeyPacket, reader: &mut BodyReader<'_>) -> Result<Self> {
        if !public.is_supported() {
            return Ok(Protection::Unsupported(format!(
                "public key algorithm {:?}",
                public.algorithm()
            )));
        }
        let usage = reader.u8()?;
        let protection = match usage {
            USAGE_UNPROTECTED => Protection::Cleartext(Zeroizing::new(reader.rest().to_vec())),
            USAGE_AEAD => {
                let cipher = SymmetricAlgorithm::from(reader.u8()?);
                let aead = AeadAlgorithm::from(reader.u8()?);
                let s2k = S2k::parse(reader)?;
                if let S2k::Unknown(kind) = s2k {
                    return Ok(unsupported(reader, format!("S2K type {}", kind)));
                }
                match (aead.nonce_size(), cipher.key_size()) {
                    (Ok(nonce_size), Ok(_)) => Protection::Aead {
                        cipher,
                        aead,
                        s2k,
                        nonce: reader.take(nonce_size)?.to_vec(),
                        ciphertext: reader.rest().to_vec(),
                    },
                    (Err(_), _) => Protection::Unsupported(format!("AEAD mode {:?}", aead)),
                    (_, Err(_)) => Protection::Unsupported(format!("cipher {:?}", cipher)),
                }
            }
            USAGE_CFB_SHA1 | USAGE_CFB_SUM16 => {
                let cipher = SymmetricAlgorithm::from(reader.u8()?);
                let s2k = S2k::parse(reader)?;
                if let S2k::Unknown(kind) = s2k {
                    return Ok(unsupported(reader, format!("S2K type {}", kind)));
                }
                match cipher.block_size() {
                    Ok(block_size) => Protection::Cfb {
                        cipher,
                        s2k,
                        iv: reader.take(block_size)?.to_vec(),
                        ciphertext: reader.rest().to_vec(),
                        sha1: usage == USAGE_CFB_SHA1,
                    },
                    Err(_) => Protection::Unsupported(format!("cipher {:?}", cipher)),
                }
            }
            legacy => Protection::Unsupported(format!("legacy S2K usage {}", legacy)),
        };
        if let Protection::Unsupported(reason) = protection {
            return Ok(unsupported(reader, reason));
        }
        Ok(protection)
    }

    fn mode(&self) -> ProtectionMode {
        match self {
            Protection::Cleartext(_) => ProtectionMode::Unprotected,
            Protection::Aead { .. } => ProtectionMode::Aead,
            Protection::Cfb { sha1: true, .. } => ProtectionMode::CfbSha1,
            Protection::Cfb { sha1: false, .. } => ProtectionMode::CfbChecksum,
            Protection::Unsupported(_) => ProtectionMode::Unsupported,
        }
    }
}

/// Give up on the rest of the secret fields
fn unsupported(reader: &mut BodyReader<'_>, reason: String) -> Protection {
    reader.rest();
    Protection::Unsupported(reason)
}

/// Memoized S2K outputs for one unlock call
///
/// Generated keys share one Argon2 specifier across primary and subkey, so
/// the expensive derivation runs once.
/// Specifiers beyond `limits` are refused before deriving anything.
#[derive(Default)]
pub(crate) struct DerivedKeys {
    limits: KdfLimits,
    entries: Vec<(S2k, usize, Zeroizing<Vec<u8>>)>,
}

impl DerivedKeys {
    pub(crate) fn new(limits: KdfLimits) -> Self {
        Self {
            limits,
            entries: Vec::new(),
        }
    }

    pub(crate) fn derive(&mut self, s2k: &S2k, passphrase: &[u8], key_len: usize) -> Result<&[u8]> {
        s2k.check_limits(&self.limits)?;
        let index = match self
            .entries
            .iter()
            .position(|(cached, len, _)| cached == s2k && *len == key_len)
        {
            Some(index) => index,
            None => {
                let key = s2k.derive(passphrase, key_len)?;
                self.entries.push((s2k.clone(), key_len, key));
                self.entries.len() - 1
            }
        };
        Ok(&self.entries[index].2)
    }
}

fn packet_type_octet(tag: Tag) -> u8 {
    0xC0 | u8::from(tag)
}

fn aead_info(tag: Tag, cipher: SymmetricAlgorithm, aead: AeadAlgorithm) -> [u8; 4] {
    [packet_type_octet(tag), KEY_VERSION, u8::from(cipher), u8::from(aead)]
}

fn aead_aad(tag: Tag, public: &PublicKeyPacket) -> Vec<u8> {
    let mut aad = Vec::with_capacity(1 + public.body().len());
    aad.push(packet_type_octet(tag));
    aad.extend_from_slice(public.body());
    aad
}

// ============================================================================
// SECRET KEY PACKET
// ============================================================================

/// A locked Secret-Key or Secret-Subkey packet
///
/// Holds only the protected form of the secret fields.
#[derive(Clone)]
pub struct SecretKeyPacket {
    tag: Tag,
    public: PublicKeyPacket,
    protection: Protection,
}

impl fmt::Debug for SecretKeyPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKeyPacket")
            .field("tag", &self.tag)
            .field("fingerprint", &self.public.fingerprint())
            .field("protection", &self.protection.mode())
            .finish()
    }
}

impl SecretKeyPacket {
    /// Parse a Secret-Key or Secret-Subkey packet
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let tag = packet.tag();
        if !matches!(tag, Tag::SecretKey | Tag::SecretSubkey) {
            return Err(Error::InvalidKeyFormat(format!(
                "expected a secret key packet, found {:?}",
                tag
            )));
        }
        let (public, used) = PublicKeyPacket::parse_prefix(tag, packet.body())?;
        let mut reader = BodyReader::new(tag, &packet.body()[used..]);
        let protection = Protection::parse(&public, &mut reader)?;
        Ok(Self {
            tag,
            public,
            protection,
        })
    }

    /// Build a protected packet for freshly generated secrets
    ///
    /// `key` is the S2K specifier with its already derived output; `None`
    /// writes the secret in the clear.
    pub(crate) fn protect(
        tag: Tag,
        public: &PublicKeyPacket,
        secret: &SecretParams,
        key: Option<(&S2k, &[u8])>,
    ) -> Result<Packet> {
        let cleartext = secret.encode();
        let mut body = Zeroizing::new(public.body().to_vec());
        match key {
            None => {
                body.push(USAGE_UNPROTECTED);
                body.extend_from_slice(&cleartext);
                body.extend_from_slice(&checksum16(&cleartext));
            }
            Some((s2k, s2k_key)) => {
                let aead = AeadAlgorithm::Gcm;
                let key_len = PROTECTION_CIPHER.key_size()?;
                let kek = kdf::secret_key_kek(s2k_key, &aead_info(tag, PROTECTION_CIPHER, aead), key_len)?;
                let nonce = crate::crypto::random_array::<{ symmetric::GCM_NONCE_SIZE }>();
                let ciphertext = symmetric::gcm_encrypt(
                    PROTECTION_CIPHER,
                    &kek,
                    &nonce,
                    &aead_aad(tag, public),
                    &cleartext,
                )?;
                body.extend_from_slice(&[USAGE_AEAD, u8::from(PROTECTION_CIPHER), u8::from(aead)]);
                s2k.write_to(&mut body);
                body.extend_from_slice(&nonce);
                body.extend_from_slice(&ciphertext);
            }
        }
        Packet::new(tag, body.to_vec())
    }

    /// Public part
    pub fn public(&self) -> &PublicKeyPacket {
        &self.public
    }

    /// Whether this is a subkey
    pub fn is_subkey(&self) -> bool {
        self.tag == Tag::SecretSubkey
    }

    /// Protection mode
    pub fn protection(&self) -> ProtectionMode {
        self.protection.mode()
    }

    /// Recover and check the secret fields
    ///
    /// Any failure to open or validate the secret is `WrongPassphrase`.
    pub(crate) fn unlock(
        &self,
        passphrase: &[u8],
        allow_unprotected: bool,
        keys: &mut DerivedKeys,
    ) -> Result<SecretParams> {
        let cleartext: Zeroizing<Vec<u8>> = match &self.protection {
            Protection::Unsupported(reason) => {
                return Err(Error::UnknownAlgorithm(format!(
                    "secret key {} uses {}",
                    self.public.fingerprint(),
                    reason
                )))
            }
            Protection::Cleartext(data) => {
                if !allow_unprotected {
                    return Err(Error::UnprotectedKey);
                }
                split_checked(data, false).ok_or(Error::WrongPassphrase)?
            }
            Protection::Aead {
                cipher,
                aead,
                s2k,
                nonce,
                ciphertext,
            } => {
                let key_len = cipher.key_size()?;
                let s2k_key = keys.derive(s2k, passphrase, key_len)?;
                let kek = kdf::secret_key_kek(s2k_key, &aead_info(self.tag, *cipher, *aead), key_len)?;
                let plain = symmetric::gcm_decrypt(
                    *cipher,
                    &kek,
                    nonce,
                    &aead_aad(self.tag, &self.public),
                    ciphertext,
                )
                .map_err(|_| Error::WrongPassphrase)?;
                Zeroizing::new(plain)
            }
            Protection::Cfb {
                cipher,
                s2k,
                iv,
                ciphertext,
                sha1,
            } => {
                let s2k_key = keys.derive(s2k, passphrase, cipher.key_size()?)?;
                let mut plain = Zeroizing::new(ciphertext.clone());
                symmetric::cfb_decrypt(*cipher, s2k_key, iv, &mut plain)?;
                split_checked(&plain, *sha1).ok_or(Error::WrongPassphrase)?
            }
        };

        let mut reader = BodyReader::new(self.tag, &cleartext);
        let secret = SecretParams::parse(&self.public, &mut reader).map_err(|_| Error::WrongPassphrase)?;
        reader.finish().map_err(|_| Error::WrongPassphrase)?;
        if !secret.matches(&self.public) {
            return Err(Error::WrongPassphrase);
        }
        Ok(secret)
    }
}

/// Strip and verify the trailing check value (SHA-1 or 16-bit sum)
fn split_checked(data: &[u8], sha1_check: bool) -> Option<Zeroizing<Vec<u8>>> {
    let check_len = if sha1_check { 20 } else { 2 };
    let split = data.len().checked_sub(check_len)?;
    let (secret, check) = data.split_at(split);
    let ok: bool = if sha1_check {
        sha1(secret)[..].ct_eq(check).into()
    } else {
        checksum16(secret)[..].ct_eq(check).into()
    };
    ok.then(|| Zeroizing::new(secret.to_vec()))
}

// ============================================================================
// UNLOCKED KEY
// ============================================================================

/// Lifecycle of private key material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// Secrets are protected and unreachable
    Locked,
    /// Secrets are recovered and usable
    Unlocked,
    /// Secrets have been zeroized
    Wiped,
}

/// One recovered secret and the key it belongs to
pub(crate) struct UnlockedSecret {
    pub(crate) public: PublicKeyPacket,
    pub(crate) secret: SecretParams,
}

/// Private key material with its secrets recovered
///
/// Secrets are zeroized by [`UnlockedKey::wipe`] or on drop, whichever
/// comes first. Nothing in the public API exposes them.
pub struct UnlockedKey {
    fingerprint: Fingerprint,
    secrets: Vec<UnlockedSecret>,
    state: KeyState,
}

impl UnlockedKey {
    pub(crate) fn new(fingerprint: Fingerprint, secrets: Vec<UnlockedSecret>) -> Self {
        Self {
            fingerprint,
            secrets,
            state: KeyState::Unlocked,
        }
    }

    /// Primary key fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Current lifecycle state
    pub fn state(&self) -> KeyState {
        self.state
    }

    /// Key IDs of the recovered secrets
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.secrets.iter().map(|s| s.public.key_id()).collect()
    }

    /// Zeroize every secret now
    pub fn wipe(&mut self) {
        if self.state != KeyState::Wiped {
            self.secrets.clear();
            self.state = KeyState::Wiped;
        }
    }

    /// Recovered secrets, unless wiped
    pub(crate) fn secrets(&self) -> Result<&[UnlockedSecret]> {
        match self.state {
            KeyState::Wiped => Err(Error::InvalidInput(
                "private key material has already been wiped".into(),
            )),
            _ => Ok(&self.secrets),
        }
    }

    /// Secret for the key with `fingerprint`
    #[cfg(test)]
    pub(crate) fn secret_for(&self, fingerprint: &Fingerprint) -> Option<&UnlockedSecret> {
        self.secrets
            .iter()
            .find(|s| s.public.fingerprint() == *fingerprint)
    }
}

impl Drop for UnlockedKey {
    fn drop(&mut self) {
        self.wipe();
    }
}

impl fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("fingerprint", &self.fingerprint)
            .field("state", &self.state)
            .field("secrets", &self.secrets.len())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{KdfLimits, KdfParams};
    use crate::crypto::ecc::EccCurve;
    use crate::crypto::HashAlgorithm;
    use crate::packet::Mpi;

    fn x25519_key() -> (PublicKeyPacket, SecretParams) {
        let (secret, public) = ecc::x25519_generate();
        let key = PublicKeyPacket::new(5, PublicParams::X25519 { public }).unwrap();
        (key, SecretParams::X25519(*secret))
    }

    fn ecdh_key() -> (PublicKeyPacket, SecretParams) {
        let (secret, point) = ecc::generate(EccCurve::Curve25519Legacy);
        let key = PublicKeyPacket::new(
            5,
            PublicParams::Ecdh {
                curve: EccCurve::Curve25519Legacy,
                point: Mpi::from_slice(&point),
                hash: HashAlgorithm::Sha256,
                cipher: SymmetricAlgorithm::Aes128,
            },
        )
        .unwrap();
        (key, SecretParams::Ecc(Mpi::from_slice(&secret)))
    }

    fn protect(tag: Tag, passphrase: &[u8]) -> (SecretKeyPacket, PublicKeyPacket) {
        let (public, secret) = ecdh_key();
        let s2k = S2k::new_argon2(&KdfParams::insecure_fast());
        let s2k_key = s2k.derive(passphrase, 32).unwrap();
        let packet = SecretKeyPacket::protect(tag, &public, &secret, Some((&s2k, &s2k_key))).unwrap();
        (SecretKeyPacket::from_packet(&packet).unwrap(), public)
    }

    #[test]
    fn test_aead_unlock_round_trip() {
        let (packet, public) = protect(Tag::SecretSubkey, b"correct-horse");
        assert_eq!(packet.protection(), ProtectionMode::Aead);
        assert!(packet.is_subkey());
        assert_eq!(packet.public(), &public);

        let secret = packet
            .unlock(b"correct-horse", false, &mut DerivedKeys::default())
            .unwrap();
        assert!(secret.matches(&public));
    }

    #[test]
    fn test_wrong_passphrase() {
        let (packet, _) = protect(Tag::SecretKey, b"correct-horse");
        assert!(matches!(
            packet.unlock(b"wrong", false, &mut DerivedKeys::default()),
            Err(Error::WrongPassphrase)
        ));
    }

    #[test]
    fn test_aead_bound_to_packet_type() {
        // Re-tagging a protected subkey as a primary key breaks the AAD
        let (public, secret) = x25519_key();
        let s2k = S2k::new_argon2(&KdfParams::insecure_fast());
        let s2k_key = s2k.derive(b"pw", 32).unwrap();
        let packet = SecretKeyPacket::protect(Tag::SecretSubkey, &public, &secret, Some((&s2k, &s2k_key))).unwrap();
        let retagged = Packet::new(Tag::SecretKey, packet.body().to_vec()).unwrap();
        let parsed = SecretKeyPacket::from_packet(&retagged).unwrap();
        assert!(matches!(
            parsed.unlock(b"pw", false, &mut DerivedKeys::default()),
            Err(Error::WrongPassphrase)
        ));
    }

    #[test]
    fn test_unprotected_requires_opt_in() {
        let (public, secret) = x25519_key();
        let packet = SecretKeyPacket::protect(Tag::SecretKey, &public, &secret, None).unwrap();
        let parsed = SecretKeyPacket::from_packet(&packet).unwrap();
        assert_eq!(parsed.protection(), ProtectionMode::Unprotected);

        assert!(matches!(
            parsed.unlock(b"", false, &mut DerivedKeys::default()),
            Err(Error::UnprotectedKey)
        ));
        assert!(parsed.unlock(b"", true, &mut DerivedKeys::default()).is_ok());
    }

    #[test]
    fn test_cfb_sha1_protection() {
        let (public, secret) = x25519_key();
        let s2k = S2k::Iterated {
            hash: HashAlgorithm::Sha256,
            salt: [3; 8],
            count: 0x60,
        };
        let key = s2k.derive(b"legacy", 32).unwrap();
        let iv = [9u8; 16];
        let mut plain = secret.encode().to_vec();
        let check = sha1(&plain);
        plain.extend_from_slice(&check);
        symmetric::cfb_encrypt(SymmetricAlgorithm::Aes256, &key, &iv, &mut plain).unwrap();

        let mut body = public.body().to_vec();
        body.extend_from_slice(&[USAGE_CFB_SHA1, 9]);
        s2k.write_to(&mut body);
        body.extend_from_slice(&iv);
        body.extend_from_slice(&plain);
        let parsed = SecretKeyPacket::from_packet(&Packet::new(Tag::SecretKey, body).unwrap()).unwrap();
        assert_eq!(parsed.protection(), ProtectionMode::CfbSha1);

        assert!(parsed.unlock(b"legacy", false, &mut DerivedKeys::default()).is_ok());
        assert!(matches!(
            parsed.unlock(b"wrong", false, &mut DerivedKeys::default()),
            Err(Error::WrongPassphrase)
        ));
    }

    #[test]
    fn test_gnu_dummy_is_unsupported() {
        let (public, _) = x25519_key();
        let mut body = public.body().to_vec();
        body.extend_from_slice(&[USAGE_CFB_SHA1, 9, 101, 2, b'G', b'N', b'U', 1]);
        let parsed = SecretKeyPacket::from_packet(&Packet::new(Tag::SecretKey, body).unwrap()).unwrap();
        assert_eq!(parsed.protection(), ProtectionMode::Unsupported);
        assert!(matches!(
            parsed.unlock(b"pw", false, &mut DerivedKeys::default()),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_mismatched_secret_is_wrong_passphrase() {
        let (public, _) = x25519_key();
        let (_, other_secret) = x25519_key();
        let packet = SecretKeyPacket::protect(Tag::SecretKey, &public, &other_secret, None).unwrap();
        let parsed = SecretKeyPacket::from_packet(&packet).unwrap();
        assert!(matches!(
            parsed.unlock(b"", true, &mut DerivedKeys::default()),
            Err(Error::WrongPassphrase)
        ));
    }

    #[test]
    fn test_derived_keys_are_cached() {
        let s2k = S2k::new_argon2(&KdfParams::insecure_fast());
        let mut keys = DerivedKeys::default();
        let first = keys.derive(&s2k, b"pw", 32).unwrap().to_vec();
        let second = keys.derive(&s2k, b"pw", 32).unwrap().to_vec();
        assert_eq!(first, second);
        assert_eq!(keys.entries.len(), 1);
    }

    #[test]
    fn test_hostile_argon2_refused_before_derivation() {
        let (public, secret) = x25519_key();
        let s2k = S2k::new_argon2(&KdfParams::insecure_fast());
        let s2k_key = s2k.derive(b"pw", 32).unwrap();
        let packet = SecretKeyPacket::protect(Tag::SecretKey, &public, &secret, Some((&s2k, &s2k_key))).unwrap();

        // usage, cipher, aead, type, salt[16], t, p, m
        let mut body = packet.body().to_vec();
        let m_offset = public.body().len() + 3 + 1 + 16 + 2;
        assert_eq!(body[m_offset], KdfParams::insecure_fast().memory_exponent);
        body[m_offset] = 30;
        let parsed = SecretKeyPacket::from_packet(&Packet::new(Tag::SecretKey, body).unwrap()).unwrap();

        let mut keys = DerivedKeys::new(KdfLimits::default());
        assert!(matches!(
            parsed.unlock(b"pw", false, &mut keys),
            Err(Error::InvalidKeyFormat(_))
        ));
        assert!(keys.entries.is_empty());
    }

    #[test]
    fn test_wipe_transitions_state() {
        let (public, secret) = x25519_key();
        let fingerprint = public.fingerprint();
        let mut key = UnlockedKey::new(fingerprint, vec![UnlockedSecret { public, secret }]);
        assert_eq!(key.state(), KeyState::Unlocked);
        assert_eq!(key.key_ids().len(), 1);
        assert!(key.secret_for(&fingerprint).is_some());

        key.wipe();
        assert_eq!(key.state(), KeyState::Wiped);
        assert!(key.secrets().is_err());
        assert!(key.key_ids().is_empty());
    }
}
