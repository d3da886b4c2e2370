//! Version 4 signature packets: the self-signatures that bind user IDs and
//! subkeys to a primary key.
//!
//! ```text
//! ┌────┬──────┬────┬──────┬──────────────┬────────────────┬────────┬────────┐
//! │ v4 │ type │ pk │ hash │ hashed subs  │ unhashed subs  │ left16 │ values │
//! └────┴──────┴────┴──────┴──────────────┴────────────────┴────────┴────────┘
//!
//!  digest = H( 0x99 || len16 || primary body
//!            [ 0xB4 || len32 || user id ]        certifications
//!            [ 0x99 || len16 || subkey body ]    subkey bindings
//!              v4 .. hashed subs || 0x04 0xFF || len32 )
//! ```

use crate::crypto::hash::Hasher;
use crate::crypto::{ecc, rsa, HashAlgorithm, PublicKeyAlgorithm};
use crate::error::{Error, Result};
use crate::packet::{BodyReader, Mpi, Packet, Tag};

use super::public::{Fingerprint, KeyId, PublicKeyPacket, PublicParams, FINGERPRINT_LEN, KEY_VERSION};
use super::secret::SecretParams;

/// Signature packet version written and verified
pub const SIGNATURE_VERSION: u8 = 4;

wire_enum! {
    /// Signature type
    pub enum SignatureType {
        /// Signature over a binary document
        Binary = 0x00,
        /// Signature over a canonical text document
        Text = 0x01,
        /// Generic certification of a user ID
        GenericCertification = 0x10,
        /// Persona certification
        PersonaCertification = 0x11,
        /// Casual certification
        CasualCertification = 0x12,
        /// Positive certification
        PositiveCertification = 0x13,
        /// Subkey binding
        SubkeyBinding = 0x18,
        /// Primary key binding (back-signature)
        PrimaryKeyBinding = 0x19,
        /// Direct key signature
        DirectKey = 0x1F,
        /// Key revocation
        KeyRevocation = 0x20,
        /// Subkey revocation
        SubkeyRevocation = 0x28,
        /// Certification revocation
        CertificationRevocation = 0x30,
    }
}

impl SignatureType {
    /// Whether this is one of the four user ID certification types
    pub fn is_certification(self) -> bool {
        matches!(
            self,
            SignatureType::GenericCertification
                | SignatureType::PersonaCertification
                | SignatureType::CasualCertification
                | SignatureType::PositiveCertification
        )
    }
}

wire_enum! {
    /// Signature subpacket type (critical bit masked off)
    pub enum SubpacketType {
        /// Signature creation time
        CreationTime = 2,
        /// Key expiration time
        KeyExpiration = 9,
        /// Preferred symmetric algorithms
        PreferredSymmetric = 11,
        /// Issuer key ID
        Issuer = 16,
        /// Preferred hash algorithms
        PreferredHash = 21,
        /// Preferred compression algorithms
        PreferredCompression = 22,
        /// Primary user ID flag
        PrimaryUserId = 25,
        /// Key flags
        KeyFlags = 27,
        /// Features
        Features = 30,
        /// Issuer fingerprint
        IssuerFingerprint = 33,
        /// Preferred AEAD ciphersuites
        PreferredAead = 39,
    }
}

/// Key usage flags from the key flags subpacket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(u8);

impl KeyFlags {
    /// May certify other keys
    pub const CERTIFY: KeyFlags = KeyFlags(0x01);
    /// May sign data
    pub const SIGN: KeyFlags = KeyFlags(0x02);
    /// May encrypt communications
    pub const ENCRYPT_COMMUNICATIONS: KeyFlags = KeyFlags(0x04);
    /// May encrypt storage
    pub const ENCRYPT_STORAGE: KeyFlags = KeyFlags(0x08);

    /// Raw flag octet
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether every flag in `other` is set
    pub fn contains(self, other: KeyFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether either encryption flag is set
    pub fn can_encrypt(self) -> bool {
        self.0 & (Self::ENCRYPT_COMMUNICATIONS.0 | Self::ENCRYPT_STORAGE.0) != 0
    }
}

impl std::ops::BitOr for KeyFlags {
    type Output = KeyFlags;

    fn bitor(self, rhs: KeyFlags) -> KeyFlags {
        KeyFlags(self.0 | rhs.0)
    }
}

/// One signature subpacket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subpacket {
    /// Critical bit
    pub critical: bool,
    /// Subpacket type
    pub kind: SubpacketType,
    /// Subpacket body
    pub data: Vec<u8>,
}

impl Subpacket {
    /// Non-critical subpacket
    pub fn new(kind: SubpacketType, data: Vec<u8>) -> Self {
        Self {
            critical: false,
            kind,
            data,
        }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        let len = self.data.len() + 1;
        if len < 192 {
            out.push(len as u8);
        } else if len < 8384 {
            let len = len - 192;
            out.push(((len >> 8) as u8) + 192);
            out.push(len as u8);
        } else {
            out.push(0xFF);
            out.extend_from_slice(&(len as u32).to_be_bytes());
        }
        let kind = u8::from(self.kind);
        out.push(if self.critical { kind | 0x80 } else { kind });
        out.extend_from_slice(&self.data);
    }
}

fn parse_subpackets(area: &[u8]) -> Result<Vec<Subpacket>> {
    let mut reader = BodyReader::new(Tag::Signature, area);
    let mut subpackets = Vec::new();
    while !reader.is_empty() {
        let first = reader.u8()?;
        let len = match first {
            0..=191 => usize::from(first),
            192..=254 => ((usize::from(first) - 192) << 8) + usize::from(reader.u8()?) + 192,
            255 => reader.u32()? as usize,
        };
        if len == 0 {
            return Err(Error::MalformedPacket("empty signature subpacket".into()));
        }
        let body = reader.take(len)?;
        subpackets.push(Subpacket {
            critical: body[0] & 0x80 != 0,
            kind: SubpacketType::from(body[0] & 0x7F),
            data: body[1..].to_vec(),
        });
    }
    Ok(subpackets)
}

fn write_subpackets(subpackets: &[Subpacket]) -> Vec<u8> {
    let mut out = Vec::new();
    for subpacket in subpackets {
        subpacket.write_to(&mut out);
    }
    out
}

// ============================================================================
// SIGNED DATA
// ============================================================================

/// What a signature is computed over
#[derive(Debug, Clone, Copy)]
pub(crate) enum SignedData<'a> {
    /// Primary key plus user ID (certifications)
    UserId {
        primary: &'a PublicKeyPacket,
        user_id: &'a [u8],
    },
    /// Primary key plus subkey (bindings and subkey revocations)
    Subkey {
        primary: &'a PublicKeyPacket,
        subkey: &'a PublicKeyPacket,
    },
    /// Primary key alone (direct-key signatures and key revocations)
    Key { primary: &'a PublicKeyPacket },
}

fn hash_key(hasher: &mut Hasher, key: &PublicKeyPacket) {
    hasher.update(&[0x99]);
    hasher.update(&(key.body().len() as u16).to_be_bytes());
    hasher.update(key.body());
}

impl SignedData<'_> {
    fn hash_into(&self, hasher: &mut Hasher) {
        match self {
            SignedData::UserId { primary, user_id } => {
                hash_key(hasher, primary);
                hasher.update(&[0xB4]);
                hasher.update(&(user_id.len() as u32).to_be_bytes());
                hasher.update(user_id);
            }
            SignedData::Subkey { primary, subkey } => {
                hash_key(hasher, primary);
                hash_key(hasher, subkey);
            }
            SignedData::Key { primary } => hash_key(hasher, primary),
        }
    }
}

// ============================================================================
// SIGNATURE
// ============================================================================

/// Algorithm-specific signature values
#[derive(Debug, Clone, PartialEq, Eq)]
enum SignatureValue {
    Rsa(Mpi),
    Ecc { r: Mpi, s: Mpi },
    Ed25519([u8; 64]),
}

/// A parsed v4 signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    sig_type: SignatureType,
    pk_algorithm: PublicKeyAlgorithm,
    hash_algorithm: HashAlgorithm,
    hashed_area: Vec<u8>,
    hashed: Vec<Subpacket>,
    unhashed: Vec<Subpacket>,
    digest_prefix: [u8; 2],
    value: SignatureValue,
}

impl Signature {
    /// Parse a Signature packet
    ///
    /// Versions other than 4 and unknown public-key algorithms are
    /// `UnknownAlgorithm`; callers skip such signatures.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let mut reader = packet.reader();
        let version = reader.u8()?;
        if version != SIGNATURE_VERSION {
            return Err(Error::UnknownAlgorithm(format!(
                "version {} signature",
                version
            )));
        }
        let sig_type = SignatureType::from(reader.u8()?);
        let pk_algorithm = PublicKeyAlgorithm::from(reader.u8()?);
        let hash_algorithm = HashAlgorithm::from(reader.u8()?);
        let hashed_len = usize::from(reader.u16()?);
        let hashed_area = reader.take(hashed_len)?.to_vec();
        let unhashed_len = usize::from(reader.u16()?);
        let unhashed_area = reader.take(unhashed_len)?;
        let digest_prefix = reader.array::<2>()?;

        let value = match pk_algorithm {
            PublicKeyAlgorithm::Rsa | PublicKeyAlgorithm::RsaSignOnly => {
                SignatureValue::Rsa(reader.mpi()?)
            }
            PublicKeyAlgorithm::Ecdsa | PublicKeyAlgorithm::EdDsaLegacy => SignatureValue::Ecc {
                r: reader.mpi()?,
                s: reader.mpi()?,
            },
            PublicKeyAlgorithm::Ed25519 => SignatureValue::Ed25519(reader.array()?),
            other => {
                return Err(Error::UnknownAlgorithm(format!(
                    "signature algorithm {:?}",
                    other
                )))
            }
        };
        reader.finish()?;

        Ok(Self {
            sig_type,
            pk_algorithm,
            hash_algorithm,
            hashed: parse_subpackets(&hashed_area)?,
            unhashed: parse_subpackets(unhashed_area)?,
            hashed_area,
            digest_prefix,
            value,
        })
    }

    /// Serialize as a Signature packet
    pub fn to_packet(&self) -> Result<Packet> {
        let mut body = self.trailer();
        let unhashed = write_subpackets(&self.unhashed);
        body.extend_from_slice(&(unhashed.len() as u16).to_be_bytes());
        body.extend_from_slice(&unhashed);
        body.extend_from_slice(&self.digest_prefix);
        match &self.value {
            SignatureValue::Rsa(s) => s.write_to(&mut body),
            SignatureValue::Ecc { r, s } => {
                r.write_to(&mut body);
                s.write_to(&mut body);
            }
            SignatureValue::Ed25519(sig) => body.extend_from_slice(sig),
        }
        Packet::new(Tag::Signature, body)
    }

    /// Signature type
    pub fn sig_type(&self) -> SignatureType {
        self.sig_type
    }

    /// Hash algorithm
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.hash_algorithm
    }

    /// Hashed subpackets
    pub fn hashed_subpackets(&self) -> &[Subpacket] {
        &self.hashed
    }

    fn hashed_data(&self, kind: SubpacketType) -> Option<&[u8]> {
        self.hashed
            .iter()
            .find(|sp| sp.kind == kind)
            .map(|sp| sp.data.as_slice())
    }

    /// Signature creation time
    pub fn created(&self) -> Option<u32> {
        let data: [u8; 4] = self.hashed_data(SubpacketType::CreationTime)?.try_into().ok()?;
        Some(u32::from_be_bytes(data))
    }

    /// Key validity period in seconds after key creation (0 = never expires)
    pub fn key_expiration(&self) -> Option<u32> {
        let data: [u8; 4] = self.hashed_data(SubpacketType::KeyExpiration)?.try_into().ok()?;
        Some(u32::from_be_bytes(data))
    }

    /// Key flags, if the subpacket is present
    pub fn key_flags(&self) -> Option<KeyFlags> {
        self.hashed_data(SubpacketType::KeyFlags)
            .and_then(|data| data.first())
            .map(|bits| KeyFlags(*bits))
    }

    /// Issuer fingerprint (hashed or unhashed)
    pub fn issuer_fingerprint(&self) -> Option<Fingerprint> {
        self.hashed
            .iter()
            .chain(&self.unhashed)
            .filter(|sp| sp.kind == SubpacketType::IssuerFingerprint)
            .find_map(|sp| match sp.data.split_first() {
                Some((&KEY_VERSION, rest)) => {
                    let bytes: [u8; FINGERPRINT_LEN] = rest.try_into().ok()?;
                    Some(Fingerprint::from_bytes(bytes))
                }
                _ => None,
            })
    }

    /// Issuer key ID (hashed or unhashed)
    pub fn issuer_key_id(&self) -> Option<KeyId> {
        self.hashed
            .iter()
            .chain(&self.unhashed)
            .filter(|sp| sp.kind == SubpacketType::Issuer)
            .find_map(|sp| sp.data.as_slice().try_into().ok().map(KeyId::from_bytes))
            .or_else(|| self.issuer_fingerprint().map(|fpr| fpr.key_id()))
    }

    /// Whether the issuer subpackets (if any) name `key`
    pub fn may_be_issued_by(&self, key: &PublicKeyPacket) -> bool {
        if let Some(fpr) = self.issuer_fingerprint() {
            return fpr == key.fingerprint();
        }
        match self.issuer_key_id() {
            Some(id) => id == key.key_id(),
            None => true,
        }
    }

    /// `v4 || type || pk || hash || len16 || hashed subpackets`
    fn trailer(&self) -> Vec<u8> {
        let mut trailer = vec![
            SIGNATURE_VERSION,
            u8::from(self.sig_type),
            u8::from(self.pk_algorithm),
            u8::from(self.hash_algorithm),
        ];
        trailer.extend_from_slice(&(self.hashed_area.len() as u16).to_be_bytes());
        trailer.extend_from_slice(&self.hashed_area);
        trailer
    }

    fn digest(&self, target: &SignedData<'_>) -> Result<Vec<u8>> {
        let mut hasher = Hasher::new(self.hash_algorithm)?;
        target.hash_into(&mut hasher);
        let trailer = self.trailer();
        hasher.update(&trailer);
        hasher.update(&[SIGNATURE_VERSION, 0xFF]);
        hasher.update(&(trailer.len() as u32).to_be_bytes());
        Ok(hasher.finalize())
    }

    /// Verify against `signer`
    ///
    /// A mismatch is `BadSelfSignature`; an unimplemented hash is
    /// `UnknownAlgorithm`.
    pub(crate) fn verify(&self, signer: &PublicKeyPacket, target: &SignedData<'_>) -> Result<()> {
        if self.pk_algorithm != signer.algorithm() {
            return Err(Error::BadSelfSignature(format!(
                "signature algorithm {:?} does not match key algorithm {:?}",
                self.pk_algorithm,
                signer.algorithm()
            )));
        }
        let digest = self.digest(target)?;
        if digest[..2] != self.digest_prefix {
            return Err(Error::BadSelfSignature("digest prefix mismatch".into()));
        }

        match (signer.params(), &self.value) {
            (PublicParams::Rsa { n, e }, SignatureValue::Rsa(s)) => {
                rsa::verify(n, e, self.hash_algorithm, &digest, s)
            }
            (PublicParams::Ecdsa { curve, point }, SignatureValue::Ecc { r, s })
            | (PublicParams::EdDsaLegacy { curve, point }, SignatureValue::Ecc { r, s }) => {
                ecc::verify(*curve, point.as_bytes(), &digest, r.as_bytes(), s.as_bytes())
            }
            (PublicParams::Ed25519 { public }, SignatureValue::Ed25519(sig)) => {
                ecc::ed25519_verify(public, &digest, sig)
            }
            _ => Err(Error::UnknownAlgorithm(format!(
                "signature verification with {:?}",
                signer.algorithm()
            ))),
        }
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Assembles and signs a new v4 signature
pub(crate) struct SignatureBuilder {
    sig_type: SignatureType,
    hash_algorithm: HashAlgorithm,
    hashed: Vec<Subpacket>,
}

impl SignatureBuilder {
    /// Start a signature of `sig_type` made at `created`
    pub(crate) fn new(sig_type: SignatureType, hash_algorithm: HashAlgorithm, created: u32) -> Self {
        Self {
            sig_type,
            hash_algorithm,
            hashed: vec![Subpacket::new(
                SubpacketType::CreationTime,
                created.to_be_bytes().to_vec(),
            )],
        }
    }

    /// Add a hashed subpacket
    pub(crate) fn subpacket(mut self, kind: SubpacketType, data: Vec<u8>) -> Self {
        self.hashed.push(Subpacket::new(kind, data));
        self
    }

    /// Add the key flags subpacket
    pub(crate) fn key_flags(self, flags: KeyFlags) -> Self {
        self.subpacket(SubpacketType::KeyFlags, vec![flags.bits()])
    }

    /// Sign with `signer`'s secret and attach issuer subpackets
    pub(crate) fn sign(
        mut self,
        signer: &PublicKeyPacket,
        secret: &SecretParams,
        target: &SignedData<'_>,
    ) -> Result<Signature> {
        let mut issuer = vec![KEY_VERSION];
        issuer.extend_from_slice(signer.fingerprint().as_bytes());
        self.hashed
            .push(Subpacket::new(SubpacketType::IssuerFingerprint, issuer));

        let hashed_area = write_subpackets(&self.hashed);
        let mut signature = Signature {
            sig_type: self.sig_type,
            pk_algorithm: signer.algorithm(),
            hash_algorithm: self.hash_algorithm,
            hashed_area,
            hashed: self.hashed,
            unhashed: vec![Subpacket::new(
                SubpacketType::Issuer,
                signer.key_id().as_bytes().to_vec(),
            )],
            digest_prefix: [0; 2],
            value: SignatureValue::Ed25519([0; 64]),
        };

        let digest = signature.digest(target)?;
        signature.digest_prefix = [digest[0], digest[1]];
        signature.value = match (signer.params(), secret) {
            (PublicParams::Rsa { n, e }, SecretParams::Rsa(parts)) => {
                let key = rsa::private_key(n, e, parts)?;
                SignatureValue::Rsa(rsa::sign(&key, self.hash_algorithm, &digest)?)
            }
            (PublicParams::Ecdsa { curve, .. }, SecretParams::Ecc(scalar))
            | (PublicParams::EdDsaLegacy { curve, .. }, SecretParams::Ecc(scalar)) => {
                let (r, s) = ecc::sign(*curve, scalar.as_bytes(), &digest)?;
                SignatureValue::Ecc {
                    r: Mpi::from_slice(&r),
                    s: Mpi::from_slice(&s),
                }
            }
            (PublicParams::Ed25519 { .. }, SecretParams::Ed25519(seed)) => {
                SignatureValue::Ed25519(ecc::ed25519_sign(seed, &digest))
            }
            _ => {
                return Err(Error::UnknownAlgorithm(format!(
                    "signing with {:?}",
                    signer.algorithm()
                )))
            }
        };
        Ok(signature)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::ecc::EccCurve;

    fn ed25519_signer() -> (PublicKeyPacket, SecretParams) {
        let (seed, public) = ecc::ed25519_generate();
        let key = PublicKeyPacket::new(1_700_000_000, PublicParams::Ed25519 { public }).unwrap();
        (key, SecretParams::Ed25519(*seed))
    }

    fn legacy_signer(curve: EccCurve) -> (PublicKeyPacket, SecretParams) {
        let (secret, point) = ecc::generate(curve);
        let params = if curve == EccCurve::Ed25519Legacy {
            PublicParams::EdDsaLegacy {
                curve,
                point: Mpi::from_slice(&point),
            }
        } else {
            PublicParams::Ecdsa {
                curve,
                point: Mpi::from_slice(&point),
            }
        };
        let key = PublicKeyPacket::new(1_700_000_000, params).unwrap();
        (key, SecretParams::Ecc(Mpi::from_slice(&secret)))
    }

    #[test]
    fn test_certification_round_trip() {
        let (key, secret) = ed25519_signer();
        let target = SignedData::UserId {
            primary: &key,
            user_id: b"<a@example.com>",
        };
        let sig = SignatureBuilder::new(SignatureType::PositiveCertification, HashAlgorithm::Sha256, 10)
            .key_flags(KeyFlags::CERTIFY | KeyFlags::SIGN)
            .sign(&key, &secret, &target)
            .unwrap();

        let parsed = Signature::from_packet(&sig.to_packet().unwrap()).unwrap();
        assert_eq!(parsed, sig);
        assert_eq!(parsed.created(), Some(10));
        assert_eq!(parsed.key_flags(), Some(KeyFlags(0x03)));
        assert_eq!(parsed.issuer_fingerprint(), Some(key.fingerprint()));
        assert_eq!(parsed.issuer_key_id(), Some(key.key_id()));
        assert!(parsed.may_be_issued_by(&key));
        parsed.verify(&key, &target).unwrap();
    }

    #[test]
    fn test_wrong_user_id_fails() {
        let (key, secret) = ed25519_signer();
        let sig = SignatureBuilder::new(SignatureType::PositiveCertification, HashAlgorithm::Sha256, 10)
            .sign(
                &key,
                &secret,
                &SignedData::UserId {
                    primary: &key,
                    user_id: b"<a@example.com>",
                },
            )
            .unwrap();
        let other = SignedData::UserId {
            primary: &key,
            user_id: b"<b@example.com>",
        };
        assert!(matches!(
            sig.verify(&key, &other),
            Err(Error::BadSelfSignature(_))
        ));
    }

    #[test]
    fn test_ecc_signers() {
        for curve in [
            EccCurve::Ed25519Legacy,
            EccCurve::NistP256,
            EccCurve::NistP384,
            EccCurve::NistP521,
        ] {
            let (key, secret) = legacy_signer(curve);
            let target = SignedData::Key { primary: &key };
            let sig = SignatureBuilder::new(SignatureType::DirectKey, curve.signature_hash(), 1)
                .sign(&key, &secret, &target)
                .unwrap();
            let parsed = Signature::from_packet(&sig.to_packet().unwrap()).unwrap();
            parsed.verify(&key, &target).unwrap();
        }
    }

    #[test]
    fn test_subkey_binding_covers_subkey() {
        let (primary, secret) = ed25519_signer();
        let (sub_a, _) = ed25519_signer();
        let (sub_b, _) = ed25519_signer();
        let sig = SignatureBuilder::new(SignatureType::SubkeyBinding, HashAlgorithm::Sha256, 1)
            .sign(
                &primary,
                &secret,
                &SignedData::Subkey {
                    primary: &primary,
                    subkey: &sub_a,
                },
            )
            .unwrap();
        assert!(sig
            .verify(
                &primary,
                &SignedData::Subkey {
                    primary: &primary,
                    subkey: &sub_b,
                },
            )
            .is_err());
    }

    #[test]
    fn test_subpacket_lengths() {
        let long = Subpacket::new(SubpacketType::from(100), vec![0xAB; 300]);
        let short = Subpacket {
            critical: true,
            kind: SubpacketType::KeyFlags,
            data: vec![1],
        };
        let area = write_subpackets(&[short.clone(), long.clone()]);
        assert_eq!(area[0], 2);
        assert_eq!(area[1], 27 | 0x80);
        assert_eq!(parse_subpackets(&area).unwrap(), vec![short, long]);
    }

    #[test]
    fn test_rejects_v3_signature() {
        let packet = Packet::new(Tag::Signature, vec![3, 5, 0x13, 0, 0, 0, 0]).unwrap();
        assert!(matches!(
            Signature::from_packet(&packet),
            Err(Error::UnknownAlgorithm(_))
        ));
    }
}
