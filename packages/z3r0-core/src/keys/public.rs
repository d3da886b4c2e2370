//! Public-Key and Public-Subkey packets (version 4).

use std::fmt;

use crate::crypto::ecc::EccCurve;
use crate::crypto::hash::sha1;
use crate::crypto::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::packet::{BodyReader, Mpi, Packet, Tag};

/// Key packet version written and accepted
pub const KEY_VERSION: u8 = 4;

/// Length of a version 4 fingerprint
pub const FINGERPRINT_LEN: usize = 20;

// ============================================================================
// FINGERPRINT / KEY ID
// ============================================================================

/// v4 fingerprint: SHA-1 over `0x99 || len16 || public body`
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; FINGERPRINT_LEN]);

impl Fingerprint {
    /// Wrap raw fingerprint octets
    pub fn from_bytes(bytes: [u8; FINGERPRINT_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw octets
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_LEN] {
        &self.0
    }

    /// Low 8 octets
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[FINGERPRINT_LEN - 8..]);
        KeyId(id)
    }

    /// Upper-case hex, no separators
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

/// 8-octet key ID
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; 8]);

impl KeyId {
    /// The all-zero ID used for anonymous recipients
    pub const WILDCARD: KeyId = KeyId([0; 8]);

    /// Wrap raw key ID octets
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw octets
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// Whether this is the wildcard ID
    pub fn is_wildcard(&self) -> bool {
        *self == Self::WILDCARD
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(self.0))
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", self)
    }
}

// ============================================================================
// PUBLIC PARAMETERS
// ============================================================================

/// Algorithm-specific public key fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicParams {
    /// RSA modulus and exponent
    Rsa {
        /// Modulus
        n: Mpi,
        /// Public exponent
        e: Mpi,
    },
    /// ECDSA over a NIST curve
    Ecdsa {
        /// Curve
        curve: EccCurve,
        /// SEC1 uncompressed point
        point: Mpi,
    },
    /// EdDSA with the legacy OID encoding (Ed25519 only)
    EdDsaLegacy {
        /// Curve (always Ed25519Legacy)
        curve: EccCurve,
        /// 0x40-prefixed point
        point: Mpi,
    },
    /// ECDH with RFC 6637 KDF parameters
    Ecdh {
        /// Curve
        curve: EccCurve,
        /// Encoded point
        point: Mpi,
        /// KDF hash
        hash: HashAlgorithm,
        /// Key-wrap cipher
        cipher: SymmetricAlgorithm,
    },
    /// Native X25519
    X25519 {
        /// Public key
        public: [u8; 32],
    },
    /// Native Ed25519
    Ed25519 {
        /// Public key
        public: [u8; 32],
    },
    /// Algorithm or curve the codec does not implement
    Unknown {
        /// Algorithm octet
        algorithm: PublicKeyAlgorithm,
        /// Raw public fields
        raw: Vec<u8>,
    },
}

impl PublicParams {
    /// Algorithm octet for these fields
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        match self {
            PublicParams::Rsa { .. } => PublicKeyAlgorithm::Rsa,
            PublicParams::Ecdsa { .. } => PublicKeyAlgorithm::Ecdsa,
            PublicParams::EdDsaLegacy { .. } => PublicKeyAlgorithm::EdDsaLegacy,
            PublicParams::Ecdh { .. } => PublicKeyAlgorithm::Ecdh,
            PublicParams::X25519 { .. } => PublicKeyAlgorithm::X25519,
            PublicParams::Ed25519 { .. } => PublicKeyAlgorithm::Ed25519,
            PublicParams::Unknown { algorithm, .. } => *algorithm,
        }
    }

    /// Parse the fields for `algorithm`, returning them and the octets used
    ///
    /// Unknown curves keep their structure so the rest of the packet stays
    /// addressable; unknown algorithms swallow the remaining input.
    fn parse(tag: Tag, algorithm: PublicKeyAlgorithm, data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = BodyReader::new(tag, data);
        let params = match algorithm {
            PublicKeyAlgorithm::Rsa
            | PublicKeyAlgorithm::RsaEncryptOnly
            | PublicKeyAlgorithm::RsaSignOnly => {
                let n = reader.mpi()?;
                let e = reader.mpi()?;
                if algorithm == PublicKeyAlgorithm::Rsa {
                    Some(PublicParams::Rsa { n, e })
                } else {
                    None
                }
            }
            PublicKeyAlgorithm::Ecdsa | PublicKeyAlgorithm::EdDsaLegacy => {
                let curve = EccCurve::from_oid(reader.short_field()?);
                let point = reader.mpi()?;
                match (algorithm, curve) {
                    (PublicKeyAlgorithm::Ecdsa, Some(curve))
                        if curve.supports_signing() && curve != EccCurve::Ed25519Legacy =>
                    {
                        Some(PublicParams::Ecdsa { curve, point })
                    }
                    (PublicKeyAlgorithm::EdDsaLegacy, Some(EccCurve::Ed25519Legacy)) => {
                        Some(PublicParams::EdDsaLegacy {
                            curve: EccCurve::Ed25519Legacy,
                            point,
                        })
                    }
                    _ => None,
                }
            }
            PublicKeyAlgorithm::Ecdh => {
                let curve = EccCurve::from_oid(reader.short_field()?);
                let point = reader.mpi()?;
                let kdf = reader.short_field()?;
                match (curve, kdf) {
                    (Some(curve), [0x01, hash, cipher]) if curve.supports_ecdh() => {
                        Some(PublicParams::Ecdh {
                            curve,
                            point,
                            hash: HashAlgorithm::from(*hash),
                            cipher: SymmetricAlgorithm::from(*cipher),
                        })
                    }
                    _ => None,
                }
            }
            PublicKeyAlgorithm::X25519 => Some(PublicParams::X25519 {
                public: reader.array()?,
            }),
            PublicKeyAlgorithm::Ed25519 => Some(PublicParams::Ed25519 {
                public: reader.array()?,
            }),
            _ => {
                reader.rest();
                None
            }
        };
        let used = data.len() - reader.remaining();
        let params = params.unwrap_or_else(|| PublicParams::Unknown {
            algorithm,
            raw: data[..used].to_vec(),
        });
        Ok((params, used))
    }

    /// Append the wire encoding
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            PublicParams::Rsa { n, e } => {
                n.write_to(out);
                e.write_to(out);
            }
            PublicParams::Ecdsa { curve, point } | PublicParams::EdDsaLegacy { curve, point } => {
                write_oid(*curve, out);
                point.write_to(out);
            }
            PublicParams::Ecdh {
                curve,
                point,
                hash,
                cipher,
            } => {
                write_oid(*curve, out);
                point.write_to(out);
                out.extend_from_slice(&[0x03, 0x01, u8::from(*hash), u8::from(*cipher)]);
            }
            PublicParams::X25519 { public } | PublicParams::Ed25519 { public } => {
                out.extend_from_slice(public);
            }
            PublicParams::Unknown { raw, .. } => out.extend_from_slice(raw),
        }
    }
}

fn write_oid(curve: EccCurve, out: &mut Vec<u8>) {
    let oid = curve.oid();
    out.push(oid.len() as u8);
    out.extend_from_slice(oid);
}

// ============================================================================
// KEY PACKET
// ============================================================================

/// The public part of a primary key or subkey
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKeyPacket {
    created: u32,
    params: PublicParams,
    body: Vec<u8>,
    fingerprint: Fingerprint,
}

impl PublicKeyPacket {
    /// Build a v4 key from its fields
    pub fn new(created: u32, params: PublicParams) -> Result<Self> {
        let mut body = vec![KEY_VERSION];
        body.extend_from_slice(&created.to_be_bytes());
        body.push(u8::from(params.algorithm()));
        params.write_to(&mut body);
        Self::from_parts(created, params, body)
    }

    fn from_parts(created: u32, params: PublicParams, body: Vec<u8>) -> Result<Self> {
        let len = u16::try_from(body.len()).map_err(|_| {
            Error::InvalidKeyFormat(format!("public key body of {} octets is too large", body.len()))
        })?;
        let mut hashed = Vec::with_capacity(3 + body.len());
        hashed.push(0x99);
        hashed.extend_from_slice(&len.to_be_bytes());
        hashed.extend_from_slice(&body);
        let fingerprint = Fingerprint(sha1(&hashed));
        Ok(Self {
            created,
            params,
            body,
            fingerprint,
        })
    }

    /// Parse the public fields at the start of a key packet body
    ///
    /// Returns the key and the number of octets it occupies; secret key
    /// packets continue after that point.
    pub(crate) fn parse_prefix(tag: Tag, data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = BodyReader::new(tag, data);
        let version = reader.u8()?;
        if version != KEY_VERSION {
            return Err(Error::InvalidKeyFormat(format!(
                "key packet version {} is not supported",
                version
            )));
        }
        let created = reader.u32()?;
        let algorithm = PublicKeyAlgorithm::from(reader.u8()?);
        let header = data.len() - reader.remaining();
        let (params, used) = PublicParams::parse(tag, algorithm, &data[header..])?;
        let end = header + used;
        let key = Self::from_parts(created, params, data[..end].to_vec())?;
        Ok((key, end))
    }

    /// Parse a Public-Key or Public-Subkey packet
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let (key, used) = Self::parse_prefix(packet.tag(), packet.body())?;
        if used != packet.len() {
            return Err(Error::MalformedPacket(format!(
                "{} trailing octets after public key fields",
                packet.len() - used
            )));
        }
        Ok(key)
    }

    /// Serialize under `tag` (PublicKey or PublicSubkey)
    pub fn to_packet(&self, tag: Tag) -> Result<Packet> {
        Packet::new(tag, self.body.clone())
    }

    /// Creation time (seconds since the epoch)
    pub fn created(&self) -> u32 {
        self.created
    }

    /// Algorithm octet
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.params.algorithm()
    }

    /// Algorithm-specific fields
    pub fn params(&self) -> &PublicParams {
        &self.params
    }

    /// Serialized public body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// v4 fingerprint
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Key ID
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    /// Whether the codec implements this key's algorithm
    pub fn is_supported(&self) -> bool {
        !matches!(self.params, PublicParams::Unknown { .. })
    }

    /// Whether the algorithm can receive session keys
    pub fn can_encrypt(&self) -> bool {
        matches!(
            self.params,
            PublicParams::Rsa { .. } | PublicParams::Ecdh { .. } | PublicParams::X25519 { .. }
        )
    }

    /// Whether the algorithm can make signatures
    pub fn can_sign(&self) -> bool {
        matches!(
            self.params,
            PublicParams::Rsa { .. }
                | PublicParams::Ecdsa { .. }
                | PublicParams::EdDsaLegacy { .. }
                | PublicParams::Ed25519 { .. }
        )
    }

    /// Hash used for signatures this key makes
    pub(crate) fn signature_hash(&self) -> HashAlgorithm {
        match &self.params {
            PublicParams::Ecdsa { curve, .. } | PublicParams::EdDsaLegacy { curve, .. } => {
                curve.signature_hash()
            }
            _ => HashAlgorithm::Sha256,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ed25519_key() -> PublicKeyPacket {
        PublicKeyPacket::new(
            1_700_000_000,
            PublicParams::Ed25519 { public: [7; 32] },
        )
        .unwrap()
    }

    #[test]
    fn test_body_layout() {
        let key = ed25519_key();
        assert_eq!(key.body()[0], 4);
        assert_eq!(&key.body()[1..5], &1_700_000_000u32.to_be_bytes());
        assert_eq!(key.body()[5], 27);
        assert_eq!(key.body().len(), 6 + 32);
    }

    #[test]
    fn test_fingerprint_is_sha1_of_framed_body() {
        let key = ed25519_key();
        let mut framed = vec![0x99, 0, key.body().len() as u8];
        framed.extend_from_slice(key.body());
        assert_eq!(key.fingerprint().as_bytes(), &sha1(&framed));
        assert_eq!(key.key_id().as_bytes(), &key.fingerprint().as_bytes()[12..]);
        assert_eq!(key.fingerprint().to_hex().len(), 40);
    }

    #[test]
    fn test_packet_round_trip() {
        let key = PublicKeyPacket::new(
            42,
            PublicParams::Ecdh {
                curve: EccCurve::NistP256,
                point: Mpi::from_slice(&[4; 65]),
                hash: HashAlgorithm::Sha256,
                cipher: SymmetricAlgorithm::Aes128,
            },
        )
        .unwrap();
        let packet = key.to_packet(Tag::PublicSubkey).unwrap();
        let parsed = PublicKeyPacket::from_packet(&packet).unwrap();
        assert_eq!(parsed, key);
        assert!(parsed.can_encrypt());
        assert!(!parsed.can_sign());
    }

    #[test]
    fn test_unknown_curve_is_retained() {
        // ECDSA over brainpoolP256r1
        let mut body = vec![4, 0, 0, 0, 1, 19];
        let oid = [0x2B, 0x24, 0x03, 0x03, 0x02, 0x08, 0x01, 0x01, 0x07];
        body.push(oid.len() as u8);
        body.extend_from_slice(&oid);
        Mpi::from_slice(&[4, 1, 2]).write_to(&mut body);
        let packet = Packet::new(Tag::PublicKey, body.clone()).unwrap();

        let key = PublicKeyPacket::from_packet(&packet).unwrap();
        assert!(!key.is_supported());
        assert_eq!(key.algorithm(), PublicKeyAlgorithm::Ecdsa);
        assert_eq!(key.body(), body.as_slice());
    }

    #[test]
    fn test_unknown_algorithm_swallows_rest() {
        let body = vec![4, 0, 0, 0, 1, 17, 1, 2, 3, 4];
        let (key, used) = PublicKeyPacket::parse_prefix(Tag::PublicKey, &body).unwrap();
        assert_eq!(used, body.len());
        assert_eq!(key.algorithm(), PublicKeyAlgorithm::Dsa);
    }

    #[test]
    fn test_rejects_other_versions() {
        let body = vec![6, 0, 0, 0, 1, 27];
        assert!(matches!(
            PublicKeyPacket::parse_prefix(Tag::PublicKey, &body),
            Err(Error::InvalidKeyFormat(_))
        ));
    }

    #[test]
    fn test_truncated_fields() {
        let body = vec![4, 0, 0, 0, 1, 27, 1, 2];
        assert!(matches!(
            PublicKeyPacket::parse_prefix(Tag::PublicKey, &body),
            Err(Error::TruncatedPacket { .. })
        ));
    }

    #[test]
    fn test_wildcard_key_id() {
        assert!(KeyId::WILDCARD.is_wildcard());
        assert!(!ed25519_key().key_id().is_wildcard());
    }
}
