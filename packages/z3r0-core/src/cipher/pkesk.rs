//! Public-Key Encrypted Session Key packets (versions 3 and 6).
//!
//! ```text
//!  v3: 03 | key id (8)                    | algo | fields
//!  v6: 06 | len | key version | fingerprint | algo | fields      (len 0 = anonymous)
//!
//!  fields  RSA     MPI(OAEP(payload))
//!          ECDH    MPI(ephemeral point) | len | AESKW(kek, pkcs5(payload))
//!          X25519  ephemeral (32) | len | [v3: cipher] | AESKW(kek, session key)
//!
//!  payload v3: cipher | session key | sum16       v6: session key | sum16
//! ```

use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::crypto::{ecc, kdf, keywrap, rsa, PublicKeyAlgorithm, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::keys::{Fingerprint, KeyId, PublicKeyPacket, PublicParams, SecretParams};
use crate::packet::{Mpi, Packet, Tag};

/// PKESK version paired with SEIPD v1
pub const PKESK_V3: u8 = 3;

/// PKESK version paired with SEIPD v2
pub const PKESK_V6: u8 = 6;

/// Cipher used to wrap X25519 session keys
const X25519_WRAP_CIPHER: SymmetricAlgorithm = SymmetricAlgorithm::Aes128;

/// Who a session-key packet is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// v3 key ID (all zeros = wildcard)
    KeyId(KeyId),
    /// v6 addressing by v4 fingerprint
    Fingerprint(Fingerprint),
    /// v6 anonymous recipient
    Anonymous,
}

impl Recipient {
    /// Whether the recipient is hidden
    pub fn is_wildcard(&self) -> bool {
        match self {
            Recipient::KeyId(id) => id.is_wildcard(),
            Recipient::Fingerprint(_) => false,
            Recipient::Anonymous => true,
        }
    }

    /// Whether `key` may be the recipient
    pub fn matches(&self, key: &PublicKeyPacket) -> bool {
        match self {
            Recipient::KeyId(id) => id.is_wildcard() || *id == key.key_id(),
            Recipient::Fingerprint(fingerprint) => *fingerprint == key.fingerprint(),
            Recipient::Anonymous => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EncryptedKey {
    Rsa(Mpi),
    Ecdh {
        ephemeral: Mpi,
        wrapped: Vec<u8>,
    },
    X25519 {
        ephemeral: [u8; 32],
        cipher: Option<SymmetricAlgorithm>,
        wrapped: Vec<u8>,
    },
}

/// A recovered session key
pub(crate) struct SessionKey {
    /// Cipher, when the PKESK carries it (v3)
    pub(crate) cipher: Option<SymmetricAlgorithm>,
    pub(crate) key: Zeroizing<Vec<u8>>,
}

/// A parsed session-key packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkesk {
    version: u8,
    recipient: Recipient,
    algorithm: PublicKeyAlgorithm,
    key: EncryptedKey,
}

fn checksum16(key: &[u8]) -> [u8; 2] {
    key.iter()
        .fold(0u16, |acc, byte| acc.wrapping_add(u16::from(*byte)))
        .to_be_bytes()
}

/// PKCS#5 padding to a multiple of 8 (1..=8 octets of value n)
fn pkcs5_pad(data: &[u8]) -> Zeroizing<Vec<u8>> {
    let n = 8 - data.len() % 8;
    let mut out = Zeroizing::new(Vec::with_capacity(data.len() + n));
    out.extend_from_slice(data);
    out.resize(data.len() + n, n as u8);
    out
}

fn pkcs5_unpad(data: &[u8]) -> Result<&[u8]> {
    let n = usize::from(*data.last().unwrap_or(&0));
    if n == 0 || n > 8 || n > data.len() || data[data.len() - n..].iter().any(|b| usize::from(*b) != n) {
        return Err(Error::IntegrityCheckFailed("invalid session key padding".into()));
    }
    Ok(&data[..data.len() - n])
}

impl Pkesk {
    /// Parse a PKESK packet
    ///
    /// Unsupported versions and algorithms are `UnknownAlgorithm`.
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        let mut reader = packet.reader();
        let version = reader.u8()?;
        let recipient = match version {
            PKESK_V3 => Recipient::KeyId(KeyId::from_bytes(reader.array()?)),
            PKESK_V6 => {
                let addressing = reader.short_field()?;
                match addressing.split_first() {
                    None => Recipient::Anonymous,
                    Some((4, fingerprint)) => {
                        let bytes = fingerprint.try_into().map_err(|_| {
                            Error::MalformedPacket("v4 fingerprint must be 20 octets".into())
                        })?;
                        Recipient::Fingerprint(Fingerprint::from_bytes(bytes))
                    }
                    Some((key_version, _)) => {
                        return Err(Error::UnknownAlgorithm(format!(
                            "session key for a version {} key",
                            key_version
                        )))
                    }
                }
            }
            other => {
                return Err(Error::UnknownAlgorithm(format!(
                    "version {} session key packet",
                    other
                )))
            }
        };
        let algorithm = PublicKeyAlgorithm::from(reader.u8()?);
        let key = match algorithm {
            PublicKeyAlgorithm::Rsa | PublicKeyAlgorithm::RsaEncryptOnly => {
                EncryptedKey::Rsa(reader.mpi()?)
            }
            PublicKeyAlgorithm::Ecdh => EncryptedKey::Ecdh {
                ephemeral: reader.mpi()?,
                wrapped: reader.short_field()?.to_vec(),
            },
            PublicKeyAlgorithm::X25519 => {
                let ephemeral = reader.array()?;
                let field = reader.short_field()?;
                let (cipher, wrapped) = match (version, field.split_first()) {
                    (PKESK_V3, Some((cipher, wrapped))) => {
                        (Some(SymmetricAlgorithm::from(*cipher)), wrapped)
                    }
                    (PKESK_V3, None) => {
                        return Err(Error::MalformedPacket(
                            "X25519 session key is missing its cipher octet".into(),
                        ))
                    }
                    _ => (None, field),
                };
                EncryptedKey::X25519 {
                    ephemeral,
                    cipher,
                    wrapped: wrapped.to_vec(),
                }
            }
            other => {
                return Err(Error::UnknownAlgorithm(format!(
                    "session key algorithm {:?}",
                    other
                )))
            }
        };
        reader.finish()?;
        Ok(Self {
            version,
            recipient,
            algorithm,
            key,
        })
    }

    /// Serialize as a PKESK packet
    pub fn to_packet(&self) -> Result<Packet> {
        let mut body = vec![self.version];
        match self.recipient {
            Recipient::KeyId(id) => body.extend_from_slice(id.as_bytes()),
            Recipient::Fingerprint(fingerprint) => {
                body.push(1 + fingerprint.as_bytes().len() as u8);
                body.push(4);
                body.extend_from_slice(fingerprint.as_bytes());
            }
            Recipient::Anonymous => body.push(0),
        }
        body.push(u8::from(self.algorithm));
        match &self.key {
            EncryptedKey::Rsa(m) => m.write_to(&mut body),
            EncryptedKey::Ecdh { ephemeral, wrapped } => {
                ephemeral.write_to(&mut body);
                push_short_field(&mut body, wrapped)?;
            }
            EncryptedKey::X25519 {
                ephemeral,
                cipher,
                wrapped,
            } => {
                body.extend_from_slice(ephemeral);
                let mut field = Vec::with_capacity(1 + wrapped.len());
                if let Some(cipher) = cipher {
                    field.push(u8::from(*cipher));
                }
                field.extend_from_slice(wrapped);
                push_short_field(&mut body, &field)?;
            }
        }
        Packet::new(Tag::PublicKeyEncryptedSessionKey, body)
    }

    /// Packet version (3 or 6)
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Addressed recipient
    pub fn recipient(&self) -> Recipient {
        self.recipient
    }

    /// Public-key algorithm
    pub fn algorithm(&self) -> PublicKeyAlgorithm {
        self.algorithm
    }

    /// Whether the wrapped key has the shape `key` can open
    pub(crate) fn fits(&self, key: &PublicKeyPacket) -> bool {
        matches!(
            (&self.key, key.params()),
            (EncryptedKey::Rsa(_), PublicParams::Rsa { .. })
                | (EncryptedKey::Ecdh { .. }, PublicParams::Ecdh { .. })
                | (EncryptedKey::X25519 { .. }, PublicParams::X25519 { .. })
        )
    }

    /// v6 packet wrapping `session_key` for `recipient`
    pub(crate) fn encrypt_v6(recipient: &PublicKeyPacket, session_key: &[u8]) -> Result<Self> {
        Self::encrypt(PKESK_V6, recipient, None, session_key)
    }

    /// v3 packet, as written by older implementations alongside SEIPD v1
    #[cfg(test)]
    pub(crate) fn encrypt_v3(
        recipient: &PublicKeyPacket,
        cipher: SymmetricAlgorithm,
        session_key: &[u8],
    ) -> Result<Self> {
        Self::encrypt(PKESK_V3, recipient, Some(cipher), session_key)
    }

    fn encrypt(
        version: u8,
        recipient: &PublicKeyPacket,
        cipher: Option<SymmetricAlgorithm>,
        session_key: &[u8],
    ) -> Result<Self> {
        let mut payload = Zeroizing::new(Vec::with_capacity(session_key.len() + 3));
        if let Some(cipher) = cipher {
            payload.push(u8::from(cipher));
        }
        payload.extend_from_slice(session_key);
        payload.extend_from_slice(&checksum16(session_key));

        let key = match recipient.params() {
            PublicParams::Rsa { n, e } => EncryptedKey::Rsa(rsa::encrypt(n, e, &payload)?),
            PublicParams::Ecdh {
                curve,
                point,
                hash,
                cipher: wrap_cipher,
            } => {
                let (ephemeral, shared) = ecc::ecdh_ephemeral(*curve, point.as_bytes())?;
                let param = kdf::ecdh_param(*curve, *hash, *wrap_cipher, recipient.fingerprint().as_bytes());
                let kek = kdf::ecdh_kek(*hash, &shared, &param, wrap_cipher.key_size()?)?;
                EncryptedKey::Ecdh {
                    ephemeral: Mpi::from_slice(&ephemeral),
                    wrapped: keywrap::wrap(*wrap_cipher, &kek, &pkcs5_pad(&payload))?,
                }
            }
            PublicParams::X25519 { public } => {
                let (ephemeral, shared) = ecc::x25519_ephemeral(public)?;
                let kek = kdf::x25519_kek(&ephemeral, public, &shared)?;
                EncryptedKey::X25519 {
                    ephemeral,
                    cipher,
                    wrapped: keywrap::wrap(X25519_WRAP_CIPHER, &kek[..], session_key)?,
                }
            }
            _ => {
                return Err(Error::UnknownAlgorithm(format!(
                    "encryption to {:?} keys",
                    recipient.algorithm()
                )))
            }
        };

        let recipient_id = match version {
            PKESK_V3 => Recipient::KeyId(recipient.key_id()),
            _ => Recipient::Fingerprint(recipient.fingerprint()),
        };
        Ok(Self {
            version,
            recipient: recipient_id,
            algorithm: recipient.algorithm(),
            key,
        })
    }

    /// Recover the session key with `secret`
    ///
    /// Key-wrap, OAEP, padding and checksum failures are all
    /// `IntegrityCheckFailed`.
    pub(crate) fn decrypt(&self, public: &PublicKeyPacket, secret: &SecretParams) -> Result<SessionKey> {
        match (&self.key, public.params(), secret) {
            (EncryptedKey::Rsa(m), PublicParams::Rsa { n, e }, SecretParams::Rsa(parts)) => {
                let key = rsa::private_key(n, e, parts)?;
                let payload = rsa::decrypt(&key, m)?;
                self.parse_payload(&payload)
            }
            (
                EncryptedKey::Ecdh { ephemeral, wrapped },
                PublicParams::Ecdh {
                    curve,
                    hash,
                    cipher,
                    ..
                },
                SecretParams::Ecc(scalar),
            ) => {
                let shared = ecc::ecdh_shared(*curve, scalar.as_bytes(), ephemeral.as_bytes())?;
                let param = kdf::ecdh_param(*curve, *hash, *cipher, public.fingerprint().as_bytes());
                let kek = kdf::ecdh_kek(*hash, &shared, &param, cipher.key_size()?)?;
                let padded = keywrap::unwrap(*cipher, &kek, wrapped)?;
                self.parse_payload(pkcs5_unpad(&padded)?)
            }
            (
                EncryptedKey::X25519 {
                    ephemeral,
                    cipher,
                    wrapped,
                },
                PublicParams::X25519 { public: point },
                SecretParams::X25519(scalar),
            ) => {
                let shared = ecc::x25519_shared(scalar, ephemeral)?;
                let kek = kdf::x25519_kek(ephemeral, point, &shared)?;
                let key = keywrap::unwrap(X25519_WRAP_CIPHER, &kek[..], wrapped)?;
                if let Some(cipher) = cipher {
                    check_key_size(*cipher, key.len())?;
                }
                Ok(SessionKey {
                    cipher: *cipher,
                    key,
                })
            }
            _ => Err(Error::IntegrityCheckFailed(format!(
                "session key for {:?} cannot be opened with a {:?} key",
                self.algorithm,
                public.algorithm()
            ))),
        }
    }

    /// Split `[cipher] || key || sum16` and verify the checksum
    fn parse_payload(&self, payload: &[u8]) -> Result<SessionKey> {
        let (cipher, rest) = match self.version {
            PKESK_V3 => {
                let (cipher, rest) = payload
                    .split_first()
                    .ok_or_else(|| Error::IntegrityCheckFailed("empty session key".into()))?;
                (Some(SymmetricAlgorithm::from(*cipher)), rest)
            }
            _ => (None, payload),
        };
        if rest.len() < 2 {
            return Err(Error::IntegrityCheckFailed("session key too short".into()));
        }
        let (key, checksum) = rest.split_at(rest.len() - 2);
        if !bool::from(checksum16(key)[..].ct_eq(checksum)) {
            return Err(Error::IntegrityCheckFailed("session key checksum mismatch".into()));
        }
        match cipher {
            Some(cipher) => check_key_size(cipher, key.len())?,
            None if matches!(key.len(), 16 | 24 | 32) => {}
            None => {
                return Err(Error::IntegrityCheckFailed(format!(
                    "session key of {} octets",
                    key.len()
                )))
            }
        }
        Ok(SessionKey {
            cipher,
            key: Zeroizing::new(key.to_vec()),
        })
    }
}

fn check_key_size(cipher: SymmetricAlgorithm, len: usize) -> Result<()> {
    if cipher.key_size()? != len {
        return Err(Error::IntegrityCheckFailed(format!(
            "session key of {} octets does not fit {:?}",
            len, cipher
        )));
    }
    Ok(())
}

fn push_short_field(body: &mut Vec<u8>, field: &[u8]) -> Result<()> {
    let len = u8::try_from(field.len())
        .map_err(|_| Error::EncryptionFailed("wrapped session key is too long".into()))?;
    body.push(len);
    body.extend_from_slice(field);
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
