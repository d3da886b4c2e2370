//! # Message Cipher Engine
//!
//! Encrypts plaintext to one or more certificates and decrypts messages
//! with an unlocked private key.
//!
//! ## Message Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           ENCRYPTED MESSAGE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PKESK v6  → recipient A encryption subkey   (session key wrapped)      │
//! │  PKESK v6  → recipient B encryption subkey                              │
//! │  SEIPD v2  AES-256 / GCM, chunked                                       │
//! │    └── [Compressed Data (ZLIB)]                                         │
//! │          └── Literal Data 'u'  "hello"                                  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Decryption
//!
//! ```text
//!   for each PKESK addressed to us (or wildcard)
//!       unwrap session key ──fail──▶ next PKESK
//!              │
//!              ▼
//!       open every chunk + final tag ──fail──▶ IntegrityCheckFailed
//!              │
//!              ▼
//!       unwrap compression, take the literal data
//! ```
//!
//! ## Design Decisions
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | Output format | PKESK v6 + SEIPD v2 | AEAD with per-chunk authentication |
//! | Legacy input | PKESK v3 + SEIPD v1 read only | Existing messages still open |
//! | Buffering | Whole plaintext held until final tag | No partial plaintext escapes |
//! | Unwrap failures | Next candidate, then IntegrityCheckFailed | One bad PKESK does not mask a good one |

mod literal;
mod pkesk;
mod seipd;

pub use literal::{LiteralData, FORMAT_UTF8, MAX_DECOMPRESSED_SIZE};
pub use pkesk::{Pkesk, Recipient, PKESK_V3, PKESK_V6};
pub use seipd::{SEIPD_V1, SEIPD_V2};

use std::collections::HashSet;

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::armor::{self, BlockType};
use crate::config::CodecConfig;
use crate::crypto::{random_bytes, SymmetricAlgorithm};
use crate::error::{Error, Result};
use crate::keys::{self, PublicKeyMaterial, UnlockedKey};
use crate::packet::{Packet, Tag};

/// Cipher used for new messages
pub const MESSAGE_CIPHER: SymmetricAlgorithm = SymmetricAlgorithm::Aes256;

// ============================================================================
// MESSAGE CONTAINERS
// ============================================================================

/// An encrypted message: session-key packets plus one encrypted-data packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    packets: Vec<Packet>,
}

impl EncryptedMessage {
    /// Parse binary packets or (tolerantly) armored `PGP MESSAGE` text
    pub fn parse(input: impl AsRef<[u8]>) -> Result<Self> {
        let packets = keys::decode_input(input.as_ref(), BlockType::Message)?;
        Ok(Self::from_packets(packets))
    }

    /// Wrap an already parsed packet sequence
    pub fn from_packets(packets: Vec<Packet>) -> Self {
        Self { packets }
    }

    /// Packets in order
    pub fn packets(&self) -> &[Packet] {
        &self.packets
    }

    /// Binary form
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::packet::serialize(&self.packets)
    }

    /// `PGP MESSAGE` armor
    pub fn to_armored(&self, comment: Option<&str>) -> String {
        armor::armor(&self.packets, BlockType::Message, comment)
    }

    /// Recipients of every readable session-key packet
    pub fn recipients(&self) -> Vec<Recipient> {
        self.packets
            .iter()
            .filter(|p| p.tag() == Tag::PublicKeyEncryptedSessionKey)
            .filter_map(|p| Pkesk::from_packet(p).ok())
            .map(|p| p.recipient())
            .collect()
    }
}

/// Recovered plaintext, wiped on drop
pub struct Plaintext {
    literal: LiteralData,
}

impl std::fmt::Debug for Plaintext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Plaintext")
            .field("len", &self.literal.data().len())
            .finish_non_exhaustive()
    }
}

impl Plaintext {
    /// Plaintext octets
    pub fn as_bytes(&self) -> &[u8] {
        self.literal.data()
    }

    /// The literal data packet the plaintext came from
    pub fn literal(&self) -> &LiteralData {
        &self.literal
    }

    /// Plaintext as UTF-8 text; anything else is `InvalidMessage`
    pub fn into_text(self) -> Result<String> {
        let data: Zeroizing<Vec<u8>> = self.literal.into_data();
        std::str::from_utf8(&data)
            .map(str::to_owned)
            .map_err(|_| Error::InvalidMessage("decrypted message is not valid UTF-8".into()))
    }
}

// ============================================================================
// ENCRYPT
// ============================================================================

/// Encrypt `plaintext` to every certificate in `recipients`
///
/// A fresh session key is wrapped once per distinct encryption key.
pub fn encrypt(
    plaintext: &[u8],
    recipients: &[&PublicKeyMaterial],
    config: &CodecConfig,
) -> Result<EncryptedMessage> {
    config.validate()?;
    if recipients.is_empty() {
        return Err(Error::InvalidInput("At least one recipient is required".into()));
    }

    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(recipients.len());
    for certificate in recipients {
        let key = certificate.encryption_key()?;
        if seen.insert(key.fingerprint()) {
            keys.push(key);
        } else {
            debug!(key = %key.fingerprint(), "Skipping duplicate recipient");
        }
    }

    let session_key = random_bytes(MESSAGE_CIPHER.key_size()?);
    let mut packets = Vec::with_capacity(keys.len() + 1);
    for key in &keys {
        packets.push(Pkesk::encrypt_v6(key, &session_key)?.to_packet()?);
    }

    let literal = LiteralData::text(plaintext).to_packet()?;
    let payload = if config.compress {
        literal::compress(&literal)?
    } else {
        literal
    };
    let payload = Zeroizing::new(payload.to_bytes());
    packets.push(seipd::encrypt_v2(
        &session_key,
        MESSAGE_CIPHER,
        config.chunk_size_octet,
        &payload,
    )?);

    info!(
        recipients = keys.len(),
        compressed = config.compress,
        "Encrypted message"
    );
    Ok(EncryptedMessage { packets })
}

// ============================================================================
// DECRYPT
// ============================================================================

/// Decrypt `message` with the secrets in `key`
///
/// Fails with `NoMatchingRecipient` when no session-key packet fits the
/// key, and `IntegrityCheckFailed` when none of those that fit open the
/// message.
pub fn decrypt(message: &EncryptedMessage, key: &UnlockedKey) -> Result<Plaintext> {
    let secrets = key.secrets()?;

    let mut pkesks = Vec::new();
    let mut data = None;
    for packet in &message.packets {
        match packet.tag() {
            Tag::PublicKeyEncryptedSessionKey => match Pkesk::from_packet(packet) {
                Ok(pkesk) => pkesks.push(pkesk),
                Err(e) => warn!(error = %e, "Skipping unreadable session key packet"),
            },
            Tag::SymKeyEncryptedSessionKey => {
                debug!("Skipping password-encrypted session key packet")
            }
            Tag::SymEncryptedProtectedData => {
                if data.replace(packet).is_some() {
                    return Err(Error::InvalidMessage(
                        "message holds more than one encrypted data packet".into(),
                    ));
                }
            }
            Tag::SymEncryptedData => {
                return Err(Error::IntegrityCheckFailed(
                    "message is encrypted without integrity protection".into(),
                ))
            }
            Tag::AeadEncryptedData => {
                return Err(Error::UnknownAlgorithm("AEAD encrypted data packets".into()))
            }
            Tag::Marker | Tag::Padding => {}
            other => {
                return Err(Error::InvalidMessage(format!(
                    "unexpected {:?} packet in encrypted message",
                    other
                )))
            }
        }
    }
    let data = data.ok_or_else(|| Error::InvalidMessage("message has no encrypted data".into()))?;

    let mut attempted = false;
    let mut last_error = None;
    for pkesk in &pkesks {
        let candidates = secrets
            .iter()
            .filter(|s| pkesk.fits(&s.public) && pkesk.recipient().matches(&s.public));
        for candidate in candidates {
            attempted = true;
            let session = match pkesk.decrypt(&candidate.public, &candidate.secret) {
                Ok(session) => session,
                Err(e) => {
                    debug!(key = %candidate.public.fingerprint(), error = %e, "Session key did not unwrap");
                    last_error = Some(e);
                    continue;
                }
            };
            let payload = seipd::decrypt(data, &session)?;
            let literal = literal::read_payload(&payload)?;
            info!(key = %candidate.public.fingerprint(), len = literal.data().len(), "Decrypted message");
            return Ok(Plaintext { literal });
        }
    }

    if !attempted {
        debug!(key = %key.fingerprint(), session_keys = pkesks.len(), "No session key addressed to this key");
        return Err(Error::NoMatchingRecipient);
    }
    Err(match last_error {
        Some(e @ Error::IntegrityCheckFailed(_)) => e,
        Some(e) => Error::IntegrityCheckFailed(format!("no session key could be recovered: {}", e)),
        None => Error::IntegrityCheckFailed("no session key could be recovered".into()),
    })
}

// ============================================================================
// TESTS
// ============================================================================
