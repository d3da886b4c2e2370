//! # Armor Codec
//!
//! Converts binary packet streams to and from ASCII armor.
//!
//! ## Armored Block Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  -----BEGIN PGP MESSAGE-----          header line                       │
//! │  Comment: z3r0                        optional armor headers            │
//! │                                       blank line                        │
//! │  wV4DAAAAAAAAAAASAQdA...              base64, 64 columns                │
//! │  ...                                                                    │
//! │  =njUN                                optional CRC24 of the payload     │
//! │  -----END PGP MESSAGE-----            footer line                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Tolerant Decoding
//!
//! [`decode_tolerant`] runs in two stages:
//!
//! 1. Strict decode of the text as given.
//! 2. If that fails and the text contains neither the BEGIN nor the END
//!    marker of the expected type, wrap it in that pair and decode again.
//!
//! When the second stage fails too, or was never attempted, the error from
//! the first stage is returned. Checksum and crypto failures are never
//! repaired.

use base64::{engine::general_purpose, Engine};

use crate::error::{Error, Result};
use crate::packet::{self, Packet};

/// Base64 characters per armored line
pub const LINE_WIDTH: usize = 64;

const CRC24_INIT: u32 = 0x00B7_04CE;
const CRC24_POLY: u32 = 0x0186_4CFB;

/// The three armored block types this codec reads and writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockType {
    /// `PGP PUBLIC KEY BLOCK`
    PublicKey,
    /// `PGP PRIVATE KEY BLOCK`
    PrivateKey,
    /// `PGP MESSAGE`
    Message,
}

impl BlockType {
    /// Label between `BEGIN PGP ` / `END PGP ` and the closing dashes
    pub fn label(self) -> &'static str {
        match self {
            BlockType::PublicKey => "PUBLIC KEY BLOCK",
            BlockType::PrivateKey => "PRIVATE KEY BLOCK",
            BlockType::Message => "MESSAGE",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        match label {
            "PUBLIC KEY BLOCK" => Some(BlockType::PublicKey),
            "PRIVATE KEY BLOCK" => Some(BlockType::PrivateKey),
            "MESSAGE" => Some(BlockType::Message),
            _ => None,
        }
    }

    /// `-----BEGIN PGP <LABEL>-----`
    pub fn begin_marker(self) -> String {
        format!("-----BEGIN PGP {}-----", self.label())
    }

    /// `-----END PGP <LABEL>-----`
    pub fn end_marker(self) -> String {
        format!("-----END PGP {}-----", self.label())
    }
}

impl std::fmt::Display for BlockType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PGP {}", self.label())
    }
}

/// A decoded armored block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredBlock {
    /// Block type named by the BEGIN line
    pub block_type: BlockType,
    /// Armor headers in the order they appeared
    pub headers: Vec<(String, String)>,
    /// Decoded payload
    pub data: Vec<u8>,
    /// CRC24 carried by the armor, already checked against `data`
    pub checksum: Option<u32>,
}

/// CRC24 as used by OpenPGP armor
pub fn crc24(data: &[u8]) -> u32 {
    let mut crc = CRC24_INIT;
    for byte in data {
        crc ^= u32::from(*byte) << 16;
        for _ in 0..8 {
            crc <<= 1;
            if crc & 0x0100_0000 != 0 {
                crc ^= CRC24_POLY;
            }
        }
    }
    crc & 0x00FF_FFFF
}

/// Armor a binary payload
pub fn encode(block_type: BlockType, data: &[u8], headers: &[(String, String)]) -> String {
    let b64 = general_purpose::STANDARD.encode(data);
    let mut out = String::with_capacity(b64.len() + b64.len() / LINE_WIDTH + 96);

    out.push_str(&block_type.begin_marker());
    out.push('\n');
    for (key, value) in headers {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');

    // base64 output is ASCII, so byte chunks are valid str boundaries
    for line in b64.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(line));
        out.push('\n');
    }

    let crc = crc24(data).to_be_bytes();
    out.push('=');
    out.push_str(&general_purpose::STANDARD.encode(&crc[1..]));
    out.push('\n');

    out.push_str(&block_type.end_marker());
    out.push('\n');
    out
}

/// Strictly decode one armored block
pub fn decode(text: &str) -> Result<ArmoredBlock> {
    let mut lines = text.lines().map(str::trim_end);

    let label = lines
        .by_ref()
        .map(str::trim_start)
        .find_map(|line| {
            line.strip_prefix("-----BEGIN PGP ")
                .and_then(|rest| rest.strip_suffix("-----"))
        })
        .ok_or_else(|| Error::MalformedArmor("missing BEGIN marker".into()))?;
    let block_type = BlockType::from_label(label).ok_or_else(|| {
        Error::MalformedArmor(format!("unsupported armor type \"PGP {}\"", label))
    })?;

    let mut headers = Vec::new();
    let mut body = String::new();
    let mut checksum_text: Option<&str> = None;
    let mut in_headers = true;
    let mut end_label = None;

    for line in lines {
        let line = line.trim_start();
        if let Some(rest) = line.strip_prefix("-----END PGP ") {
            end_label = Some(rest.strip_suffix("-----").unwrap_or(rest));
            break;
        }
        if in_headers {
            if line.is_empty() {
                in_headers = false;
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                headers.push((key.trim().to_string(), value.trim().to_string()));
                continue;
            }
            // no blank line after the BEGIN marker
            in_headers = false;
        }
        if line.is_empty() {
            continue;
        }
        if let Some(crc) = line.strip_prefix('=') {
            checksum_text = Some(crc);
            continue;
        }
        if checksum_text.is_some() {
            return Err(Error::MalformedArmor(
                "data after the checksum line".into(),
            ));
        }
        body.push_str(line);
    }

    match end_label {
        None => return Err(Error::MalformedArmor("missing END marker".into())),
        Some(end) if end != label => {
            return Err(Error::MalformedArmor(format!(
                "BEGIN type \"{}\" does not match END type \"{}\"",
                label, end
            )))
        }
        Some(_) => {}
    }

    let data = general_purpose::STANDARD.decode(body.as_bytes())?;

    let checksum = match checksum_text {
        Some(crc) => {
            let raw = general_purpose::STANDARD
                .decode(crc)
                .map_err(|e| Error::MalformedArmor(format!("invalid checksum line: {}", e)))?;
            if raw.len() != 3 {
                return Err(Error::MalformedArmor("checksum must be 3 octets".into()));
            }
            let expected = u32::from_be_bytes([0, raw[0], raw[1], raw[2]]);
            let computed = crc24(&data);
            if expected != computed {
                return Err(Error::ArmorChecksumMismatch { expected, computed });
            }
            Some(expected)
        }
        None => None,
    };

    Ok(ArmoredBlock {
        block_type,
        headers,
        data,
        checksum,
    })
}

/// Decode with the framing repair policy described in the module docs
///
/// The decoded block must be of the `expected` type.
pub fn decode_tolerant(text: &str, expected: BlockType) -> Result<ArmoredBlock> {
    let block = match decode(text) {
        Ok(block) => block,
        Err(original) => {
            let trimmed = text.trim();
            let begin = expected.begin_marker();
            let end = expected.end_marker();
            if trimmed.contains(&begin) || trimmed.contains(&end) {
                return Err(original);
            }
            tracing::debug!(
                block_type = %expected,
                "Armor markers missing, retrying with repaired framing"
            );
            let repaired = format!("{}\n\n{}\n{}", begin, trimmed, end);
            decode(&repaired).map_err(|_| original)?
        }
    };

    if block.block_type != expected {
        return Err(Error::MalformedArmor(format!(
            "expected {}, found {}",
            expected, block.block_type
        )));
    }
    Ok(block)
}

/// Serialize packets and armor them
pub fn armor(packets: &[Packet], block_type: BlockType, comment: Option<&str>) -> String {
    let headers: Vec<(String, String)> = comment
        .map(|c| vec![("Comment".to_string(), c.to_string())])
        .unwrap_or_default();
    encode(block_type, &packet::serialize(packets), &headers)
}

/// Decode armor strictly and parse the payload into packets
pub fn dearmor(text: &str) -> Result<(BlockType, Vec<Packet>)> {
    let block = decode(text)?;
    let packets = packet::parse_all(&block.data)?;
    tracing::debug!(
        block_type = %block.block_type,
        packets = packets.len(),
        "Dearmored block"
    );
    Ok((block.block_type, packets))
}

/// Tolerant [`dearmor`] for a known block type
pub fn dearmor_tolerant(text: &str, expected: BlockType) -> Result<Vec<Packet>> {
    let block = decode_tolerant(text, expected)?;
    packet::parse_all(&block.data)
}

// ============================================================================
// TESTS
// ============================================================================
