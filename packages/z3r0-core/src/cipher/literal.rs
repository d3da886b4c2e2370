//! Literal and Compressed Data packets inside the encrypted payload.

use tracing::debug;
use zeroize::Zeroizing;

use crate::crypto::CompressionAlgorithm;
use crate::error::{Error, Result};
use crate::packet::{self, Packet, Tag};
use crate::time;

/// Format octet for UTF-8 text
pub const FORMAT_UTF8: u8 = b'u';

/// Upper bound on inflated payloads (256 MiB)
pub const MAX_DECOMPRESSED_SIZE: usize = 256 * 1024 * 1024;

/// Compressed Data packets nested deeper than this are rejected
const MAX_NESTING: usize = 8;

const ZLIB_LEVEL: u8 = 6;

/// Contents of a Literal Data packet
#[derive(Clone)]
pub struct LiteralData {
    format: u8,
    filename: Vec<u8>,
    date: u32,
    data: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for LiteralData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiteralData")
            .field("format", &(self.format as char))
            .field("filename", &String::from_utf8_lossy(&self.filename))
            .field("date", &self.date)
            .field("len", &self.data.len())
            .finish()
    }
}

impl LiteralData {
    /// UTF-8 text with no filename, stamped now
    pub(crate) fn text(data: &[u8]) -> Self {
        Self {
            format: FORMAT_UTF8,
            filename: Vec::new(),
            date: time::now_pgp_timestamp(),
            data: Zeroizing::new(data.to_vec()),
        }
    }

    pub(crate) fn from_packet(packet: &Packet) -> Result<Self> {
        let mut reader = packet.reader();
        let format = reader.u8()?;
        let filename = reader.short_field()?.to_vec();
        let date = reader.u32()?;
        let data = Zeroizing::new(reader.rest().to_vec());
        Ok(Self {
            format,
            filename,
            date,
            data,
        })
    }

    pub(crate) fn to_packet(&self) -> Result<Packet> {
        let filename_len = u8::try_from(self.filename.len())
            .map_err(|_| Error::InvalidInput("literal filename is too long".into()))?;
        let mut body = Vec::with_capacity(6 + self.filename.len() + self.data.len());
        body.push(self.format);
        body.push(filename_len);
        body.extend_from_slice(&self.filename);
        body.extend_from_slice(&self.date.to_be_bytes());
        body.extend_from_slice(&self.data);
        Packet::new(Tag::LiteralData, body)
    }

    /// Format octet (`b`, `u`, `t`, ...)
    pub fn format(&self) -> u8 {
        self.format
    }

    /// Filename hint, usually empty
    pub fn filename(&self) -> &[u8] {
        &self.filename
    }

    /// Creation date in seconds since the epoch (0 if unset)
    pub fn date(&self) -> u32 {
        self.date
    }

    /// Literal contents
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn into_data(self) -> Zeroizing<Vec<u8>> {
        self.data
    }
}

/// Wrap `inner` in a ZLIB Compressed Data packet
pub(crate) fn compress(inner: &Packet) -> Result<Packet> {
    let serialized = Zeroizing::new(inner.to_bytes());
    let mut body = vec![u8::from(CompressionAlgorithm::Zlib)];
    body.extend_from_slice(&miniz_oxide::deflate::compress_to_vec_zlib(&serialized, ZLIB_LEVEL));
    Packet::new(Tag::CompressedData, body)
}

/// Inflate a Compressed Data packet
pub(crate) fn decompress(packet: &Packet) -> Result<Zeroizing<Vec<u8>>> {
    let (algorithm, data) = packet
        .body()
        .split_first()
        .ok_or_else(|| Error::InvalidMessage("empty compressed data packet".into()))?;
    let algorithm = CompressionAlgorithm::from(*algorithm);
    let inflated = match algorithm {
        CompressionAlgorithm::Uncompressed => Ok(data.to_vec()),
        CompressionAlgorithm::Zip => {
            miniz_oxide::inflate::decompress_to_vec_with_limit(data, MAX_DECOMPRESSED_SIZE)
        }
        CompressionAlgorithm::Zlib => {
            miniz_oxide::inflate::decompress_to_vec_zlib_with_limit(data, MAX_DECOMPRESSED_SIZE)
        }
        other => {
            return Err(Error::UnknownAlgorithm(format!(
                "compression algorithm {:?}",
                other
            )))
        }
    };
    let inflated = inflated.map_err(|e| {
        Error::InvalidMessage(format!("{:?} data failed to inflate: {:?}", algorithm, e.status))
    })?;
    debug!(
        algorithm = ?algorithm,
        compressed = data.len(),
        inflated = inflated.len(),
        "Inflated compressed data"
    );
    Ok(Zeroizing::new(inflated))
}

/// Find the one Literal Data packet in a decrypted payload
///
/// Compressed Data is unwrapped, signature, marker and padding packets are
/// skipped. Anything else, or a literal count other than one, is
/// `InvalidMessage`.
pub(crate) fn read_payload(data: &[u8]) -> Result<LiteralData> {
    read_payload_at(data, 0)
}

fn read_payload_at(data: &[u8], depth: usize) -> Result<LiteralData> {
    if depth > MAX_NESTING {
        return Err(Error::InvalidMessage(
            "compressed data is nested too deeply".into(),
        ));
    }
    let packets = packet::parse_all(data)
        .map_err(|e| Error::InvalidMessage(format!("decrypted payload: {}", e)))?;

    let mut literal = None;
    for packet in &packets {
        let found = match packet.tag() {
            Tag::LiteralData => LiteralData::from_packet(packet)?,
            Tag::CompressedData => read_payload_at(&decompress(packet)?, depth + 1)?,
            Tag::OnePassSignature | Tag::Signature => {
                debug!("Skipping signature packet in decrypted payload");
                continue;
            }
            Tag::Marker | Tag::Padding => continue,
            other => {
                return Err(Error::InvalidMessage(format!(
                    "unexpected {:?} packet in decrypted payload",
                    other
                )))
            }
        };
        if literal.replace(found).is_some() {
            return Err(Error::InvalidMessage(
                "decrypted payload holds more than one literal data packet".into(),
            ));
        }
    }
    literal.ok_or_else(|| Error::InvalidMessage("decrypted payload has no literal data".into()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_packet_layout() {
        let literal = LiteralData::text(b"hello");
        let packet = literal.to_packet().unwrap();
        let body = packet.body();
        assert_eq!(body[0], b'u');
        assert_eq!(body[1], 0);
        assert_eq!(&body[6..], b"hello");

        let parsed = LiteralData::from_packet(&packet).unwrap();
        assert_eq!(parsed.data(), b"hello");
        assert_eq!(parsed.format(), FORMAT_UTF8);
        assert_eq!(parsed.date(), literal.date());
    }

    #[test]
    fn test_compressed_payload() {
        let literal = LiteralData::text(&[b'a'; 4096]).to_packet().unwrap();
        let compressed = compress(&literal).unwrap();
        assert!(compressed.len() < literal.len());

        let parsed = read_payload(&compressed.to_bytes()).unwrap();
        assert_eq!(parsed.data(), &[b'a'; 4096][..]);
    }

    #[test]
    fn test_uncompressed_and_raw_deflate() {
        let literal = LiteralData::text(b"inner").to_packet().unwrap().to_bytes();

        let mut stored = vec![0u8];
        stored.extend_from_slice(&literal);
        let packet = Packet::new(Tag::CompressedData, stored).unwrap();
        assert_eq!(read_payload(&packet.to_bytes()).unwrap().data(), b"inner");

        let mut zip = vec![1u8];
        zip.extend_from_slice(&miniz_oxide::deflate::compress_to_vec(&literal, 6));
        let packet = Packet::new(Tag::CompressedData, zip).unwrap();
        assert_eq!(read_payload(&packet.to_bytes()).unwrap().data(), b"inner");
    }

    #[test]
    fn test_bzip2_is_unknown() {
        let packet = Packet::new(Tag::CompressedData, vec![3, 0x42, 0x5A]).unwrap();
        assert!(matches!(
            read_payload(&packet.to_bytes()),
            Err(Error::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_skips_marker_and_signatures() {
        let mut payload = Packet::new(Tag::Marker, b"PGP".to_vec()).unwrap().to_bytes();
        payload.extend(LiteralData::text(b"x").to_packet().unwrap().to_bytes());
        payload.extend(Packet::new(Tag::Signature, vec![4, 0]).unwrap().to_bytes());
        assert_eq!(read_payload(&payload).unwrap().data(), b"x");
    }

    #[test]
    fn test_rejects_two_literals() {
        let mut payload = LiteralData::text(b"a").to_packet().unwrap().to_bytes();
        payload.extend(LiteralData::text(b"b").to_packet().unwrap().to_bytes());
        assert!(matches!(read_payload(&payload), Err(Error::InvalidMessage(_))));
    }

    #[test]
    fn test_rejects_empty_and_foreign_payloads() {
        assert!(matches!(read_payload(&[]), Err(Error::InvalidMessage(_))));

        let user_id = Packet::new(Tag::UserId, b"<a@example.com>".to_vec()).unwrap();
        assert!(matches!(
            read_payload(&user_id.to_bytes()),
            Err(Error::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_rejects_deep_nesting() {
        let mut packet = LiteralData::text(b"deep").to_packet().unwrap();
        for _ in 0..=MAX_NESTING + 1 {
            packet = compress(&packet).unwrap();
        }
        assert!(matches!(
            read_payload(&packet.to_bytes()),
            Err(Error::InvalidMessage(_))
        ));
    }
}
