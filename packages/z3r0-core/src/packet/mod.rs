//! # Packet Parser
//!
//! OpenPGP packet framing: raw octets become an ordered sequence of tagged
//! packets, and packets serialize back to octets.
//!
//! ## Packet Framing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         PACKET HEADERS                                  │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  New format                                                             │
//! │  ┌──────────┬──────────────────────────────┬───────────────────────┐    │
//! │  │ 11tttttt │ length                       │ body                  │    │
//! │  └──────────┴──────────────────────────────┴───────────────────────┘    │
//! │               0..191         1 octet                                    │
//! │               192..223       2 octets                                   │
//! │               255            5 octets (0xFF + u32)                      │
//! │               224..254       partial chunk of 2^(n & 0x1F), repeated    │
//! │                                                                         │
//! │  Old format                                                             │
//! │  ┌──────────┬──────────────────────────────┬───────────────────────┐    │
//! │  │ 10ttttll │ length (ll = 0,1,2 → 1,2,4)  │ body                  │    │
//! │  └──────────┴──────────────────────────────┴───────────────────────┘    │
//! │               ll = 3: body runs to the end of input                     │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Unknown tags are not an error: the packet is kept as an opaque body under
//! [`Tag::Unknown`] and the caller decides what to do with it.

mod body;
mod header;

pub use body::{BodyReader, Mpi};
pub use header::HeaderFormat;

use zeroize::Zeroizing;

use crate::error::{Error, Result};
use header::{parse_header, parse_new_length, write_new_length, BodyLength};

/// Smallest first chunk allowed in a partial-length body
pub const MIN_FIRST_PARTIAL_CHUNK: usize = 512;

wire_enum! {
    /// Packet type tag
    pub enum Tag {
        /// Public-Key Encrypted Session Key
        PublicKeyEncryptedSessionKey = 1,
        /// Signature
        Signature = 2,
        /// Symmetric-Key Encrypted Session Key
        SymKeyEncryptedSessionKey = 3,
        /// One-Pass Signature
        OnePassSignature = 4,
        /// Secret-Key
        SecretKey = 5,
        /// Public-Key
        PublicKey = 6,
        /// Secret-Subkey
        SecretSubkey = 7,
        /// Compressed Data
        CompressedData = 8,
        /// Symmetrically Encrypted Data (no integrity protection)
        SymEncryptedData = 9,
        /// Marker
        Marker = 10,
        /// Literal Data
        LiteralData = 11,
        /// Trust
        Trust = 12,
        /// User ID
        UserId = 13,
        /// Public-Subkey
        PublicSubkey = 14,
        /// User Attribute
        UserAttribute = 17,
        /// Symmetrically Encrypted Integrity Protected Data
        SymEncryptedProtectedData = 18,
        /// Modification Detection Code
        ModificationDetectionCode = 19,
        /// AEAD Encrypted Data (LibrePGP)
        AeadEncryptedData = 20,
        /// Padding
        Padding = 21,
    }
}

impl Tag {
    /// Whether partial body lengths are permitted for this tag
    pub fn allows_partial(self) -> bool {
        matches!(
            self,
            Tag::CompressedData
                | Tag::SymEncryptedData
                | Tag::LiteralData
                | Tag::SymEncryptedProtectedData
                | Tag::AeadEncryptedData
        )
    }
}

/// One framed packet: tag plus raw body
///
/// Bodies may hold cleartext secrets (unprotected keys, decrypted payloads)
/// and are wiped on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    tag: Tag,
    format: HeaderFormat,
    body: Zeroizing<Vec<u8>>,
}

impl std::fmt::Debug for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Packet")
            .field("tag", &self.tag)
            .field("format", &self.format)
            .field("len", &self.body.len())
            .finish()
    }
}

impl Packet {
    /// Build a packet for serialization
    pub fn new(tag: Tag, body: Vec<u8>) -> Result<Self> {
        if u8::from(tag) == 0 || u8::from(tag) > 63 {
            return Err(Error::MalformedPacket(format!(
                "tag {} cannot be encoded",
                u8::from(tag)
            )));
        }
        if u32::try_from(body.len()).is_err() {
            return Err(Error::MalformedPacket(format!(
                "packet body of {} octets is too large",
                body.len()
            )));
        }
        Ok(Self {
            tag,
            format: HeaderFormat::New,
            body: Zeroizing::new(body),
        })
    }

    /// Packet tag
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Header format the packet was read with
    pub fn format(&self) -> HeaderFormat {
        self.format
    }

    /// Raw body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body length in octets
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Cursor over the body
    pub fn reader(&self) -> BodyReader<'_> {
        BodyReader::new(self.tag, &self.body)
    }

    /// Serialize with a new-format header and the shortest definite length
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.body.len() + 6);
        self.write_to(&mut out);
        out
    }

    /// Append the serialized packet
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.push(0xC0 | u8::from(self.tag));
        // Packet::new guarantees the length fits in 32 bits
        write_new_length(self.body.len() as u32, out);
        out.extend_from_slice(&self.body);
    }

    /// Serialize data packets with partial lengths of `2^exponent` octets
    ///
    /// Bodies no larger than one chunk are written with a definite length.
    pub fn to_bytes_partial(&self, exponent: u8) -> Result<Vec<u8>> {
        if !self.tag.allows_partial() {
            return Err(Error::MalformedPacket(format!(
                "partial lengths are not allowed for {:?}",
                self.tag
            )));
        }
        if !(9..=30).contains(&exponent) {
            return Err(Error::MalformedPacket(format!(
                "partial chunk exponent {} out of range",
                exponent
            )));
        }

        let chunk = 1usize << exponent;
        let mut out = Vec::with_capacity(self.body.len() + self.body.len() / chunk + 6);
        out.push(0xC0 | u8::from(self.tag));
        let mut rest: &[u8] = &self.body;
        while rest.len() > chunk {
            out.push(0xE0 | exponent);
            out.extend_from_slice(&rest[..chunk]);
            rest = &rest[chunk..];
        }
        write_new_length(rest.len() as u32, &mut out);
        out.extend_from_slice(rest);
        Ok(out)
    }
}

/// Lazy packet iterator over a byte slice
///
/// Yields `Err` at most once; the iterator is exhausted afterwards.
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> PacketReader<'a> {
    /// Read packets from `data`
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            failed: false,
        }
    }

    fn read_packet(&mut self) -> Result<Packet> {
        let input = &self.data[self.pos..];
        let header = parse_header(input)?;
        let tag = Tag::from(header.tag);
        if header.tag == 0 {
            return Err(Error::MalformedPacket("reserved packet tag 0".into()));
        }
        let mut pos = header.size;

        let body = match header.length {
            BodyLength::Fixed(len) => {
                let body = take(input, pos, len, header.tag)?;
                pos += len;
                body.to_vec()
            }
            BodyLength::Indeterminate => {
                let body = input[pos..].to_vec();
                pos = input.len();
                body
            }
            BodyLength::Partial(first) => {
                if !tag.allows_partial() {
                    return Err(Error::MalformedPacket(format!(
                        "partial length on non-data packet tag {}",
                        header.tag
                    )));
                }
                if first < MIN_FIRST_PARTIAL_CHUNK {
                    return Err(Error::MalformedPacket(format!(
                        "first partial chunk of {} octets is below {}",
                        first, MIN_FIRST_PARTIAL_CHUNK
                    )));
                }
                let mut body = Vec::new();
                let mut chunk = first;
                loop {
                    body.extend_from_slice(take(input, pos, chunk, header.tag)?);
                    pos += chunk;
                    let (next, used) = parse_new_length(&input[pos..], header.tag)?;
                    pos += used;
                    match next {
                        BodyLength::Partial(len) => chunk = len,
                        BodyLength::Fixed(len) => {
                            body.extend_from_slice(take(input, pos, len, header.tag)?);
                            pos += len;
                            break;
                        }
                        BodyLength::Indeterminate => {
                            return Err(Error::Internal("indeterminate partial chunk".into()))
                        }
                    }
                }
                body
            }
        };

        if let Tag::Unknown(n) = tag {
            tracing::debug!(tag = n, len = body.len(), "Retaining packet with unknown tag");
        }

        self.pos += pos;
        Ok(Packet {
            tag,
            format: header.format,
            body: Zeroizing::new(body),
        })
    }
}

fn take(input: &[u8], pos: usize, len: usize, tag: u8) -> Result<&[u8]> {
    let remaining = input.len() - pos;
    if len > remaining {
        return Err(Error::truncated(tag, len, remaining));
    }
    Ok(&input[pos..pos + len])
}

impl<'a> Iterator for PacketReader<'a> {
    type Item = Result<Packet>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.data.len() {
            return None;
        }
        let result = self.read_packet();
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

impl std::iter::FusedIterator for PacketReader<'_> {}

/// Parse a complete packet sequence
pub fn parse_all(data: &[u8]) -> Result<Vec<Packet>> {
    PacketReader::new(data).collect()
}

/// Serialize a packet sequence
pub fn serialize(packets: &[Packet]) -> Vec<u8> {
    let mut out = Vec::with_capacity(packets.iter().map(|p| p.len() + 6).sum());
    for packet in packets {
        packet.write_to(&mut out);
    }
    out
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_round_trip() {
        let packets = vec![
            Packet::new(Tag::PublicKey, vec![4; 51]).unwrap(),
            Packet::new(Tag::UserId, b"<a@example.com>".to_vec()).unwrap(),
            Packet::new(Tag::Signature, vec![7; 300]).unwrap(),
        ];
        let bytes = serialize(&packets);
        let parsed = parse_all(&bytes).unwrap();
        assert_eq!(parsed, packets);
    }

    #[test]
    fn test_truncated_body() {
        let mut bytes = Packet::new(Tag::UserId, vec![b'x'; 20]).unwrap().to_bytes();
        bytes.truncate(10);
        let err = parse_all(&bytes).unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedPacket {
                tag: 13,
                declared: 20,
                remaining: 8
            }
        ));
    }

    #[test]
    fn test_unknown_tag_is_retained() {
        let mut bytes = vec![0xC0 | 60, 3, 1, 2, 3];
        bytes.extend(Packet::new(Tag::Marker, b"PGP".to_vec()).unwrap().to_bytes());
        let parsed = parse_all(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].tag(), Tag::Unknown(60));
        assert_eq!(parsed[0].body(), &[1, 2, 3]);
        assert_eq!(parsed[1].tag(), Tag::Marker);
    }

    #[test]
    fn test_old_format_packets() {
        // tag 13, one-octet length; then tag 11 indeterminate
        let bytes = [0xB4, 0x02, b'h', b'i', 0xAF, b'a', b'b', b'c'];
        let parsed = parse_all(&bytes).unwrap();
        assert_eq!(parsed[0].tag(), Tag::UserId);
        assert_eq!(parsed[0].format(), HeaderFormat::Old);
        assert_eq!(parsed[0].body(), b"hi");
        assert_eq!(parsed[1].tag(), Tag::LiteralData);
        assert_eq!(parsed[1].body(), b"abc");
    }

    #[test]
    fn test_partial_lengths_round_trip() {
        let body: Vec<u8> = (0..3000u32).map(|i| (i % 251) as u8).collect();
        let packet = Packet::new(Tag::LiteralData, body.clone()).unwrap();
        let bytes = packet.to_bytes_partial(9).unwrap();
        // full 512-octet chunks, then a definite tail
        assert_eq!(bytes[1], 0xE9);

        let parsed = parse_all(&bytes).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].body(), body.as_slice());
    }

    #[test]
    fn test_partial_rejected_for_non_data_packets() {
        let packet = Packet::new(Tag::UserId, vec![0; 1024]).unwrap();
        assert!(packet.to_bytes_partial(9).is_err());

        let mut bytes = vec![0xC0 | 13, 0xE9];
        bytes.extend(vec![0u8; 512]);
        bytes.push(0);
        assert!(matches!(parse_all(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_small_first_partial_chunk_rejected() {
        let mut bytes = vec![0xC0 | 11, 0xE1];
        bytes.extend([0u8; 2]);
        bytes.push(0);
        assert!(matches!(parse_all(&bytes), Err(Error::MalformedPacket(_))));
    }

    #[test]
    fn test_reader_stops_after_error() {
        let bytes = [0xC0 | 13, 5, b'a', 0x01];
        let mut reader = PacketReader::new(&bytes);
        assert!(reader.next().unwrap().is_err());
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_reserved_tag_rejected() {
        assert!(matches!(
            parse_all(&[0xC0, 0]),
            Err(Error::MalformedPacket(_))
        ));
    }
}
