//! Packet header framing: old and new formats, every length encoding.

use crate::error::{Error, Result};

/// Which header format a packet was read with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderFormat {
    /// Legacy format (tag in bits 5..2, length type in bits 1..0)
    Old,
    /// OpenPGP format (tag in bits 5..0)
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BodyLength {
    Fixed(usize),
    Partial(usize),
    Indeterminate,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Header {
    pub tag: u8,
    pub format: HeaderFormat,
    pub length: BodyLength,
    /// Octets consumed by the header itself
    pub size: usize,
}

pub(crate) fn parse_header(input: &[u8]) -> Result<Header> {
    let first = *input
        .first()
        .ok_or_else(|| Error::MalformedPacket("empty packet header".into()))?;
    if first & 0x80 == 0 {
        return Err(Error::MalformedPacket(format!(
            "invalid packet header octet 0x{:02X}",
            first
        )));
    }

    if first & 0x40 != 0 {
        let tag = first & 0x3F;
        let (length, len_size) = parse_new_length(&input[1..], tag)?;
        return Ok(Header {
            tag,
            format: HeaderFormat::New,
            length,
            size: 1 + len_size,
        });
    }

    let tag = (first >> 2) & 0x0F;
    let rest = &input[1..];
    let (length, len_size) = match first & 0x03 {
        0 => (BodyLength::Fixed(usize::from(read_exact::<1>(rest, tag)?[0])), 1),
        1 => (
            BodyLength::Fixed(usize::from(u16::from_be_bytes(read_exact::<2>(rest, tag)?))),
            2,
        ),
        2 => (
            BodyLength::Fixed(u32::from_be_bytes(read_exact::<4>(rest, tag)?) as usize),
            4,
        ),
        _ => (BodyLength::Indeterminate, 0),
    };
    Ok(Header {
        tag,
        format: HeaderFormat::Old,
        length,
        size: 1 + len_size,
    })
}

/// Parse a new-format length. Returns the length and the octets it used.
pub(crate) fn parse_new_length(input: &[u8], tag: u8) -> Result<(BodyLength, usize)> {
    let first = read_exact::<1>(input, tag)?[0];
    match first {
        0..=191 => Ok((BodyLength::Fixed(usize::from(first)), 1)),
        192..=223 => {
            let two = read_exact::<2>(input, tag)?;
            let len = ((usize::from(two[0]) - 192) << 8) + usize::from(two[1]) + 192;
            Ok((BodyLength::Fixed(len), 2))
        }
        255 => {
            let five = read_exact::<5>(input, tag)?;
            let len = u32::from_be_bytes([five[1], five[2], five[3], five[4]]) as usize;
            Ok((BodyLength::Fixed(len), 5))
        }
        _ => Ok((BodyLength::Partial(1usize << (first & 0x1F)), 1)),
    }
}

/// Write the shortest definite new-format length.
pub(crate) fn write_new_length(len: u32, out: &mut Vec<u8>) {
    match len {
        0..=191 => out.push(len as u8),
        192..=8383 => {
            let v = len - 192;
            out.push(((v >> 8) as u8) + 192);
            out.push((v & 0xFF) as u8);
        }
        _ => {
            out.push(0xFF);
            out.extend_from_slice(&len.to_be_bytes());
        }
    }
}

fn read_exact<const N: usize>(input: &[u8], tag: u8) -> Result<[u8; N]> {
    input
        .get(..N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::truncated(tag, N, input.len()))
}

// ============================================================================
// TESTS
// ============================================================================
