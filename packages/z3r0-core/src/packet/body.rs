//! Cursor over a packet body, plus the multiprecision integer type.

use std::fmt;

use zeroize::{Zeroize, Zeroizing};

use super::Tag;
use crate::error::{Error, Result};

/// OpenPGP multiprecision integer (2-octet bit count + big-endian magnitude)
///
/// Stored without leading zero octets. Secret MPIs are wiped on drop by the
/// structures that own them.
#[derive(Clone, PartialEq, Eq, Zeroize)]
pub struct Mpi(Vec<u8>);

impl Mpi {
    /// Build from big-endian octets, stripping leading zeros
    pub fn from_slice(bytes: &[u8]) -> Self {
        let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
        Self(bytes[start..].to_vec())
    }

    /// Magnitude octets
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of significant bits
    pub fn bit_len(&self) -> usize {
        match self.0.first() {
            Some(first) => (self.0.len() - 1) * 8 + (8 - first.leading_zeros() as usize),
            None => 0,
        }
    }

    /// Magnitude left-padded with zeros to `len` octets
    ///
    /// Returns `None` when the value does not fit.
    pub fn to_padded(&self, len: usize) -> Option<Zeroizing<Vec<u8>>> {
        if self.0.len() > len {
            return None;
        }
        let mut out = Zeroizing::new(vec![0u8; len]);
        out[len - self.0.len()..].copy_from_slice(&self.0);
        Some(out)
    }

    /// Append the wire encoding
    pub fn write_to(&self, out: &mut Vec<u8>) {
        debug_assert!(self.bit_len() <= usize::from(u16::MAX));
        out.extend_from_slice(&(self.bit_len() as u16).to_be_bytes());
        out.extend_from_slice(&self.0);
    }
}

impl fmt::Debug for Mpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mpi({} bits)", self.bit_len())
    }
}

/// Sequential reader over a packet body
///
/// Every short read is reported as `TruncatedPacket` with the packet's tag.
pub struct BodyReader<'a> {
    tag: u8,
    data: &'a [u8],
    pos: usize,
}

impl<'a> BodyReader<'a> {
    /// Start reading `data`, attributing errors to `tag`
    pub fn new(tag: Tag, data: &'a [u8]) -> Self {
        Self {
            tag: tag.into(),
            data,
            pos: 0,
        }
    }

    /// Octets not yet consumed
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the body has been fully consumed
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume exactly `n` octets
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(Error::truncated(self.tag, n, self.remaining()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Consume a fixed-size array
    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Consume one octet
    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    /// Consume a big-endian u16
    pub fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    /// Consume a big-endian u32
    pub fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    /// Consume an MPI
    ///
    /// The bit count must be exact: no leading zero bits or octets.
    pub fn mpi(&mut self) -> Result<Mpi> {
        let bits = usize::from(self.u16()?);
        let mpi = Mpi::from_slice(self.take((bits + 7) / 8)?);
        if mpi.bit_len() != bits {
            return Err(Error::MalformedPacket(format!(
                "MPI declares {} bits but holds {}",
                bits,
                mpi.bit_len()
            )));
        }
        Ok(mpi)
    }

    /// Consume a one-octet length prefix and that many octets
    pub fn short_field(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u8()?);
        self.take(len)
    }

    /// Consume everything left
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.data[self.pos..];
        self.pos = self.data.len();
        slice
    }

    /// Fail if anything is left unread
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::MalformedPacket(format!(
                "{} trailing octets in tag {} body",
                self.remaining(),
                self.tag
            )))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mpi_encoding() {
        let mpi = Mpi::from_slice(&[0x00, 0x01, 0xFF]);
        assert_eq!(mpi.as_bytes(), &[0x01, 0xFF]);
        assert_eq!(mpi.bit_len(), 9);

        let mut out = Vec::new();
        mpi.write_to(&mut out);
        assert_eq!(out, vec![0x00, 0x09, 0x01, 0xFF]);
    }

    #[test]
    fn test_mpi_zero() {
        let mpi = Mpi::from_slice(&[0, 0]);
        assert_eq!(mpi.bit_len(), 0);
        let mut out = Vec::new();
        mpi.write_to(&mut out);
        assert_eq!(out, vec![0, 0]);
    }

    #[test]
    fn test_mpi_padding() {
        let mpi = Mpi::from_slice(&[0x05]);
        assert_eq!(mpi.to_padded(3).unwrap().as_slice(), &[0, 0, 5]);
        assert!(Mpi::from_slice(&[1, 2, 3]).to_padded(2).is_none());
    }

    #[test]
    fn test_reader_fields() {
        let data = [0x04, 0x00, 0x00, 0x00, 0x2A, 0x00, 0x0A, 0x02, 0xFF, 0x01];
        let mut reader = BodyReader::new(Tag::PublicKey, &data);
        assert_eq!(reader.u8().unwrap(), 4);
        assert_eq!(reader.u32().unwrap(), 42);
        let mpi = reader.mpi().unwrap();
        assert_eq!(mpi.as_bytes(), &[0x02, 0xFF]);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.finish().is_err());
        assert_eq!(reader.rest(), &[0x01]);
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_mpi_bit_count_must_be_exact() {
        // 0x02FF is 10 bits; 9, 11 and 16 all address the same two octets
        for declared in [9u16, 11, 16] {
            let mut data = declared.to_be_bytes().to_vec();
            data.extend_from_slice(&[0x02, 0xFF]);
            let mut reader = BodyReader::new(Tag::PublicKey, &data);
            assert!(
                matches!(reader.mpi(), Err(Error::MalformedPacket(_))),
                "{} bits",
                declared
            );
        }

        let mut reader = BodyReader::new(Tag::PublicKey, &[0x00, 0x00]);
        assert_eq!(reader.mpi().unwrap().bit_len(), 0);
    }

    #[test]
    fn test_reader_truncation() {
        let data = [0x00, 0x20, 0x01];
        let mut reader = BodyReader::new(Tag::Signature, &data);
        let err = reader.mpi().unwrap_err();
        assert!(matches!(
            err,
            Error::TruncatedPacket {
                tag: 2,
                declared: 4,
                remaining: 1
            }
        ));
    }
}
