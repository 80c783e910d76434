//! Length-prefixed binary layout shared by claims, links and chains.
//!
//! Every variable-length field is written as a big-endian `u32` length
//! followed by that many bytes. Booleans are a single `0`/`1` byte. Readers
//! check each declared length against a caller-supplied limit before
//! allocating, so hostile input cannot force large allocations.

use crate::IdentityError;

/// The largest field accepted by any reader in this crate: 2 MiB
pub const MAX_FIELD_SIZE: usize = 2 * 1024 * 1024;

#[derive(Debug, Default)]
pub(crate) struct ByteWriter(Vec<u8>);

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u32(&mut self, value: u32) {
        self.0.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        // Fields are bounded well below u32::MAX by MAX_FIELD_SIZE
        self.write_u32(bytes.len() as u32);
        self.0.extend_from_slice(bytes);
    }

    pub fn write_string(&mut self, value: &str) {
        self.write_bytes(value.as_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.0.push(value as u8);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }
}

#[derive(Debug)]
pub(crate) struct ByteReader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    pub fn is_exhausted(&self) -> bool {
        self.position >= self.bytes.len()
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], IdentityError> {
        let end = self
            .position
            .checked_add(count)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| {
                IdentityError::Malformed(format!(
                    "expected {} more bytes at offset {}, found {}",
                    count,
                    self.position,
                    self.bytes.len().saturating_sub(self.position)
                ))
            })?;
        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    pub fn read_u32(&mut self) -> Result<u32, IdentityError> {
        let mut buffer = [0u8; 4];
        buffer.copy_from_slice(self.take(4)?);
        Ok(u32::from_be_bytes(buffer))
    }

    pub fn read_bytes(&mut self, limit: usize) -> Result<&'a [u8], IdentityError> {
        let size = self.read_u32()? as usize;
        if size > limit {
            return Err(IdentityError::FieldTooLarge { size, limit });
        }
        self.take(size)
    }

    pub fn read_string(&mut self, limit: usize) -> Result<String, IdentityError> {
        let bytes = self.read_bytes(limit)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|error| IdentityError::Malformed(format!("invalid UTF-8: {error}")))
    }

    pub fn read_bool(&mut self) -> Result<bool, IdentityError> {
        match self.take(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(IdentityError::Malformed(format!(
                "invalid boolean byte {other:#04x}"
            ))),
        }
    }

    /// Fails unless every byte has been consumed
    pub fn finish(self) -> Result<(), IdentityError> {
        if self.is_exhausted() {
            Ok(())
        } else {
            Err(IdentityError::Malformed(format!(
                "{} trailing bytes",
                self.bytes.len() - self.position
            )))
        }
    }
}
