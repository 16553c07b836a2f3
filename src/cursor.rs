use crate::error::ClassFileError;

/// Big-endian reader over a class file or a slice of it.
#[derive(Clone)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassFileError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| {
                ClassFileError::malformed(format!(
                    "truncated: need {len} bytes at offset {}, have {}",
                    self.pos,
                    self.remaining()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn skip(&mut self, len: usize) -> Result<(), ClassFileError> {
        self.bytes(len).map(|_| ())
    }

    pub(crate) fn u1(&mut self) -> Result<u8, ClassFileError> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u2(&mut self) -> Result<u16, ClassFileError> {
        let bytes = self.bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn u4(&mut self) -> Result<u32, ClassFileError> {
        let bytes = self.bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn i4(&mut self) -> Result<i32, ClassFileError> {
        self.u4().map(|value| value as i32)
    }

    pub(crate) fn u8(&mut self) -> Result<u64, ClassFileError> {
        let high = self.u4()? as u64;
        let low = self.u4()? as u64;
        Ok((high << 32) | low)
    }

    /// Length field of an attribute. Values at or above 2^31 are rejected.
    pub(crate) fn attribute_length(&mut self) -> Result<usize, ClassFileError> {
        let length = self.u4()?;
        if length > i32::MAX as u32 {
            return Err(ClassFileError::malformed(format!(
                "attribute length {length} out of range"
            )));
        }
        Ok(length as usize)
    }
}
