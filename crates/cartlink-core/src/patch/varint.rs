//! BPS-style variable length integers and a bounds-checked byte reader.

use super::PatchError;

pub(crate) fn write(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let x = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(0x80 | x);
            break;
        }
        out.push(x);
        value -= 1;
    }
}

pub(crate) fn write_signed(out: &mut Vec<u8>, value: i64) {
    let magnitude = value.unsigned_abs();
    write(out, (magnitude << 1) | u64::from(value < 0));
}

pub(crate) struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub(crate) fn u8(&mut self) -> Result<u8, PatchError> {
        let byte = *self.data.get(self.pos).ok_or(PatchError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    pub(crate) fn bytes(&mut self, len: usize) -> Result<&'a [u8], PatchError> {
        let end = self.pos.checked_add(len).ok_or(PatchError::Truncated)?;
        let slice = self.data.get(self.pos..end).ok_or(PatchError::Truncated)?;
        self.pos = end;
        Ok(slice)
    }

    pub(crate) fn u32_le(&mut self) -> Result<u32, PatchError> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn varint(&mut self) -> Result<u64, PatchError> {
        let overflow = || PatchError::Malformed("integer overflow".into());
        let mut data: u64 = 0;
        let mut shift: u64 = 1;
        loop {
            let x = self.u8()?;
            let part = u64::from(x & 0x7F).checked_mul(shift).ok_or_else(overflow)?;
            data = data.checked_add(part).ok_or_else(overflow)?;
            if x & 0x80 != 0 {
                return Ok(data);
            }
            shift = shift.checked_mul(128).ok_or_else(overflow)?;
            data = data.checked_add(shift).ok_or_else(overflow)?;
        }
    }

    pub(crate) fn varint_usize(&mut self) -> Result<usize, PatchError> {
        usize::try_from(self.varint()?).map_err(|_| PatchError::Malformed("value too large".into()))
    }

    pub(crate) fn signed(&mut self) -> Result<i64, PatchError> {
        let raw = self.varint()?;
        let magnitude =
            i64::try_from(raw >> 1).map_err(|_| PatchError::Malformed("offset too large".into()))?;
        Ok(if raw & 1 != 0 { -magnitude } else { magnitude })
    }
}
