use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

/// Random-access reader/writer over an in-memory buffer.
///
/// All primitives are little-endian. Positions are absolute byte offsets
/// into the buffer; alignment is computed against `align_base + position`
/// so that a cursor over a carved-out region can still honor the
/// absolute-position alignment rules of the surrounding file.
#[derive(Debug, Clone)]
pub struct BinaryCursor {
    data: Vec<u8>,
    pos: usize,
    align_base: u64,
    queued_strings: Vec<(usize, String)>,
}

impl BinaryCursor {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            pos: 0,
            align_base: 0,
            queued_strings: Vec::new(),
        }
    }

    /// Cursor over a region whose byte 0 sits at absolute file offset
    /// `base`. Only `base % 16` matters for alignment.
    pub fn with_align_base(data: Vec<u8>, base: u64) -> Self {
        let mut cursor = Self::new(data);
        cursor.align_base = base;
        cursor
    }

    pub fn align_base(&self) -> u64 {
        self.align_base
    }

    pub fn tell(&self) -> u64 {
        self.pos as u64
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        self.pos = usize::try_from(pos)?;
        Ok(())
    }

    /// Runs `f` at `pos`, restoring the current position on every exit
    /// path, failure included.
    pub fn at<T>(&mut self, pos: u64, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let saved = self.pos;
        let result = self.seek(pos).and_then(|_| f(self));
        self.pos = saved;
        result
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    pub fn skip(&mut self, count: usize) {
        self.pos += count;
    }

    /// Grows the backing buffer with zeros up to `required` bytes.
    pub fn ensure_capacity(&mut self, required: usize) {
        if required > self.data.len() {
            self.data.resize(required, 0u8);
        }
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let available = self.data.len().saturating_sub(self.pos);
        if available < count {
            return Err(Error::Truncated {
                offset: self.pos as u64,
                expected: count,
                actual: available,
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Consumes `count` bytes without interpreting them.
    pub fn skip_padding(&mut self, count: usize) -> Result<()> {
        self.take(count)?;
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.ensure_capacity(self.pos + bytes.len());
        self.data[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// Skips forward so that `align_base + position` is a multiple of
    /// `alignment`.
    pub fn align(&mut self, alignment: u64) {
        if alignment > 1 {
            let rem = (self.pos as u64 + self.align_base) % alignment;
            if rem != 0 {
                self.pos += (alignment - rem) as usize;
            }
        }
    }

    /// As [`Self::align`], but materializes the padding as zero bytes.
    pub fn align_write(&mut self, alignment: u64) {
        if alignment > 1 {
            let rem = (self.pos as u64 + self.align_base) % alignment;
            if rem != 0 {
                let padding = (alignment - rem) as usize;
                self.write_bytes(&vec![0u8; padding]);
            }
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.take(1)?[0] != 0)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    pub fn read_guid(&mut self) -> Result<[u8; 16]> {
        let mut guid = [0u8; 16];
        guid.copy_from_slice(self.take(16)?);
        Ok(guid)
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.write_bytes(&[value as u8]);
    }

    pub fn write_bool(&mut self, value: bool) {
        self.write_bytes(&[u8::from(value)]);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_u16(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_i16(&mut self, value: i16) {
        let mut buf = [0u8; 2];
        LittleEndian::write_i16(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_u32(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_i32(&mut self, value: i32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_i32(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_u64(&mut self, value: u64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_u64(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_i64(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_f32(&mut self, value: f32) {
        let mut buf = [0u8; 4];
        LittleEndian::write_f32(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut buf = [0u8; 8];
        LittleEndian::write_f64(&mut buf, value);
        self.write_bytes(&buf);
    }

    pub fn write_guid(&mut self, guid: &[u8; 16]) {
        self.write_bytes(guid);
    }

    pub fn write_u32_at(&mut self, offset: u64, value: u32) -> Result<()> {
        self.at(offset, |cursor| {
            cursor.write_u32(value);
            Ok(())
        })
    }

    pub fn write_u64_at(&mut self, offset: u64, value: u64) -> Result<()> {
        self.at(offset, |cursor| {
            cursor.write_u64(value);
            Ok(())
        })
    }

    /// Reads a UTF-16LE string terminated by `0x0000`, consuming the
    /// terminator. The terminator is not part of the returned value.
    pub fn read_wstring(&mut self) -> Result<String> {
        let mut units = Vec::new();
        loop {
            let unit = self.read_u16()?;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        Ok(String::from_utf16(&units)?)
    }

    /// Reads a terminated UTF-16LE string at `offset` without moving the
    /// cursor. An offset outside the buffer yields an empty string; byte
    /// content that is not valid UTF-16 is replaced, never fatal.
    pub fn read_wstring_at(&self, offset: u64) -> (String, u64) {
        if offset as usize >= self.data.len() {
            log::warn!(
                "invalid string offset {:#x} (buffer size {:#x})",
                offset,
                self.data.len()
            );
            return (String::new(), offset);
        }

        let mut units = Vec::new();
        let mut pos = offset as usize;
        while pos + 1 < self.data.len() {
            let unit = LittleEndian::read_u16(&self.data[pos..pos + 2]);
            pos += 2;
            if unit == 0 {
                break;
            }
            units.push(unit);
        }
        (String::from_utf16_lossy(&units), pos as u64)
    }

    pub fn write_wstring(&mut self, value: &str) {
        for unit in value.encode_utf16() {
            self.write_u16(unit);
        }
        self.write_u16(0);
    }

    /// Reads a `u32` code-unit count followed by that many UTF-16LE
    /// units. Field-level strings include their terminator in the count,
    /// so the decoded value is returned untrimmed.
    pub fn read_prefixed_utf16(&mut self) -> Result<String> {
        let count = self.read_u32()? as usize;
        if count == 0 {
            return Ok(String::new());
        }
        let bytes = self.take(count * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Reads a `u32` byte count followed by that many UTF-8 bytes.
    pub fn read_prefixed_utf8(&mut self) -> Result<String> {
        let count = self.read_u32()? as usize;
        if count == 0 {
            return Ok(String::new());
        }
        let bytes = self.take(count)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Writes an 8-byte zero placeholder and queues `value` for
    /// [`Self::flush_string_table`].
    pub fn queue_string(&mut self, value: &str) {
        let slot = self.pos;
        self.write_u64(0);
        self.queued_strings.push((slot, value.to_owned()));
    }

    /// Emits every queued string at the current position, one copy per
    /// distinct value in queue order, then patches each placeholder slot
    /// with its string's offset relative to `relative_to`.
    pub fn flush_string_table(&mut self, relative_to: u64) -> Result<()> {
        let queued = std::mem::take(&mut self.queued_strings);
        let mut first_offsets: Vec<(String, u64)> = Vec::new();

        for (slot, value) in &queued {
            let offset = match first_offsets.iter().find(|(v, _)| v == value) {
                Some((_, offset)) => *offset,
                None => {
                    let offset = self.tell();
                    self.write_wstring(value);
                    first_offsets.push((value.clone(), offset));
                    offset
                }
            };
            self.write_u64_at(*slot as u64, offset - relative_to)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_round_trip() {
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(0xCAFEBABE);
        cursor.write_i16(-2);
        cursor.write_f64(1.5);
        cursor.write_bool(true);

        cursor.seek(0).unwrap();
        assert_eq!(cursor.read_u32().unwrap(), 0xCAFEBABE);
        assert_eq!(cursor.read_i16().unwrap(), -2);
        assert_eq!(cursor.read_f64().unwrap(), 1.5);
        assert!(cursor.read_bool().unwrap());
    }

    #[test]
    fn test_short_read_reports_offset() {
        let mut cursor = BinaryCursor::new(vec![1, 2]);
        match cursor.read_u32() {
            Err(Error::Truncated {
                offset,
                expected,
                actual,
            }) => {
                assert_eq!(offset, 0);
                assert_eq!(expected, 4);
                assert_eq!(actual, 2);
            }
            other => panic!("expected Truncated, got {:?}", other),
        }
    }

    #[test]
    fn test_align_uses_base() {
        let mut cursor = BinaryCursor::with_align_base(vec![0u8; 32], 4);
        cursor.seek(0).unwrap();
        cursor.align(8);
        // absolute offset 4 + base 4 = 8, already aligned
        assert_eq!(cursor.tell(), 4);

        cursor.seek(5).unwrap();
        cursor.align(8);
        assert_eq!(cursor.tell(), 12);
    }

    #[test]
    fn test_align_write_pads_with_zeros() {
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u8(0xFF);
        cursor.align_write(4);
        assert_eq!(cursor.as_slice(), &[0xFF, 0, 0, 0]);
    }

    #[test]
    fn test_scoped_seek_restores_on_failure() {
        let mut cursor = BinaryCursor::new(vec![0u8; 8]);
        cursor.seek(4).unwrap();
        let result = cursor.at(6, |c| c.read_u32().map(|_| ()));
        assert!(result.is_err());
        assert_eq!(cursor.tell(), 4);
    }

    #[test]
    fn test_wstring_round_trip() {
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_wstring("paths/a.mesh");
        cursor.seek(0).unwrap();
        assert_eq!(cursor.read_wstring().unwrap(), "paths/a.mesh");
        assert_eq!(cursor.tell(), 2 * ("paths/a.mesh".len() as u64 + 1));
    }

    #[test]
    fn test_wstring_at_out_of_bounds_is_empty() {
        let cursor = BinaryCursor::new(vec![0u8; 4]);
        let (value, _) = cursor.read_wstring_at(100);
        assert!(value.is_empty());
    }

    #[test]
    fn test_string_table_deduplicates() {
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.queue_string("a");
        cursor.queue_string("bb");
        cursor.queue_string("a");
        cursor.flush_string_table(0).unwrap();

        cursor.seek(0).unwrap();
        let first = cursor.read_u64().unwrap();
        let second = cursor.read_u64().unwrap();
        let third = cursor.read_u64().unwrap();
        assert_eq!(first, 24);
        assert_eq!(third, first);
        assert_ne!(second, first);

        // heap holds "a" once, then "bb"
        let (a, end) = cursor.read_wstring_at(first);
        assert_eq!(a, "a");
        let (bb, _) = cursor.read_wstring_at(end);
        assert_eq!(bb, "bb");
        assert_eq!(second, end);
    }

    #[test]
    fn test_prefixed_utf16_keeps_terminator() {
        let mut cursor = BinaryCursor::new(Vec::new());
        cursor.write_u32(3);
        cursor.write_u16(u16::from(b'h'));
        cursor.write_u16(u16::from(b'i'));
        cursor.write_u16(0);

        cursor.seek(0).unwrap();
        let value = cursor.read_prefixed_utf16().unwrap();
        assert_eq!(value, "hi\0");
    }
}
