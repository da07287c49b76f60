use crate::inspect::{InspectError, Result};

/// Simple bounded cursor over an immutable byte slice.
pub struct Cursor<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl<'a> Cursor<'a> {
	/// Create a cursor at position 0.
	pub fn new(bytes: &'a [u8]) -> Self {
		Self { bytes, pos: 0 }
	}

	/// Return current byte offset.
	pub fn pos(&self) -> usize {
		self.pos
	}

	/// Return remaining unread bytes.
	pub fn remaining(&self) -> usize {
		self.bytes.len().saturating_sub(self.pos)
	}

	/// Read exactly `n` bytes and advance cursor.
	pub fn read_exact(&mut self, n: usize) -> Result<&'a [u8]> {
		if n > self.remaining() {
			return Err(InspectError::UnexpectedEof {
				at: self.pos,
				need: n,
				rem: self.remaining(),
			});
		}

		let start = self.pos;
		self.pos += n;
		Ok(&self.bytes[start..self.pos])
	}

	/// Read a four-byte code.
	pub fn read_code4(&mut self) -> Result<[u8; 4]> {
		let raw = self.read_exact(4)?;
		let mut out = [0_u8; 4];
		out.copy_from_slice(raw);
		Ok(out)
	}

	/// Read one byte.
	pub fn read_u8(&mut self) -> Result<u8> {
		Ok(self.read_exact(1)?[0])
	}

	/// Read a little-endian `u16`.
	pub fn read_u16_le(&mut self) -> Result<u16> {
		let raw = self.read_exact(2)?;
		let mut buf = [0_u8; 2];
		buf.copy_from_slice(raw);
		Ok(u16::from_le_bytes(buf))
	}

	/// Read a little-endian `u32`.
	pub fn read_u32_le(&mut self) -> Result<u32> {
		let raw = self.read_exact(4)?;
		let mut buf = [0_u8; 4];
		buf.copy_from_slice(raw);
		Ok(u32::from_le_bytes(buf))
	}

	/// Read a little-endian `u64`.
	pub fn read_u64_le(&mut self) -> Result<u64> {
		let raw = self.read_exact(8)?;
		let mut buf = [0_u8; 8];
		buf.copy_from_slice(raw);
		Ok(u64::from_le_bytes(buf))
	}

	/// Advance to the next 4-byte aligned position.
	pub fn align4(&mut self) -> Result<()> {
		let aligned = (self.pos + 3) & !3;
		let skip = aligned.saturating_sub(self.pos);
		let _ = self.read_exact(skip)?;
		Ok(())
	}

	/// Read a zero-terminated byte string without the terminator.
	pub fn read_cstring_bytes(&mut self) -> Result<&'a [u8]> {
		let start = self.pos;
		let rem = &self.bytes[self.pos..];
		let Some(rel_end) = rem.iter().position(|byte| *byte == 0) else {
			return Err(InspectError::UnexpectedEof {
				at: self.pos,
				need: 1,
				rem: self.remaining(),
			});
		};

		let end = start + rel_end;
		self.pos = end + 1;
		Ok(&self.bytes[start..end])
	}
}

#[cfg(test)]
mod tests {
	use super::Cursor;
	use crate::inspect::InspectError;

	#[test]
	fn align4_skips_to_boundary() {
		let bytes = [b'a', 0, 0, 0, 7, 0, 0, 0];
		let mut cursor = Cursor::new(&bytes);
		assert_eq!(cursor.read_cstring_bytes().expect("cstring"), b"a");
		cursor.align4().expect("align");
		assert_eq!(cursor.read_u32_le().expect("u32"), 7);
		assert_eq!(cursor.remaining(), 0);
	}

	#[test]
	fn short_read_reports_eof_position() {
		let bytes = [1_u8, 2];
		let mut cursor = Cursor::new(&bytes);
		let err = cursor.read_u32_le().expect_err("must fail");
		assert!(matches!(err, InspectError::UnexpectedEof { at: 0, need: 4, rem: 2 }));
	}
}
