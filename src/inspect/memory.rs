use std::borrow::Cow;
use std::fs;
use std::path::Path;

use crate::inspect::bytes::Cursor;
use crate::inspect::compression::decode_bytes;
use crate::inspect::{Endianness, InspectError, Result, SpareBitMask, TargetInfo};

/// Read access to a stopped process's memory.
pub trait MemoryReader {
	/// Read exactly `len` bytes at `addr`, failing with `MemoryUnavailable` if any byte is unmapped.
	fn read_bytes(&self, addr: u64, len: usize) -> Result<Cow<'_, [u8]>>;
}

/// One mapped address range of a snapshot.
#[derive(Debug, Clone)]
pub struct MemoryRegion {
	/// First mapped address.
	pub base: u64,
	/// Region contents.
	pub bytes: Vec<u8>,
}

impl MemoryRegion {
	/// One past the last mapped address.
	pub fn end(&self) -> u64 {
		self.base.saturating_add(self.bytes.len() as u64)
	}
}

/// Process memory captured as a set of non-overlapping regions.
#[derive(Debug, Clone)]
pub struct MemorySnapshot {
	/// Target description recorded with the snapshot.
	pub target: TargetInfo,
	regions: Vec<MemoryRegion>,
}

impl MemorySnapshot {
	/// Empty snapshot for `target`.
	pub fn new(target: TargetInfo) -> Self {
		Self { target, regions: Vec::new() }
	}

	/// Read, decompress if needed, and parse an `MSNP` snapshot file.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		let raw = fs::read(path)?;
		let (_, bytes) = decode_bytes(raw)?;
		Self::parse(&bytes)
	}

	/// Parse `MSNP` snapshot bytes.
	pub fn parse(bytes: &[u8]) -> Result<Self> {
		let mut cursor = Cursor::new(bytes);
		let magic = cursor.read_code4()?;
		if &magic != b"MSNP" {
			return Err(InspectError::BadMagic { magic });
		}

		let pointer_size = cursor.read_u8()?;
		let endianness = match cursor.read_u8()? {
			0 => Endianness::Little,
			1 => Endianness::Big,
			other => {
				return Err(InspectError::IndexOutOfRange {
					kind: "snapshot.endianness",
					idx: u32::from(other),
					max: 1,
				});
			}
		};
		let _reserved = cursor.read_u16_le()?;
		let target = TargetInfo::new(pointer_size, endianness)?;

		let mut snapshot = Self::new(target);
		let count = cursor.read_u32_le()?;
		for _ in 0..count {
			let base = cursor.read_u64_le()?;
			let len = cursor.read_u64_le()?;
			let len = usize::try_from(len).map_err(|_| InspectError::UnexpectedEof {
				at: cursor.pos(),
				need: usize::MAX,
				rem: cursor.remaining(),
			})?;
			let bytes = cursor.read_exact(len)?;
			snapshot.add_region(base, bytes.to_vec());
		}

		Ok(snapshot)
	}

	/// Map `bytes` at `base`; later regions shadow earlier ones where they overlap.
	pub fn add_region(&mut self, base: u64, bytes: Vec<u8>) -> &mut Self {
		self.regions.push(MemoryRegion { base, bytes });
		self
	}

	/// Mapped regions in insertion order.
	pub fn regions(&self) -> &[MemoryRegion] {
		&self.regions
	}
}

impl MemoryReader for MemorySnapshot {
	fn read_bytes(&self, addr: u64, len: usize) -> Result<Cow<'_, [u8]>> {
		let unavailable = InspectError::MemoryUnavailable { addr, len: len as u64 };
		let end = addr.checked_add(len as u64).ok_or(unavailable)?;

		for region in self.regions.iter().rev() {
			if addr >= region.base && end <= region.end() {
				let start = (addr - region.base) as usize;
				return Ok(Cow::Borrowed(&region.bytes[start..start + len]));
			}
		}

		Err(InspectError::MemoryUnavailable { addr, len: len as u64 })
	}
}

/// View of another reader with one spare-bit tag word cleared.
pub struct MaskedMemory<'a> {
	inner: &'a dyn MemoryReader,
	mask: SpareBitMask,
}

impl<'a> MaskedMemory<'a> {
	/// Wrap `inner`, clearing `mask` wherever reads overlap it.
	pub fn new(inner: &'a dyn MemoryReader, mask: SpareBitMask) -> Self {
		Self { inner, mask }
	}
}

impl MemoryReader for MaskedMemory<'_> {
	fn read_bytes(&self, addr: u64, len: usize) -> Result<Cow<'_, [u8]>> {
		let raw = self.inner.read_bytes(addr, len)?;
		let end = addr.saturating_add(len as u64);
		let mask_end = self.mask.addr.saturating_add(u64::from(self.mask.width));
		if end <= self.mask.addr || addr >= mask_end {
			return Ok(raw);
		}

		let mut out = raw.into_owned();
		for (idx, mask_byte) in self.mask.mask_bytes().into_iter().enumerate() {
			let byte_addr = self.mask.addr + idx as u64;
			if byte_addr >= addr && byte_addr < end {
				out[(byte_addr - addr) as usize] &= !mask_byte;
			}
		}
		Ok(Cow::Owned(out))
	}
}
