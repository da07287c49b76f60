use crate::inspect::{InspectError, Result};

/// Byte order of the inspected process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
	/// Little-endian byte order.
	Little,
	/// Big-endian byte order.
	Big,
}

impl Endianness {
	/// Stable lowercase label.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Little => "little",
			Self::Big => "big",
		}
	}

	/// Widen up to eight bytes into an unsigned integer using this byte order.
	pub fn read_uint(self, bytes: &[u8]) -> u64 {
		let mut value = 0_u64;
		match self {
			Self::Little => {
				for byte in bytes.iter().rev() {
					value = (value << 8) | u64::from(*byte);
				}
			}
			Self::Big => {
				for byte in bytes {
					value = (value << 8) | u64::from(*byte);
				}
			}
		}
		value
	}
}

/// Platform facts the layout rules depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
	/// Pointer width in bytes (4 or 8).
	pub pointer_size: u8,
	/// Process byte order.
	pub endianness: Endianness,
}

impl Default for TargetInfo {
	fn default() -> Self {
		Self::lp64_little()
	}
}

impl TargetInfo {
	/// 64-bit little-endian target (x86_64, aarch64).
	pub fn lp64_little() -> Self {
		Self {
			pointer_size: 8,
			endianness: Endianness::Little,
		}
	}

	/// Build a target description, rejecting unsupported pointer widths.
	pub fn new(pointer_size: u8, endianness: Endianness) -> Result<Self> {
		if !matches!(pointer_size, 4 | 8) {
			return Err(InspectError::UnsupportedPointerSize {
				size: usize::from(pointer_size),
			});
		}
		Ok(Self { pointer_size, endianness })
	}

	/// Pointer width as a layout quantity.
	pub fn pointer_bytes(self) -> u64 {
		u64::from(self.pointer_size)
	}
}
