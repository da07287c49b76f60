use std::io::Read;

use crate::inspect::{InspectError, Result};

const IMAGE_MAGIC: &[u8] = b"TYMD";
const SNAPSHOT_MAGIC: &[u8] = b"MSNP";
const MAX_DECOMPRESSED_BYTES: usize = 512 * 1024 * 1024;
/// zstd frame magic used by compressed image and snapshot files.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Compression mode detected for a source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
	/// Raw uncompressed stream.
	None,
	/// zstd-compressed stream.
	Zstd,
}

impl Compression {
	/// Render compression mode as a stable lowercase label.
	pub fn as_str(self) -> &'static str {
		match self {
			Self::None => "none",
			Self::Zstd => "zstd",
		}
	}
}

/// Detect and decode compression, returning `(mode, decoded_bytes)`.
pub fn decode_bytes(raw: Vec<u8>) -> Result<(Compression, Vec<u8>)> {
	if is_known_format(&raw) {
		return Ok((Compression::None, raw));
	}

	if raw.starts_with(&ZSTD_MAGIC) {
		let out = decode_zstd(&raw)?;
		return Ok((Compression::Zstd, out));
	}

	Err(InspectError::BadMagic { magic: first4(&raw) })
}

fn decode_zstd(raw: &[u8]) -> Result<Vec<u8>> {
	let mut decoder = zstd::stream::read::Decoder::new(raw)?;
	let mut out = Vec::new();
	let mut buf = [0_u8; 8192];

	loop {
		let read = decoder.read(&mut buf)?;
		if read == 0 {
			break;
		}

		if out.len() + read > MAX_DECOMPRESSED_BYTES {
			return Err(InspectError::DecompressedTooLarge { limit: MAX_DECOMPRESSED_BYTES });
		}

		out.extend_from_slice(&buf[..read]);
	}

	if !is_known_format(&out) {
		return Err(InspectError::BadMagic { magic: first4(&out) });
	}

	Ok(out)
}

fn is_known_format(bytes: &[u8]) -> bool {
	bytes.starts_with(IMAGE_MAGIC) || bytes.starts_with(SNAPSHOT_MAGIC)
}

fn first4(bytes: &[u8]) -> [u8; 4] {
	let mut magic = [0_u8; 4];
	let take = bytes.len().min(4);
	magic[..take].copy_from_slice(&bytes[..take]);
	magic
}
