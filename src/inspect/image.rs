use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::inspect::bytes::Cursor;
use crate::inspect::compression::{Compression, decode_bytes};
use crate::inspect::{InspectError, Result};

const IMAGE_VERSION: u16 = 1;
const NO_PAYLOAD: u32 = u32::MAX;

pub(crate) const RECORD_RESILIENT: u8 = 0x1;
pub(crate) const RECORD_SPARE_BITS: u8 = 0x2;
pub(crate) const ENTRY_INDIRECT: u32 = 0x1;
pub(crate) const ENTRY_HIDDEN: u32 = 0x2;

/// Parsed type metadata published by one loaded module.
#[derive(Debug)]
pub struct ModuleImage {
	/// Module name used for cache invalidation.
	pub name: Box<str>,
	/// Records in image order.
	pub records: Vec<Arc<MetadataRecord>>,
	by_symbol: HashMap<Box<str>, usize>,
}

/// One raw, unresolved type record.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
	/// Symbolic type name.
	pub symbol: Box<str>,
	/// Kind-specific payload, member types still symbolic.
	pub kind: RecordKind,
}

/// Kind-specific record body.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordKind {
	/// Fixed-width leaf value.
	Scalar {
		/// Raw encoding selector.
		encoding: u32,
		/// Width in bytes.
		size: u32,
		/// Alignment in bytes.
		align: u32,
	},
	/// Ordered member aggregate.
	Struct {
		/// Members in declaration order.
		members: Vec<RawMember>,
		/// Runtime value witness address for resilient structs.
		witness: Option<u64>,
	},
	/// Tagged union.
	Enum {
		/// Cases in discriminator order.
		cases: Vec<RawCase>,
		/// Spare-bit tag placement, when the tag lives inside the payload.
		spare_bits: Option<RawSpareBits>,
	},
	/// Two-case `some`/`none` wrapper.
	Optional {
		/// Wrapped type symbol.
		payload: Box<str>,
		/// Spare-bit tag placement, when the tag lives inside the payload.
		spare_bits: Option<RawSpareBits>,
	},
	/// Leaf with runtime-provided storage.
	Opaque(RawStorage),
}

/// Unresolved struct member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMember {
	/// Member name.
	pub name: Box<str>,
	/// Member type symbol.
	pub type_name: Box<str>,
	/// Raw member flags.
	pub flags: u32,
}

/// Unresolved enum case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCase {
	/// Case name.
	pub name: Box<str>,
	/// Payload type symbol, if the case carries one.
	pub payload: Option<Box<str>>,
	/// Raw case flags.
	pub flags: u32,
}

/// Spare-bit tag placement inside an enum payload area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawSpareBits {
	/// Byte offset of the tag word within the payload area.
	pub offset: u32,
	/// Width of the tag word in bytes.
	pub width: u32,
	/// Bits of the tag word that hold the discriminator.
	pub mask: u64,
}

/// Storage declaration for opaque leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawStorage {
	/// Statically known size.
	Fixed {
		/// Size in bytes.
		size: u32,
		/// Alignment in bytes.
		align: u32,
	},
	/// Size read from a value witness record in process memory.
	Witness {
		/// Witness record address.
		addr: u64,
	},
	/// Size read from a length header at the start of each instance.
	Prefixed {
		/// Header width in bytes.
		header_width: u32,
		/// Alignment in bytes.
		align: u32,
	},
}

impl ModuleImage {
	/// Read, decompress if needed, and parse an image file; the module is named after the file stem.
	pub fn open(path: impl AsRef<Path>) -> Result<Self> {
		Ok(Self::open_with_compression(path)?.1)
	}

	/// Like [`ModuleImage::open`], also reporting how the file was stored.
	pub fn open_with_compression(path: impl AsRef<Path>) -> Result<(Compression, Self)> {
		let path = path.as_ref();
		let raw = fs::read(path)?;
		let (compression, bytes) = decode_bytes(raw)?;
		let name = path.file_stem().map(|stem| stem.to_string_lossy().into_owned()).unwrap_or_default();
		let name = name.split('.').next().unwrap_or_default().to_owned();
		Ok((compression, Self::parse(&name, &bytes)?))
	}

	/// Parse `TYMD` image bytes.
	pub fn parse(name: &str, bytes: &[u8]) -> Result<Self> {
		let mut cursor = Cursor::new(bytes);

		expect_tag(&mut cursor, *b"TYMD")?;
		let version = cursor.read_u16_le()?;
		if version != IMAGE_VERSION {
			return Err(InspectError::UnsupportedImageVersion { version });
		}
		let _reserved = cursor.read_u16_le()?;

		expect_tag(&mut cursor, *b"NAME")?;
		let name_count = cursor.read_u32_le()? as usize;
		let mut names = Vec::with_capacity(name_count.min(bytes.len()));
		for _ in 0..name_count {
			names.push(read_lossy_string(&mut cursor)?);
		}
		cursor.align4()?;

		expect_tag(&mut cursor, *b"RECS")?;
		let record_count = cursor.read_u32_le()? as usize;
		let mut records = Vec::with_capacity(record_count.min(bytes.len()));
		for _ in 0..record_count {
			records.push(parse_record(&mut cursor, &names)?);
		}

		Self::from_records(name, records)
	}

	/// Build an image from already-decoded records.
	pub fn from_records(name: &str, records: Vec<MetadataRecord>) -> Result<Self> {
		let mut by_symbol = HashMap::with_capacity(records.len());
		for (idx, record) in records.iter().enumerate() {
			if by_symbol.insert(record.symbol.clone(), idx).is_some() {
				return Err(InspectError::malformed(&record.symbol, format!("duplicate record in module {name}")));
			}
		}

		Ok(Self {
			name: name.into(),
			records: records.into_iter().map(Arc::new).collect(),
			by_symbol,
		})
	}

	/// Look up a record by symbolic type name.
	pub fn record(&self, symbol: &str) -> Option<&Arc<MetadataRecord>> {
		self.by_symbol.get(symbol).and_then(|idx| self.records.get(*idx))
	}
}

impl RecordKind {
	/// Stable lowercase kind label.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Scalar { .. } => "scalar",
			Self::Struct { .. } => "struct",
			Self::Enum { .. } => "enum",
			Self::Optional { .. } => "optional",
			Self::Opaque(_) => "opaque",
		}
	}
}

impl RawMember {
	/// Whether the member is stored out of line behind a pointer.
	pub fn is_indirect(&self) -> bool {
		self.flags & ENTRY_INDIRECT != 0
	}

	/// Whether the runtime injected this member rather than the source declaring it.
	pub fn is_hidden(&self) -> bool {
		self.flags & ENTRY_HIDDEN != 0
	}
}

impl RawCase {
	/// Whether the payload is stored out of line behind a pointer.
	pub fn is_indirect(&self) -> bool {
		self.flags & ENTRY_INDIRECT != 0
	}
}

fn parse_record(cursor: &mut Cursor<'_>, names: &[Box<str>]) -> Result<MetadataRecord> {
	let at = cursor.pos();
	let symbol = name_at(names, cursor.read_u32_le()?, "record.symbol")?;
	let kind = cursor.read_u8()?;
	let flags = cursor.read_u8()?;
	let _reserved = cursor.read_u16_le()?;

	let kind = match kind {
		0 => RecordKind::Scalar {
			encoding: cursor.read_u32_le()?,
			size: cursor.read_u32_le()?,
			align: cursor.read_u32_le()?,
		},
		1 => {
			let count = cursor.read_u32_le()? as usize;
			let mut members = Vec::with_capacity(count.min(cursor.remaining()));
			for _ in 0..count {
				members.push(RawMember {
					name: name_at(names, cursor.read_u32_le()?, "member.name")?,
					type_name: name_at(names, cursor.read_u32_le()?, "member.type")?,
					flags: cursor.read_u32_le()?,
				});
			}
			let witness = if flags & RECORD_RESILIENT != 0 { Some(cursor.read_u64_le()?) } else { None };
			RecordKind::Struct { members, witness }
		}
		2 => {
			let count = cursor.read_u32_le()? as usize;
			let mut cases = Vec::with_capacity(count.min(cursor.remaining()));
			for _ in 0..count {
				let name = name_at(names, cursor.read_u32_le()?, "case.name")?;
				let payload_idx = cursor.read_u32_le()?;
				let payload = if payload_idx == NO_PAYLOAD {
					None
				} else {
					Some(name_at(names, payload_idx, "case.payload")?)
				};
				cases.push(RawCase {
					name,
					payload,
					flags: cursor.read_u32_le()?,
				});
			}
			RecordKind::Enum {
				cases,
				spare_bits: read_spare_bits(cursor, flags)?,
			}
		}
		3 => RecordKind::Optional {
			payload: name_at(names, cursor.read_u32_le()?, "optional.payload")?,
			spare_bits: read_spare_bits(cursor, flags)?,
		},
		4 => RecordKind::Opaque(read_storage(cursor)?),
		other => return Err(InspectError::UnknownRecordKind { kind: other, at }),
	};

	Ok(MetadataRecord { symbol, kind })
}

fn read_spare_bits(cursor: &mut Cursor<'_>, flags: u8) -> Result<Option<RawSpareBits>> {
	if flags & RECORD_SPARE_BITS == 0 {
		return Ok(None);
	}
	Ok(Some(RawSpareBits {
		offset: cursor.read_u32_le()?,
		width: cursor.read_u32_le()?,
		mask: cursor.read_u64_le()?,
	}))
}

fn read_storage(cursor: &mut Cursor<'_>) -> Result<RawStorage> {
	match cursor.read_u32_le()? {
		0 => Ok(RawStorage::Fixed {
			size: cursor.read_u32_le()?,
			align: cursor.read_u32_le()?,
		}),
		1 => Ok(RawStorage::Witness { addr: cursor.read_u64_le()? }),
		2 => Ok(RawStorage::Prefixed {
			header_width: cursor.read_u32_le()?,
			align: cursor.read_u32_le()?,
		}),
		other => Err(InspectError::IndexOutOfRange {
			kind: "opaque.storage",
			idx: other,
			max: 2,
		}),
	}
}

fn name_at(names: &[Box<str>], idx: u32, kind: &'static str) -> Result<Box<str>> {
	names.get(idx as usize).cloned().ok_or(InspectError::IndexOutOfRange {
		kind,
		idx,
		max: names.len().saturating_sub(1) as u32,
	})
}

fn expect_tag(cursor: &mut Cursor<'_>, expected: [u8; 4]) -> Result<()> {
	let at = cursor.pos();
	let got = cursor.read_code4()?;
	if got != expected {
		return Err(InspectError::BadSectionTag { expected, got, at });
	}
	Ok(())
}

fn read_lossy_string(cursor: &mut Cursor<'_>) -> Result<Box<str>> {
	let bytes = cursor.read_cstring_bytes()?;
	Ok(String::from_utf8_lossy(bytes).into_owned().into_boxed_str())
}
