use thiserror::Error;

/// Crate-local result type.
pub type Result<T> = std::result::Result<T, InspectError>;

/// Errors produced while resolving metadata, computing layouts, and formatting values.
#[derive(Debug, Error)]
pub enum InspectError {
	/// Filesystem or stream IO failure.
	#[error("io: {0}")]
	Io(#[from] std::io::Error),
	/// No loaded module provides metadata for the requested type.
	#[error("unresolved metadata for type {symbol}")]
	UnresolvedMetadata {
		/// Symbolic type name that failed to resolve.
		symbol: String,
	},
	/// A metadata record exists but is structurally invalid.
	#[error("malformed metadata for type {symbol}: {reason}")]
	MalformedMetadata {
		/// Symbolic type name of the offending record.
		symbol: String,
		/// Short description of the defect.
		reason: String,
	},
	/// A computed member range would read past the known extent of its container.
	#[error("layout out of bounds: offset={offset}, size={size}, extent={extent}")]
	OutOfBounds {
		/// Byte offset of the offending range.
		offset: u64,
		/// Byte size of the offending range.
		size: u64,
		/// Known extent of the containing value.
		extent: u64,
	},
	/// Enum discriminator does not map to a declared case.
	#[error("invalid tag {tag} for {type_name} ({case_count} cases)")]
	InvalidTag {
		/// Enum type name.
		type_name: String,
		/// Discriminator value read from memory.
		tag: u64,
		/// Number of declared cases.
		case_count: usize,
	},
	/// Process memory could not be read.
	#[error("memory unavailable at 0x{addr:016x} (len={len})")]
	MemoryUnavailable {
		/// Requested start address.
		addr: u64,
		/// Requested byte count.
		len: u64,
	},
	/// Not enough bytes remained for a requested read.
	#[error("unexpected eof at offset {at}, need {need} bytes, remaining {rem}")]
	UnexpectedEof {
		/// Byte offset where the read was attempted.
		at: usize,
		/// Requested bytes.
		need: usize,
		/// Bytes still available.
		rem: usize,
	},
	/// Unknown leading file magic.
	#[error("unrecognized file magic {magic:?}")]
	BadMagic {
		/// First up-to-4 bytes of the stream.
		magic: [u8; 4],
	},
	/// Unexpected section tag inside a metadata image.
	#[error("image tag mismatch at {at}: expected {expected:?}, got {got:?}")]
	BadSectionTag {
		/// Expected section tag.
		expected: [u8; 4],
		/// Actual section tag.
		got: [u8; 4],
		/// Cursor offset of the tag read.
		at: usize,
	},
	/// Out-of-range index inside image tables.
	#[error("image index out of range for {kind}: idx={idx}, max={max}")]
	IndexOutOfRange {
		/// Logical index kind being validated.
		kind: &'static str,
		/// Offending index value.
		idx: u32,
		/// Maximum valid index.
		max: u32,
	},
	/// Record kind byte is not known.
	#[error("unknown record kind {kind} at {at}")]
	UnknownRecordKind {
		/// Raw kind byte.
		kind: u8,
		/// Cursor offset of the record.
		at: usize,
	},
	/// Unsupported image container version.
	#[error("unsupported image version {version} (expected 1)")]
	UnsupportedImageVersion {
		/// Parsed version.
		version: u16,
	},
	/// Pointer width is neither 4 nor 8 bytes.
	#[error("unsupported pointer size {size}")]
	UnsupportedPointerSize {
		/// Declared pointer width.
		size: usize,
	},
	/// Decompression output exceeded configured safety limit.
	#[error("decompressed output exceeded limit {limit} bytes")]
	DecompressedTooLarge {
		/// Maximum allowed output bytes.
		limit: usize,
	},
	/// A module with the same name is already loaded.
	#[error("module already loaded: {name}")]
	ModuleAlreadyLoaded {
		/// Module name.
		name: String,
	},
	/// Requested module is not loaded.
	#[error("module not loaded: {name}")]
	ModuleNotLoaded {
		/// Module name.
		name: String,
	},
	/// CLI pointer literal was invalid.
	#[error("invalid pointer literal: {value}")]
	InvalidPointerLiteral {
		/// User-provided literal.
		value: String,
	},
	/// CLI variable spec was not `name=Type@addr`.
	#[error("invalid variable spec: {spec}")]
	InvalidVariableSpec {
		/// User-provided spec.
		spec: String,
	},
}

impl InspectError {
	pub(crate) fn malformed(symbol: &str, reason: impl Into<String>) -> Self {
		Self::MalformedMetadata {
			symbol: symbol.to_owned(),
			reason: reason.into(),
		}
	}

	/// Short stable label for the error class, used by frontends for placeholders.
	pub fn kind_label(&self) -> &'static str {
		match self {
			Self::Io(_) => "io",
			Self::UnresolvedMetadata { .. } => "unresolved_metadata",
			Self::MalformedMetadata { .. } => "malformed_metadata",
			Self::OutOfBounds { .. } => "out_of_bounds",
			Self::InvalidTag { .. } => "invalid_tag",
			Self::MemoryUnavailable { .. } => "memory_unavailable",
			Self::UnexpectedEof { .. }
			| Self::BadMagic { .. }
			| Self::BadSectionTag { .. }
			| Self::IndexOutOfRange { .. }
			| Self::UnknownRecordKind { .. }
			| Self::UnsupportedImageVersion { .. }
			| Self::UnsupportedPointerSize { .. }
			| Self::DecompressedTooLarge { .. } => "bad_input",
			Self::ModuleAlreadyLoaded { .. } | Self::ModuleNotLoaded { .. } => "module",
			Self::InvalidPointerLiteral { .. } | Self::InvalidVariableSpec { .. } => "usage",
		}
	}
}
