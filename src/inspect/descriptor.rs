use std::fmt;

/// Stable key of a descriptor inside a session's type arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
	/// Arena slot index.
	pub fn index(self) -> usize {
		self.0 as usize
	}
}

impl fmt::Display for TypeId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{}", self.0)
	}
}

/// Resolved, immutable description of one type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
	/// Symbolic type name.
	pub name: Box<str>,
	/// Module that published the metadata.
	pub module: Box<str>,
	/// Kind-specific shape.
	pub kind: TypeKind,
	/// Whether instance sizes are only known at runtime.
	pub dynamic: bool,
	/// Whether the size is read from each instance's own bytes; implies `dynamic`.
	pub per_instance: bool,
}

/// Closed set of type shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
	/// Fixed-width leaf.
	Scalar(ScalarType),
	/// Ordered member aggregate.
	Struct(StructType),
	/// Tagged union.
	Enum(EnumType),
	/// `some(T)` / `none` wrapper, projected like an enum.
	Optional(EnumType),
	/// Leaf with runtime-provided storage and no visible structure.
	Opaque(Storage),
}

/// How a scalar's bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarEncoding {
	/// Two's complement signed integer.
	Signed,
	/// Unsigned integer.
	Unsigned,
	/// IEEE-754 binary float.
	Float,
	/// Zero is false, anything else true.
	Bool,
	/// Address rendered in hex.
	Pointer,
}

/// Scalar width and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarType {
	/// Byte interpretation.
	pub encoding: ScalarEncoding,
	/// Width in bytes.
	pub size: u64,
	/// Alignment in bytes.
	pub align: u64,
}

/// Struct members plus optional resilience witness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructType {
	/// Members in declaration order.
	pub members: Vec<MemberDescriptor>,
	/// Runtime value witness bounding the instance size of a resilient struct.
	pub witness: Option<u64>,
}

/// One resolved struct member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDescriptor {
	/// Member name.
	pub name: Box<str>,
	/// Member type.
	pub ty: TypeId,
	/// Stored behind a pointer.
	pub indirect: bool,
	/// Injected by the runtime rather than declared in source.
	pub hidden: bool,
}

/// Enum cases and the policy locating the discriminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumType {
	/// Cases in discriminator order.
	pub cases: Vec<EnumCaseInfo>,
	/// Discriminator placement.
	pub strategy: TagStrategy,
}

/// One enum case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumCaseInfo {
	/// Case name without a leading dot.
	pub name: Box<str>,
	/// Payload type, if the case carries one.
	pub payload: Option<TypeId>,
	/// Payload stored behind a pointer.
	pub indirect: bool,
}

impl EnumCaseInfo {
	/// Whether the case carries a payload.
	pub fn has_payload(&self) -> bool {
		self.payload.is_some()
	}
}

/// Where an enum keeps its discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStrategy {
	/// Separate tag bytes after the payload area.
	TagBytes,
	/// Discriminator packed into unused payload bits.
	SpareBits {
		/// Byte offset of the tag word inside the payload area.
		offset: u64,
		/// Tag word width in bytes.
		width: u8,
		/// Discriminator bits of the tag word.
		mask: u64,
	},
}

/// Storage of an opaque leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Storage {
	/// Statically known.
	Fixed {
		/// Size in bytes.
		size: u64,
		/// Alignment in bytes.
		align: u64,
	},
	/// Read from a value witness record at `addr` in process memory.
	Witness {
		/// Witness record address.
		addr: u64,
	},
	/// Instance begins with an unsigned length header giving its total size.
	Prefixed {
		/// Header width in bytes.
		header_width: u8,
		/// Alignment in bytes.
		align: u64,
	},
}

impl TypeDescriptor {
	/// Stable lowercase kind label.
	pub fn kind_label(&self) -> &'static str {
		match self.kind {
			TypeKind::Scalar(_) => "scalar",
			TypeKind::Struct(_) => "struct",
			TypeKind::Enum(_) => "enum",
			TypeKind::Optional(_) => "optional",
			TypeKind::Opaque(_) => "opaque",
		}
	}

	/// Enum shape of enums and optionals.
	pub fn enum_type(&self) -> Option<&EnumType> {
		match &self.kind {
			TypeKind::Enum(item) | TypeKind::Optional(item) => Some(item),
			_ => None,
		}
	}

	/// Types stored inline in this one, excluding members and payloads behind a pointer.
	pub fn inline_types(&self) -> Vec<TypeId> {
		match &self.kind {
			TypeKind::Struct(item) => item.members.iter().filter(|member| !member.indirect).map(|member| member.ty).collect(),
			TypeKind::Enum(item) | TypeKind::Optional(item) => item.cases.iter().filter(|case| !case.indirect).filter_map(|case| case.payload).collect(),
			TypeKind::Scalar(_) | TypeKind::Opaque(_) => Vec::new(),
		}
	}

	/// Types this descriptor refers to directly (members and payloads).
	pub fn referenced_types(&self) -> Vec<TypeId> {
		match &self.kind {
			TypeKind::Struct(item) => item.members.iter().map(|member| member.ty).collect(),
			TypeKind::Enum(item) | TypeKind::Optional(item) => item.cases.iter().filter_map(|case| case.payload).collect(),
			TypeKind::Scalar(_) | TypeKind::Opaque(_) => Vec::new(),
		}
	}
}

impl EnumType {
	/// Width of a separate tag field for this many cases; zero when a single case needs no tag.
	pub fn tag_width(&self) -> u64 {
		match self.cases.len() {
			0 | 1 => 0,
			2..=256 => 1,
			257..=65536 => 2,
			_ => 4,
		}
	}
}
