mod bytes;
mod compression;
mod descriptor;
mod error;
mod format;
mod image;
mod layout;
mod memory;
mod project;
mod registry;
mod resolve;
mod session;
mod target;
mod value;

/// Compression mode detection for image and snapshot files.
pub use compression::{Compression, decode_bytes};
/// Resolved type descriptor model.
pub use descriptor::{EnumCaseInfo, EnumType, MemberDescriptor, ScalarEncoding, ScalarType, Storage, StructType, TagStrategy, TypeDescriptor, TypeId, TypeKind};
/// Error and result aliases.
pub use error::{InspectError, Result};
/// Value formatting entry points and options.
pub use format::{FormatOptions, Formatter, OptionalStyle};
/// Module metadata image parsing.
pub use image::{MetadataRecord, ModuleImage, RawCase, RawMember, RawSpareBits, RawStorage, RecordKind};
/// Concrete per-instance layout computation.
pub use layout::{ConcreteLayout, LayoutCx, MemberLayout, compute_layout, compute_layout_within};
/// Process memory collaborator and snapshot implementation.
pub use memory::{MaskedMemory, MemoryReader, MemoryRegion, MemorySnapshot};
/// Enum case projection.
pub use project::{CaseSelection, SpareBitMask, select_case};
/// Loaded module set and metadata provider contract.
pub use registry::{MetadataProvider, ModuleRegistry, RecordRef};
/// Per-session type descriptor cache.
pub use resolve::TypeCache;
/// Debug session lifecycle.
pub use session::Session;
/// Target platform description.
pub use target::{Endianness, TargetInfo};
/// Formatted value tree.
pub use value::Value;
