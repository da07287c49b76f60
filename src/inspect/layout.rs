use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use crate::inspect::{EnumType, InspectError, MemoryReader, Result, Storage, StructType, TagStrategy, TargetInfo, TypeCache, TypeDescriptor, TypeId, TypeKind};

const T: &str = "dynview::layout";

/// Everything layout computation needs: resolved types, process memory, and target facts.
pub struct LayoutCx<'a> {
	cache: &'a TypeCache,
	mem: &'a dyn MemoryReader,
	target: TargetInfo,
	statics: RefCell<HashMap<TypeId, Footprint>>,
}

/// Size and alignment of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Footprint {
	pub(crate) size: u64,
	pub(crate) align: u64,
}

/// Concrete layout of one instance at one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcreteLayout {
	/// End of the last member, without trailing padding.
	pub size: u64,
	/// `size` rounded up to `align`; distance between array elements.
	pub stride: u64,
	/// Required alignment.
	pub align: u64,
	/// Members in storage order. Enums list their payload area and tag region.
	pub members: Vec<MemberLayout>,
}

/// Placement of one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberLayout {
	/// Member name, or `payload` / `tag` for enum regions.
	pub name: Box<str>,
	/// Member type; `None` for synthetic enum regions.
	pub ty: Option<TypeId>,
	/// Byte offset from the start of the instance.
	pub offset: u64,
	/// Byte size at this address.
	pub size: u64,
	/// Stored behind a pointer.
	pub indirect: bool,
}

/// Payload area and tag placement of an enum instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct EnumAreas {
	pub(crate) payload: Footprint,
	pub(crate) tag_offset: u64,
	pub(crate) tag_width: u64,
	pub(crate) total: Footprint,
}

/// Runtime value witness contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Witness {
	size: u64,
	align: u64,
}

impl<'a> LayoutCx<'a> {
	/// Layout context over `cache` and `mem` for `target`.
	pub fn new(cache: &'a TypeCache, mem: &'a dyn MemoryReader, target: TargetInfo) -> Self {
		Self {
			cache,
			mem,
			target,
			statics: RefCell::new(HashMap::new()),
		}
	}

	/// Same types and target over a different view of memory.
	pub fn with_memory<'b>(&'b self, mem: &'b dyn MemoryReader) -> LayoutCx<'b> {
		LayoutCx {
			cache: self.cache,
			mem,
			target: self.target,
			statics: RefCell::new(self.statics.borrow().clone()),
		}
	}

	/// Type cache backing this context.
	pub fn cache(&self) -> &'a TypeCache {
		self.cache
	}

	/// Memory this context reads.
	pub fn mem(&self) -> &dyn MemoryReader {
		self.mem
	}

	/// Target description.
	pub fn target(&self) -> TargetInfo {
		self.target
	}

	/// Resolved descriptor for `ty`.
	pub fn descriptor(&self, ty: TypeId) -> Result<Arc<TypeDescriptor>> {
		self.cache.descriptor(ty)
	}

	/// Read a target-width pointer at `addr`.
	pub fn read_pointer(&self, addr: u64) -> Result<u64> {
		let width = usize::from(self.target.pointer_size);
		let bytes = self.mem.read_bytes(addr, width)?;
		Ok(self.target.endianness.read_uint(&bytes))
	}

	/// Read an unsigned integer of `width` bytes at `addr` in target byte order.
	pub(crate) fn read_uint(&self, addr: u64, width: u64) -> Result<u64> {
		let bytes = self.mem.read_bytes(addr, width as usize)?;
		Ok(self.target.endianness.read_uint(&bytes))
	}

	/// Size and alignment of an instance of `ty` stored at `addr`.
	pub(crate) fn footprint(&self, ty: TypeId, addr: u64) -> Result<Footprint> {
		if let Some(found) = self.statics.borrow().get(&ty) {
			return Ok(*found);
		}

		let desc = self.descriptor(ty)?;
		let out = match &desc.kind {
			TypeKind::Scalar(scalar) => Footprint {
				size: scalar.size,
				align: scalar.align,
			},
			TypeKind::Struct(item) => self.struct_members(&desc, item, addr)?.1,
			TypeKind::Enum(item) | TypeKind::Optional(item) => self.enum_areas(&desc, item, addr)?.total,
			TypeKind::Opaque(storage) => self.opaque_footprint(&desc, *storage, addr)?,
		};

		if !desc.dynamic {
			self.statics.borrow_mut().insert(ty, out);
		}
		Ok(out)
	}

	/// Alignment of `ty`, which never depends on the instance address.
	pub(crate) fn alignment(&self, ty: TypeId) -> Result<u64> {
		if let Some(found) = self.statics.borrow().get(&ty) {
			return Ok(found.align);
		}

		let desc = self.descriptor(ty)?;
		match &desc.kind {
			TypeKind::Scalar(scalar) => Ok(scalar.align),
			TypeKind::Struct(item) => {
				let mut align = 1;
				for member in &item.members {
					align = align.max(self.slot_alignment(member.ty, member.indirect)?);
				}
				if let Some(addr) = item.witness {
					align = align.max(self.read_witness(&desc.name, addr)?.align);
				}
				Ok(align)
			}
			TypeKind::Enum(item) | TypeKind::Optional(item) => {
				let mut align = 1;
				for case in &item.cases {
					if let Some(payload) = case.payload {
						align = align.max(self.slot_alignment(payload, case.indirect)?);
					}
				}
				if item.strategy == TagStrategy::TagBytes {
					align = align.max(item.tag_width());
				}
				Ok(align)
			}
			TypeKind::Opaque(Storage::Fixed { align, .. } | Storage::Prefixed { align, .. }) => Ok(*align),
			TypeKind::Opaque(Storage::Witness { addr }) => Ok(self.read_witness(&desc.name, *addr)?.align),
		}
	}

	fn slot_alignment(&self, ty: TypeId, indirect: bool) -> Result<u64> {
		if indirect { Ok(self.target.pointer_bytes()) } else { self.alignment(ty) }
	}

	fn slot_footprint(&self, ty: TypeId, indirect: bool, addr: u64) -> Result<Footprint> {
		if indirect {
			let width = self.target.pointer_bytes();
			return Ok(Footprint { size: width, align: width });
		}
		self.footprint(ty, addr)
	}

	fn struct_members(&self, desc: &TypeDescriptor, item: &StructType, addr: u64) -> Result<(Vec<MemberLayout>, Footprint)> {
		let mut members = Vec::with_capacity(item.members.len());
		let mut end = 0_u64;
		let mut align = 1_u64;

		for member in &item.members {
			let member_align = self.slot_alignment(member.ty, member.indirect)?;
			let offset = align_up(end, member_align)?;
			let member_addr = offset_addr(addr, offset)?;
			let size = self.slot_footprint(member.ty, member.indirect, member_addr)?.size;
			end = offset.checked_add(size).ok_or(InspectError::OutOfBounds {
				offset,
				size,
				extent: u64::MAX,
			})?;
			align = align.max(member_align);
			members.push(MemberLayout {
				name: member.name.clone(),
				ty: Some(member.ty),
				offset,
				size,
				indirect: member.indirect,
			});
		}

		if let Some(witness_addr) = item.witness {
			let witness = self.read_witness(&desc.name, witness_addr)?;
			if end > witness.size {
				return Err(InspectError::OutOfBounds {
					offset: 0,
					size: end,
					extent: witness.size,
				});
			}
			align = align.max(witness.align);
		}

		Ok((members, Footprint { size: end, align }))
	}

	/// Payload area and tag placement of an enum or optional instance at `addr`.
	pub(crate) fn enum_areas(&self, desc: &TypeDescriptor, item: &EnumType, addr: u64) -> Result<EnumAreas> {
		let mut payload = Footprint { size: 0, align: 1 };
		for case in &item.cases {
			if let Some(ty) = case.payload {
				let found = self.slot_footprint(ty, case.indirect, addr)?;
				payload.size = payload.size.max(found.size);
				payload.align = payload.align.max(found.align);
			}
		}

		let areas = match item.strategy {
			TagStrategy::TagBytes => {
				let tag_width = item.tag_width();
				let tag_offset = if tag_width == 0 { payload.size } else { align_up(payload.size, tag_width)? };
				let size = tag_offset.checked_add(tag_width).ok_or(InspectError::OutOfBounds {
					offset: tag_offset,
					size: tag_width,
					extent: u64::MAX,
				})?;
				EnumAreas {
					payload,
					tag_offset,
					tag_width,
					total: Footprint {
						size,
						align: payload.align.max(tag_width.max(1)),
					},
				}
			}
			TagStrategy::SpareBits { offset, width, .. } => {
				let width = u64::from(width);
				if offset.saturating_add(width) > payload.size {
					return Err(InspectError::OutOfBounds {
						offset,
						size: width,
						extent: payload.size,
					});
				}
				EnumAreas {
					payload,
					tag_offset: offset,
					tag_width: width,
					total: payload,
				}
			}
		};

		log::trace!(target: T, "{} at 0x{addr:x}: payload {} bytes, tag {}+{}", desc.name, payload.size, areas.tag_offset, areas.tag_width);
		Ok(areas)
	}

	fn opaque_footprint(&self, desc: &TypeDescriptor, storage: Storage, addr: u64) -> Result<Footprint> {
		match storage {
			Storage::Fixed { size, align } => Ok(Footprint { size, align }),
			Storage::Witness { addr: witness_addr } => {
				let witness = self.read_witness(&desc.name, witness_addr)?;
				Ok(Footprint {
					size: witness.size,
					align: witness.align,
				})
			}
			Storage::Prefixed { header_width, align } => {
				let width = u64::from(header_width);
				let size = self.read_uint(addr, width)?;
				if size < width {
					return Err(InspectError::OutOfBounds {
						offset: 0,
						size: width,
						extent: size,
					});
				}
				Ok(Footprint { size, align })
			}
		}
	}

	fn read_witness(&self, type_name: &str, addr: u64) -> Result<Witness> {
		let width = self.target.pointer_bytes();
		let bytes = self.mem.read_bytes(addr, (width * 2 + 4) as usize)?;
		let endian = self.target.endianness;
		let size = endian.read_uint(&bytes[..width as usize]);
		let flags = endian.read_uint(&bytes[(width * 2) as usize..]);
		let align = (flags & 0xff) + 1;
		if !align.is_power_of_two() {
			return Err(InspectError::malformed(type_name, format!("value witness alignment {align} is not a power of two")));
		}
		Ok(Witness { size, align })
	}
}

/// Compute the layout of the instance of `ty` at `addr`.
pub fn compute_layout(cx: &LayoutCx<'_>, ty: TypeId, addr: u64) -> Result<ConcreteLayout> {
	let desc = cx.descriptor(ty)?;
	let (members, footprint) = match &desc.kind {
		TypeKind::Struct(item) => cx.struct_members(&desc, item, addr)?,
		TypeKind::Enum(item) | TypeKind::Optional(item) => {
			let areas = cx.enum_areas(&desc, item, addr)?;
			let mut members = vec![MemberLayout {
				name: "payload".into(),
				ty: None,
				offset: 0,
				size: areas.payload.size,
				indirect: false,
			}];
			if item.strategy == TagStrategy::TagBytes && areas.tag_width > 0 {
				members.push(MemberLayout {
					name: "tag".into(),
					ty: None,
					offset: areas.tag_offset,
					size: areas.tag_width,
					indirect: false,
				});
			}
			(members, areas.total)
		}
		TypeKind::Scalar(_) | TypeKind::Opaque(_) => (Vec::new(), cx.footprint(ty, addr)?),
	};

	Ok(ConcreteLayout {
		size: footprint.size,
		stride: align_up(footprint.size, footprint.align)?,
		align: footprint.align,
		members,
	})
}

/// Compute the layout of `ty` at `addr`, failing if it does not fit in `extent` bytes.
pub fn compute_layout_within(cx: &LayoutCx<'_>, ty: TypeId, addr: u64, extent: u64) -> Result<ConcreteLayout> {
	let layout = compute_layout(cx, ty, addr)?;
	for member in &layout.members {
		if member.offset.saturating_add(member.size) > extent {
			return Err(InspectError::OutOfBounds {
				offset: member.offset,
				size: member.size,
				extent,
			});
		}
	}
	if layout.size > extent {
		return Err(InspectError::OutOfBounds {
			offset: 0,
			size: layout.size,
			extent,
		});
	}
	Ok(layout)
}

pub(crate) fn align_up(value: u64, align: u64) -> Result<u64> {
	let mask = align.max(1) - 1;
	value.checked_add(mask).map(|item| item & !mask).ok_or(InspectError::OutOfBounds {
		offset: value,
		size: align,
		extent: u64::MAX,
	})
}

pub(crate) fn offset_addr(addr: u64, offset: u64) -> Result<u64> {
	addr.checked_add(offset).ok_or(InspectError::OutOfBounds {
		offset,
		size: 0,
		extent: u64::MAX - addr,
	})
}
