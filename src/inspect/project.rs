use crate::inspect::layout::offset_addr;
use crate::inspect::{EnumCaseInfo, Endianness, InspectError, LayoutCx, MaskedMemory, Result, TagStrategy, TypeId};

const T: &str = "dynview::project";

/// Tag bits of a spare-bit enum, located in process memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpareBitMask {
	/// Address of the tag word.
	pub addr: u64,
	/// Tag word width in bytes.
	pub width: u8,
	/// Discriminator bits of the tag word.
	pub mask: u64,
	/// Byte order of the tag word.
	pub endianness: Endianness,
}

impl SpareBitMask {
	/// Mask laid out as the tag word's bytes in memory order.
	pub fn mask_bytes(&self) -> Vec<u8> {
		let mut out: Vec<u8> = (0..usize::from(self.width)).map(|idx| (self.mask >> (8 * idx)) as u8).collect();
		if self.endianness == Endianness::Big {
			out.reverse();
		}
		out
	}
}

/// Active case of one enum instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseSelection {
	/// Case index in declaration order.
	pub index: usize,
	/// Selected case.
	pub case: EnumCaseInfo,
	/// Raw discriminator value.
	pub tag: u64,
	/// Address of the payload value, after following indirection.
	pub payload_addr: Option<u64>,
	/// Tag bits to clear when reading an inline payload.
	pub mask: Option<SpareBitMask>,
}

/// Read the discriminator of the enum or optional `ty` at `addr` and select its case.
pub fn select_case(cx: &LayoutCx<'_>, ty: TypeId, addr: u64) -> Result<CaseSelection> {
	let desc = cx.descriptor(ty)?;
	let item = desc.enum_type().ok_or_else(|| InspectError::malformed(&desc.name, format!("{} type has no cases", desc.kind_label())))?;
	let areas = cx.enum_areas(&desc, item, addr)?;

	let (tag, mask) = match item.strategy {
		TagStrategy::TagBytes if areas.tag_width == 0 => (0, None),
		TagStrategy::TagBytes => (cx.read_uint(offset_addr(addr, areas.tag_offset)?, areas.tag_width)?, None),
		TagStrategy::SpareBits { offset, width, mask } => {
			let word_addr = offset_addr(addr, offset)?;
			let word = cx.read_uint(word_addr, u64::from(width))?;
			let spare = SpareBitMask {
				addr: word_addr,
				width,
				mask,
				endianness: cx.target().endianness,
			};
			((word & mask) >> mask.trailing_zeros(), Some(spare))
		}
	};

	let case = usize::try_from(tag).ok().and_then(|index| item.cases.get(index)).ok_or_else(|| InspectError::InvalidTag {
		type_name: desc.name.to_string(),
		tag,
		case_count: item.cases.len(),
	})?;

	let (payload_addr, mask) = match case.payload {
		None => (None, None),
		Some(_) if case.indirect => {
			let pointer = match mask {
				Some(spare) => cx.with_memory(&MaskedMemory::new(cx.mem(), spare)).read_pointer(addr)?,
				None => cx.read_pointer(addr)?,
			};
			if pointer == 0 {
				return Err(InspectError::MemoryUnavailable {
					addr: 0,
					len: cx.target().pointer_bytes(),
				});
			}
			(Some(pointer), None)
		}
		Some(_) => (Some(addr), mask),
	};

	log::trace!(target: T, "{} at 0x{addr:x}: tag {tag} -> .{}", desc.name, case.name);
	Ok(CaseSelection {
		index: tag as usize,
		case: case.clone(),
		tag,
		payload_addr,
		mask,
	})
}

#[cfg(test)]
mod tests;
