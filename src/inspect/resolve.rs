use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::inspect::image::{RawSpareBits, RawStorage, RecordKind};
use crate::inspect::{
	EnumCaseInfo, EnumType, InspectError, MemberDescriptor, MetadataProvider, Result, ScalarEncoding, ScalarType, Storage, StructType, TagStrategy,
	TypeDescriptor, TypeId, TypeKind,
};

const T: &str = "dynview::resolve";

/// Per-session arena of resolved type descriptors keyed by symbolic name.
///
/// Reads take a shared lock; a first resolution holds the exclusive lock for the whole
/// recursive pass, so one symbol never gets two conflicting entries.
#[derive(Debug, Default)]
pub struct TypeCache {
	state: RwLock<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
	slots: Vec<Slot>,
	by_symbol: HashMap<Box<str>, TypeId>,
}

#[derive(Debug)]
enum Slot {
	/// Placeholder for a type whose resolution is in progress.
	Pending { symbol: Box<str> },
	Ready(Arc<TypeDescriptor>),
	Evicted { symbol: Box<str> },
}

impl TypeCache {
	/// Empty cache.
	pub fn new() -> Self {
		Self::default()
	}

	/// Resolve `symbol` and everything it references, caching the result.
	pub fn resolve(&self, provider: &dyn MetadataProvider, symbol: &str) -> Result<TypeId> {
		if let Some(id) = self.lookup(symbol) {
			log::trace!(target: T, "cache hit {symbol} -> {id}");
			return Ok(id);
		}

		let mut state = self.state.write();
		if let Some(id) = state.ready_id(symbol) {
			return Ok(id);
		}

		let mut pass = Resolution {
			state: &mut *state,
			provider,
			inserted: Vec::new(),
			path: Vec::new(),
		};
		match pass.resolve_symbol(symbol, false).and_then(|id| pass.settle().map(|()| id)) {
			Ok(id) => {
				log::debug!(target: T, "resolved {symbol} -> {id} ({} new descriptors)", pass.inserted.len());
				Ok(id)
			}
			Err(err) => {
				log::debug!(target: T, "resolution of {symbol} failed: {err}");
				pass.rollback();
				Err(err)
			}
		}
	}

	/// Id of an already-resolved symbol.
	pub fn lookup(&self, symbol: &str) -> Option<TypeId> {
		self.state.read().ready_id(symbol)
	}

	/// Descriptor for `id`; evicted ids report the symbol they used to describe until that
	/// symbol is resolved again into the same slot.
	pub fn descriptor(&self, id: TypeId) -> Result<Arc<TypeDescriptor>> {
		let state = self.state.read();
		match state.slots.get(id.index()) {
			Some(Slot::Ready(desc)) => Ok(Arc::clone(desc)),
			Some(Slot::Pending { symbol } | Slot::Evicted { symbol }) => Err(InspectError::UnresolvedMetadata { symbol: symbol.to_string() }),
			None => Err(InspectError::UnresolvedMetadata { symbol: id.to_string() }),
		}
	}

	/// Evict every descriptor published by `module` and, transitively, every descriptor
	/// referring to an evicted one. Returns the number of evicted descriptors.
	pub fn invalidate_module(&self, module: &str) -> usize {
		let mut state = self.state.write();

		let mut evicted: HashSet<TypeId> = state
			.ready()
			.filter(|(_, desc)| desc.module.as_ref() == module)
			.map(|(id, _)| id)
			.collect();

		loop {
			let dependents: Vec<TypeId> = state
				.ready()
				.filter(|(id, desc)| !evicted.contains(id) && desc.referenced_types().iter().any(|item| evicted.contains(item)))
				.map(|(id, _)| id)
				.collect();
			if dependents.is_empty() {
				break;
			}
			evicted.extend(dependents);
		}

		for id in &evicted {
			let slot = &mut state.slots[id.index()];
			let Slot::Ready(desc) = slot else {
				continue;
			};
			let symbol = desc.name.clone();
			*slot = Slot::Evicted { symbol };
		}

		log::debug!(target: T, "module {module} unloaded, evicted {} descriptors", evicted.len());
		evicted.len()
	}

	/// Number of resolved descriptors.
	pub fn len(&self) -> usize {
		self.state.read().ready().count()
	}

	/// Whether no descriptor is resolved.
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

impl CacheState {
	fn ready_id(&self, symbol: &str) -> Option<TypeId> {
		let id = *self.by_symbol.get(symbol)?;
		matches!(self.slots.get(id.index()), Some(Slot::Ready(_))).then_some(id)
	}

	fn ready(&self) -> impl Iterator<Item = (TypeId, &Arc<TypeDescriptor>)> {
		self.slots.iter().enumerate().filter_map(|(idx, slot)| match slot {
			Slot::Ready(desc) => Some((TypeId(idx as u32), desc)),
			_ => None,
		})
	}
}

struct Resolution<'s, 'p> {
	state: &'s mut CacheState,
	provider: &'p dyn MetadataProvider,
	inserted: Vec<TypeId>,
	/// Types under construction, with whether each was reached through an indirect edge.
	path: Vec<(TypeId, bool)>,
}

impl Resolution<'_, '_> {
	fn resolve_symbol(&mut self, symbol: &str, via_indirect: bool) -> Result<TypeId> {
		let evicted = match self.state.by_symbol.get(symbol) {
			Some(&id) => match &self.state.slots[id.index()] {
				Slot::Ready(_) => return Ok(id),
				Slot::Pending { .. } if via_indirect || self.guarded_since(id) => return Ok(id),
				Slot::Pending { .. } => return Err(InspectError::malformed(symbol, "type contains itself without indirection")),
				Slot::Evicted { .. } => Some(id),
			},
			None => None,
		};

		let found = self.provider.find_record(symbol).ok_or_else(|| InspectError::UnresolvedMetadata { symbol: symbol.to_owned() })?;

		let pending = Slot::Pending { symbol: symbol.into() };
		let id = match evicted {
			Some(id) => {
				self.state.slots[id.index()] = pending;
				id
			}
			None => {
				let id = TypeId(self.state.slots.len() as u32);
				self.state.slots.push(pending);
				self.state.by_symbol.insert(symbol.into(), id);
				id
			}
		};
		self.inserted.push(id);

		self.path.push((id, via_indirect));
		let built = self.build_kind(symbol, &found.record.kind);
		self.path.pop();
		let kind = built?;
		let (dynamic, per_instance) = own_sizing(&kind);
		self.state.slots[id.index()] = Slot::Ready(Arc::new(TypeDescriptor {
			name: symbol.into(),
			module: found.module,
			kind,
			dynamic,
			per_instance,
		}));
		Ok(id)
	}

	fn build_kind(&mut self, symbol: &str, raw: &RecordKind) -> Result<TypeKind> {
		match raw {
			RecordKind::Scalar { encoding, size, align } => Ok(TypeKind::Scalar(scalar_type(symbol, *encoding, *size, *align)?)),
			RecordKind::Struct { members, witness } => {
				let mut out = Vec::with_capacity(members.len());
				for member in members {
					let ty = self.resolve_symbol(&member.type_name, member.is_indirect())?;
					out.push(MemberDescriptor {
						name: member.name.clone(),
						ty,
						indirect: member.is_indirect(),
						hidden: member.is_hidden(),
					});
				}
				Ok(TypeKind::Struct(StructType {
					members: out,
					witness: *witness,
				}))
			}
			RecordKind::Enum { cases, spare_bits } => {
				if cases.is_empty() {
					return Err(InspectError::malformed(symbol, "enum declares no cases"));
				}
				let strategy = tag_strategy(symbol, *spare_bits)?;
				if strategy != TagStrategy::TagBytes && cases.iter().all(|case| case.payload.is_none()) {
					return Err(InspectError::malformed(symbol, "spare-bit enum has no payload to hold its tag"));
				}
				let mut out = Vec::with_capacity(cases.len());
				for case in cases {
					let payload = match &case.payload {
						Some(name) => Some(self.resolve_symbol(name, case.is_indirect())?),
						None => None,
					};
					out.push(EnumCaseInfo {
						name: case.name.clone(),
						payload,
						indirect: case.is_indirect(),
					});
				}
				Ok(TypeKind::Enum(EnumType { cases: out, strategy }))
			}
			RecordKind::Optional { payload, spare_bits } => {
				let strategy = tag_strategy(symbol, *spare_bits)?;
				let ty = self.resolve_symbol(payload, false)?;
				let cases = vec![
					EnumCaseInfo {
						name: "some".into(),
						payload: Some(ty),
						indirect: false,
					},
					EnumCaseInfo {
						name: "none".into(),
						payload: None,
						indirect: false,
					},
				];
				Ok(TypeKind::Optional(EnumType { cases, strategy }))
			}
			RecordKind::Opaque(storage) => Ok(TypeKind::Opaque(opaque_storage(symbol, *storage)?)),
		}
	}

	/// Whether an indirect edge lies between the pending `id` and the current position.
	fn guarded_since(&self, id: TypeId) -> bool {
		match self.path.iter().position(|(item, _)| *item == id) {
			Some(pos) => self.path[pos + 1..].iter().any(|(_, indirect)| *indirect),
			None => false,
		}
	}

	/// Spread runtime sizing from inline members and payloads until nothing changes, then reject
	/// multi-case enums whose payload area would be sized from an inactive case's bytes.
	fn settle(&mut self) -> Result<()> {
		loop {
			let mut changed = false;
			for &id in &self.inserted {
				let Some(Slot::Ready(desc)) = self.state.slots.get(id.index()) else {
					continue;
				};
				let (mut dynamic, mut per_instance) = (desc.dynamic, desc.per_instance);
				for inner in desc.inline_types() {
					if let Some(Slot::Ready(found)) = self.state.slots.get(inner.index()) {
						dynamic |= found.dynamic;
						per_instance |= found.per_instance;
					}
				}
				if (dynamic, per_instance) != (desc.dynamic, desc.per_instance) {
					let updated = TypeDescriptor {
						dynamic,
						per_instance,
						..TypeDescriptor::clone(desc)
					};
					self.state.slots[id.index()] = Slot::Ready(Arc::new(updated));
					changed = true;
				}
			}
			if !changed {
				break;
			}
		}

		for &id in &self.inserted {
			let Some(Slot::Ready(desc)) = self.state.slots.get(id.index()) else {
				continue;
			};
			let Some(item) = desc.enum_type() else {
				continue;
			};
			if item.cases.len() < 2 {
				continue;
			}
			for case in item.cases.iter().filter(|case| !case.indirect) {
				if let Some(payload) = case.payload
					&& let Some(Slot::Ready(found)) = self.state.slots.get(payload.index())
					&& found.per_instance
				{
					return Err(InspectError::malformed(&desc.name, format!("case {} stores a per-instance sized payload inline", case.name)));
				}
			}
		}
		Ok(())
	}

	fn rollback(&mut self) {
		for id in self.inserted.drain(..) {
			let slot = &mut self.state.slots[id.index()];
			let symbol = match slot {
				Slot::Pending { symbol } | Slot::Evicted { symbol } => symbol.clone(),
				Slot::Ready(desc) => desc.name.clone(),
			};
			*slot = Slot::Evicted { symbol };
		}
	}
}

/// Runtime sizing a kind has on its own, before looking at what it stores inline.
fn own_sizing(kind: &TypeKind) -> (bool, bool) {
	match kind {
		TypeKind::Struct(item) => (item.witness.is_some(), false),
		TypeKind::Opaque(Storage::Witness { .. }) => (true, false),
		TypeKind::Opaque(Storage::Prefixed { .. }) => (true, true),
		TypeKind::Scalar(_) | TypeKind::Enum(_) | TypeKind::Optional(_) | TypeKind::Opaque(Storage::Fixed { .. }) => (false, false),
	}
}

fn scalar_type(symbol: &str, encoding: u32, size: u32, align: u32) -> Result<ScalarType> {
	let encoding = match encoding {
		0 => ScalarEncoding::Signed,
		1 => ScalarEncoding::Unsigned,
		2 => ScalarEncoding::Float,
		3 => ScalarEncoding::Bool,
		4 => ScalarEncoding::Pointer,
		other => return Err(InspectError::malformed(symbol, format!("unknown scalar encoding {other}"))),
	};

	let width_ok = match encoding {
		ScalarEncoding::Float | ScalarEncoding::Pointer => matches!(size, 4 | 8),
		ScalarEncoding::Bool => size == 1,
		ScalarEncoding::Signed | ScalarEncoding::Unsigned => matches!(size, 1 | 2 | 4 | 8),
	};
	if !width_ok {
		return Err(InspectError::malformed(symbol, format!("unsupported scalar width {size}")));
	}
	check_align(symbol, align)?;

	Ok(ScalarType {
		encoding,
		size: u64::from(size),
		align: u64::from(align),
	})
}

fn tag_strategy(symbol: &str, spare_bits: Option<RawSpareBits>) -> Result<TagStrategy> {
	let Some(spare) = spare_bits else {
		return Ok(TagStrategy::TagBytes);
	};

	if !matches!(spare.width, 1 | 2 | 4 | 8) {
		return Err(InspectError::malformed(symbol, format!("unsupported spare-bit word width {}", spare.width)));
	}
	if spare.mask == 0 {
		return Err(InspectError::malformed(symbol, "spare-bit mask is empty"));
	}
	if spare.width < 8 && spare.mask >> (spare.width * 8) != 0 {
		return Err(InspectError::malformed(symbol, "spare-bit mask exceeds tag word"));
	}

	Ok(TagStrategy::SpareBits {
		offset: u64::from(spare.offset),
		width: spare.width as u8,
		mask: spare.mask,
	})
}

fn opaque_storage(symbol: &str, raw: RawStorage) -> Result<Storage> {
	match raw {
		RawStorage::Fixed { size, align } => {
			check_align(symbol, align)?;
			Ok(Storage::Fixed {
				size: u64::from(size),
				align: u64::from(align),
			})
		}
		RawStorage::Witness { addr } => Ok(Storage::Witness { addr }),
		RawStorage::Prefixed { header_width, align } => {
			if !matches!(header_width, 1 | 2 | 4 | 8) {
				return Err(InspectError::malformed(symbol, format!("unsupported length header width {header_width}")));
			}
			check_align(symbol, align)?;
			Ok(Storage::Prefixed {
				header_width: header_width as u8,
				align: u64::from(align),
			})
		}
	}
}

fn check_align(symbol: &str, align: u32) -> Result<()> {
	if !align.is_power_of_two() {
		return Err(InspectError::malformed(symbol, format!("alignment {align} is not a power of two")));
	}
	Ok(())
}

#[cfg(test)]
mod tests;
