use crate::inspect::layout::offset_addr;
use crate::inspect::{
	InspectError, LayoutCx, MaskedMemory, MemoryReader, Result, ScalarEncoding, ScalarType, TargetInfo, TypeCache, TypeDescriptor, TypeId,
	TypeKind, Value, compute_layout, select_case,
};

const T: &str = "dynview::format";

/// Rendering of enum and optional case labels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptionalStyle {
	/// `.name`, or `.name(inner)` when the payload has a summary of its own.
	#[default]
	CaseLabel,
	/// Enums as `.name`; optionals as `nil` or the payload's own summary.
	Swift,
}

/// Runtime limits and behavior switches for value formatting.
#[derive(Debug, Clone)]
pub struct FormatOptions {
	/// Maximum nesting depth of structs and indirect enum payloads; deeper values summarize as `{...}`.
	pub max_depth: u32,
	/// Case label rendering.
	pub optional_style: OptionalStyle,
	/// Include members injected by the runtime rather than declared in source.
	pub show_hidden_members: bool,
}

impl Default for FormatOptions {
	fn default() -> Self {
		Self {
			max_depth: 16,
			optional_style: OptionalStyle::CaseLabel,
			show_hidden_members: false,
		}
	}
}

impl FormatOptions {
	/// Preset matching the source language's own optional rendering.
	pub fn swift() -> Self {
		Self {
			optional_style: OptionalStyle::Swift,
			..Self::default()
		}
	}

	/// Preset for debugging the runtime itself: hidden members shown, deep nesting allowed.
	pub fn for_runtime_inspect() -> Self {
		Self {
			max_depth: 64,
			optional_style: OptionalStyle::CaseLabel,
			show_hidden_members: true,
		}
	}
}

/// Formats values of resolved types found in process memory.
pub struct Formatter<'a> {
	cx: LayoutCx<'a>,
	options: FormatOptions,
}

impl<'a> Formatter<'a> {
	/// Formatter reading `mem` with types from `cache`.
	pub fn new(cache: &'a TypeCache, mem: &'a dyn MemoryReader, target: TargetInfo, options: FormatOptions) -> Self {
		Self {
			cx: LayoutCx::new(cache, mem, target),
			options,
		}
	}

	/// Active options.
	pub fn options(&self) -> &FormatOptions {
		&self.options
	}

	/// Layout context shared by every value this formatter produces.
	pub fn layout_cx(&self) -> &LayoutCx<'a> {
		&self.cx
	}

	/// Format the anonymous value of `ty` at `addr`.
	pub fn format(&self, ty: TypeId, addr: u64) -> Result<Value> {
		self.format_named("", ty, addr)
	}

	/// Format the value of `ty` at `addr` under `name`.
	pub fn format_named(&self, name: &str, ty: TypeId, addr: u64) -> Result<Value> {
		let value = self.format_at(&self.cx, name, ty, addr, 0)?;
		log::debug!(target: T, "formatted {name}: {} at 0x{addr:x}, {} children", value.type_name, value.children.len());
		Ok(value)
	}

	fn format_at(&self, cx: &LayoutCx<'_>, name: &str, ty: TypeId, addr: u64, depth: u32) -> Result<Value> {
		let desc = cx.descriptor(ty)?;
		match &desc.kind {
			TypeKind::Scalar(scalar) => {
				let bytes = cx.mem().read_bytes(addr, scalar.size as usize)?;
				let raw = cx.target().endianness.read_uint(&bytes);
				Ok(leaf(name, &desc, addr, scalar.size, String::new(), Some(scalar_text(*scalar, raw))))
			}
			TypeKind::Opaque(_) => {
				let size = cx.footprint(ty, addr)?.size;
				Ok(leaf(name, &desc, addr, size, format!("<{size} bytes>"), None))
			}
			TypeKind::Struct(item) => {
				let layout = compute_layout(cx, ty, addr)?;
				if depth >= self.options.max_depth {
					return Ok(leaf(name, &desc, addr, layout.size, "{...}".to_owned(), None));
				}

				let mut children = Vec::with_capacity(layout.members.len());
				for (member, placed) in item.members.iter().zip(&layout.members) {
					if member.hidden && !self.options.show_hidden_members {
						continue;
					}
					let mut member_addr = offset_addr(addr, placed.offset)?;
					if member.indirect {
						member_addr = deref(cx, member_addr)?;
					}
					children.push(self.format_at(cx, &member.name, member.ty, member_addr, depth + 1)?);
				}

				Ok(Value {
					children,
					..leaf(name, &desc, addr, layout.size, String::new(), None)
				})
			}
			TypeKind::Enum(_) | TypeKind::Optional(_) => {
				let size = cx.footprint(ty, addr)?.size;
				let selection = select_case(cx, ty, addr)?;
				let is_optional = matches!(desc.kind, TypeKind::Optional(_));
				let case_name = selection.case.name.clone();

				let (payload, payload_addr) = match (selection.case.payload, selection.payload_addr) {
					(Some(payload), Some(payload_addr)) => (payload, payload_addr),
					_ => {
						let summary = self.empty_case_label(is_optional, &case_name);
						return Ok(Value {
							case: Some(case_name),
							..leaf(name, &desc, addr, size, summary, None)
						});
					}
				};

				// Indirect payloads consume one level; the pointer may lead back to this enum.
				let payload_depth = if selection.case.indirect {
					if depth >= self.options.max_depth {
						return Ok(Value {
							case: Some(case_name.clone()),
							..leaf(name, &desc, addr, size, self.payload_case_label(is_optional, &case_name, "{...}"), None)
						});
					}
					depth + 1
				} else {
					depth
				};

				let inner = match selection.mask {
					Some(mask) => {
						let masked = MaskedMemory::new(cx.mem(), mask);
						self.format_at(&cx.with_memory(&masked), name, payload, payload_addr, payload_depth)?
					}
					None => self.format_at(cx, name, payload, payload_addr, payload_depth)?,
				};

				Ok(Value {
					name: name.into(),
					type_name: desc.name.clone(),
					address: addr,
					byte_size: size,
					summary: self.payload_case_label(is_optional, &case_name, &inner.summary),
					scalar: inner.scalar,
					case: Some(case_name),
					children: inner.children,
				})
			}
		}
	}

	fn empty_case_label(&self, is_optional: bool, case: &str) -> String {
		match self.options.optional_style {
			OptionalStyle::Swift if is_optional => "nil".to_owned(),
			OptionalStyle::Swift | OptionalStyle::CaseLabel => format!(".{case}"),
		}
	}

	fn payload_case_label(&self, is_optional: bool, case: &str, inner: &str) -> String {
		match self.options.optional_style {
			OptionalStyle::Swift if is_optional => inner.to_owned(),
			OptionalStyle::Swift => format!(".{case}"),
			OptionalStyle::CaseLabel if inner.is_empty() => format!(".{case}"),
			OptionalStyle::CaseLabel => format!(".{case}({inner})"),
		}
	}
}

fn leaf(name: &str, desc: &TypeDescriptor, addr: u64, size: u64, summary: String, scalar: Option<String>) -> Value {
	Value {
		name: name.into(),
		type_name: desc.name.clone(),
		address: addr,
		byte_size: size,
		summary,
		scalar,
		case: None,
		children: Vec::new(),
	}
}

fn deref(cx: &LayoutCx<'_>, addr: u64) -> Result<u64> {
	let pointer = cx.read_pointer(addr)?;
	if pointer == 0 {
		return Err(InspectError::MemoryUnavailable {
			addr: 0,
			len: cx.target().pointer_bytes(),
		});
	}
	Ok(pointer)
}

fn scalar_text(scalar: ScalarType, raw: u64) -> String {
	match scalar.encoding {
		ScalarEncoding::Signed => {
			let shift = 64 - scalar.size * 8;
			(((raw << shift) as i64) >> shift).to_string()
		}
		ScalarEncoding::Unsigned => raw.to_string(),
		ScalarEncoding::Float if scalar.size == 4 => f32::from_bits(raw as u32).to_string(),
		ScalarEncoding::Float => f64::from_bits(raw).to_string(),
		ScalarEncoding::Bool => (raw != 0).to_string(),
		ScalarEncoding::Pointer => format!("0x{raw:x}"),
	}
}
