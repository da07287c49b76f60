//! Shared test helpers for workspace crates.
//!
//! Writers here emit the on-disk `TYMD` image and `MSNP` snapshot formats byte by byte, so
//! parser tests exercise the real decoding path.

use std::fs;
use std::path::{Path, PathBuf};

/// Resolve the workspace root path.
pub fn workspace_root() -> PathBuf {
	let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
	manifest_dir
		.join("..")
		.join("..")
		.canonicalize()
		.unwrap_or_else(|_| manifest_dir.join("..").join(".."))
}

/// Resolve the workspace target directory.
pub fn target_dir() -> PathBuf {
	std::env::var_os("CARGO_TARGET_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(|| workspace_root().join("target"))
}

/// Write `bytes` under `<target>/dynview-scratch/<group>/<name>` and return the path.
pub fn write_scratch(group: &str, name: &str, bytes: &[u8]) -> PathBuf {
	let dir = target_dir().join("dynview-scratch").join(group);
	fs::create_dir_all(&dir).expect("scratch dir is creatable");
	let path = dir.join(name);
	fs::write(&path, bytes).expect("scratch file is writable");
	path
}

/// Scalar encodings understood by image records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarEnc {
	/// Two's complement signed integer.
	Signed = 0,
	/// Unsigned integer.
	Unsigned = 1,
	/// IEEE-754 float.
	Float = 2,
	/// Boolean byte.
	Bool = 3,
	/// Raw pointer.
	Pointer = 4,
}

/// Struct member declaration for [`ImageWriter::structure`].
#[derive(Debug, Clone)]
pub struct Member {
	name: String,
	type_name: String,
	flags: u32,
}

impl Member {
	/// Inline member.
	pub fn new(name: &str, type_name: &str) -> Self {
		Self {
			name: name.to_owned(),
			type_name: type_name.to_owned(),
			flags: 0,
		}
	}

	/// Mark as stored behind a pointer.
	pub fn indirect(mut self) -> Self {
		self.flags |= 0x1;
		self
	}

	/// Mark as runtime-injected.
	pub fn hidden(mut self) -> Self {
		self.flags |= 0x2;
		self
	}
}

/// Enum case declaration for [`ImageWriter::enumeration`].
#[derive(Debug, Clone)]
pub struct Case {
	name: String,
	payload: Option<String>,
	flags: u32,
}

impl Case {
	/// Case without payload.
	pub fn empty(name: &str) -> Self {
		Self {
			name: name.to_owned(),
			payload: None,
			flags: 0,
		}
	}

	/// Case carrying a payload of `type_name`.
	pub fn payload(name: &str, type_name: &str) -> Self {
		Self {
			name: name.to_owned(),
			payload: Some(type_name.to_owned()),
			flags: 0,
		}
	}

	/// Mark the payload as stored behind a pointer.
	pub fn indirect(mut self) -> Self {
		self.flags |= 0x1;
		self
	}
}

/// Spare-bit tag placement.
#[derive(Debug, Clone, Copy)]
pub struct SpareBits {
	/// Byte offset inside the payload area.
	pub offset: u32,
	/// Tag word width in bytes.
	pub width: u32,
	/// Discriminator bits.
	pub mask: u64,
}

/// Incremental `TYMD` image writer.
#[derive(Debug, Default)]
pub struct ImageWriter {
	names: Vec<String>,
	records: Vec<u8>,
	record_count: u32,
}

impl ImageWriter {
	/// Empty image.
	pub fn new() -> Self {
		Self::default()
	}

	/// Add a scalar record.
	pub fn scalar(&mut self, symbol: &str, encoding: ScalarEnc, size: u32, align: u32) -> &mut Self {
		let mut body = Vec::new();
		put_u32(&mut body, encoding as u32);
		put_u32(&mut body, size);
		put_u32(&mut body, align);
		self.record(symbol, 0, 0, body)
	}

	/// Add a struct record with a static layout.
	pub fn structure(&mut self, symbol: &str, members: &[Member]) -> &mut Self {
		let body = self.member_body(members);
		self.record(symbol, 1, 0, body)
	}

	/// Add a resilient struct record whose size is checked against a value witness.
	pub fn resilient_struct(&mut self, symbol: &str, members: &[Member], witness_addr: u64) -> &mut Self {
		let mut body = self.member_body(members);
		put_u64(&mut body, witness_addr);
		self.record(symbol, 1, 0x1, body)
	}

	/// Add a tag-byte enum record.
	pub fn enumeration(&mut self, symbol: &str, cases: &[Case]) -> &mut Self {
		let body = self.case_body(cases);
		self.record(symbol, 2, 0, body)
	}

	/// Add a spare-bits enum record.
	pub fn enumeration_spare_bits(&mut self, symbol: &str, cases: &[Case], spare: SpareBits) -> &mut Self {
		let mut body = self.case_body(cases);
		put_spare(&mut body, spare);
		self.record(symbol, 2, 0x2, body)
	}

	/// Add a tag-byte optional record.
	pub fn optional(&mut self, symbol: &str, payload: &str) -> &mut Self {
		let mut body = Vec::new();
		let idx = self.intern(payload);
		put_u32(&mut body, idx);
		self.record(symbol, 3, 0, body)
	}

	/// Add a spare-bits optional record.
	pub fn optional_spare_bits(&mut self, symbol: &str, payload: &str, spare: SpareBits) -> &mut Self {
		let mut body = Vec::new();
		let idx = self.intern(payload);
		put_u32(&mut body, idx);
		put_spare(&mut body, spare);
		self.record(symbol, 3, 0x2, body)
	}

	/// Add an opaque record with fixed storage.
	pub fn opaque_fixed(&mut self, symbol: &str, size: u32, align: u32) -> &mut Self {
		let mut body = Vec::new();
		put_u32(&mut body, 0);
		put_u32(&mut body, size);
		put_u32(&mut body, align);
		self.record(symbol, 4, 0, body)
	}

	/// Add an opaque record sized by a value witness in process memory.
	pub fn opaque_witness(&mut self, symbol: &str, witness_addr: u64) -> &mut Self {
		let mut body = Vec::new();
		put_u32(&mut body, 1);
		put_u64(&mut body, witness_addr);
		self.record(symbol, 4, 0, body)
	}

	/// Add an opaque record sized by a per-instance length header.
	pub fn opaque_prefixed(&mut self, symbol: &str, header_width: u32, align: u32) -> &mut Self {
		let mut body = Vec::new();
		put_u32(&mut body, 2);
		put_u32(&mut body, header_width);
		put_u32(&mut body, align);
		self.record(symbol, 4, 0, body)
	}

	/// Add a record with an arbitrary kind byte and body, for malformed-input tests.
	pub fn raw_record(&mut self, symbol: &str, kind: u8, flags: u8, body: Vec<u8>) -> &mut Self {
		self.record(symbol, kind, flags, body)
	}

	/// Serialize the image.
	pub fn finish(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(b"TYMD");
		out.extend_from_slice(&1_u16.to_le_bytes());
		out.extend_from_slice(&0_u16.to_le_bytes());
		out.extend_from_slice(b"NAME");
		put_u32(&mut out, self.names.len() as u32);
		for name in &self.names {
			out.extend_from_slice(name.as_bytes());
			out.push(0);
		}
		while out.len() % 4 != 0 {
			out.push(0);
		}
		out.extend_from_slice(b"RECS");
		put_u32(&mut out, self.record_count);
		out.extend_from_slice(&self.records);
		out
	}

	fn record(&mut self, symbol: &str, kind: u8, flags: u8, body: Vec<u8>) -> &mut Self {
		let idx = self.intern(symbol);
		put_u32(&mut self.records, idx);
		self.records.push(kind);
		self.records.push(flags);
		self.records.extend_from_slice(&0_u16.to_le_bytes());
		self.records.extend_from_slice(&body);
		self.record_count += 1;
		self
	}

	fn member_body(&mut self, members: &[Member]) -> Vec<u8> {
		let mut body = Vec::new();
		put_u32(&mut body, members.len() as u32);
		for member in members {
			let name = self.intern(&member.name);
			let ty = self.intern(&member.type_name);
			put_u32(&mut body, name);
			put_u32(&mut body, ty);
			put_u32(&mut body, member.flags);
		}
		body
	}

	fn case_body(&mut self, cases: &[Case]) -> Vec<u8> {
		let mut body = Vec::new();
		put_u32(&mut body, cases.len() as u32);
		for case in cases {
			let name = self.intern(&case.name);
			let payload = match &case.payload {
				Some(ty) => self.intern(ty),
				None => u32::MAX,
			};
			put_u32(&mut body, name);
			put_u32(&mut body, payload);
			put_u32(&mut body, case.flags);
		}
		body
	}

	fn intern(&mut self, name: &str) -> u32 {
		if let Some(idx) = self.names.iter().position(|item| item == name) {
			return idx as u32;
		}
		self.names.push(name.to_owned());
		(self.names.len() - 1) as u32
	}
}

/// Incremental `MSNP` snapshot writer.
#[derive(Debug)]
pub struct SnapshotWriter {
	pointer_size: u8,
	big_endian: bool,
	regions: Vec<(u64, Vec<u8>)>,
}

impl SnapshotWriter {
	/// Little-endian snapshot with the given pointer width.
	pub fn new(pointer_size: u8) -> Self {
		Self {
			pointer_size,
			big_endian: false,
			regions: Vec::new(),
		}
	}

	/// Mark the snapshot as big-endian.
	pub fn big_endian(mut self) -> Self {
		self.big_endian = true;
		self
	}

	/// Add one mapped region.
	pub fn region(mut self, base: u64, bytes: Vec<u8>) -> Self {
		self.regions.push((base, bytes));
		self
	}

	/// Serialize the snapshot.
	pub fn finish(&self) -> Vec<u8> {
		let mut out = Vec::new();
		out.extend_from_slice(b"MSNP");
		out.push(self.pointer_size);
		out.push(u8::from(self.big_endian));
		out.extend_from_slice(&0_u16.to_le_bytes());
		put_u32(&mut out, self.regions.len() as u32);
		for (base, bytes) in &self.regions {
			put_u64(&mut out, *base);
			put_u64(&mut out, bytes.len() as u64);
			out.extend_from_slice(bytes);
		}
		out
	}
}

/// Little-endian byte buffer addressed by absolute process addresses.
#[derive(Debug, Clone)]
pub struct MemImage {
	base: u64,
	bytes: Vec<u8>,
}

impl MemImage {
	/// Zero-filled memory covering `[base, base + len)`.
	pub fn zeroed(base: u64, len: usize) -> Self {
		Self { base, bytes: vec![0; len] }
	}

	/// Region base address.
	pub fn base(&self) -> u64 {
		self.base
	}

	/// Store one byte.
	pub fn put_u8(&mut self, addr: u64, value: u8) -> &mut Self {
		self.put(addr, &[value])
	}

	/// Store a little-endian `u16`.
	pub fn put_u16(&mut self, addr: u64, value: u16) -> &mut Self {
		self.put(addr, &value.to_le_bytes())
	}

	/// Store a little-endian `u32`.
	pub fn put_u32(&mut self, addr: u64, value: u32) -> &mut Self {
		self.put(addr, &value.to_le_bytes())
	}

	/// Store a little-endian `u64`.
	pub fn put_u64(&mut self, addr: u64, value: u64) -> &mut Self {
		self.put(addr, &value.to_le_bytes())
	}

	/// Store a little-endian `i64`.
	pub fn put_i64(&mut self, addr: u64, value: i64) -> &mut Self {
		self.put(addr, &value.to_le_bytes())
	}

	/// Store raw bytes.
	pub fn put(&mut self, addr: u64, bytes: &[u8]) -> &mut Self {
		let start = (addr - self.base) as usize;
		self.bytes[start..start + bytes.len()].copy_from_slice(bytes);
		self
	}

	/// Raw region bytes.
	pub fn into_bytes(self) -> Vec<u8> {
		self.bytes
	}
}

/// The program under inspection: a resilient struct from library `mod`, plus optionals and
/// enums wrapping it from the main module.
#[derive(Debug, Clone)]
pub struct ResilientProgram {
	/// `Swift` module image (standard scalars).
	pub swift_image: Vec<u8>,
	/// `mod` module image (resilient struct `mod.S`).
	pub mod_image: Vec<u8>,
	/// `main` module image (struct `main.T`, enum `main.ResEnum`, optionals).
	pub main_image: Vec<u8>,
	/// Stopped process memory.
	pub memory: MemImage,
	/// Frame variables as `(name, type symbol, address)`.
	pub vars: Vec<(&'static str, &'static str, u64)>,
}

impl ResilientProgram {
	/// Address of a named frame variable.
	pub fn var(&self, name: &str) -> (&'static str, u64) {
		self.vars
			.iter()
			.find(|item| item.0 == name)
			.map(|item| (item.1, item.2))
			.unwrap_or_else(|| panic!("fixture has no variable {name}"))
	}

	/// Serialized single-region snapshot of the program memory.
	pub fn snapshot(&self) -> Vec<u8> {
		SnapshotWriter::new(8).region(self.memory.base(), self.memory.clone().into_bytes()).finish()
	}
}

/// Base address of the fixture memory region.
pub const PROGRAM_BASE: u64 = 0x1000;
/// Address of the `mod.S` value witness record.
pub const S_WITNESS: u64 = 0x2000;

/// Build the resilient-program fixture.
///
/// `mod.S` has five `Int` fields `a..e` holding `1..5`; `main.T` holds `a = 2`; `main.ResEnum`
/// has cases `a`, `b`, `t(T)`, `s(S)`, `c`.
pub fn resilient_program() -> ResilientProgram {
	let mut swift = ImageWriter::new();
	swift
		.scalar("Swift.Int", ScalarEnc::Signed, 8, 8)
		.scalar("Swift.UInt8", ScalarEnc::Unsigned, 1, 1)
		.scalar("Swift.Bool", ScalarEnc::Bool, 1, 1)
		.scalar("Swift.Double", ScalarEnc::Float, 8, 8);

	let mut module = ImageWriter::new();
	module.resilient_struct(
		"mod.S",
		&[
			Member::new("a", "Swift.Int"),
			Member::new("b", "Swift.Int"),
			Member::new("c", "Swift.Int"),
			Member::new("d", "Swift.Int"),
			Member::new("e", "Swift.Int"),
		],
		S_WITNESS,
	);

	let mut main = ImageWriter::new();
	main.structure("main.T", &[Member::new("a", "Swift.Int")])
		.enumeration(
			"main.ResEnum",
			&[
				Case::empty("a"),
				Case::empty("b"),
				Case::payload("t", "main.T"),
				Case::payload("s", "mod.S"),
				Case::empty("c"),
			],
		)
		.optional("Swift.Optional<mod.S>", "mod.S")
		.optional("Swift.Optional<main.T>", "main.T")
		.optional("Swift.Optional<main.ResEnum>", "main.ResEnum");

	let mut memory = MemImage::zeroed(PROGRAM_BASE, 0x1100);
	let put_s = |memory: &mut MemImage, addr: u64| {
		for (idx, value) in (1..=5_i64).enumerate() {
			memory.put_i64(addr + idx as u64 * 8, value);
		}
	};

	// mod.S: 40 bytes. Optional<mod.S>: tag at 40. ResEnum: tag at 40. Optional<ResEnum>: tag at 41.
	put_s(&mut memory, 0x1000);
	put_s(&mut memory, 0x1100);
	memory.put_u8(0x1100 + 40, 0);
	memory.put_u8(0x1200 + 40, 1);
	memory.put_i64(0x1300, 2);
	memory.put_i64(0x1310, 2).put_u8(0x1310 + 8, 0);
	memory.put_u8(0x1320 + 8, 1);
	memory.put_u8(0x1400 + 40, 0);
	memory.put_u8(0x1500 + 40, 0).put_u8(0x1500 + 41, 0);
	memory.put_i64(0x1600, 2).put_u8(0x1600 + 40, 2);
	put_s(&mut memory, 0x1700);
	memory.put_u8(0x1700 + 40, 3);
	put_s(&mut memory, 0x1800);
	memory.put_u8(0x1800 + 40, 3).put_u8(0x1800 + 41, 0);
	memory.put_u8(0x1900 + 40, 9);
	memory.put_u64(S_WITNESS, 40).put_u64(S_WITNESS + 8, 40).put_u32(S_WITNESS + 16, 7);

	ResilientProgram {
		swift_image: swift.finish(),
		mod_image: module.finish(),
		main_image: main.finish(),
		memory,
		vars: vec![
			("s", "mod.S", 0x1000),
			("s_opt", "Swift.Optional<mod.S>", 0x1100),
			("s_nil_opt", "Swift.Optional<mod.S>", 0x1200),
			("t", "main.T", 0x1300),
			("t_opt", "Swift.Optional<main.T>", 0x1310),
			("t_nil_opt", "Swift.Optional<main.T>", 0x1320),
			("r_enum_a", "main.ResEnum", 0x1400),
			("r_enum_a_opt", "Swift.Optional<main.ResEnum>", 0x1500),
			("r_enum_t", "main.ResEnum", 0x1600),
			("r_enum_s", "main.ResEnum", 0x1700),
			("r_enum_s_opt", "Swift.Optional<main.ResEnum>", 0x1800),
			("r_enum_corrupt", "main.ResEnum", 0x1900),
		],
	}
}

fn put_u32(out: &mut Vec<u8>, value: u32) {
	out.extend_from_slice(&value.to_le_bytes());
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
	out.extend_from_slice(&value.to_le_bytes());
}

fn put_spare(out: &mut Vec<u8>, spare: SpareBits) {
	put_u32(out, spare.offset);
	put_u32(out, spare.width);
	put_u64(out, spare.mask);
}
