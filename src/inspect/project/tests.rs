use dynview_testkit::{Case, ImageWriter, MemImage, Member, ScalarEnc, SpareBits, resilient_program};

use crate::inspect::{Endianness, InspectError, LayoutCx, MemorySnapshot, ModuleImage, ModuleRegistry, SpareBitMask, TargetInfo, TypeCache, select_case};

struct World {
	registry: ModuleRegistry,
	cache: TypeCache,
	snapshot: MemorySnapshot,
}

impl World {
	fn new(images: Vec<(&str, Vec<u8>)>, memory: MemImage) -> Self {
		let registry = ModuleRegistry::new();
		for (name, bytes) in images {
			registry.load(ModuleImage::parse(name, &bytes).expect("image parses")).expect("load");
		}
		let mut snapshot = MemorySnapshot::new(TargetInfo::default());
		let base = memory.base();
		snapshot.add_region(base, memory.into_bytes());
		Self {
			registry,
			cache: TypeCache::new(),
			snapshot,
		}
	}

	fn program() -> Self {
		let program = resilient_program();
		Self::new(
			vec![("Swift", program.swift_image), ("mod", program.mod_image), ("main", program.main_image)],
			program.memory,
		)
	}

	fn select(&self, symbol: &str, addr: u64) -> crate::inspect::Result<crate::inspect::CaseSelection> {
		let ty = self.cache.resolve(&self.registry, symbol)?;
		select_case(&LayoutCx::new(&self.cache, &self.snapshot, self.snapshot.target), ty, addr)
	}
}

#[test]
fn tag_bytes_select_fixture_cases() {
	let world = World::program();

	let a = world.select("main.ResEnum", 0x1400).expect("case a");
	assert_eq!((a.index, a.case.name.as_ref(), a.payload_addr), (0, "a", None));

	let t = world.select("main.ResEnum", 0x1600).expect("case t");
	assert_eq!((t.index, t.tag, t.case.name.as_ref()), (2, 2, "t"));
	assert_eq!(t.payload_addr, Some(0x1600));
	assert!(t.mask.is_none());

	let s = world.select("main.ResEnum", 0x1700).expect("case s");
	assert_eq!(s.case.name.as_ref(), "s");
}

#[test]
fn optionals_project_some_and_none() {
	let world = World::program();

	let some = world.select("Swift.Optional<mod.S>", 0x1100).expect("some");
	assert_eq!((some.index, some.case.name.as_ref(), some.payload_addr), (0, "some", Some(0x1100)));

	let none = world.select("Swift.Optional<mod.S>", 0x1200).expect("none");
	assert_eq!((none.index, none.case.name.as_ref(), none.payload_addr), (1, "none", None));

	let nested = world.select("Swift.Optional<main.ResEnum>", 0x1800).expect("nested some");
	assert_eq!(nested.payload_addr, Some(0x1800));
}

#[test]
fn out_of_range_tag_is_invalid() {
	let world = World::program();
	let err = world.select("main.ResEnum", 0x1900).expect_err("must fail");
	assert!(matches!(
		err,
		InspectError::InvalidTag { ref type_name, tag: 9, case_count: 5 } if type_name == "main.ResEnum"
	));
}

#[test]
fn non_enum_types_cannot_be_projected() {
	let world = World::program();
	let err = world.select("main.T", 0x1300).expect_err("must fail");
	assert!(matches!(err, InspectError::MalformedMetadata { .. }));
}

fn spare_world(tag_word: u64) -> World {
	let mut writer = ImageWriter::new();
	writer.scalar("Int", ScalarEnc::Signed, 8, 8).enumeration_spare_bits(
		"lib.E",
		&[Case::payload("p", "Int"), Case::empty("q"), Case::empty("r")],
		SpareBits {
			offset: 0,
			width: 8,
			mask: 0xC000_0000_0000_0000,
		},
	);
	let mut memory = MemImage::zeroed(0x4000, 0x10);
	memory.put_u64(0x4000, tag_word);
	World::new(vec![("lib", writer.finish())], memory)
}

#[test]
fn spare_bits_select_by_masked_word() {
	let payload = spare_world(0x2a).select("lib.E", 0x4000).expect("payload case");
	assert_eq!((payload.index, payload.case.name.as_ref()), (0, "p"));
	assert_eq!(payload.payload_addr, Some(0x4000));
	assert_eq!(
		payload.mask,
		Some(SpareBitMask {
			addr: 0x4000,
			width: 8,
			mask: 0xC000_0000_0000_0000,
			endianness: Endianness::Little,
		})
	);

	let empty = spare_world(0x8000_0000_0000_0000).select("lib.E", 0x4000).expect("empty case");
	assert_eq!((empty.index, empty.tag, empty.payload_addr), (2, 2, None));

	let err = spare_world(0xC000_0000_0000_0000).select("lib.E", 0x4000).expect_err("tag 3");
	assert!(matches!(err, InspectError::InvalidTag { tag: 3, case_count: 3, .. }));
}

#[test]
fn single_case_enum_has_no_tag() {
	let mut writer = ImageWriter::new();
	writer.scalar("Int", ScalarEnc::Signed, 8, 8).enumeration("lib.One", &[Case::payload("only", "Int")]);
	let world = World::new(vec![("lib", writer.finish())], MemImage::zeroed(0x4000, 8));

	let only = world.select("lib.One", 0x4000).expect("only case");
	assert_eq!((only.index, only.tag, only.payload_addr), (0, 0, Some(0x4000)));
}

fn list_world(pointer: u64) -> World {
	let mut writer = ImageWriter::new();
	writer
		.scalar("Int", ScalarEnc::Signed, 8, 8)
		.enumeration("lib.List", &[Case::empty("nil"), Case::payload("cons", "lib.Cell").indirect()])
		.structure("lib.Cell", &[Member::new("head", "Int"), Member::new("tail", "lib.List")]);
	let mut memory = MemImage::zeroed(0x5000, 0x200);
	memory.put_u64(0x5000, pointer).put_u8(0x5008, 1);
	World::new(vec![("lib", writer.finish())], memory)
}

#[test]
fn indirect_payloads_follow_the_pointer() {
	let cons = list_world(0x5100).select("lib.List", 0x5000).expect("cons");
	assert_eq!(cons.case.name.as_ref(), "cons");
	assert_eq!(cons.payload_addr, Some(0x5100));

	let err = list_world(0).select("lib.List", 0x5000).expect_err("null payload pointer");
	assert!(matches!(err, InspectError::MemoryUnavailable { addr: 0, len: 8 }));
}

#[test]
fn mask_bytes_follow_byte_order() {
	let mut mask = SpareBitMask {
		addr: 0,
		width: 4,
		mask: 0x8000_0001,
		endianness: Endianness::Little,
	};
	assert_eq!(mask.mask_bytes(), vec![0x01, 0x00, 0x00, 0x80]);
	mask.endianness = Endianness::Big;
	assert_eq!(mask.mask_bytes(), vec![0x80, 0x00, 0x00, 0x01]);
}
