use std::thread;

use dynview_testkit::{Case, ImageWriter, Member, ScalarEnc, SpareBits, resilient_program};

use crate::inspect::{InspectError, ModuleImage, ModuleRegistry, TagStrategy, TypeCache, TypeKind};

fn program_registry() -> ModuleRegistry {
	let program = resilient_program();
	let registry = ModuleRegistry::new();
	registry.load(ModuleImage::parse("Swift", &program.swift_image).expect("swift")).expect("load swift");
	registry.load(ModuleImage::parse("mod", &program.mod_image).expect("mod")).expect("load mod");
	registry.load(ModuleImage::parse("main", &program.main_image).expect("main")).expect("load main");
	registry
}

fn single_image(writer: &ImageWriter) -> ModuleRegistry {
	let registry = ModuleRegistry::new();
	registry.load(ModuleImage::parse("lib", &writer.finish()).expect("image parses")).expect("load");
	registry
}

#[test]
fn optional_resolves_as_two_case_enum() {
	let registry = program_registry();
	let cache = TypeCache::new();

	let id = cache.resolve(&registry, "Swift.Optional<mod.S>").expect("optional resolves");
	let desc = cache.descriptor(id).expect("descriptor");
	let TypeKind::Optional(item) = &desc.kind else {
		panic!("expected optional kind");
	};
	assert_eq!(item.cases.len(), 2);
	assert_eq!(item.cases[0].name.as_ref(), "some");
	assert_eq!(item.cases[1].name.as_ref(), "none");
	assert!(item.cases[1].payload.is_none());
	assert_eq!(item.strategy, TagStrategy::TagBytes);
	assert!(desc.dynamic, "optional of a resilient struct is dynamically sized");
	assert_eq!(desc.module.as_ref(), "main");

	let payload = cache.descriptor(item.cases[0].payload.expect("some payload")).expect("payload descriptor");
	assert_eq!(payload.name.as_ref(), "mod.S");
	assert_eq!(payload.module.as_ref(), "mod");

	// Optional, mod.S, and Swift.Int.
	assert_eq!(cache.len(), 3);
}

#[test]
fn repeated_resolution_hits_the_cache() {
	let registry = program_registry();
	let cache = TypeCache::new();
	let first = cache.resolve(&registry, "main.ResEnum").expect("first");
	let count = cache.len();
	let second = cache.resolve(&registry, "main.ResEnum").expect("second");
	assert_eq!(first, second);
	assert_eq!(cache.len(), count);
	assert_eq!(cache.lookup("main.T"), Some(cache.resolve(&registry, "main.T").expect("T")));
}

#[test]
fn missing_type_is_unresolved() {
	let registry = program_registry();
	let cache = TypeCache::new();
	let err = cache.resolve(&registry, "other.Missing").expect_err("must fail");
	assert!(matches!(err, InspectError::UnresolvedMetadata { ref symbol } if symbol == "other.Missing"));
	assert!(cache.is_empty());
}

#[test]
fn missing_member_rolls_back_partial_entries() {
	let mut writer = ImageWriter::new();
	writer
		.scalar("Int", ScalarEnc::Signed, 8, 8)
		.structure("lib.Outer", &[Member::new("x", "Int"), Member::new("inner", "lib.Inner")])
		.structure("lib.Inner", &[Member::new("y", "Int"), Member::new("gone", "lib.Gone")]);
	let registry = single_image(&writer);
	let cache = TypeCache::new();

	let err = cache.resolve(&registry, "lib.Outer").expect_err("must fail");
	assert!(matches!(err, InspectError::UnresolvedMetadata { ref symbol } if symbol == "lib.Gone"));
	assert!(cache.is_empty(), "no partial descriptors may remain");
	assert!(cache.lookup("Int").is_none());

	// Unrelated types still resolve after the failed pass.
	cache.resolve(&registry, "Int").expect("scalar resolves");
	assert_eq!(cache.len(), 1);
}

#[test]
fn direct_cycle_is_malformed() {
	let mut writer = ImageWriter::new();
	writer
		.scalar("Int", ScalarEnc::Signed, 8, 8)
		.structure("lib.A", &[Member::new("b", "lib.B")])
		.structure("lib.B", &[Member::new("n", "Int"), Member::new("a", "lib.A")]);
	let registry = single_image(&writer);
	let cache = TypeCache::new();

	let err = cache.resolve(&registry, "lib.A").expect_err("must fail");
	assert!(matches!(err, InspectError::MalformedMetadata { ref symbol, .. } if symbol == "lib.A"));
	assert!(cache.is_empty());
}

#[test]
fn optional_of_itself_is_malformed() {
	let mut writer = ImageWriter::new();
	writer.optional("lib.Loop", "lib.Loop");
	let registry = single_image(&writer);
	let err = TypeCache::new().resolve(&registry, "lib.Loop").expect_err("must fail");
	assert!(matches!(err, InspectError::MalformedMetadata { .. }));
}

#[test]
fn indirect_recursion_is_allowed() {
	let mut writer = ImageWriter::new();
	writer
		.scalar("Int", ScalarEnc::Signed, 8, 8)
		.enumeration("lib.List", &[Case::empty("nil"), Case::payload("cons", "lib.Cell").indirect()])
		.structure("lib.Cell", &[Member::new("head", "Int"), Member::new("tail", "lib.List")]);
	let registry = single_image(&writer);
	let cache = TypeCache::new();

	let list = cache.resolve(&registry, "lib.List").expect("list resolves");
	let desc = cache.descriptor(list).expect("descriptor");
	let TypeKind::Enum(item) = &desc.kind else {
		panic!("expected enum");
	};
	let cell = cache.descriptor(item.cases[1].payload.expect("cons payload")).expect("cell");
	let TypeKind::Struct(cell_struct) = &cell.kind else {
		panic!("expected struct");
	};
	assert_eq!(cell_struct.members[1].ty, list);
	assert!(!desc.dynamic);
}

fn assert_malformed(label: &str, build: impl FnOnce(&mut ImageWriter)) {
	let mut writer = ImageWriter::new();
	build(&mut writer);
	let registry = single_image(&writer);
	let err = TypeCache::new().resolve(&registry, "X").expect_err(label);
	assert!(matches!(err, InspectError::MalformedMetadata { .. }), "{label}: {err}");
}

#[test]
fn invalid_records_are_malformed() {
	assert_malformed("float width", |w| {
		w.scalar("X", ScalarEnc::Float, 2, 2);
	});
	assert_malformed("align", |w| {
		w.scalar("X", ScalarEnc::Signed, 4, 3);
	});
	assert_malformed("empty enum", |w| {
		w.enumeration("X", &[]);
	});
	assert_malformed("empty mask", |w| {
		w.enumeration_spare_bits("X", &[Case::empty("a")], SpareBits { offset: 0, width: 1, mask: 0 });
	});
	assert_malformed("wide mask", |w| {
		w.enumeration_spare_bits("X", &[Case::empty("a")], SpareBits { offset: 0, width: 1, mask: 0x100 });
	});
	assert_malformed("prefix width", |w| {
		w.opaque_prefixed("X", 3, 1);
	});
	assert_malformed("spare bits without payload", |w| {
		w.enumeration_spare_bits("X", &[Case::empty("a"), Case::empty("b")], SpareBits { offset: 0, width: 1, mask: 0x80 });
	});
}

#[test]
fn per_instance_payloads_need_a_single_case_or_a_pointer() {
	assert_malformed("prefixed case", |w| {
		w.scalar("UInt8", ScalarEnc::Unsigned, 1, 1)
			.opaque_prefixed("lib.Blob", 1, 1)
			.enumeration("X", &[Case::payload("p", "lib.Blob"), Case::payload("n", "UInt8")]);
	});
	assert_malformed("optional of prefixed", |w| {
		w.opaque_prefixed("lib.Blob", 4, 4).optional("X", "lib.Blob");
	});
	assert_malformed("struct holding prefixed", |w| {
		w.opaque_prefixed("lib.Blob", 4, 4)
			.structure("lib.Rec", &[Member::new("body", "lib.Blob")])
			.enumeration("X", &[Case::payload("r", "lib.Rec"), Case::empty("none")]);
	});

	let mut writer = ImageWriter::new();
	writer
		.opaque_prefixed("lib.Blob", 4, 4)
		.enumeration("lib.One", &[Case::payload("only", "lib.Blob")])
		.enumeration("lib.Boxed", &[Case::payload("p", "lib.Blob").indirect(), Case::empty("none")]);
	let registry = single_image(&writer);
	let cache = TypeCache::new();
	let one = cache.resolve(&registry, "lib.One").expect("single case resolves");
	assert!(cache.descriptor(one).expect("one").per_instance);
	let boxed = cache.resolve(&registry, "lib.Boxed").expect("indirect case resolves");
	assert!(!cache.descriptor(boxed).expect("boxed").dynamic);
}

#[test]
fn runtime_sizing_reaches_types_inside_indirect_cycles() {
	let mut writer = ImageWriter::new();
	writer
		.opaque_prefixed("lib.Blob", 4, 4)
		.structure("lib.A", &[Member::new("x", "lib.B").indirect(), Member::new("blob", "lib.Blob")])
		.structure("lib.B", &[Member::new("y", "lib.A")])
		.structure("lib.Link", &[Member::new("next", "lib.A").indirect()]);
	let registry = single_image(&writer);
	let cache = TypeCache::new();

	let a = cache.resolve(&registry, "lib.A").expect("A resolves");
	let b = cache.lookup("lib.B").expect("B resolved with A");
	for id in [a, b] {
		let desc = cache.descriptor(id).expect("descriptor");
		assert!(desc.dynamic && desc.per_instance, "{} is sized per instance", desc.name);
	}

	let link = cache.resolve(&registry, "lib.Link").expect("link resolves");
	assert!(!cache.descriptor(link).expect("link").dynamic);
}

#[test]
fn unloading_a_module_evicts_dependents() {
	let registry = program_registry();
	let cache = TypeCache::new();
	let opt = cache.resolve(&registry, "Swift.Optional<main.ResEnum>").expect("resolves");
	let t_opt = cache.resolve(&registry, "Swift.Optional<main.T>").expect("resolves");
	let int = cache.lookup("Swift.Int").expect("Int cached");

	registry.unload("mod").expect("unload");
	let evicted = cache.invalidate_module("mod");

	// mod.S, main.ResEnum, Optional<main.ResEnum>.
	assert_eq!(evicted, 3);
	assert!(matches!(cache.descriptor(opt), Err(InspectError::UnresolvedMetadata { ref symbol }) if symbol == "Swift.Optional<main.ResEnum>"));
	assert!(cache.descriptor(t_opt).is_ok());
	assert!(cache.descriptor(int).is_ok());

	let err = cache.resolve(&registry, "main.ResEnum").expect_err("mod.S is gone");
	assert!(matches!(err, InspectError::UnresolvedMetadata { ref symbol } if symbol == "mod.S"));
}

#[test]
fn reloading_reuses_evicted_slots() {
	let registry = program_registry();
	let cache = TypeCache::new();
	let opt = cache.resolve(&registry, "Swift.Optional<main.ResEnum>").expect("resolves");
	let count = cache.len();

	for _ in 0..3 {
		registry.unload("mod").expect("unload");
		cache.invalidate_module("mod");
		cache.resolve(&registry, "Swift.Optional<main.ResEnum>").expect_err("mod.S is gone");

		registry.load(ModuleImage::parse("mod", &resilient_program().mod_image).expect("mod")).expect("reload");
		assert_eq!(cache.resolve(&registry, "Swift.Optional<main.ResEnum>").expect("resolves again"), opt);
		assert_eq!(cache.len(), count);
	}
	assert!(cache.descriptor(opt).is_ok());
}

#[test]
fn concurrent_first_resolution_agrees() {
	let registry = program_registry();
	let cache = TypeCache::new();

	let ids: Vec<_> = thread::scope(|scope| {
		let handles: Vec<_> = (0..8)
			.map(|_| scope.spawn(|| cache.resolve(&registry, "Swift.Optional<main.ResEnum>").expect("resolves")))
			.collect();
		handles.into_iter().map(|handle| handle.join().expect("thread joins")).collect()
	});

	assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
	// Optional<ResEnum>, ResEnum, T, S, Int.
	assert_eq!(cache.len(), 5);
}
