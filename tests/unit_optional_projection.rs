#![allow(missing_docs)]

use dynview::inspect::{InspectError, MemorySnapshot, ModuleImage, Session, TargetInfo, Value};
use dynview_testkit::{ResilientProgram, resilient_program};

fn attach(program: &ResilientProgram) -> (Session, MemorySnapshot) {
	let memory = MemorySnapshot::parse(&program.snapshot()).expect("snapshot parses");
	let session = Session::attach(memory.target);
	for (name, bytes) in [("Swift", &program.swift_image), ("mod", &program.mod_image), ("main", &program.main_image)] {
		session.load_module(ModuleImage::parse(name, bytes).expect("image parses")).expect("module loads");
	}
	(session, memory)
}

fn format(program: &ResilientProgram, session: &Session, memory: &MemorySnapshot, var: &str) -> dynview::inspect::Result<Value> {
	let (symbol, addr) = program.var(var);
	session.format_variable(memory, var, symbol, addr)
}

#[test]
fn resilient_payloads_are_transparent_through_wrappers() {
	let program = resilient_program();
	let (session, memory) = attach(&program);

	let t_opt = format(&program, &session, &memory, "t_opt").expect("t_opt");
	assert_eq!(t_opt.num_children(), 1);
	assert_eq!(t_opt.child_member_with_name("a").and_then(Value::scalar_value), Some("2"));

	let r_enum_s = format(&program, &session, &memory, "r_enum_s").expect("r_enum_s");
	assert_eq!(r_enum_s.summary(), ".s");
	assert_eq!(r_enum_s.num_children(), 5);
	assert_eq!(r_enum_s.child_member_with_name("a").and_then(Value::scalar_value), Some("1"));

	let s_opt = format(&program, &session, &memory, "s_opt").expect("s_opt");
	assert_eq!(s_opt.num_children(), 5);
	assert_eq!(s_opt.child_at_index(0).and_then(Value::scalar_value), Some("1"));

	let err = format(&program, &session, &memory, "r_enum_corrupt").expect_err("corrupt tag");
	assert!(matches!(err, InspectError::InvalidTag { .. }));
}

#[test]
fn sibling_variables_survive_a_failing_one() {
	let program = resilient_program();
	let (session, memory) = attach(&program);

	let results: Vec<_> = ["s", "r_enum_corrupt", "s_nil_opt"]
		.into_iter()
		.map(|var| format(&program, &session, &memory, var))
		.collect();

	assert!(results[0].as_ref().is_ok_and(|value| value.num_children() == 5));
	assert!(results[1].is_err());
	assert!(results[2].as_ref().is_ok_and(|value| value.summary() == ".none" && value.num_children() == 0));
}

#[test]
fn sessions_share_nothing() {
	let program = resilient_program();
	let (first, memory) = attach(&program);
	let second = Session::attach(TargetInfo::default());

	format(&program, &first, &memory, "s").expect("first session formats");
	assert!(second.types().is_empty());
	assert!(matches!(
		format(&program, &second, &memory, "s"),
		Err(InspectError::UnresolvedMetadata { .. })
	));
}
