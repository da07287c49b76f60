use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::OnceLock;

use dynview_testkit::{ResilientProgram, resilient_program, write_scratch};

static DYNVIEW_BIN: OnceLock<PathBuf> = OnceLock::new();

/// On-disk copy of the resilient-program fixture.
pub(crate) struct ProgramFiles {
	pub(crate) images: Vec<String>,
	pub(crate) snapshot: String,
	pub(crate) program: ResilientProgram,
}

pub(crate) fn program_files(group: &str) -> ProgramFiles {
	let program = resilient_program();
	let images = [("Swift.tymd", &program.swift_image), ("mod.tymd", &program.mod_image), ("main.tymd", &program.main_image)]
		.into_iter()
		.map(|(name, bytes)| write_scratch(group, name, bytes).to_string_lossy().into_owned())
		.collect();
	let snapshot = write_scratch(group, "memory.msnp", &program.snapshot()).to_string_lossy().into_owned();
	ProgramFiles { images, snapshot, program }
}

pub(crate) fn run_dynview(args: &[&str]) -> Output {
	Command::new(dynview_bin()).args(args).output().expect("dynview command executes")
}

pub(crate) fn run_dynview_json(args: &[&str]) -> serde_json::Value {
	let output = run_dynview(args);
	assert!(
		output.status.success(),
		"dynview command failed with status={}: {}",
		output.status,
		String::from_utf8_lossy(&output.stderr)
	);
	serde_json::from_slice(&output.stdout).expect("stdout should be valid json")
}

fn dynview_bin() -> &'static PathBuf {
	DYNVIEW_BIN.get_or_init(resolve_dynview_bin)
}

fn resolve_dynview_bin() -> PathBuf {
	if let Ok(path) = std::env::var("CARGO_BIN_EXE_dynview") {
		return PathBuf::from(path);
	}

	let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
	let target_dir = std::env::var_os("CARGO_TARGET_DIR")
		.map(PathBuf::from)
		.unwrap_or_else(|| manifest_dir.join("target"));

	let mut bin = target_dir.join("debug");
	bin.push(if cfg!(windows) { "dynview.exe" } else { "dynview" });

	let status = Command::new("cargo")
		.current_dir(&manifest_dir)
		.args(["build", "--quiet", "--bin", "dynview"])
		.status()
		.expect("cargo build executes");
	assert!(status.success(), "failed to build dynview binary at {}", bin.display());

	bin
}
