#![allow(missing_docs)]

use std::path::PathBuf;
use std::process::Command;

use dynview_testkit::{resilient_program, write_scratch};
use serde_json::Value;

struct Files {
	images: Vec<PathBuf>,
	snapshot: PathBuf,
}

fn files(group: &str, compress: bool) -> Files {
	let program = resilient_program();
	let encode = |bytes: &[u8]| if compress { zstd::encode_all(bytes, 3).expect("zstd encodes") } else { bytes.to_vec() };
	Files {
		images: vec![
			write_scratch(group, "Swift.tymd", &encode(&program.swift_image)),
			write_scratch(group, "mod.tymd", &encode(&program.mod_image)),
			write_scratch(group, "main.tymd", &encode(&program.main_image)),
		],
		snapshot: write_scratch(group, "memory.msnp", &encode(&program.snapshot())),
	}
}

fn format_json(files: &Files, vars: &[&str]) -> Value {
	let mut args: Vec<String> = vec!["format".to_owned()];
	for image in &files.images {
		args.extend(["--image".to_owned(), image.display().to_string()]);
	}
	args.extend(["--snapshot".to_owned(), files.snapshot.display().to_string()]);
	for var in vars {
		args.extend(["--var".to_owned(), (*var).to_owned()]);
	}
	args.push("--json".to_owned());
	run_json(args)
}

#[test]
fn format_json_output_is_valid_and_structured() {
	let json = format_json(&files("cli-json-plain", false), &["s_opt=Swift.Optional<mod.S>@0x1100", "t_nil_opt=Swift.Optional<main.T>@0x1320"]);

	assert_eq!(json["vars"][0]["name"], "s_opt");
	assert_eq!(json["vars"][0]["addr"], "0x0000000000001100");
	assert_eq!(json["vars"][0]["value"]["case"], "some");
	assert_eq!(json["vars"][0]["value"]["children"][4]["name"], "e");
	assert_eq!(json["vars"][0]["value"]["children"][4]["scalar"], "5");
	assert_eq!(json["vars"][1]["value"]["summary"], ".none");
	assert_eq!(json["vars"][1]["value"]["children"].as_array().map(Vec::len), Some(0));
}

#[test]
fn compressed_inputs_are_sniffed() {
	let files = files("cli-json-zstd", true);
	let json = format_json(&files, &["r_enum_s_opt=Swift.Optional<main.ResEnum>@0x1800"]);
	assert_eq!(json["vars"][0]["value"]["summary"], ".some(.s)");

	let mut args = vec!["types".to_owned()];
	args.extend(files.images.iter().map(|path| path.display().to_string()));
	args.push("--json".to_owned());
	let types = run_json(args);
	assert_eq!(types["modules"][0]["compression"], "zstd");
	assert_eq!(types["modules"][0]["name"], "Swift");
}

#[test]
fn missing_image_file_exits_with_error() {
	let output = Command::new(env!("CARGO_BIN_EXE_dynview"))
		.args(["types", "/nonexistent/dynview/none.tymd"])
		.output()
		.expect("command executes");

	assert_eq!(output.status.code(), Some(1));
	assert!(String::from_utf8_lossy(&output.stderr).starts_with("error: io:"));
}

fn run_json(args: Vec<String>) -> Value {
	let output = Command::new(env!("CARGO_BIN_EXE_dynview")).args(&args).output().expect("command executes");

	assert!(output.status.success(), "command should succeed: {}", String::from_utf8_lossy(&output.stderr));
	serde_json::from_slice(&output.stdout).expect("stdout should be valid json")
}
