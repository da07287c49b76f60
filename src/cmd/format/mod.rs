use std::path::PathBuf;

use dynview::inspect::{FormatOptions, InspectError, OptionalStyle, Result, Value};

use crate::cmd::print::{PrintOptions, ValueJson, print_value, render_error};
use crate::cmd::util::{VarSpec, emit_json, open_session, parse_var_spec, ptr_hex};

#[derive(clap::Args)]
pub struct Args {
	#[arg(long = "image", required = true)]
	pub images: Vec<PathBuf>,
	#[arg(long)]
	pub snapshot: PathBuf,
	#[arg(long = "var", required = true)]
	pub vars: Vec<String>,
	#[arg(long)]
	pub json: bool,
	#[arg(long = "max-depth")]
	pub max_depth: Option<u32>,
	#[arg(long = "swift-style")]
	pub swift_style: bool,
	#[arg(long = "show-hidden")]
	pub show_hidden: bool,
	#[arg(long)]
	pub compact: bool,
}

/// Format frame variables; each variable succeeds or fails on its own.
pub fn run(args: Args) -> Result<()> {
	let Args {
		images,
		snapshot,
		vars,
		json,
		max_depth,
		swift_style,
		show_hidden,
		compact,
	} = args;

	let specs = vars.iter().map(|spec| parse_var_spec(spec)).collect::<Result<Vec<_>>>()?;

	let mut options = FormatOptions::default();
	if let Some(max_depth) = max_depth {
		options.max_depth = max_depth;
	}
	if swift_style {
		options.optional_style = OptionalStyle::Swift;
	}
	options.show_hidden_members = show_hidden;

	let (session, memory) = open_session(&images, &snapshot, options)?;
	let results: Vec<(VarSpec, Result<Value>)> = specs
		.into_iter()
		.map(|spec| {
			let result = session.format_variable(&memory, &spec.name, &spec.symbol, spec.addr);
			(spec, result)
		})
		.collect();

	if json {
		emit_json(&FormatJson {
			vars: results.iter().map(|(spec, result)| var_json(spec, result)).collect(),
		});
		return Ok(());
	}

	let print_options = if compact { PrintOptions::compact() } else { PrintOptions::default() };
	for (spec, result) in &results {
		match result {
			Ok(value) => print_value(value, print_options),
			Err(err) => print!("{}", render_error(&spec.name, err)),
		}
	}

	Ok(())
}

fn var_json(spec: &VarSpec, result: &Result<Value>) -> VarJson {
	let (value, error) = match result {
		Ok(value) => (Some(ValueJson::from(value)), None),
		Err(err) => (None, Some(ErrorJson::from(err))),
	};
	VarJson {
		name: spec.name.clone(),
		type_name: spec.symbol.clone(),
		addr: ptr_hex(spec.addr),
		value,
		error,
	}
}

#[derive(serde::Serialize)]
struct ErrorJson {
	kind: &'static str,
	message: String,
}

impl From<&InspectError> for ErrorJson {
	fn from(err: &InspectError) -> Self {
		Self {
			kind: err.kind_label(),
			message: err.to_string(),
		}
	}
}

#[derive(serde::Serialize)]
struct VarJson {
	name: String,
	type_name: String,
	addr: String,
	value: Option<ValueJson>,
	error: Option<ErrorJson>,
}

#[derive(serde::Serialize)]
struct FormatJson {
	vars: Vec<VarJson>,
}
