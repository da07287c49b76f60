use std::fmt::Write as _;

use dynview::inspect::{InspectError, Value};

use crate::cmd::util::ptr_hex;

/// Output truncation limits for formatted value trees.
#[derive(Debug, Clone, Copy)]
pub struct PrintOptions {
	/// Maximum number of children printed for a single value.
	pub max_children: usize,
	/// Maximum nesting depth printed.
	pub max_print_depth: u32,
	/// Append each value's type name.
	pub show_types: bool,
}

impl Default for PrintOptions {
	fn default() -> Self {
		Self {
			max_children: 64,
			max_print_depth: 8,
			show_types: true,
		}
	}
}

impl PrintOptions {
	/// Preset for one line per value with no type annotations.
	pub fn compact() -> Self {
		Self {
			max_children: 16,
			max_print_depth: 4,
			show_types: false,
		}
	}
}

/// Print one formatted value tree.
pub fn print_value(value: &Value, options: PrintOptions) {
	print!("{}", render_value(value, options));
}

/// Render one formatted value tree as indented text.
pub fn render_value(value: &Value, options: PrintOptions) -> String {
	let mut out = String::new();
	render_into(&mut out, value, 0, options);
	out
}

/// Placeholder line for a variable that failed to format.
pub fn render_error(name: &str, err: &InspectError) -> String {
	format!("{name} = <error: {err}>\n")
}

fn render_into(out: &mut String, value: &Value, depth: u32, options: PrintOptions) {
	let pad = "  ".repeat(depth as usize);
	let _ = write!(out, "{pad}{} = {}", value.name, value_text(value));
	if options.show_types {
		let _ = write!(out, " ({})", value.type_name);
	}

	if value.children.is_empty() {
		out.push('\n');
		return;
	}
	if depth >= options.max_print_depth {
		let _ = writeln!(out, " {{ ... {} children }}", value.children.len());
		return;
	}

	out.push_str(" {\n");
	for child in value.children.iter().take(options.max_children) {
		render_into(out, child, depth + 1, options);
	}
	if value.children.len() > options.max_children {
		let _ = writeln!(out, "{pad}  ... {} more", value.children.len() - options.max_children);
	}
	let _ = writeln!(out, "{pad}}}");
}

fn value_text(value: &Value) -> String {
	match (value.scalar_value(), value.summary()) {
		(Some(scalar), "") => scalar.to_owned(),
		(Some(scalar), summary) => format!("{summary} {scalar}"),
		(None, "") => format!("@{}", ptr_hex(value.address)),
		(None, summary) => summary.to_owned(),
	}
}

/// JSON form of a formatted value tree.
#[derive(Debug, serde::Serialize)]
pub struct ValueJson {
	name: String,
	type_name: String,
	address: String,
	byte_size: u64,
	summary: String,
	scalar: Option<String>,
	case: Option<String>,
	children: Vec<ValueJson>,
}

impl From<&Value> for ValueJson {
	fn from(value: &Value) -> Self {
		Self {
			name: value.name.to_string(),
			type_name: value.type_name.to_string(),
			address: ptr_hex(value.address),
			byte_size: value.byte_size,
			summary: value.summary.clone(),
			scalar: value.scalar.clone(),
			case: value.case.as_deref().map(str::to_owned),
			children: value.children.iter().map(ValueJson::from).collect(),
		}
	}
}
