use std::path::{Path, PathBuf};

use dynview::inspect::{FormatOptions, InspectError, MemorySnapshot, Result, Session};

/// One `name=Type@addr` frame variable requested on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VarSpec {
	pub(crate) name: String,
	pub(crate) symbol: String,
	pub(crate) addr: u64,
}

/// Parse decimal or `0x`-prefixed hex pointer literal.
pub(crate) fn parse_ptr(value: &str) -> Result<u64> {
	let parsed = if let Some(stripped) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
		u64::from_str_radix(stripped, 16)
	} else {
		value.parse::<u64>()
	};

	parsed.map_err(|_| InspectError::InvalidPointerLiteral { value: value.to_owned() })
}

/// Parse `name=Type@addr`.
pub(crate) fn parse_var_spec(spec: &str) -> Result<VarSpec> {
	let invalid = || InspectError::InvalidVariableSpec { spec: spec.to_owned() };
	let (name, rest) = spec.split_once('=').ok_or_else(invalid)?;
	let (symbol, addr) = rest.rsplit_once('@').ok_or_else(invalid)?;
	if name.is_empty() || symbol.is_empty() {
		return Err(invalid());
	}

	Ok(VarSpec {
		name: name.to_owned(),
		symbol: symbol.to_owned(),
		addr: parse_ptr(addr)?,
	})
}

/// Open a snapshot and attach a session with every image loaded.
pub(crate) fn open_session(images: &[PathBuf], snapshot: &Path, options: FormatOptions) -> Result<(Session, MemorySnapshot)> {
	let memory = MemorySnapshot::open(snapshot)?;
	let session = Session::with_options(memory.target, options);
	for path in images {
		session.load_module_file(path)?;
	}
	Ok((session, memory))
}

/// Print a serializable payload as pretty JSON on stdout.
pub(crate) fn emit_json<T: serde::Serialize>(payload: &T) {
	match serde_json::to_string_pretty(payload) {
		Ok(text) => println!("{text}"),
		Err(err) => eprintln!("error: failed to serialize json output: {err}"),
	}
}

/// Render an address as fixed-width hex.
pub(crate) fn ptr_hex(value: u64) -> String {
	format!("0x{value:016x}")
}
