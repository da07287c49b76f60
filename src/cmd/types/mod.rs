use std::path::PathBuf;

use dynview::inspect::{MetadataRecord, ModuleImage, RawStorage, RecordKind, Result};

use crate::cmd::util::{emit_json, ptr_hex};

#[derive(clap::Args)]
pub struct Args {
	#[arg(required = true)]
	pub images: Vec<PathBuf>,
	#[arg(long)]
	pub json: bool,
}

/// List the type records each module image publishes.
pub fn run(args: Args) -> Result<()> {
	let Args { images, json } = args;

	let mut modules = Vec::with_capacity(images.len());
	for path in &images {
		let (compression, image) = ModuleImage::open_with_compression(path)?;
		modules.push(ModuleJson {
			path: path.display().to_string(),
			name: image.name.to_string(),
			compression: compression.as_str().to_owned(),
			records: image.records.iter().map(|record| record_json(record)).collect(),
		});
	}

	if json {
		emit_json(&TypesJson { modules });
		return Ok(());
	}

	for module in modules {
		println!("module: {}", module.name);
		println!("path: {}", module.path);
		println!("compression: {}", module.compression);
		println!("records: {}", module.records.len());
		for record in module.records {
			println!("  {:<8} {} {}", record.kind, record.symbol, record.detail);
		}
	}

	Ok(())
}

fn record_json(record: &MetadataRecord) -> RecordJson {
	let (detail, refs) = describe(&record.kind);
	RecordJson {
		symbol: record.symbol.to_string(),
		kind: record.kind.as_str(),
		detail,
		refs,
	}
}

pub(crate) fn describe(kind: &RecordKind) -> (String, Vec<String>) {
	match kind {
		RecordKind::Scalar { encoding, size, align } => (format!("encoding={encoding} size={size} align={align}"), Vec::new()),
		RecordKind::Struct { members, witness } => {
			let mut detail = format!("members={}", members.len());
			if let Some(addr) = witness {
				detail.push_str(&format!(" witness={}", ptr_hex(*addr)));
			}
			let hidden = members.iter().filter(|member| member.is_hidden()).count();
			if hidden > 0 {
				detail.push_str(&format!(" hidden={hidden}"));
			}
			(detail, members.iter().map(|member| member.type_name.to_string()).collect())
		}
		RecordKind::Enum { cases, spare_bits } => {
			let mut detail = format!("cases={}", cases.len());
			if let Some(spare) = spare_bits {
				detail.push_str(&format!(" spare_bits=+{}:{}/0x{:x}", spare.offset, spare.width, spare.mask));
			}
			(detail, cases.iter().filter_map(|case| case.payload.as_deref().map(str::to_owned)).collect())
		}
		RecordKind::Optional { payload, spare_bits } => {
			let mut detail = format!("payload={payload}");
			if let Some(spare) = spare_bits {
				detail.push_str(&format!(" spare_bits=+{}:{}/0x{:x}", spare.offset, spare.width, spare.mask));
			}
			(detail, vec![payload.to_string()])
		}
		RecordKind::Opaque(storage) => {
			let detail = match storage {
				RawStorage::Fixed { size, align } => format!("fixed size={size} align={align}"),
				RawStorage::Witness { addr } => format!("witness={}", ptr_hex(*addr)),
				RawStorage::Prefixed { header_width, align } => format!("prefixed header={header_width} align={align}"),
			};
			(detail, Vec::new())
		}
	}
}

#[derive(serde::Serialize)]
struct RecordJson {
	symbol: String,
	kind: &'static str,
	detail: String,
	refs: Vec<String>,
}

#[derive(serde::Serialize)]
struct ModuleJson {
	path: String,
	name: String,
	compression: String,
	records: Vec<RecordJson>,
}

#[derive(serde::Serialize)]
struct TypesJson {
	modules: Vec<ModuleJson>,
}
