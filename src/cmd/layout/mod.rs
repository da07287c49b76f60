use std::path::PathBuf;

use dynview::inspect::{ConcreteLayout, FormatOptions, LayoutCx, Result, Session, TypeId, compute_layout};

use crate::cmd::util::{emit_json, open_session, parse_ptr, ptr_hex};

#[derive(clap::Args)]
pub struct Args {
	#[arg(long = "image", required = true)]
	pub images: Vec<PathBuf>,
	#[arg(long)]
	pub snapshot: PathBuf,
	#[arg(long = "type")]
	pub type_name: String,
	#[arg(long)]
	pub addr: String,
	#[arg(long)]
	pub json: bool,
}

/// Compute and print the concrete layout of one instance.
pub fn run(args: Args) -> Result<()> {
	let Args {
		images,
		snapshot,
		type_name,
		addr,
		json,
	} = args;

	let addr = parse_ptr(&addr)?;
	let (session, memory) = open_session(&images, &snapshot, FormatOptions::default())?;
	let ty = session.resolve(&type_name)?;
	let desc = session.types().descriptor(ty)?;
	let cx = LayoutCx::new(session.types(), &memory, session.target);
	let layout = compute_layout(&cx, ty, addr)?;

	if json {
		emit_json(&layout_json(&session, &type_name, desc.kind_label(), desc.dynamic, addr, &layout));
		return Ok(());
	}

	println!("type: {type_name}");
	println!("kind: {}", desc.kind_label());
	println!("dynamic: {}", desc.dynamic);
	println!("addr: {}", ptr_hex(addr));
	println!("size: {}", layout.size);
	println!("stride: {}", layout.stride);
	println!("align: {}", layout.align);
	println!("members: {}", layout.members.len());
	for member in &layout.members {
		let indirect = if member.indirect { " indirect" } else { "" };
		println!(
			"  +0x{:04x} {}: {} ({} bytes{indirect})",
			member.offset,
			member.name,
			member_type(&session, member.ty),
			member.size
		);
	}

	Ok(())
}

fn member_type(session: &Session, ty: Option<TypeId>) -> String {
	match ty {
		Some(ty) => session
			.types()
			.descriptor(ty)
			.map(|desc| desc.name.to_string())
			.unwrap_or_else(|_| ty.to_string()),
		None => "-".to_owned(),
	}
}

fn layout_json(session: &Session, type_name: &str, kind: &'static str, dynamic: bool, addr: u64, layout: &ConcreteLayout) -> LayoutJson {
	LayoutJson {
		type_name: type_name.to_owned(),
		kind,
		dynamic,
		addr: ptr_hex(addr),
		size: layout.size,
		stride: layout.stride,
		align: layout.align,
		members: layout
			.members
			.iter()
			.map(|member| MemberJson {
				name: member.name.to_string(),
				type_name: member.ty.map(|_| member_type(session, member.ty)),
				offset: member.offset,
				size: member.size,
				indirect: member.indirect,
			})
			.collect(),
	}
}

#[derive(serde::Serialize)]
struct MemberJson {
	name: String,
	type_name: Option<String>,
	offset: u64,
	size: u64,
	indirect: bool,
}

#[derive(serde::Serialize)]
struct LayoutJson {
	type_name: String,
	kind: &'static str,
	dynamic: bool,
	addr: String,
	size: u64,
	stride: u64,
	align: u64,
	members: Vec<MemberJson>,
}
