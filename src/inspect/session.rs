use std::path::Path;

use crate::inspect::{FormatOptions, Formatter, MemoryReader, ModuleImage, ModuleRegistry, Result, TargetInfo, TypeCache, TypeId, Value};

const T: &str = "dynview::session";

/// One debugging session: loaded modules, their resolved types, and formatting options.
#[derive(Debug)]
pub struct Session {
	/// Target the session is attached to.
	pub target: TargetInfo,
	/// Options applied by [`Session::formatter`].
	pub options: FormatOptions,
	modules: ModuleRegistry,
	cache: TypeCache,
}

impl Session {
	/// Attach to a stopped process on `target` with default options.
	pub fn attach(target: TargetInfo) -> Self {
		Self::with_options(target, FormatOptions::default())
	}

	/// Attach with explicit formatting options.
	pub fn with_options(target: TargetInfo, options: FormatOptions) -> Self {
		log::debug!(target: T, "attached to {}-byte {} target", target.pointer_size, target.endianness.as_str());
		Self {
			target,
			options,
			modules: ModuleRegistry::new(),
			cache: TypeCache::new(),
		}
	}

	/// Register a parsed module image.
	pub fn load_module(&self, image: ModuleImage) -> Result<()> {
		self.modules.load(image)
	}

	/// Read and register the module image at `path`.
	pub fn load_module_file(&self, path: impl AsRef<Path>) -> Result<()> {
		self.load_module(ModuleImage::open(path)?)
	}

	/// Unload a module and evict every type that depended on it.
	pub fn unload_module(&self, name: &str) -> Result<usize> {
		self.modules.unload(name)?;
		Ok(self.cache.invalidate_module(name))
	}

	/// Loaded modules.
	pub fn modules(&self) -> &ModuleRegistry {
		&self.modules
	}

	/// Resolved type cache.
	pub fn types(&self) -> &TypeCache {
		&self.cache
	}

	/// Resolve a symbolic type name.
	pub fn resolve(&self, symbol: &str) -> Result<TypeId> {
		self.cache.resolve(&self.modules, symbol)
	}

	/// Formatter over `mem` using this session's types and options.
	pub fn formatter<'a>(&'a self, mem: &'a dyn MemoryReader) -> Formatter<'a> {
		Formatter::new(&self.cache, mem, self.target, self.options.clone())
	}

	/// Resolve `symbol` and format the variable `name` stored at `addr`.
	pub fn format_variable(&self, mem: &dyn MemoryReader, name: &str, symbol: &str, addr: u64) -> Result<Value> {
		let ty = self.resolve(symbol)?;
		self.formatter(mem).format_named(name, ty, addr)
	}
}

#[cfg(test)]
mod tests {
	use dynview_testkit::resilient_program;

	use super::Session;
	use crate::inspect::{InspectError, MemorySnapshot, ModuleImage, TargetInfo};

	fn attached() -> (Session, MemorySnapshot) {
		let program = resilient_program();
		let session = Session::attach(TargetInfo::default());
		session.load_module(ModuleImage::parse("Swift", &program.swift_image).expect("swift")).expect("load");
		session.load_module(ModuleImage::parse("mod", &program.mod_image).expect("mod")).expect("load");
		session.load_module(ModuleImage::parse("main", &program.main_image).expect("main")).expect("load");
		let snapshot = MemorySnapshot::parse(&program.snapshot()).expect("snapshot");
		(session, snapshot)
	}

	#[test]
	fn format_variable_resolves_then_formats() {
		let (session, snapshot) = attached();
		let value = session.format_variable(&snapshot, "s_opt", "Swift.Optional<mod.S>", 0x1100).expect("formats");
		assert_eq!(value.name.as_ref(), "s_opt");
		assert_eq!(value.num_children(), 5);
	}

	#[test]
	fn unloading_a_dependency_invalidates_wrappers() {
		let (session, snapshot) = attached();
		session.format_variable(&snapshot, "r", "main.ResEnum", 0x1700).expect("formats before unload");

		assert_eq!(session.unload_module("mod").expect("unload"), 2);
		let err = session.format_variable(&snapshot, "r", "main.ResEnum", 0x1700).expect_err("mod.S is gone");
		assert!(matches!(err, InspectError::UnresolvedMetadata { ref symbol } if symbol == "mod.S"));

		let t = session.format_variable(&snapshot, "t", "main.T", 0x1300).expect("unrelated type still formats");
		assert_eq!(t.child_member_with_name("a").and_then(|child| child.scalar_value()), Some("2"));
		assert!(matches!(session.unload_module("mod"), Err(InspectError::ModuleNotLoaded { .. })));
	}
}
