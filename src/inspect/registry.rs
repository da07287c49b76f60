use std::sync::Arc;

use parking_lot::RwLock;

use crate::inspect::{InspectError, MetadataRecord, ModuleImage, Result};

const T: &str = "dynview::registry";

/// Source of raw type metadata for loaded modules.
pub trait MetadataProvider {
	/// Find the record describing `symbol`, if any loaded module publishes it.
	fn find_record(&self, symbol: &str) -> Option<RecordRef>;
}

/// A record together with the module that published it.
#[derive(Debug, Clone)]
pub struct RecordRef {
	/// Publishing module name.
	pub module: Box<str>,
	/// Raw record.
	pub record: Arc<MetadataRecord>,
}

/// Thread-safe set of loaded module images, searched in load order.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
	modules: RwLock<Vec<Arc<ModuleImage>>>,
}

impl ModuleRegistry {
	/// Empty registry.
	pub fn new() -> Self {
		Self::default()
	}

	/// Register a loaded module.
	pub fn load(&self, image: ModuleImage) -> Result<()> {
		let mut modules = self.modules.write();
		if modules.iter().any(|item| item.name == image.name) {
			return Err(InspectError::ModuleAlreadyLoaded { name: image.name.into() });
		}
		log::debug!(target: T, "loaded module {} ({} records)", image.name, image.records.len());
		modules.push(Arc::new(image));
		Ok(())
	}

	/// Remove a module, returning its image.
	pub fn unload(&self, name: &str) -> Result<Arc<ModuleImage>> {
		let mut modules = self.modules.write();
		let idx = modules
			.iter()
			.position(|item| item.name.as_ref() == name)
			.ok_or_else(|| InspectError::ModuleNotLoaded { name: name.to_owned() })?;
		log::debug!(target: T, "unloaded module {name}");
		Ok(modules.remove(idx))
	}

	/// Names of loaded modules in load order.
	pub fn module_names(&self) -> Vec<String> {
		self.modules.read().iter().map(|item| item.name.to_string()).collect()
	}

	/// Loaded module images in load order.
	pub fn modules(&self) -> Vec<Arc<ModuleImage>> {
		self.modules.read().clone()
	}
}

impl MetadataProvider for ModuleRegistry {
	fn find_record(&self, symbol: &str) -> Option<RecordRef> {
		self.modules.read().iter().find_map(|module| {
			module.record(symbol).map(|record| RecordRef {
				module: module.name.clone(),
				record: Arc::clone(record),
			})
		})
	}
}
