use crate::inspect::{MemoryReader, Result};

/// One formatted value and its materialized children.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
	/// Variable or member name; empty for anonymous roots.
	pub name: Box<str>,
	/// Symbolic type name of the value as declared (the outermost wrapper).
	pub type_name: Box<str>,
	/// Address of the value in process memory.
	pub address: u64,
	/// Byte size at this address.
	pub byte_size: u64,
	/// One-line summary, such as a case label.
	pub summary: String,
	/// Literal text of a scalar leaf, possibly forwarded through wrappers.
	pub scalar: Option<String>,
	/// Active case label of an enum or optional.
	pub case: Option<Box<str>>,
	/// Ordered children.
	pub children: Vec<Value>,
}

impl Value {
	/// Summary text.
	pub fn summary(&self) -> &str {
		&self.summary
	}

	/// Scalar literal, if the value (or its innermost payload) is a scalar.
	pub fn scalar_value(&self) -> Option<&str> {
		self.scalar.as_deref()
	}

	/// Number of children.
	pub fn num_children(&self) -> usize {
		self.children.len()
	}

	/// Child by position.
	pub fn child_at_index(&self, idx: usize) -> Option<&Value> {
		self.children.get(idx)
	}

	/// Child by member name.
	pub fn child_member_with_name(&self, name: &str) -> Option<&Value> {
		self.children.iter().find(|child| child.name.as_ref() == name)
	}

	/// Position of the child with member name `name`.
	pub fn index_of_child_with_name(&self, name: &str) -> Option<usize> {
		self.children.iter().position(|child| child.name.as_ref() == name)
	}

	/// Active case label, without the leading dot.
	pub fn case_name(&self) -> Option<&str> {
		self.case.as_deref()
	}

	/// Copy this value's bytes out of `mem`.
	pub fn read_data(&self, mem: &dyn MemoryReader) -> Result<Vec<u8>> {
		Ok(mem.read_bytes(self.address, self.byte_size as usize)?.into_owned())
	}

	/// Display text: the scalar literal when present, otherwise the summary.
	pub fn display_text(&self) -> &str {
		self.scalar.as_deref().unwrap_or(&self.summary)
	}
}
