/// Value formatting command.
pub mod format;
/// Concrete layout command.
pub mod layout;
/// Value tree rendering shared by commands.
pub mod print;
/// Module record listing command.
pub mod types;

mod util;

#[cfg(test)]
mod test_support;
