//! Public library API for resolving runtime layouts and formatting debugger values.

/// Type metadata resolution, layout computation, enum projection, and value formatting.
pub mod inspect;
