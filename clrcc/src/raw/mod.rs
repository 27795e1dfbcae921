//! Binary metadata reader: parses a PE/ECMA-335 assembly into its raw table,
//! heap and bytecode views. This is the object model the rest of the crate
//! consumes; it performs no semantic resolution of its own.

pub mod assembly;
pub mod heaps;
pub mod il;
pub mod indices;
pub mod pe;
