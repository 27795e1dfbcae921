//! Ahead-of-time frontend and IR builder that lowers ECMA-335 assemblies
//! into a C++ translation unit graph.
//!
//! [`raw`] decodes the binary metadata (PE headers, heaps, bytecode) with
//! no semantic resolution of its own. Everything above it — [`ir`],
//! [`mangle`], [`icall`], [`translate`], [`intercept`], [`generics`],
//! [`builder`], [`records`], [`emit`] — is the compiler core: it turns
//! decoded metadata into the closed IR described by [`ir`] and then into
//! C++ text. [`config`] and [`error`] are the ambient configuration and
//! diagnostics surface shared by every stage of that pipeline.

pub mod config;
pub mod error;
pub mod raw;
pub mod utilities;

pub mod builder;
pub mod emit;
pub mod generics;
pub mod icall;
pub mod intercept;
pub mod ir;
pub mod mangle;
pub mod records;
pub mod translate;

pub use builder::{BuildResult, DeclaredField, DeclaredMethod, DeclaredType, IRBuilder, MethodBody, Origin};
pub use config::BuildOptions;
pub use emit::{CppEmitter, TranslationUnit};
pub use error::{CoreError, Diagnostics};
pub use icall::{IcallCategory, IcallEntry, IcallRegistry};
pub use ir::Module;
