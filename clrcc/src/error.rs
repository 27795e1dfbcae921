//! Error kinds and the best-effort diagnostics sink described in the core's
//! error-handling design: three of the four kinds degrade a single method,
//! instantiation or reference and are recorded here rather than propagated;
//! only a metadata read failure aborts the build.

use std::fmt::{Debug, Display, Formatter};
use std::sync::Mutex;

use thiserror::Error;

/// One of the four recoverable-or-fatal error kinds a build can hit.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A type, method or field reference could not be resolved against the
    /// type cache. Logged as a comment at the use site; that method (or
    /// that single field/base reference) is skipped, nothing else is.
    #[error("unresolved reference: {0}")]
    UnresolvedReference(String),

    /// The bytecode translator hit an opcode it has no lowering for.
    /// A comment instruction is emitted in its place and translation of
    /// the rest of the method continues.
    #[error("unsupported opcode at IL_{offset:04X}: {opcode}")]
    UnsupportedOpcode { offset: u64, opcode: String },

    /// A generic instantiation's blob could not be decoded into a coherent
    /// key (malformed signature, out-of-range type argument). The
    /// instantiation is skipped silently; no comment is emitted, since by
    /// construction nothing downstream could have referenced it yet.
    #[error("malformed generic instantiation: {0}")]
    MalformedGenericInstantiation(String),

    /// The underlying metadata could not be read at all. Unrecoverable:
    /// the build aborts.
    #[error("metadata read failure: {0}")]
    MetadataRead(#[from] std::io::Error),
}

impl CoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CoreError::MetadataRead(_))
    }
}

/// Where a [`CoreError`] was raised, for the "print once per offending site"
/// idempotence rule in the recovery policy.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Site {
    pub type_name: String,
    pub method_name: Option<String>,
}

impl Display for Site {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.method_name {
            Some(method) => write!(f, "{}::{}", self.type_name, method),
            None => write!(f, "{}", self.type_name),
        }
    }
}

/// Accumulates recoverable errors across a build. Each (site, error) pair is
/// recorded and logged (via `tracing` when the feature is enabled) exactly
/// once; re-hitting the same site with the same kind of complaint is a no-op.
#[derive(Default)]
pub struct Diagnostics {
    seen: Mutex<std::collections::HashSet<(Site, String)>>,
}

impl Debug for Diagnostics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let seen = self.seen.lock().unwrap();
        f.debug_struct("Diagnostics").field("recorded", &seen.len()).finish()
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `error` at `site`. Returns `true` the first time this exact
    /// (site, error) pair is seen, `false` on every subsequent duplicate.
    pub fn report(&self, site: Site, error: &CoreError) -> bool {
        let key = (site.clone(), error.to_string());
        let mut seen = self.seen.lock().unwrap();
        let first = seen.insert(key);
        if first {
            #[cfg(feature = "tracing")]
            match error {
                CoreError::UnsupportedOpcode { .. } => tracing::warn!(%site, %error, "unsupported opcode"),
                _ => tracing::debug!(%site, %error, "recoverable core error"),
            }
            #[cfg(not(feature = "tracing"))]
            let _ = (&site, error);
        }
        first
    }

    /// Whether any unresolved-reference diagnostic was ever recorded. The
    /// driver uses this to decide the process exit code (§7: the compiler
    /// itself is always best-effort, but the final process exits non-zero
    /// on unresolved-reference link failure).
    pub fn has_unresolved_references(&self) -> bool {
        let seen = self.seen.lock().unwrap();
        seen.iter().any(|(_, msg)| msg.starts_with("unresolved reference"))
    }
}
