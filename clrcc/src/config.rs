//! Build configuration: the options named in the external-interfaces
//! section (debug vs. release, debug-symbol reading, multi-assembly mode,
//! managed-shortcut elision) plus the optional JSON dependency manifest and
//! runtime-config file that can populate them.

use std::path::PathBuf;

use serde::Deserialize;

/// A single entry of the flat JSON dependency manifest: name, version, and
/// whether the dependency is itself a reference assembly or a base-library
/// component (this distinction feeds the generic engine's namespace filter
/// in pass 0, and the driver's user/third-party/base-library origin
/// classification in pass 1).
#[derive(Debug, Clone, Deserialize)]
pub struct DependencyEntry {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub kind: DependencyKind,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyKind {
    Reference,
    BaseLibrary,
}

/// Options controlling a single build. Constructible programmatically via
/// [`Default`], or by deserializing the optional runtime-config JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Emit line directives and keep source-location records on instructions.
    pub debug: bool,
    /// Read the optional debug-symbol stream for line tables when `debug` is set.
    pub read_debug_symbols: bool,
    /// Accept more than one input assembly and resolve cross-assembly references.
    pub multi_assembly_mode: bool,
    /// Prefer managed-shortcut bodies over compiling bytecode when both are available.
    pub prefer_managed_shortcuts: bool,
    /// Flat dependency manifest, if one was supplied.
    #[serde(skip)]
    pub dependencies: Vec<DependencyEntry>,
    /// Output directory for the generated translation units.
    #[serde(skip)]
    pub output_dir: Option<PathBuf>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            debug: false,
            read_debug_symbols: false,
            multi_assembly_mode: false,
            prefer_managed_shortcuts: true,
            dependencies: Vec::new(),
            output_dir: None,
        }
    }
}

impl BuildOptions {
    /// Loads options from a runtime-config JSON file (§6's "optional runtime
    /// config file"). `output_dir` and `dependencies` are not part of that
    /// file's schema and are left at their defaults; callers set them after.
    pub fn from_config_file(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Parses the flat JSON dependency manifest (§6) and attaches it.
    pub fn with_dependency_manifest(mut self, bytes: &[u8]) -> serde_json::Result<Self> {
        self.dependencies = serde_json::from_slice(bytes)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_prefer_managed_shortcuts() {
        let opts = BuildOptions::default();
        assert!(opts.prefer_managed_shortcuts);
        assert!(!opts.debug);
    }

    #[test]
    fn loads_dependency_manifest() {
        let json = br#"[
            {"name": "System.Private.CoreLib", "version": "8.0.0", "type": "base-library"},
            {"name": "MyApp", "version": "1.0.0", "type": "reference"}
        ]"#;
        let opts = BuildOptions::default().with_dependency_manifest(json).unwrap();
        assert_eq!(opts.dependencies.len(), 2);
        assert_eq!(opts.dependencies[0].kind, DependencyKind::BaseLibrary);
    }
}
