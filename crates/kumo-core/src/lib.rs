//! kumo core
//!
//! Declaration side of the reconciler: the KDL declaration format, the data
//! model it parses into, and the dependency graph derived from references.
//!
//! ```text
//! kumo.kdl + resources/**/*.kdl
//!         │  template expansion (Tera)
//!         ▼
//!     Manifest ── resources, outputs, provider blocks
//!         │
//!         ▼
//!  DependencyGraph ── creation / destruction order, cycle detection
//! ```
//!
//! Reconciliation itself (diffing against state, applying through a
//! provider) lives in `kumo-engine`.

pub mod discovery;
pub mod error;
pub mod graph;
pub mod loader;
pub mod model;
pub mod parser;
pub mod template;

// Re-exports
pub use discovery::{DiscoveredFiles, discover_files, find_project_root};
pub use error::{ManifestError, Result};
pub use graph::DependencyGraph;
pub use loader::{load_project, load_project_from_root};
pub use model::{
    Address, AttrValue, Manifest, OutputDecl, ProviderConfig, RefPath, ResourceNode,
};
pub use parser::{DEFAULT_PROVIDER, parse_kdl_file, parse_kdl_string};
pub use template::{TemplateProcessor, Variables, extract_variables};
