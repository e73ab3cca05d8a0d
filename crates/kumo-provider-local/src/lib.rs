//! Local filesystem provider for kumo
//!
//! Implements the `Provider` trait against a directory of JSON documents,
//! one per resource. Useful for trying out declarations, for tests, and as
//! the reference implementation of the provider interface.
//!
//! # Example
//!
//! ```ignore
//! use kumo_provider_local::LocalProvider;
//! use kumo_engine::Provider;
//!
//! let provider = LocalProvider::from_config(project_root, &config)?;
//! let applied = provider.create(&request).await?;
//! println!("created {}", applied.id);
//! ```

pub mod error;
pub mod provider;

pub use error::{LocalProviderError, Result};
pub use provider::LocalProvider;
