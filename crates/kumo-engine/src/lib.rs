//! kumo reconciliation engine
//!
//! Takes the declarations loaded by `kumo-core`, diffs them against the
//! persisted state snapshot, and drives provider integrations to make live
//! state match.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   kumo CLI                       │
//! │             (kumo plan/apply/destroy)            │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                kumo-engine                       │
//! │  ┌──────────────┐  ┌──────────────┐             │
//! │  │ State Differ │  │   Executor   │             │
//! │  └──────┬───────┘  └──────┬───────┘             │
//! │  ┌──────▼────────────────▼──────────────────┐   │
//! │  │        Provider Abstraction               │   │
//! │  │  trait Provider { create/update/delete }  │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐                               │
//! │  │  State Mgmt  │  .kumo/state.json             │
//! │  └──────────────┘                               │
//! └───────┬─────────────────────────────────────────┘
//!         │
//! ┌───────▼───────┐
//! │ local provider │  (kumo-provider-local)
//! └───────────────┘
//! ```

pub mod diff;
pub mod error;
pub mod executor;
pub mod plan;
pub mod provider;
pub mod state;

// Re-exports
pub use diff::{Differ, SchemaIndex};
pub use error::{EngineError, ProviderError, Result};
pub use executor::{Executor, ExecutorOptions, resolve_attributes, resolve_outputs};
pub use plan::{Action, ActionResult, ActionType, ApplyResult, Plan, PlanSummary};
pub use provider::{
    AppliedResource, ApplyRequest, Provider, ProviderRegistry, ResourceSchema, RetryConfig,
};
pub use state::{ResourceRecord, StateLock, StateManager, StateSnapshot};
