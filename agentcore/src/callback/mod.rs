//! Callback system for observing agent step-loop lifecycle events.
//!
//! This module provides a priority-ordered callback registry that hooks
//! into [`crate::step::StepEvent`]s emitted during a run — step boundaries,
//! tool-call dispatch, and subagent spawns — without the callback being able
//! to alter execution flow.
//!
//! # Example
//!
//! ```rust
//! use agentcore::callback::{CallbackRegistry, Priority};
//!
//! let registry = CallbackRegistry::builder()
//!     .on(|event, _ctx| {
//!         println!("{}", event.kind());
//!     })
//!     .with_logging()
//!     .build();
//! ```

mod context;
mod handlers;
mod registry;

pub use context::CallbackContext;
pub use handlers::Priority;
pub use registry::{CallbackRegistry, CallbackRegistryBuilder};
