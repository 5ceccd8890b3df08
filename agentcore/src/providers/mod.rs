//! The `Model` trait: the seam between the agent step loop and any concrete
//! LLM provider.
//!
//! Concrete provider clients (OpenAI, Anthropic, local inference, etc.) are
//! external collaborators consumed through [`common::Model`]; this crate
//! only defines the trait and a [`mock`] implementation for tests.

pub mod common;
pub mod mock;

pub use common::*;
