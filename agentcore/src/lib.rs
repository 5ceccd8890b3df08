#![cfg_attr(docsrs, feature(doc_cfg))]
//! `agentcore` implements the step loop, context-pruning governor, and
//! subagent scheduler that sit at the core of an agent-orchestration
//! platform: it streams model output, parses tool calls out of the token
//! stream, dispatches them, and keeps an agent instance's message history
//! within its model's context window between steps.

extern crate self as agentcore;

pub mod agent_id;
pub mod builtin;
pub mod callback;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod fabric;
pub mod http;
pub mod instance;
pub mod message;
pub mod providers;
pub mod pruner;
pub mod session;
pub mod step;
pub mod stream;
pub mod subagent;
pub mod template;
pub mod tool;
pub mod transport;
pub mod usage;

#[cfg(feature = "derive")]
#[cfg_attr(docsrs, doc(cfg(feature = "derive")))]
pub use agentcore_derive::agent_tool;
