//! HTTP surface types (§6): request/response shapes for the platform's
//! out-of-band template validation and publishing endpoints. This module
//! defines the contract only — no HTTP client or server is implemented here.

use serde::{Deserialize, Serialize};

/// `GET /validate-agent` query: validate a single agent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAgentRequest {
    /// Raw agent definition (template source, not yet parsed) to validate.
    pub definition: serde_json::Value,
}

/// One problem found while validating an agent definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Dot-path into the definition the issue applies to.
    pub path: String,
    /// Human-readable description of the problem.
    pub message: String,
}

/// Response to `GET /validate-agent` and each entry of `POST /validate-agents`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAgentResponse {
    /// Whether the definition is well-formed and internally consistent.
    pub valid: bool,
    /// Problems found, empty when `valid` is `true`.
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

/// `POST /validate-agents`: validate a batch of agent definitions in one call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAgentsRequest {
    /// Definitions to validate, in order.
    pub definitions: Vec<serde_json::Value>,
}

/// Response to `POST /validate-agents`, one result per input definition, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidateAgentsResponse {
    /// Per-definition validation results, same length and order as the request.
    pub results: Vec<ValidateAgentResponse>,
}

/// `POST /publish`: publish a validated agent definition under a publisher namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRequest {
    /// Publisher namespace to publish under.
    pub publisher: String,
    /// Agent definition being published.
    pub definition: serde_json::Value,
    /// Version string for this publish, or `"latest"` to float.
    pub version: String,
}

/// Response to `POST /publish`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishResponse {
    /// Fully-qualified id the definition was published under
    /// (`publisher/name@version`).
    pub agent_id: String,
}
