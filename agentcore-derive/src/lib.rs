//! Procedural macros for declaring custom tools on `agentcore` agents.
//!
//! - [`agent_tool`] - attribute macro that turns a plain function into a
//!   `agentcore::tool::Tool` implementation, generating the parameter struct
//!   and JSON schema from the function signature.

extern crate proc_macro;

use proc_macro::TokenStream;
use syn::{ItemFn, parse_macro_input};

mod tool;

/// Attribute macro that transforms a function into an `agentcore::tool::Tool`.
///
/// # Examples
/// ```rust,ignore
/// use agentcore_derive::agent_tool;
///
/// #[agent_tool(description = "Add two integers")]
/// fn add(a: i64, b: i64) -> Result<i64, agentcore::error::ToolError> {
///     Ok(a + b)
/// }
/// ```
#[proc_macro_attribute]
pub fn agent_tool(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as tool::ToolMacroArgs);
    let input_fn = parse_macro_input!(input as ItemFn);

    tool::expand_agent_tool(args, input_fn)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}
