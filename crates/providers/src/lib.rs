//! LLM provider adapters for bareagent.
//!
//! Every adapter implements `bareagent_core::ProviderAdapter`. The router
//! picks one from configuration or a `"<provider>:<model>"` identifier.

pub mod anthropic;
pub mod fallback;
mod http;
pub mod openai;
pub mod router;

pub use anthropic::AnthropicAdapter;
pub use openai::OpenAiAdapter;
pub use router::{ModelRef, build_adapter, from_config, resolve};
