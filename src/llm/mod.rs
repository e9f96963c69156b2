//! Generative backend access.
//!
//! Providers speak to a text model; the rate limiter keeps the engine under
//! the backend's quota.

mod provider;
mod rate_limiter;

pub use provider::{AnthropicProvider, LLMProvider, OllamaProvider, OpenAICompatibleProvider, ANTHROPIC_API_URL};
pub use rate_limiter::RateLimiter;
