//! Assistant providers for the netops action engine
//!
//! | Provider | Base URL | Auth Method |
//! |----------|----------|-------------|
//! | Gemini | `https://generativelanguage.googleapis.com/v1beta` | `x-goog-api-key: {KEY}` |
//!
//! Requests go through the same resilient client as the dashboard API, so
//! rate limiting and cancellation behave identically.

pub mod gemini;
pub mod provider;

#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use gemini::GeminiClient;
pub use provider::{BoxedProvider, LlmProvider};

#[cfg(any(test, feature = "test-support"))]
pub use scripted::ScriptedProvider;
