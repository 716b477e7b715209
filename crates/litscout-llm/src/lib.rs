//! litscout-llm — Model client abstraction.
//!
//! One trait, three wire formats. `LlmProvider` exposes text and JSON
//! completion; the OpenAI, Claude, and Gemini backends each adapt the
//! contract to their API (native JSON mode, prompt-injected JSON
//! instruction, and mime-type + schema hint respectively). The tolerant
//! JSON extractor is shared by every backend that cannot guarantee a
//! bare JSON body.

pub mod backend;
pub mod json;
pub mod provider;

pub use backend::{ClaudeProvider, GeminiProvider, OpenAiProvider};
pub use json::extract_json;
pub use provider::{create_provider, LlmError, LlmProvider};
