//! These models represent the conversation passed between the agent and a backend adapter
//!
//! There are several different related formats we need to interact with:
//! - openai-compatible chat completion messages/tools (OpenAI, Qwen)
//! - anthropic messages/tools
//! - gemini contents/function declarations
//!
//! These all overlap to varying degrees. Adapters immediately convert between those wire
//! formats and the canonical structs here, so the canonical model is not an exact match to
//! any of them.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
