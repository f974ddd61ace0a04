//! These models represent the objects passed around by the agent
//!
//! There are several related formats we need to interact with:
//! - chat-completions messages/tools, sent from the agent to the LLM
//! - tool backend requests, sent from the agent to the connected session
//!
//! These overlap but do not match exactly, so the internal structs are
//! wire-shaped for the LLM payload and converted at the session boundary.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
