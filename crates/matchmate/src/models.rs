//! These models represent the objects passed around by the orchestrator
//!
//! There are several related formats we need to interact with:
//! - the client's `{message}` request and streamed line protocol
//! - openai-compatible messages/tools, sent from the agent to the LLM
//! - tool inputs and normalized tool outcomes, exchanged with executors
//!
//! We always immediately convert those formats into the internal structs defined
//! here, so the conversation history never depends on a provider's wire shape.
pub mod role;
pub mod tool;
pub mod turn;
