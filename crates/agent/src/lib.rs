//! Dialogue engine for RisePal.
//!
//! One turn runs through a fixed pipeline:
//! 1. **Memory** (`memory`) - persist the message and refresh the rolling summary
//! 2. **Classification** (`classifier`, `guardrails`) - pick an intent the caller's role allows
//! 3. **Extraction** (`extraction`) - fill the intent's slot schema from the message
//! 4. **Clarification** (`clarification`) - ask for missing fields or release complete slots
//! 5. **Dispatch** (`dispatch`) - run exactly one store operation and phrase the reply
//!
//! The completion service only ever translates text. Identity, permissions,
//! dates and writes are decided deterministically here and in the store.

pub mod clarification;
pub mod classifier;
pub mod dispatch;
pub mod extraction;
pub mod guardrails;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod runtime;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use runtime::{AgentRuntime, RuntimeDeps, TurnOutcome, TurnReply, TurnRequest};
