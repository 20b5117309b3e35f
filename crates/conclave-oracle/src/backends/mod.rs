//! HTTP completion backends.
//!
//! To add a new provider:
//! 1. Create a new module in `backends/`
//! 2. Implement [`CompletionOracle`](crate::CompletionOracle) for your struct
//! 3. Add the variant to `LlmProvider` in `config.rs`
//! 4. Wire it up in [`completion_oracle`](crate::completion_oracle)

pub mod claude;
pub mod openai;
