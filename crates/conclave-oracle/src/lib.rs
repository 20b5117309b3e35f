//! External collaborators consumed by the orchestration core.
//!
//! Everything here is an opaque capability behind a trait:
//!
//! - [`CompletionOracle`]: text completion (`complete(prompt, options)`).
//! - [`RetrievalOracle`]: document retrieval (`retrieve(query)`).
//! - [`WebhookNotifier`]: fire-and-forget JSON POST.
//!
//! HTTP implementations are provided for each; tests substitute their own.

pub mod backends;
pub mod completion;
pub mod config;
pub mod retrieval;
pub mod webhook;

pub use completion::{
    completion_oracle, Completion, CompletionOptions, CompletionOracle, Complexity, Usage,
};
pub use config::{LlmProvider, ModelConfig, RetrievalConfig};
pub use retrieval::{
    HttpRetrievalOracle, Retrieval, RetrievalOracle, RetrievalQuery, RetrievalStrategy, Source,
};
pub use webhook::{HttpWebhookNotifier, WebhookNotifier};
