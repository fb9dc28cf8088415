//! Prompt Studio LLM
//!
//! Backend dispatch for Prompt Studio:
//! - `registry` maps backend ids to connectors
//! - `http_connector` is the one connector implementation, parameterized by
//!   a `dialect` (OpenAI-compatible, Ollama, custom payload template)
//! - `dispatcher` runs single or streaming executions with cancellation
//!
//! Also includes the dialect stream adapters and the HTTP client factory.

pub mod connector;
pub mod credentials;
pub mod dialect;
pub mod dispatcher;
pub mod http_client;
pub mod http_connector;
pub mod registry;
pub mod settings;
pub mod streaming_adapters;
pub mod types;

// Re-export main types
pub use connector::{classify_transport_error, missing_api_key_error, parse_http_error, Connector};
pub use credentials::{
    CredentialSource, NoCredentials, StaticCredentials, CREDENTIAL_SERVICE, OPENAI_ACCOUNT,
};
pub use dialect::{PayloadTemplate, WireDialect};
pub use dispatcher::{BackendTestReport, Dispatcher, ExecutionHandle};
pub use http_client::build_http_client;
pub use http_connector::{BackendAuth, HttpConnector};
pub use registry::BackendRegistry;
pub use settings::{BackendSettings, CustomBackendConfig};
pub use types::*;

// Re-export streaming adapters
pub use streaming_adapters::{OllamaAdapter, OpenAiAdapter};
