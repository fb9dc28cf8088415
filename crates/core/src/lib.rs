//! Prompt Studio Core
//!
//! Shared types for the Prompt Studio workspace. This crate has no
//! dependencies on application-level code (database, HTTP clients,
//! template rendering).
//!
//! ## Module Organization
//!
//! - `streaming` - Stream event types and the wire adapter trait
//! - `execution` - Execution lifecycle state
//! - `proxy` - Proxy configuration data types shared across workspace crates
//!
//! ## Design Principles
//!
//! 1. **Only serde** - keeps build times minimal
//! 2. **Unidirectional dependency** - this crate depends on nothing else in the workspace

pub mod execution;
pub mod proxy;
pub mod streaming;

// ── Execution State ────────────────────────────────────────────────────
pub use execution::ExecutionState;

// ── Proxy Types ────────────────────────────────────────────────────────
pub use proxy::{ProxyConfig, ProxyProtocol, ProxyStrategy};

// ── Streaming Types ────────────────────────────────────────────────────
pub use streaming::{AdapterError, StreamAdapter, StreamEvent};
