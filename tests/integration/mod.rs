//! Integration Tests Module
//!
//! End-to-end tests for Prompt Studio: template rendering scenarios, backend
//! dispatch against mock servers, and the command layer over a temporary
//! data directory.

// Placeholder inference and rendering scenarios
mod template_test;

// Dispatcher behavior against mock and unreachable backends
mod dispatch_test;

// Commands over a real AppState (library, execution, history, settings)
mod workflow_test;
