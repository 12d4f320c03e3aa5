//! ToolGateway (C14): a resilient, strictly non-blocking HTTP client that
//! may enrich retrieved chunks by calling a registered external tool.
//! Optional in the pipeline — its only promise is that it never turns a
//! tool failure into a request failure.

pub mod circuit_breaker;
pub mod gateway;

pub use circuit_breaker::{Admission, CircuitBreaker, CircuitState};
pub use gateway::{GatewayError, ToolGateway};
