//! Core types: controller endpoints, tracing setup

pub mod endpoint;
pub mod tracing;

pub use endpoint::{
    ControllerEndpoint, DEFAULT_PLAIN_PORT, DEFAULT_SSL_PORT, EndpointError, TransportKind,
    parse_controller_list,
};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
