//! Controller connection, reply correlation, client API and CLI
//!
//! This crate provides the [`Client`] used to talk to a LINSTOR controller
//! and the `linstor` command-line interface built on it.

pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
mod reader;
pub mod tls;

pub use cli::Cli;
pub use client::{ApiCallResponsesExt, Client};
pub use config::{ClientConfig, ConnectOptions, TlsSettings};
pub use connection::{Connection, ConnectionState, ControllerInfo, Transport};
pub use correlator::{Correlator, PendingReply};
pub use error::{ClientError, ClientResult};
