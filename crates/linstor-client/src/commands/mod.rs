//! Command implementations.
//!
//! Every command talks to the controller through [`Client`] and prints
//! plain text or JSON to stdout.

pub mod config;
pub mod controller;
pub mod node;
pub mod resource;
pub mod storage;

use serde::Serialize;

use linstor_protocol::ApiCallResponses;

use crate::cli::Command;
use crate::client::{ApiCallResponsesExt, Client};
use crate::error::ClientResult;

/// How command results are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Tables and response text.
    #[default]
    Text,
    /// Pretty printed JSON, for scripts.
    Json,
}

/// Runs a controller command. `config` commands never reach this point.
pub async fn dispatch(client: &Client, command: Command, output: OutputFormat) -> ClientResult<()> {
    match command {
        Command::Node { action } => node::run(client, action, output).await,
        Command::ResourceDefinition { action } => {
            resource::run_definition(client, action, output).await
        }
        Command::VolumeDefinition { action } => {
            resource::run_volume_definition(client, action, output).await
        }
        Command::Resource { action } => resource::run(client, action, output).await,
        Command::StoragePoolDefinition { action } => {
            storage::run_definition(client, action, output).await
        }
        Command::StoragePool { action } => storage::run(client, action, output).await,
        Command::Controller { action } => controller::run(client, action, output).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Prints the answer to a mutating request.
///
/// In text mode an answer containing an error is returned as the error
/// instead, so it is printed once by the caller. JSON output always prints
/// the whole answer.
pub(crate) fn report(responses: ApiCallResponses, output: OutputFormat) -> ClientResult<()> {
    if output == OutputFormat::Json {
        print_json(&responses)?;
    }
    let responses = responses.into_result()?;
    if output == OutputFormat::Text {
        print!("{}", responses);
    }
    Ok(())
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> ClientResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Renders rows as left aligned columns separated by two spaces.
pub(crate) fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_line(&mut out, &widths, headers.iter().copied());
    for row in rows {
        push_line(&mut out, &widths, row.iter().map(String::as_str));
    }
    out
}

fn push_line<'a>(out: &mut String, widths: &[usize], cells: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = cells
        .zip(widths)
        .map(|(cell, &width)| format!("{cell:<width$}"))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// Formats a size in KiB with the largest binary unit that keeps it >= 1.
pub(crate) fn format_kib(kib: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    let mut value = kib as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{kib} KiB")
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}
