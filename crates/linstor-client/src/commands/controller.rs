//! Controller commands.

use std::collections::BTreeMap;

use serde_json::json;

use super::{OutputFormat, print_json, render_table, report};
use crate::cli::ControllerAction;
use crate::client::Client;
use crate::error::ClientResult;

pub async fn run(
    client: &Client,
    action: ControllerAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        ControllerAction::SetProperty { key, value } => {
            report(client.set_controller_property(&key, &value).await?, output)
        }
        ControllerAction::ListProperties => {
            let props: BTreeMap<_, _> = client.controller_properties().await?.into_iter().collect();
            if output == OutputFormat::Json {
                return print_json(&props);
            }
            let rows: Vec<Vec<String>> = props.into_iter().map(|(k, v)| vec![k, v]).collect();
            print!("{}", render_table(&["Key", "Value"], &rows));
            Ok(())
        }
        ControllerAction::Version => {
            let controller = client.controller_version();
            match output {
                OutputFormat::Json => print_json(controller),
                OutputFormat::Text => {
                    println!("API version: {}", controller.version);
                    if !controller.info.is_empty() {
                        println!("{}", controller.info);
                    }
                    Ok(())
                }
            }
        }
        ControllerAction::Ping { count } => {
            let endpoint = client.connection().endpoint();
            for _ in 0..count.max(1) {
                let rtt_ms = client.ping().await?.as_secs_f64() * 1000.0;
                match output {
                    OutputFormat::Json => {
                        print_json(&json!({ "endpoint": endpoint, "rtt_ms": rtt_ms }))?
                    }
                    OutputFormat::Text => println!("pong from {endpoint}: time={rtt_ms:.3} ms"),
                }
            }
            Ok(())
        }
    }
}
