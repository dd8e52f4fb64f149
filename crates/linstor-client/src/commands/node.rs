//! Node commands.

use std::collections::HashMap;

use linstor_protocol::{NetInterface, Node};

use super::{OutputFormat, print_json, render_table, report};
use crate::cli::NodeAction;
use crate::client::Client;
use crate::error::ClientResult;

const DEFAULT_SATELLITE_PORT: u32 = 3366;
const DEFAULT_SATELLITE_SSL_PORT: u32 = 3367;

pub async fn run(client: &Client, action: NodeAction, output: OutputFormat) -> ClientResult<()> {
    match action {
        NodeAction::Create {
            name,
            address,
            node_type,
            port,
            ssl,
            interface_name,
        } => {
            let (encryption, default_port) = if ssl {
                ("SSL", DEFAULT_SATELLITE_SSL_PORT)
            } else {
                ("PLAIN", DEFAULT_SATELLITE_PORT)
            };
            let node = Node {
                name,
                node_type: node_type.as_wire().to_string(),
                net_interfaces: vec![NetInterface {
                    name: interface_name,
                    address,
                    stlt_port: Some(port.unwrap_or(default_port)),
                    stlt_encryption_type: Some(encryption.to_string()),
                }],
                ..Default::default()
            };
            report(client.create_node(node).await?, output)
        }
        NodeAction::SetProperty { name, set, delete } => {
            let props: HashMap<String, String> = set.into_iter().collect();
            report(client.modify_node(&name, props, delete).await?, output)
        }
        NodeAction::Delete { name } => report(client.delete_node(&name).await?, output),
        NodeAction::List { names } => {
            let nodes = client.list_nodes(&names).await?;
            match output {
                OutputFormat::Json => print_json(&nodes),
                OutputFormat::Text => {
                    print!("{}", node_table(&nodes));
                    Ok(())
                }
            }
        }
    }
}

fn node_table(nodes: &[Node]) -> String {
    let rows: Vec<Vec<String>> = nodes
        .iter()
        .map(|node| {
            let address = node
                .net_interfaces
                .first()
                .map(|nic| match nic.stlt_port {
                    Some(port) => format!("{}:{}", nic.address, port),
                    None => nic.address.clone(),
                })
                .unwrap_or_default();
            vec![
                node.name.clone(),
                node.node_type.clone(),
                address,
                node.connection_status.clone(),
            ]
        })
        .collect();
    render_table(&["Node", "NodeType", "Addresses", "State"], &rows)
}
