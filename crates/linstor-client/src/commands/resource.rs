//! Resource, resource definition and volume definition commands.

use std::collections::HashMap;

use linstor_protocol::{Rsc, RscDfn, VlmDfn};

use super::{OutputFormat, format_kib, print_json, render_table, report};
use crate::cli::{ResourceAction, ResourceDefinitionAction, VolumeDefinitionAction};
use crate::client::Client;
use crate::error::ClientResult;

const STOR_POOL_PROP: &str = "StorPoolName";
const DISKLESS_FLAG: &str = "DISKLESS";

pub async fn run_definition(
    client: &Client,
    action: ResourceDefinitionAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        ResourceDefinitionAction::Create { name, port } => {
            let rsc_dfn = RscDfn {
                rsc_name: name,
                rsc_dfn_port: port,
                ..Default::default()
            };
            report(client.create_resource_definition(rsc_dfn).await?, output)
        }
        ResourceDefinitionAction::Delete { name } => {
            report(client.delete_resource_definition(&name).await?, output)
        }
        ResourceDefinitionAction::List => {
            let rsc_dfns = client.list_resource_definitions().await?;
            if output == OutputFormat::Json {
                return print_json(&rsc_dfns);
            }
            let rows: Vec<Vec<String>> = rsc_dfns
                .iter()
                .map(|dfn| {
                    vec![
                        dfn.rsc_name.clone(),
                        dfn.rsc_dfn_port.map(|p| p.to_string()).unwrap_or_default(),
                        dfn.vlm_dfns.len().to_string(),
                    ]
                })
                .collect();
            print!("{}", render_table(&["ResourceName", "Port", "Volumes"], &rows));
            Ok(())
        }
    }
}

pub async fn run_volume_definition(
    client: &Client,
    action: VolumeDefinitionAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        VolumeDefinitionAction::Create {
            resource,
            size,
            vlm_nr,
            minor,
        } => {
            let vlm_dfn = VlmDfn {
                vlm_nr,
                vlm_size_kib: size,
                vlm_minor: minor,
                ..Default::default()
            };
            report(client.create_volume_definitions(&resource, vec![vlm_dfn]).await?, output)
        }
    }
}

pub async fn run(
    client: &Client,
    action: ResourceAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        ResourceAction::Create {
            node,
            resource,
            storage_pool,
            diskless,
        } => {
            let mut props = HashMap::new();
            if let Some(pool) = storage_pool {
                props.insert(STOR_POOL_PROP.to_string(), pool);
            }
            let rsc = Rsc {
                name: resource,
                node_name: node,
                props,
                rsc_flags: if diskless {
                    vec![DISKLESS_FLAG.to_string()]
                } else {
                    Vec::new()
                },
                ..Default::default()
            };
            report(client.create_resource(rsc).await?, output)
        }
        ResourceAction::Delete { node, resource } => {
            report(client.delete_resource(&node, &resource).await?, output)
        }
        ResourceAction::List { nodes, resources } => {
            let resources = client.list_resources(&nodes, &resources).await?;
            match output {
                OutputFormat::Json => print_json(&resources),
                OutputFormat::Text => {
                    print!("{}", resource_table(&resources));
                    Ok(())
                }
            }
        }
    }
}

fn resource_table(resources: &[Rsc]) -> String {
    let rows: Vec<Vec<String>> = resources
        .iter()
        .flat_map(|rsc| {
            rsc.vlms.iter().map(move |vlm| {
                vec![
                    rsc.name.clone(),
                    rsc.node_name.clone(),
                    vlm.vlm_nr.to_string(),
                    vlm.stor_pool_name.clone(),
                    vlm.device_path.clone(),
                    vlm.allocated_size_kib.map(format_kib).unwrap_or_default(),
                    vlm.disk_state.clone(),
                ]
            })
        })
        .collect();
    render_table(
        &[
            "ResourceName",
            "Node",
            "Volume",
            "StoragePool",
            "DeviceName",
            "Allocated",
            "State",
        ],
        &rows,
    )
}
