//! Storage pool and storage pool definition commands.

use std::collections::HashMap;

use linstor_protocol::{StorPool, StorPoolDfn};

use super::{OutputFormat, format_kib, print_json, render_table, report};
use crate::cli::{StorageDriver, StoragePoolAction, StoragePoolDefinitionAction};
use crate::client::Client;
use crate::error::{ClientError, ClientResult};

pub async fn run_definition(
    client: &Client,
    action: StoragePoolDefinitionAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        StoragePoolDefinitionAction::Create { name } => {
            let dfn = StorPoolDfn {
                stor_pool_name: name,
                ..Default::default()
            };
            report(client.create_storage_pool_definition(dfn).await?, output)
        }
        StoragePoolDefinitionAction::Delete { name } => {
            report(client.delete_storage_pool_definition(&name).await?, output)
        }
        StoragePoolDefinitionAction::List => {
            let dfns = client.list_storage_pool_definitions().await?;
            if output == OutputFormat::Json {
                return print_json(&dfns);
            }
            let rows: Vec<Vec<String>> = dfns
                .iter()
                .map(|dfn| vec![dfn.stor_pool_name.clone()])
                .collect();
            print!("{}", render_table(&["StoragePool"], &rows));
            Ok(())
        }
    }
}

pub async fn run(
    client: &Client,
    action: StoragePoolAction,
    output: OutputFormat,
) -> ClientResult<()> {
    match action {
        StoragePoolAction::Create {
            driver,
            node,
            name,
            backing,
        } => {
            let stor_pool = storage_pool(driver, node, name, backing)?;
            report(client.create_storage_pool(stor_pool).await?, output)
        }
        StoragePoolAction::Delete { node, name } => {
            report(client.delete_storage_pool(&node, &name).await?, output)
        }
        StoragePoolAction::List {
            nodes,
            storage_pools,
        } => {
            let pools = client.list_storage_pools(&nodes, &storage_pools).await?;
            if output == OutputFormat::Json {
                return print_json(&pools);
            }
            let rows: Vec<Vec<String>> = pools
                .iter()
                .map(|pool| {
                    vec![
                        pool.stor_pool_name.clone(),
                        pool.node_name.clone(),
                        pool.provider_kind.clone(),
                        pool.free_capacity_kib.map(format_kib).unwrap_or_default(),
                        pool.total_capacity_kib.map(format_kib).unwrap_or_default(),
                    ]
                })
                .collect();
            print!(
                "{}",
                render_table(
                    &["StoragePool", "Node", "Driver", "FreeCapacity", "TotalCapacity"],
                    &rows
                )
            );
            Ok(())
        }
    }
}

fn storage_pool(
    driver: StorageDriver,
    node_name: String,
    stor_pool_name: String,
    backing: Option<String>,
) -> ClientResult<StorPool> {
    let mut props = HashMap::new();
    match (driver.pool_property(), backing) {
        (Some(key), Some(backing)) => {
            props.insert(key.to_string(), backing);
        }
        (Some(_), None) => {
            return Err(ClientError::Config(format!(
                "driver {} needs a backing pool",
                driver.provider_kind()
            )));
        }
        (None, Some(_)) => {
            return Err(ClientError::Config(
                "diskless pools take no backing pool".to_string(),
            ));
        }
        (None, None) => {}
    }

    Ok(StorPool {
        stor_pool_name,
        node_name,
        provider_kind: driver.provider_kind().to_string(),
        props,
        ..Default::default()
    })
}
