//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::OutputFormat;

/// linstor - talk to a LINSTOR controller
#[derive(Debug, Parser)]
#[command(name = "linstor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Comma separated controller list, tried in order
    ///
    /// Accepts `linstor://host[:port]`, `linstor+ssl://host[:port]` or a
    /// bare `host[:port]` (plain).
    #[arg(long, env = "LS_CONTROLLERS")]
    pub controllers: Option<String>,

    /// Path to configuration file
    #[arg(long, short, env = "LINSTOR_CLIENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log as JSON lines
    #[arg(long)]
    pub log_json: bool,

    /// Print results as JSON
    #[arg(long, short = 'm')]
    pub machine_readable: bool,

    /// Request timeout in seconds, overrides the configuration file
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Returns the output format based on CLI flags.
    pub fn output_format(&self) -> OutputFormat {
        if self.machine_readable {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Node commands
    #[command(visible_alias = "n")]
    Node {
        #[command(subcommand)]
        action: NodeAction,
    },

    /// Resource definition commands
    #[command(visible_alias = "rd")]
    ResourceDefinition {
        #[command(subcommand)]
        action: ResourceDefinitionAction,
    },

    /// Volume definition commands
    #[command(visible_alias = "vd")]
    VolumeDefinition {
        #[command(subcommand)]
        action: VolumeDefinitionAction,
    },

    /// Resource commands
    #[command(visible_alias = "r")]
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Storage pool definition commands
    #[command(visible_alias = "spd")]
    StoragePoolDefinition {
        #[command(subcommand)]
        action: StoragePoolDefinitionAction,
    },

    /// Storage pool commands
    #[command(visible_alias = "sp")]
    StoragePool {
        #[command(subcommand)]
        action: StoragePoolAction,
    },

    /// Controller commands
    #[command(visible_alias = "c")]
    Controller {
        #[command(subcommand)]
        action: ControllerAction,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Role of a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NodeType {
    Controller,
    Satellite,
    Combined,
    Auxiliary,
}

impl NodeType {
    /// Name used on the wire.
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Controller => "CONTROLLER",
            Self::Satellite => "SATELLITE",
            Self::Combined => "COMBINED",
            Self::Auxiliary => "AUXILIARY",
        }
    }
}

/// Node actions.
#[derive(Debug, Subcommand)]
pub enum NodeAction {
    /// Register a node with the controller
    Create {
        name: String,
        /// IP address the satellite listens on
        address: String,
        #[arg(long, value_enum, default_value = "satellite")]
        node_type: NodeType,
        /// Satellite port (3366 plain, 3367 ssl if omitted)
        #[arg(long)]
        port: Option<u32>,
        /// Use an encrypted satellite connection
        #[arg(long)]
        ssl: bool,
        /// Name of the default network interface
        #[arg(long, default_value = "default")]
        interface_name: String,
    },

    /// Set or delete node properties
    SetProperty {
        name: String,
        /// `key=value` pairs to set
        #[arg(long = "set", value_parser = parse_key_value)]
        set: Vec<(String, String)>,
        /// Keys to delete
        #[arg(long = "delete")]
        delete: Vec<String>,
    },

    /// Remove a node
    #[command(visible_alias = "d")]
    Delete { name: String },

    /// List nodes
    #[command(visible_alias = "l")]
    List {
        /// Only show these nodes
        names: Vec<String>,
    },
}

/// Resource definition actions.
#[derive(Debug, Subcommand)]
pub enum ResourceDefinitionAction {
    /// Create a resource definition
    Create {
        name: String,
        /// DRBD port, allocated by the controller if omitted
        #[arg(long)]
        port: Option<u32>,
    },

    /// Delete a resource definition and all its resources
    #[command(visible_alias = "d")]
    Delete { name: String },

    /// List resource definitions
    #[command(visible_alias = "l")]
    List,
}

/// Volume definition actions.
#[derive(Debug, Subcommand)]
pub enum VolumeDefinitionAction {
    /// Add a volume to a resource definition
    Create {
        resource: String,
        /// Size with optional binary unit: 1024K, 100M, 10G, 1T (default KiB)
        #[arg(value_parser = parse_size_kib)]
        size: u64,
        /// Volume number, next free if omitted
        #[arg(long)]
        vlm_nr: Option<u32>,
        /// DRBD minor number
        #[arg(long)]
        minor: Option<i32>,
    },
}

/// Resource actions.
#[derive(Debug, Subcommand)]
pub enum ResourceAction {
    /// Deploy a resource on a node
    Create {
        node: String,
        resource: String,
        /// Storage pool backing the volumes
        #[arg(long, short)]
        storage_pool: Option<String>,
        /// Deploy without local storage
        #[arg(long)]
        diskless: bool,
    },

    /// Remove a resource from a node
    #[command(visible_alias = "d")]
    Delete { node: String, resource: String },

    /// List resources
    #[command(visible_alias = "l")]
    List {
        /// Only show resources on these nodes
        #[arg(long, short, value_delimiter = ',')]
        nodes: Vec<String>,
        /// Only show these resources
        #[arg(long, short, value_delimiter = ',')]
        resources: Vec<String>,
    },
}

/// Storage pool definition actions.
#[derive(Debug, Subcommand)]
pub enum StoragePoolDefinitionAction {
    /// Create a storage pool definition
    Create { name: String },

    /// Delete a storage pool definition
    #[command(visible_alias = "d")]
    Delete { name: String },

    /// List storage pool definitions
    #[command(visible_alias = "l")]
    List,
}

/// Backing driver of a storage pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageDriver {
    Lvm,
    LvmThin,
    Zfs,
    ZfsThin,
    Diskless,
}

impl StorageDriver {
    /// Provider kind used on the wire.
    pub fn provider_kind(self) -> &'static str {
        match self {
            Self::Lvm => "LVM",
            Self::LvmThin => "LVM_THIN",
            Self::Zfs => "ZFS",
            Self::ZfsThin => "ZFS_THIN",
            Self::Diskless => "DISKLESS",
        }
    }

    /// Property naming the backing volume group, thin pool or zpool.
    pub fn pool_property(self) -> Option<&'static str> {
        match self {
            Self::Lvm => Some("StorDriver/LvmVg"),
            Self::LvmThin => Some("StorDriver/ThinPool"),
            Self::Zfs => Some("StorDriver/ZPool"),
            Self::ZfsThin => Some("StorDriver/ZPoolThin"),
            Self::Diskless => None,
        }
    }
}

/// Storage pool actions.
#[derive(Debug, Subcommand)]
pub enum StoragePoolAction {
    /// Create a storage pool on a node
    Create {
        #[arg(value_enum)]
        driver: StorageDriver,
        node: String,
        name: String,
        /// Volume group, `vg/thinpool` or zpool backing the pool
        backing: Option<String>,
    },

    /// Delete a storage pool from a node
    #[command(visible_alias = "d")]
    Delete { node: String, name: String },

    /// List storage pools
    #[command(visible_alias = "l")]
    List {
        /// Only show pools on these nodes
        #[arg(long, short, value_delimiter = ',')]
        nodes: Vec<String>,
        /// Only show these pools
        #[arg(long, short, value_delimiter = ',')]
        storage_pools: Vec<String>,
    },
}

/// Controller actions.
#[derive(Debug, Subcommand)]
pub enum ControllerAction {
    /// Set a controller property
    SetProperty { key: String, value: String },

    /// List controller properties
    ListProperties,

    /// Show the controller API version
    Version,

    /// Measure the round-trip time to the controller
    Ping {
        /// Number of pings
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump the effective configuration
    Dump,

    /// Show configuration file path
    Path,
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{s}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

/// Parses a size into KiB. A bare number is KiB.
pub fn parse_size_kib(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid size '{s}'"))?;

    let factor: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "K" | "KIB" => 1,
        "M" | "MIB" => 1024,
        "G" | "GIB" => 1024 * 1024,
        "T" | "TIB" => 1024 * 1024 * 1024,
        other => return Err(format!("unknown size unit '{other}'")),
    };
    value
        .checked_mul(factor)
        .ok_or_else(|| format!("size '{s}' is too large"))
}
