//! Message schemas carried inside frames.
//!
//! Every frame starts with a [`MsgHeader`]; the remaining messages are
//! opcode specific. The schemas are plain `prost` derives, so any peer that
//! speaks protobuf with the same field tags interoperates.

use std::collections::HashMap;

use prost::Message;
use serde::Serialize;

use crate::api_call::ApiCall;

/// First message of every frame.
#[derive(Clone, PartialEq, Message)]
pub struct MsgHeader {
    /// Opcode naming the request or reply kind.
    #[prost(string, tag = "1")]
    pub api_call: String,
    /// Correlation ID chosen by the requester and echoed in the reply.
    #[prost(uint64, tag = "2")]
    pub msg_id: u64,
}

impl MsgHeader {
    /// Creates a header for the given opcode and message ID.
    pub fn new(api_call: ApiCall, msg_id: u64) -> Self {
        Self {
            api_call: api_call.as_str().to_string(),
            msg_id,
        }
    }
}

/// Version announcement sent by the controller right after connect.
#[derive(Clone, PartialEq, Message)]
pub struct MsgApiVersion {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    /// Free-form controller build description.
    #[prost(string, tag = "2")]
    pub controller_info: String,
}

/// One entry of an API call answer.
#[derive(Clone, PartialEq, Message, Serialize)]
pub struct MsgApiCallResponse {
    /// Return code; the two high bits carry the severity.
    #[prost(uint64, tag = "1")]
    pub ret_code: u64,
    #[prost(string, tag = "2")]
    pub message: String,
    #[prost(string, tag = "3")]
    pub cause: String,
    #[prost(string, tag = "4")]
    pub correction: String,
    #[prost(string, tag = "5")]
    pub details: String,
    /// Objects the response refers to (`Node`, `RscDfn`, ...).
    #[prost(map = "string, string", tag = "6")]
    pub obj_refs: HashMap<String, String>,
    #[prost(string, repeated, tag = "7")]
    pub error_report_ids: Vec<String>,
}

/// Name filter attached to list requests. Empty lists match everything.
#[derive(Clone, PartialEq, Message)]
pub struct MsgFilter {
    #[prost(string, repeated, tag = "1")]
    pub node_names: Vec<String>,
    #[prost(string, repeated, tag = "2")]
    pub stor_pool_names: Vec<String>,
    #[prost(string, repeated, tag = "3")]
    pub resource_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct NetInterface {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub address: String,
    /// Satellite port, only set on the interface used for controller traffic.
    #[prost(uint32, optional, tag = "3")]
    pub stlt_port: Option<u32>,
    /// `PLAIN` or `SSL`.
    #[prost(string, optional, tag = "4")]
    pub stlt_encryption_type: Option<String>,
}

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct Node {
    #[prost(string, tag = "1")]
    pub name: String,
    /// `CONTROLLER`, `SATELLITE`, `COMBINED` or `AUXILIARY`.
    #[prost(string, tag = "2")]
    pub node_type: String,
    #[prost(map = "string, string", tag = "3")]
    pub props: HashMap<String, String>,
    #[prost(message, repeated, tag = "4")]
    pub net_interfaces: Vec<NetInterface>,
    /// Reported by the controller in list replies, ignored on create.
    #[prost(string, tag = "5")]
    pub connection_status: String,
    #[prost(string, tag = "6")]
    pub uuid: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtNode {
    #[prost(message, optional, tag = "1")]
    pub node: Option<Node>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgModNode {
    #[prost(string, tag = "1")]
    pub node_name: String,
    #[prost(map = "string, string", tag = "2")]
    pub override_props: HashMap<String, String>,
    #[prost(string, repeated, tag = "3")]
    pub delete_prop_keys: Vec<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelNode {
    #[prost(string, tag = "1")]
    pub node_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstNode {
    #[prost(message, repeated, tag = "1")]
    pub nodes: Vec<Node>,
}

// ---------------------------------------------------------------------------
// Resource and volume definitions
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct VlmDfn {
    #[prost(uint32, optional, tag = "1")]
    pub vlm_nr: Option<u32>,
    #[prost(uint64, tag = "2")]
    pub vlm_size_kib: u64,
    #[prost(int32, optional, tag = "3")]
    pub vlm_minor: Option<i32>,
    #[prost(map = "string, string", tag = "4")]
    pub props: HashMap<String, String>,
}

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct RscDfn {
    #[prost(string, tag = "1")]
    pub rsc_name: String,
    /// DRBD TCP port; allocated by the controller when absent.
    #[prost(uint32, optional, tag = "2")]
    pub rsc_dfn_port: Option<u32>,
    #[prost(map = "string, string", tag = "3")]
    pub props: HashMap<String, String>,
    #[prost(message, repeated, tag = "4")]
    pub vlm_dfns: Vec<VlmDfn>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtRscDfn {
    #[prost(message, optional, tag = "1")]
    pub rsc_dfn: Option<RscDfn>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelRscDfn {
    #[prost(string, tag = "1")]
    pub rsc_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstRscDfn {
    #[prost(message, repeated, tag = "1")]
    pub rsc_dfns: Vec<RscDfn>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtVlmDfn {
    #[prost(string, tag = "1")]
    pub rsc_name: String,
    #[prost(message, repeated, tag = "2")]
    pub vlm_dfns: Vec<VlmDfn>,
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct Vlm {
    #[prost(uint32, tag = "1")]
    pub vlm_nr: u32,
    #[prost(string, tag = "2")]
    pub stor_pool_name: String,
    #[prost(string, tag = "3")]
    pub device_path: String,
    #[prost(uint64, optional, tag = "4")]
    pub allocated_size_kib: Option<u64>,
    /// Disk state as reported by the satellite (`UpToDate`, `Diskless`, ...).
    #[prost(string, tag = "5")]
    pub disk_state: String,
}

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct Rsc {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub node_name: String,
    #[prost(map = "string, string", tag = "3")]
    pub props: HashMap<String, String>,
    #[prost(string, repeated, tag = "4")]
    pub rsc_flags: Vec<String>,
    #[prost(message, repeated, tag = "5")]
    pub vlms: Vec<Vlm>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtRsc {
    #[prost(message, optional, tag = "1")]
    pub rsc: Option<Rsc>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelRsc {
    #[prost(string, tag = "1")]
    pub node_name: String,
    #[prost(string, tag = "2")]
    pub rsc_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstRsc {
    #[prost(message, repeated, tag = "1")]
    pub resources: Vec<Rsc>,
}

// ---------------------------------------------------------------------------
// Storage pools
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct StorPoolDfn {
    #[prost(string, tag = "1")]
    pub stor_pool_name: String,
    #[prost(map = "string, string", tag = "2")]
    pub props: HashMap<String, String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtStorPoolDfn {
    #[prost(message, optional, tag = "1")]
    pub stor_pool_dfn: Option<StorPoolDfn>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelStorPoolDfn {
    #[prost(string, tag = "1")]
    pub stor_pool_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstStorPoolDfn {
    #[prost(message, repeated, tag = "1")]
    pub stor_pool_dfns: Vec<StorPoolDfn>,
}

#[derive(Clone, PartialEq, Message, Serialize)]
pub struct StorPool {
    #[prost(string, tag = "1")]
    pub stor_pool_name: String,
    #[prost(string, tag = "2")]
    pub node_name: String,
    /// Backing driver, e.g. `LVM`, `LVM_THIN`, `ZFS`, `DISKLESS`.
    #[prost(string, tag = "3")]
    pub provider_kind: String,
    #[prost(map = "string, string", tag = "4")]
    pub props: HashMap<String, String>,
    #[prost(uint64, optional, tag = "5")]
    pub free_capacity_kib: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    pub total_capacity_kib: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgCrtStorPool {
    #[prost(message, optional, tag = "1")]
    pub stor_pool: Option<StorPool>,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgDelStorPool {
    #[prost(string, tag = "1")]
    pub node_name: String,
    #[prost(string, tag = "2")]
    pub stor_pool_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstStorPool {
    #[prost(message, repeated, tag = "1")]
    pub stor_pools: Vec<StorPool>,
}

// ---------------------------------------------------------------------------
// Controller properties
// ---------------------------------------------------------------------------

#[derive(Clone, PartialEq, Message)]
pub struct MsgSetCtrlCfgProp {
    /// Full key including its namespace, e.g. `DrbdOptions/auto-quorum`.
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct MsgLstCtrlCfgProps {
    #[prost(map = "string, string", tag = "1")]
    pub props: HashMap<String, String>,
}
