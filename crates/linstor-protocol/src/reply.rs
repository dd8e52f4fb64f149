//! Typed replies decoded from incoming frames.

use prost::Message;

use crate::api_call::ApiCall;
use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{
    MsgApiCallResponse, MsgLstCtrlCfgProps, MsgLstNode, MsgLstRsc, MsgLstRscDfn, MsgLstStorPool,
    MsgLstStorPoolDfn,
};
use crate::response::ApiCallResponses;

/// A reply delivered to the caller waiting on its message ID.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Success/info/warning/error entries, answer to mutating calls (and to
    /// list calls that failed).
    ApiCallResponses(ApiCallResponses),
    /// Answer to a client-initiated `Ping`.
    Pong,
    Nodes(MsgLstNode),
    ResourceDefinitions(MsgLstRscDfn),
    Resources(MsgLstRsc),
    StoragePoolDefinitions(MsgLstStorPoolDfn),
    StoragePools(MsgLstStorPool),
    ControllerProps(MsgLstCtrlCfgProps),
}

impl Reply {
    /// Decodes the payload of a frame whose header named `api_call`.
    ///
    /// Returns `Ok(None)` for opcodes that are never sent as replies
    /// (requests, `Version`, `Ping`). A list reply without a payload message
    /// decodes as an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if a payload does not match the
    /// schema its opcode implies.
    pub fn decode(api_call: ApiCall, payloads: &[Vec<u8>]) -> ProtocolResult<Option<Self>> {
        let reply = match api_call {
            ApiCall::Reply => {
                let responses = payloads
                    .iter()
                    .map(|raw| {
                        MsgApiCallResponse::decode(raw.as_slice())
                            .map_err(|e| ProtocolError::decode("MsgApiCallResponse", e))
                    })
                    .collect::<ProtocolResult<Vec<_>>>()?;
                Self::ApiCallResponses(responses.into())
            }
            ApiCall::Pong => Self::Pong,
            ApiCall::LstNode => Self::Nodes(decode_list(payloads, "MsgLstNode")?),
            ApiCall::LstRscDfn => Self::ResourceDefinitions(decode_list(payloads, "MsgLstRscDfn")?),
            ApiCall::LstRsc => Self::Resources(decode_list(payloads, "MsgLstRsc")?),
            ApiCall::LstStorPoolDfn => {
                Self::StoragePoolDefinitions(decode_list(payloads, "MsgLstStorPoolDfn")?)
            }
            ApiCall::LstStorPool => Self::StoragePools(decode_list(payloads, "MsgLstStorPool")?),
            ApiCall::LstCtrlCfgProps => {
                Self::ControllerProps(decode_list(payloads, "MsgLstCtrlCfgProps")?)
            }
            ApiCall::Version
            | ApiCall::Ping
            | ApiCall::CrtNode
            | ApiCall::ModNode
            | ApiCall::DelNode
            | ApiCall::CrtRscDfn
            | ApiCall::DelRscDfn
            | ApiCall::CrtVlmDfn
            | ApiCall::CrtRsc
            | ApiCall::DelRsc
            | ApiCall::CrtStorPoolDfn
            | ApiCall::DelStorPoolDfn
            | ApiCall::CrtStorPool
            | ApiCall::DelStorPool
            | ApiCall::SetCtrlCfgProp => return Ok(None),
        };
        Ok(Some(reply))
    }

    /// Short name of the reply kind, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ApiCallResponses(_) => "api call responses",
            Self::Pong => "pong",
            Self::Nodes(_) => "node list",
            Self::ResourceDefinitions(_) => "resource definition list",
            Self::Resources(_) => "resource list",
            Self::StoragePoolDefinitions(_) => "storage pool definition list",
            Self::StoragePools(_) => "storage pool list",
            Self::ControllerProps(_) => "controller property list",
        }
    }
}

fn decode_list<M: Message + Default>(
    payloads: &[Vec<u8>],
    name: &'static str,
) -> ProtocolResult<M> {
    match payloads.first() {
        Some(raw) => M::decode(raw.as_slice()).map_err(|e| ProtocolError::decode(name, e)),
        None => Ok(M::default()),
    }
}
