//! Opcodes carried in [`MsgHeader::api_call`](crate::MsgHeader).
//!
//! The wire form is a short string (`"LstNode"`); inside the client every
//! opcode is an [`ApiCall`] variant so dispatch on it is an exhaustive
//! `match`.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtocolError;

macro_rules! define_api_calls {
    ( $( $(#[$meta:meta])* $variant:ident => $wire:literal; )* ) => {
        /// Opcode identifying a request or reply kind.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum ApiCall {
            $( $(#[$meta])* $variant, )*
        }

        impl ApiCall {
            /// Wire name of the opcode.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $wire, )*
                }
            }

            /// Looks up an opcode by wire name. Returns `None` for unknown names.
            pub fn from_wire(name: &str) -> Option<Self> {
                match name {
                    $( $wire => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }

        /// Every defined opcode, in declaration order.
        #[doc(hidden)]
        pub const ALL_API_CALLS: &[ApiCall] = &[
            $( ApiCall::$variant, )*
        ];
    };
}

define_api_calls! {
    // Session
    /// Version announcement, sent once by the controller after connect
    Version => "Version";
    /// Keep-alive probe
    Ping => "Ping";
    /// Keep-alive answer
    Pong => "Pong";
    /// Answer made of API call responses
    Reply => "Reply";

    // Nodes
    /// Create a node
    CrtNode => "CrtNode";
    /// Modify node properties
    ModNode => "ModNode";
    /// Delete a node
    DelNode => "DelNode";
    /// List nodes (request and reply)
    LstNode => "LstNode";

    // Resource definitions
    /// Create a resource definition
    CrtRscDfn => "CrtRscDfn";
    /// Delete a resource definition
    DelRscDfn => "DelRscDfn";
    /// List resource definitions (request and reply)
    LstRscDfn => "LstRscDfn";
    /// Add volume definitions to a resource definition
    CrtVlmDfn => "CrtVlmDfn";

    // Resources
    /// Deploy a resource on a node
    CrtRsc => "CrtRsc";
    /// Remove a resource from a node
    DelRsc => "DelRsc";
    /// List resources (request and reply)
    LstRsc => "LstRsc";

    // Storage pools
    /// Create a storage pool definition
    CrtStorPoolDfn => "CrtStorPoolDfn";
    /// Delete a storage pool definition
    DelStorPoolDfn => "DelStorPoolDfn";
    /// List storage pool definitions (request and reply)
    LstStorPoolDfn => "LstStorPoolDfn";
    /// Create a storage pool on a node
    CrtStorPool => "CrtStorPool";
    /// Delete a storage pool from a node
    DelStorPool => "DelStorPool";
    /// List storage pools (request and reply)
    LstStorPool => "LstStorPool";

    // Controller
    /// Set a controller configuration property
    SetCtrlCfgProp => "SetCtrlCfgProp";
    /// List controller configuration properties (request and reply)
    LstCtrlCfgProps => "LstCtrlCfgProps";
}

impl fmt::Display for ApiCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiCall {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wire(s).ok_or_else(|| ProtocolError::UnknownApiCall(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn wire_names_are_unique_and_resolve_back() {
        let names: HashSet<_> = ALL_API_CALLS.iter().map(|c| c.as_str()).collect();
        assert_eq!(names.len(), ALL_API_CALLS.len());

        for call in ALL_API_CALLS {
            assert_eq!(call.as_str().parse::<ApiCall>().unwrap(), *call);
        }
    }

    #[test]
    fn unknown_name_is_rejected() {
        let err = "LstFoo".parse::<ApiCall>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownApiCall(name) if name == "LstFoo"));
        assert_eq!(ApiCall::from_wire("ping"), None);
    }
}
