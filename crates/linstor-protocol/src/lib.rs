//! Wire protocol spoken between the linstor client and a controller.
//!
//! # Frames
//!
//! Every transmission is a frame: a 16-byte envelope (4 zero bytes, the body
//! length as a big-endian `u32`, 8 reserved zero bytes) followed by a body of
//! messages, each prefixed by its length as a protobuf varint.
//!
//! The first message is a [`MsgHeader`] carrying the opcode ([`ApiCall`])
//! and the message ID used to correlate a reply with its request. Further
//! messages are the opcode's payload.
//!
//! # Session
//!
//! Right after the transport is up, the controller sends a `Version` frame.
//! After that the controller may send `Ping` at any time and expects a
//! `Pong`; every request is answered by exactly one reply frame echoing the
//! request's message ID.
//!
//! # Example
//!
//! ```rust
//! use linstor_protocol::{ApiCall, FrameAssembler, MsgDelNode, MsgHeader, encode_frame};
//!
//! let header = MsgHeader::new(ApiCall::DelNode, 1);
//! let frame = encode_frame(&header, &[MsgDelNode { node_name: "alpha".into() }]).unwrap();
//!
//! let mut assembler = FrameAssembler::new();
//! let frames = assembler.push(&frame).unwrap();
//! assert_eq!(frames[0].header().unwrap(), header);
//! ```

mod api_call;
mod error;
mod framing;
mod messages;
mod reply;
mod response;

pub use api_call::{ALL_API_CALLS, ApiCall};
pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    FrameAssembler, RawFrame, decode_header, encode_frame, encode_header_only, encode_raw_frame,
    split_messages,
};
pub use messages::*;
pub use reply::Reply;
pub use response::{ApiCallResponses, MASK_ERROR, MASK_INFO, MASK_WARN, Severity};

/// Size of the fixed frame envelope.
pub const FRAME_HEADER_LEN: usize = 16;

/// Default upper bound for a frame body (64 MiB).
pub const MAX_FRAME_SIZE: u32 = 64 * 1024 * 1024;

/// Inclusive range of controller API versions this client speaks.
pub const MIN_API_VERSION: u32 = 1;
pub const MAX_API_VERSION: u32 = 1;

pub use prost::Message;
