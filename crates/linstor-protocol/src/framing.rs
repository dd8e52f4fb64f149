//! Frame envelope and varint message framing.
//!
//! Every transmission is one frame: a fixed 16-byte envelope followed by a
//! body of varint length-prefixed messages.
//!
//! ```text
//! +--------------+----------------+---------------+--------------------------------+
//! | type (4, =0) | length (4 BE)  | reserved (8)  | body: [varint len][msg] ...    |
//! +--------------+----------------+---------------+--------------------------------+
//! ```
//!
//! The first message of the body is always a [`MsgHeader`]; any further
//! messages are the payload of the opcode it names.

use prost::Message;
use prost::bytes::Buf;
use prost::encoding::{decode_varint, encode_varint, encoded_len_varint};

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::MsgHeader;
use crate::{FRAME_HEADER_LEN, MAX_FRAME_SIZE};

/// Encodes a header and its payload messages into a complete frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encoding`] if the body would exceed
/// [`MAX_FRAME_SIZE`].
pub fn encode_frame<M: Message>(header: &MsgHeader, payloads: &[M]) -> ProtocolResult<Vec<u8>> {
    let mut messages = Vec::with_capacity(1 + payloads.len());
    messages.push(header.encode_to_vec());
    messages.extend(payloads.iter().map(|payload| payload.encode_to_vec()));
    encode_raw_frame(&messages)
}

/// Encodes a frame that carries only a header message.
///
/// # Errors
///
/// See [`encode_frame`].
pub fn encode_header_only(header: &MsgHeader) -> ProtocolResult<Vec<u8>> {
    encode_raw_frame(&[header.encode_to_vec()])
}

/// Wraps already serialized messages into a frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Encoding`] for an empty message list or a body
/// larger than [`MAX_FRAME_SIZE`].
pub fn encode_raw_frame<T: AsRef<[u8]>>(messages: &[T]) -> ProtocolResult<Vec<u8>> {
    if messages.is_empty() {
        return Err(ProtocolError::Encoding(
            "a frame needs at least a header message".into(),
        ));
    }

    let body_len: usize = messages
        .iter()
        .map(|m| {
            let len = m.as_ref().len();
            encoded_len_varint(len as u64) + len
        })
        .sum();

    if body_len > MAX_FRAME_SIZE as usize {
        return Err(ProtocolError::Encoding(format!(
            "frame body of {body_len} bytes exceeds the maximum of {MAX_FRAME_SIZE}"
        )));
    }

    let mut frame = Vec::with_capacity(FRAME_HEADER_LEN + body_len);
    frame.extend_from_slice(&[0u8; 4]);
    frame.extend_from_slice(&(body_len as u32).to_be_bytes());
    frame.extend_from_slice(&[0u8; 8]);
    for message in messages {
        let bytes = message.as_ref();
        encode_varint(bytes.len() as u64, &mut frame);
        frame.extend_from_slice(bytes);
    }
    Ok(frame)
}

/// Extracts the body length from a 16-byte envelope.
///
/// Only the length field at offset 4 is read; the type and reserved fields
/// are ignored.
///
/// # Errors
///
/// Returns [`ProtocolError::IncompleteHeader`] if `header` is shorter than
/// [`FRAME_HEADER_LEN`].
pub fn decode_header(header: &[u8]) -> ProtocolResult<u32> {
    let Some(envelope) = header.get(..FRAME_HEADER_LEN) else {
        return Err(ProtocolError::IncompleteHeader {
            expected: FRAME_HEADER_LEN,
            received: header.len(),
        });
    };
    let len_bytes: [u8; 4] = [envelope[4], envelope[5], envelope[6], envelope[7]];
    Ok(u32::from_be_bytes(len_bytes))
}

/// Splits a frame body into its raw messages, in wire order.
///
/// # Errors
///
/// Fails on a malformed varint, on a length prefix that runs past the end of
/// `body`, and on an empty body.
pub fn split_messages(body: &[u8]) -> ProtocolResult<Vec<Vec<u8>>> {
    if body.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }

    let mut cursor = body;
    let mut messages = Vec::new();
    while cursor.has_remaining() {
        let offset = body.len() - cursor.remaining();
        let len = decode_varint(&mut cursor).map_err(|_| ProtocolError::InvalidVarint { offset })?;
        if len > cursor.remaining() as u64 {
            return Err(ProtocolError::Truncated {
                offset,
                needed: len,
                available: cursor.remaining(),
            });
        }
        let len = len as usize;
        messages.push(cursor[..len].to_vec());
        cursor.advance(len);
    }
    Ok(messages)
}

/// One complete frame as received: the raw header message plus payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    messages: Vec<Vec<u8>>,
}

impl RawFrame {
    /// Splits a frame body into a `RawFrame`.
    ///
    /// # Errors
    ///
    /// See [`split_messages`].
    pub fn from_body(body: &[u8]) -> ProtocolResult<Self> {
        Ok(Self {
            messages: split_messages(body)?,
        })
    }

    /// Decodes the header message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Decode`] if the first message is not a
    /// valid [`MsgHeader`].
    pub fn header(&self) -> ProtocolResult<MsgHeader> {
        MsgHeader::decode(self.messages[0].as_slice())
            .map_err(|e| ProtocolError::decode("MsgHeader", e))
    }

    /// Raw payload messages following the header.
    pub fn payloads(&self) -> &[Vec<u8>] {
        &self.messages[1..]
    }

    /// All raw messages, header first.
    pub fn messages(&self) -> &[Vec<u8>] {
        &self.messages
    }
}

/// Reassembles frames from arbitrarily sized reads.
///
/// The assembler owns the accumulation buffer and the expected body length
/// of the frame in progress. It is driven by a single reader; nothing else
/// may touch its state.
#[derive(Debug)]
pub struct FrameAssembler {
    buffer: Vec<u8>,
    expected_body_len: Option<usize>,
    max_frame_size: u32,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Creates an assembler accepting bodies up to [`MAX_FRAME_SIZE`].
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    /// Creates an assembler with a custom body size limit.
    pub fn with_max_frame_size(max_frame_size: u32) -> Self {
        Self {
            buffer: Vec::with_capacity(16 * 1024),
            expected_body_len: None,
            max_frame_size,
        }
    }

    /// Appends `chunk` and returns every frame it completed.
    ///
    /// Leftover bytes of a following frame stay buffered for the next call.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] as soon as an envelope
    /// declares a body above the limit, or any [`split_messages`] error.
    /// The assembler must be discarded after an error.
    pub fn push(&mut self, chunk: &[u8]) -> ProtocolResult<Vec<RawFrame>> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        loop {
            if self.expected_body_len.is_none() && self.buffer.len() >= FRAME_HEADER_LEN {
                let declared = decode_header(&self.buffer[..FRAME_HEADER_LEN])?;
                if declared > self.max_frame_size {
                    return Err(ProtocolError::FrameTooLarge {
                        size: u64::from(declared),
                        max: self.max_frame_size,
                    });
                }
                self.expected_body_len = Some(declared as usize);
            }

            let Some(body_len) = self.expected_body_len else {
                break;
            };
            let frame_len = FRAME_HEADER_LEN + body_len;
            if self.buffer.len() < frame_len {
                break;
            }

            let frame = RawFrame::from_body(&self.buffer[FRAME_HEADER_LEN..frame_len])?;
            self.buffer.drain(..frame_len);
            self.expected_body_len = None;
            frames.push(frame);
        }
        Ok(frames)
    }

    /// Number of bytes buffered for the frame in progress.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Body length of the frame in progress, once its envelope has arrived.
    pub fn expected_body_len(&self) -> Option<usize> {
        self.expected_body_len
    }
}
