//! Background reader task.
//!
//! One task per connection owns the read half and the frame assembler. It
//! answers keep-alive pings itself and hands every reply to the correlator.
//! Any transport or protocol failure is terminal: the task tears the
//! connection down, which wakes every waiter, and exits.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, ReadHalf};
use tracing::{debug, error, trace, warn};

use linstor_protocol::{
    ApiCall, FrameAssembler, MsgHeader, ProtocolError, RawFrame, Reply, encode_header_only,
};

use crate::connection::{BoxedTransport, Shared, wait_closing};
use crate::error::ClientResult;

const READ_CHUNK_SIZE: usize = 64 * 1024;

pub(crate) async fn run(
    shared: Arc<Shared>,
    mut stream: ReadHalf<BoxedTransport>,
    mut assembler: FrameAssembler,
    poll_interval: Duration,
) {
    let mut shutdown = shared.subscribe();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    debug!(endpoint = %shared.endpoint, "reader started");

    'read: loop {
        let read = tokio::select! {
            _ = wait_closing(&mut shutdown) => break 'read,
            read = tokio::time::timeout(poll_interval, stream.read(&mut chunk)) => read,
        };

        let len = match read {
            // idle, check the state again
            Err(_) => continue,
            Ok(Ok(0)) => {
                shared.teardown("remote closed connection").await;
                break;
            }
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                shared
                    .teardown(format!("failed to read from {}: {}", shared.endpoint, e))
                    .await;
                break;
            }
        };

        let frames = match assembler.push(&chunk[..len]) {
            Ok(frames) => frames,
            Err(e) => {
                error!(endpoint = %shared.endpoint, error = %e, "invalid frame from controller");
                shared.teardown(format!("protocol error: {}", e)).await;
                break;
            }
        };

        for frame in frames {
            if let Err(e) = dispatch(&shared, frame).await {
                error!(endpoint = %shared.endpoint, error = %e, "closing connection");
                shared.teardown(e.to_string()).await;
                break 'read;
            }
        }
    }

    debug!(endpoint = %shared.endpoint, "reader stopped");
}

async fn dispatch(shared: &Shared, frame: RawFrame) -> ClientResult<()> {
    let header = frame.header()?;
    let api_call: ApiCall = header.api_call.parse()?;
    trace!(msg_id = header.msg_id, %api_call, "frame received");

    match api_call {
        ApiCall::Version => Err(ProtocolError::UnexpectedApiCall {
            expected: "a reply",
            received: header.api_call,
        }
        .into()),
        ApiCall::Ping => {
            let msg_id = shared.correlator.next_message_id();
            let pong = encode_header_only(&MsgHeader::new(ApiCall::Pong, msg_id))?;
            shared.send_frame(&pong).await?;
            trace!(msg_id, "answered keep-alive");
            Ok(())
        }
        _ => {
            let Some(reply) = Reply::decode(api_call, frame.payloads())? else {
                return Err(ProtocolError::UnexpectedApiCall {
                    expected: "a reply",
                    received: header.api_call,
                }
                .into());
            };
            let kind = reply.kind();
            if shared.correlator.deliver(header.msg_id, reply) {
                debug!(msg_id = header.msg_id, kind, "reply delivered");
            } else {
                warn!(msg_id = header.msg_id, kind, "dropping reply nobody waits for");
            }
            Ok(())
        }
    }
}
