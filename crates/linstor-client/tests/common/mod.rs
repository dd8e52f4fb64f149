//! In-process fake controller speaking the wire protocol over TCP.

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

use linstor_core::{ControllerEndpoint, TransportKind};
use linstor_protocol::{
    ApiCall, FrameAssembler, MASK_ERROR, Message, MsgApiCallResponse, MsgApiVersion, MsgCrtNode,
    MsgDelNode, MsgHeader, MsgLstNode, Node, RawFrame, encode_frame, encode_header_only,
};

/// Behaviour knobs of the fake controller.
#[derive(Debug, Clone)]
pub struct ControllerBehavior {
    /// API version announced in the handshake.
    pub api_version: u32,
    /// Send a `Ping` before answering each request.
    pub ping_before_reply: bool,
    /// Answer list requests with an error response.
    pub deny_lists: bool,
}

impl Default for ControllerBehavior {
    fn default() -> Self {
        Self {
            api_version: 1,
            ping_before_reply: false,
            deny_lists: false,
        }
    }
}

#[derive(Debug, Default)]
struct Store {
    nodes: Vec<Node>,
    pongs: usize,
}

/// A fake controller accepting connections until dropped.
pub struct FakeController {
    pub port: u16,
    store: Arc<Mutex<Store>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl FakeController {
    pub async fn start(behavior: ControllerBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let store = Arc::new(Mutex::new(Store::default()));
        let (shutdown, mut shutdown_rx) = oneshot::channel();

        let accept_store = Arc::clone(&store);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { break };
                        tokio::spawn(serve(stream, behavior.clone(), Arc::clone(&accept_store)));
                    }
                    _ = &mut shutdown_rx => break,
                }
            }
        });

        Self {
            port,
            store,
            shutdown: Some(shutdown),
        }
    }

    pub fn endpoint(&self) -> ControllerEndpoint {
        ControllerEndpoint::new(TransportKind::Plain, "127.0.0.1", self.port)
    }

    pub fn pongs(&self) -> usize {
        self.store.lock().unwrap().pongs
    }
}

impl Drop for FakeController {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// An endpoint nothing listens on.
pub async fn dead_endpoint() -> ControllerEndpoint {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    ControllerEndpoint::new(TransportKind::Plain, "127.0.0.1", port)
}

async fn serve(mut stream: TcpStream, behavior: ControllerBehavior, store: Arc<Mutex<Store>>) {
    let version = encode_frame(
        &MsgHeader::new(ApiCall::Version, 0),
        &[MsgApiVersion {
            version: behavior.api_version,
            controller_info: "fake controller".into(),
        }],
    )
    .unwrap();
    if stream.write_all(&version).await.is_err() {
        return;
    }

    let mut assembler = FrameAssembler::new();
    let mut buf = vec![0u8; 8192];
    let mut next_ping_id = 1_000_000;
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        let Ok(frames) = assembler.push(&buf[..n]) else {
            return;
        };
        for frame in frames {
            let header = frame.header().unwrap();
            let api_call: ApiCall = header.api_call.parse().unwrap();
            if api_call == ApiCall::Pong {
                store.lock().unwrap().pongs += 1;
                continue;
            }

            if behavior.ping_before_reply {
                next_ping_id += 1;
                let ping = encode_header_only(&MsgHeader::new(ApiCall::Ping, next_ping_id)).unwrap();
                if stream.write_all(&ping).await.is_err() {
                    return;
                }
            }

            let reply = answer(api_call, header.msg_id, &frame, &behavior, &store);
            if stream.write_all(&reply).await.is_err() {
                return;
            }
        }
    }
}

fn answer(
    api_call: ApiCall,
    msg_id: u64,
    frame: &RawFrame,
    behavior: &ControllerBehavior,
    store: &Mutex<Store>,
) -> Vec<u8> {
    let mut store = store.lock().unwrap();
    match api_call {
        ApiCall::Ping => encode_header_only(&MsgHeader::new(ApiCall::Pong, msg_id)).unwrap(),
        ApiCall::LstNode if behavior.deny_lists => {
            responses(msg_id, MASK_ERROR | 12, "Access to the node list denied")
        }
        ApiCall::LstNode => encode_frame(
            &MsgHeader::new(ApiCall::LstNode, msg_id),
            &[MsgLstNode {
                nodes: store.nodes.clone(),
            }],
        )
        .unwrap(),
        ApiCall::CrtNode => {
            let request = MsgCrtNode::decode(frame.payloads()[0].as_slice()).unwrap();
            let node = request.node.unwrap_or_default();
            if store.nodes.iter().any(|n| n.name == node.name) {
                return responses(
                    msg_id,
                    MASK_ERROR | 3,
                    &format!("Node '{}' already exists", node.name),
                );
            }
            let message = format!("New node '{}' registered", node.name);
            store.nodes.push(Node {
                connection_status: "ONLINE".into(),
                ..node
            });
            responses(msg_id, 1, &message)
        }
        ApiCall::DelNode => {
            let request = MsgDelNode::decode(frame.payloads()[0].as_slice()).unwrap();
            store.nodes.retain(|n| n.name != request.node_name);
            responses(msg_id, 2, &format!("Node '{}' deleted", request.node_name))
        }
        other => responses(msg_id, MASK_ERROR, &format!("{other} not supported")),
    }
}

fn responses(msg_id: u64, ret_code: u64, message: &str) -> Vec<u8> {
    encode_frame(
        &MsgHeader::new(ApiCall::Reply, msg_id),
        &[MsgApiCallResponse {
            ret_code,
            message: message.into(),
            ..Default::default()
        }],
    )
    .unwrap()
}
