//! High-level controller API.
//!
//! [`Client`] turns each operation into one request frame, waits for the
//! correlated reply and maps it to a typed result. Clones share the same
//! connection, so any number of tasks can issue requests concurrently.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use linstor_core::ControllerEndpoint;
use linstor_protocol::{
    ApiCall, ApiCallResponses, Message, MsgCrtNode, MsgCrtRsc, MsgCrtRscDfn, MsgCrtStorPool,
    MsgCrtStorPoolDfn, MsgCrtVlmDfn, MsgDelNode, MsgDelRsc, MsgDelRscDfn, MsgDelStorPool,
    MsgDelStorPoolDfn, MsgFilter, MsgHeader, MsgModNode, MsgSetCtrlCfgProp, Node, Reply, Rsc,
    RscDfn, StorPool, StorPoolDfn, VlmDfn, encode_frame, encode_header_only,
};

use crate::config::ConnectOptions;
use crate::connection::{Connection, ControllerInfo, Transport};
use crate::error::{ClientError, ClientResult};

/// Turns the error entries of an answer into [`ClientError::Api`].
pub trait ApiCallResponsesExt: Sized {
    /// Returns the responses unchanged if none of them is an error.
    fn into_result(self) -> ClientResult<Self>;
}

impl ApiCallResponsesExt for ApiCallResponses {
    fn into_result(self) -> ClientResult<Self> {
        if self.has_errors() {
            Err(ClientError::Api(self))
        } else {
            Ok(self)
        }
    }
}

/// Client for one controller connection.
#[derive(Debug, Clone)]
pub struct Client {
    connection: Arc<Connection>,
    request_timeout: Duration,
}

impl Client {
    /// Connects to the first controller in `endpoints` that completes the
    /// handshake.
    ///
    /// # Errors
    ///
    /// Returns the error of the last endpoint tried if none succeeds.
    pub async fn connect(
        endpoints: &[ControllerEndpoint],
        options: &ConnectOptions,
    ) -> ClientResult<Self> {
        let mut last_error = None;
        for endpoint in endpoints {
            match Connection::connect(endpoint, options).await {
                Ok(connection) => {
                    return Ok(Self::from_connection(connection, options.request_timeout));
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "controller unavailable");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| ClientError::Config("no controller configured".to_string())))
    }

    /// Runs the handshake over an already open stream.
    pub async fn establish<S: Transport>(
        name: impl Into<String>,
        stream: S,
        options: &ConnectOptions,
    ) -> ClientResult<Self> {
        let connection = Connection::establish(name, stream, options).await?;
        Ok(Self::from_connection(connection, options.request_timeout))
    }

    /// Wraps an established connection.
    pub fn from_connection(connection: Connection, request_timeout: Duration) -> Self {
        Self {
            connection: Arc::new(connection),
            request_timeout,
        }
    }

    /// Returns a client sharing this connection with a different timeout.
    pub fn with_request_timeout(&self, request_timeout: Duration) -> Self {
        Self {
            connection: Arc::clone(&self.connection),
            request_timeout,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Closes the connection for every clone of this client.
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Sends `api_call` with an optional payload and waits for the reply.
    pub async fn call<M: Message>(
        &self,
        api_call: ApiCall,
        payload: Option<&M>,
    ) -> ClientResult<Reply> {
        let msg_id = self.connection.correlator().next_message_id();
        let header = MsgHeader::new(api_call, msg_id);
        let frame = match payload {
            Some(payload) => encode_frame(&header, std::slice::from_ref(payload))?,
            None => encode_header_only(&header)?,
        };
        self.exchange(api_call, msg_id, &frame).await
    }

    /// Sends a header-only request and waits for the reply.
    pub async fn call_empty(&self, api_call: ApiCall) -> ClientResult<Reply> {
        let msg_id = self.connection.correlator().next_message_id();
        let frame = encode_header_only(&MsgHeader::new(api_call, msg_id))?;
        self.exchange(api_call, msg_id, &frame).await
    }

    /// Sends `frame` and waits for its reply, both within the request
    /// timeout.
    async fn exchange(&self, api_call: ApiCall, msg_id: u64, frame: &[u8]) -> ClientResult<Reply> {
        let deadline = tokio::time::Instant::now() + self.request_timeout;
        // the slot must exist before the controller can answer
        let pending = self.connection.correlator().register(msg_id)?;
        debug!(msg_id, %api_call, "sending request");

        match tokio::time::timeout_at(deadline, self.connection.send(frame)).await {
            Ok(sent) => sent?,
            Err(_) => {
                // part of the frame may already be on the wire
                self.connection
                    .abort(format!("timed out writing {api_call} request"))
                    .await;
                return Err(ClientError::timeout(format!("sending {api_call} request")));
            }
        }

        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let reply = pending.wait(Some(remaining)).await?;
        debug!(msg_id, %api_call, reply = reply.kind(), "request answered");
        Ok(reply)
    }

    async fn mutate<M: Message>(
        &self,
        api_call: ApiCall,
        payload: &M,
    ) -> ClientResult<ApiCallResponses> {
        match self.call(api_call, Some(payload)).await? {
            Reply::ApiCallResponses(responses) => Ok(responses),
            other => Err(unexpected(api_call, &other)),
        }
    }

    // ---------------------------------------------------------------------
    // Session
    // ---------------------------------------------------------------------

    /// Measures the round-trip time of a `Ping`.
    pub async fn ping(&self) -> ClientResult<Duration> {
        let started = Instant::now();
        match self.call_empty(ApiCall::Ping).await? {
            Reply::Pong => Ok(started.elapsed()),
            other => Err(unexpected(ApiCall::Ping, &other)),
        }
    }

    /// What the controller announced during the handshake.
    pub fn controller_version(&self) -> &ControllerInfo {
        self.connection.controller()
    }

    // ---------------------------------------------------------------------
    // Nodes
    // ---------------------------------------------------------------------

    pub async fn create_node(&self, node: Node) -> ClientResult<ApiCallResponses> {
        self.mutate(ApiCall::CrtNode, &MsgCrtNode { node: Some(node) }).await
    }

    /// Sets `override_props` and removes `delete_keys` on a node.
    pub async fn modify_node(
        &self,
        node_name: &str,
        override_props: HashMap<String, String>,
        delete_keys: Vec<String>,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgModNode {
            node_name: node_name.to_string(),
            override_props,
            delete_prop_keys: delete_keys,
        };
        self.mutate(ApiCall::ModNode, &request).await
    }

    pub async fn delete_node(&self, node_name: &str) -> ClientResult<ApiCallResponses> {
        let request = MsgDelNode {
            node_name: node_name.to_string(),
        };
        self.mutate(ApiCall::DelNode, &request).await
    }

    /// Lists nodes; an empty filter lists all of them.
    pub async fn list_nodes(&self, node_names: &[String]) -> ClientResult<Vec<Node>> {
        let filter = MsgFilter {
            node_names: node_names.to_vec(),
            ..Default::default()
        };
        match self.call(ApiCall::LstNode, Some(&filter)).await? {
            Reply::Nodes(list) => Ok(list.nodes),
            other => Err(list_failure(ApiCall::LstNode, other)),
        }
    }

    // ---------------------------------------------------------------------
    // Resource and volume definitions
    // ---------------------------------------------------------------------

    pub async fn create_resource_definition(
        &self,
        rsc_dfn: RscDfn,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgCrtRscDfn {
            rsc_dfn: Some(rsc_dfn),
        };
        self.mutate(ApiCall::CrtRscDfn, &request).await
    }

    /// Deletes a resource definition together with all its resources.
    pub async fn delete_resource_definition(
        &self,
        rsc_name: &str,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgDelRscDfn {
            rsc_name: rsc_name.to_string(),
        };
        self.mutate(ApiCall::DelRscDfn, &request).await
    }

    pub async fn list_resource_definitions(&self) -> ClientResult<Vec<RscDfn>> {
        match self.call_empty(ApiCall::LstRscDfn).await? {
            Reply::ResourceDefinitions(list) => Ok(list.rsc_dfns),
            other => Err(list_failure(ApiCall::LstRscDfn, other)),
        }
    }

    /// Adds volume definitions to an existing resource definition.
    pub async fn create_volume_definitions(
        &self,
        rsc_name: &str,
        vlm_dfns: Vec<VlmDfn>,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgCrtVlmDfn {
            rsc_name: rsc_name.to_string(),
            vlm_dfns,
        };
        self.mutate(ApiCall::CrtVlmDfn, &request).await
    }

    // ---------------------------------------------------------------------
    // Resources
    // ---------------------------------------------------------------------

    pub async fn create_resource(&self, rsc: Rsc) -> ClientResult<ApiCallResponses> {
        self.mutate(ApiCall::CrtRsc, &MsgCrtRsc { rsc: Some(rsc) }).await
    }

    pub async fn delete_resource(
        &self,
        node_name: &str,
        rsc_name: &str,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgDelRsc {
            node_name: node_name.to_string(),
            rsc_name: rsc_name.to_string(),
        };
        self.mutate(ApiCall::DelRsc, &request).await
    }

    /// Lists resources, optionally restricted to some nodes and resources.
    pub async fn list_resources(
        &self,
        node_names: &[String],
        resource_names: &[String],
    ) -> ClientResult<Vec<Rsc>> {
        let filter = MsgFilter {
            node_names: node_names.to_vec(),
            resource_names: resource_names.to_vec(),
            ..Default::default()
        };
        match self.call(ApiCall::LstRsc, Some(&filter)).await? {
            Reply::Resources(list) => Ok(list.resources),
            other => Err(list_failure(ApiCall::LstRsc, other)),
        }
    }

    // ---------------------------------------------------------------------
    // Storage pools
    // ---------------------------------------------------------------------

    pub async fn create_storage_pool_definition(
        &self,
        stor_pool_dfn: StorPoolDfn,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgCrtStorPoolDfn {
            stor_pool_dfn: Some(stor_pool_dfn),
        };
        self.mutate(ApiCall::CrtStorPoolDfn, &request).await
    }

    pub async fn delete_storage_pool_definition(
        &self,
        stor_pool_name: &str,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgDelStorPoolDfn {
            stor_pool_name: stor_pool_name.to_string(),
        };
        self.mutate(ApiCall::DelStorPoolDfn, &request).await
    }

    pub async fn list_storage_pool_definitions(&self) -> ClientResult<Vec<StorPoolDfn>> {
        match self.call_empty(ApiCall::LstStorPoolDfn).await? {
            Reply::StoragePoolDefinitions(list) => Ok(list.stor_pool_dfns),
            other => Err(list_failure(ApiCall::LstStorPoolDfn, other)),
        }
    }

    pub async fn create_storage_pool(&self, stor_pool: StorPool) -> ClientResult<ApiCallResponses> {
        let request = MsgCrtStorPool {
            stor_pool: Some(stor_pool),
        };
        self.mutate(ApiCall::CrtStorPool, &request).await
    }

    pub async fn delete_storage_pool(
        &self,
        node_name: &str,
        stor_pool_name: &str,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgDelStorPool {
            node_name: node_name.to_string(),
            stor_pool_name: stor_pool_name.to_string(),
        };
        self.mutate(ApiCall::DelStorPool, &request).await
    }

    /// Lists storage pools, optionally restricted to some nodes and pools.
    pub async fn list_storage_pools(
        &self,
        node_names: &[String],
        stor_pool_names: &[String],
    ) -> ClientResult<Vec<StorPool>> {
        let filter = MsgFilter {
            node_names: node_names.to_vec(),
            stor_pool_names: stor_pool_names.to_vec(),
            ..Default::default()
        };
        match self.call(ApiCall::LstStorPool, Some(&filter)).await? {
            Reply::StoragePools(list) => Ok(list.stor_pools),
            other => Err(list_failure(ApiCall::LstStorPool, other)),
        }
    }

    // ---------------------------------------------------------------------
    // Controller properties
    // ---------------------------------------------------------------------

    pub async fn set_controller_property(
        &self,
        key: &str,
        value: &str,
    ) -> ClientResult<ApiCallResponses> {
        let request = MsgSetCtrlCfgProp {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.mutate(ApiCall::SetCtrlCfgProp, &request).await
    }

    pub async fn controller_properties(&self) -> ClientResult<HashMap<String, String>> {
        match self.call_empty(ApiCall::LstCtrlCfgProps).await? {
            Reply::ControllerProps(list) => Ok(list.props),
            other => Err(list_failure(ApiCall::LstCtrlCfgProps, other)),
        }
    }
}

fn unexpected(request: ApiCall, reply: &Reply) -> ClientError {
    ClientError::UnexpectedReply {
        request: request.as_str(),
        received: reply.kind(),
    }
}

/// A list request answered with responses failed on the controller side.
fn list_failure(request: ApiCall, reply: Reply) -> ClientError {
    match reply {
        Reply::ApiCallResponses(responses) => ClientError::Api(responses),
        other => unexpected(request, &other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::task::JoinHandle;

    use linstor_protocol::{
        FrameAssembler, MASK_ERROR, MsgApiCallResponse, MsgApiVersion, MsgLstCtrlCfgProps,
        MsgLstNode, RawFrame,
    };

    /// Answers every request through `respond`, which gets the opcode, the
    /// frame and returns the reply frames to write.
    fn fake_controller<F>(mut stream: DuplexStream, respond: F) -> JoinHandle<Vec<ApiCall>>
    where
        F: Fn(ApiCall, u64, &RawFrame) -> Vec<Vec<u8>> + Send + 'static,
    {
        tokio::spawn(async move {
            let version = encode_frame(
                &MsgHeader::new(ApiCall::Version, 0),
                &[MsgApiVersion {
                    version: 1,
                    controller_info: "fake".into(),
                }],
            )
            .unwrap();
            stream.write_all(&version).await.unwrap();

            let mut seen = Vec::new();
            let mut assembler = FrameAssembler::new();
            let mut buf = vec![0u8; 4096];
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                for frame in assembler.push(&buf[..n]).unwrap() {
                    let header = frame.header().unwrap();
                    let api_call: ApiCall = header.api_call.parse().unwrap();
                    seen.push(api_call);
                    for reply in respond(api_call, header.msg_id, &frame) {
                        stream.write_all(&reply).await.unwrap();
                    }
                }
            }
            seen
        })
    }

    fn responses_frame(msg_id: u64, ret_code: u64, message: &str) -> Vec<u8> {
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

    async fn client_for<F>(respond: F) -> (Client, JoinHandle<Vec<ApiCall>>)
    where
        F: Fn(ApiCall, u64, &RawFrame) -> Vec<Vec<u8>> + Send + 'static,
    {
        let (client_side, server_side) = tokio::io::duplex(64 * 1024);
        let controller = fake_controller(server_side, respond);
        let client = Client::establish("fake", client_side, &ConnectOptions::default())
            .await
            .unwrap();
        (client, controller)
    }

    #[tokio::test]
    async fn create_node_returns_responses() {
        let (client, controller) = client_for(|api_call, msg_id, frame| {
            assert_eq!(api_call, ApiCall::CrtNode);
            let request = MsgCrtNode::decode(frame.payloads()[0].as_slice()).unwrap();
            assert_eq!(request.node.unwrap().name, "alpha");
            vec![responses_frame(msg_id, 1, "Node 'alpha' created")]
        })
        .await;

        let node = Node {
            name: "alpha".into(),
            node_type: "SATELLITE".into(),
            ..Default::default()
        };
        let responses = client.create_node(node).await.unwrap().into_result().unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(client.controller_version().info, "fake");

        client.disconnect().await;
        assert_eq!(controller.await.unwrap(), vec![ApiCall::CrtNode]);
    }

    #[tokio::test]
    async fn error_responses_become_api_error() {
        let (client, _controller) =
            client_for(|_, msg_id, _| vec![responses_frame(msg_id, MASK_ERROR | 4, "exists")]).await;

        let responses = client.delete_node("alpha").await.unwrap();
        let err = responses.into_result().unwrap_err();
        assert!(matches!(err, ClientError::Api(r) if r.has_errors()));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn list_answered_with_responses_is_api_error() {
        let (client, _controller) =
            client_for(|_, msg_id, _| vec![responses_frame(msg_id, MASK_ERROR, "no access")]).await;

        let err = client.list_nodes(&[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Api(_)));
        // the connection survives a failed request
        assert!(client.connection().is_ready());
        client.disconnect().await;
    }

    #[tokio::test]
    async fn list_with_wrong_reply_kind_is_unexpected() {
        let (client, _controller) = client_for(|_, msg_id, _| {
            vec![encode_header_only(&MsgHeader::new(ApiCall::Pong, msg_id)).unwrap()]
        })
        .await;

        let err = client.list_resource_definitions().await.unwrap_err();
        assert!(matches!(
            err,
            ClientError::UnexpectedReply {
                request: "LstRscDfn",
                received: "pong"
            }
        ));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn list_nodes_sends_filter() {
        let (client, _controller) = client_for(|_, msg_id, frame| {
            let filter = MsgFilter::decode(frame.payloads()[0].as_slice()).unwrap();
            let nodes = filter
                .node_names
                .into_iter()
                .map(|name| Node {
                    name,
                    ..Default::default()
                })
                .collect();
            vec![
                encode_frame(
                    &MsgHeader::new(ApiCall::LstNode, msg_id),
                    &[MsgLstNode { nodes }],
                )
                .unwrap(),
            ]
        })
        .await;

        let nodes = client
            .list_nodes(&["alpha".to_string(), "bravo".to_string()])
            .await
            .unwrap();
        let names: Vec<_> = nodes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["alpha", "bravo"]);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn controller_properties_round_trip() {
        let (client, _controller) = client_for(|api_call, msg_id, frame| match api_call {
            ApiCall::SetCtrlCfgProp => {
                let request = MsgSetCtrlCfgProp::decode(frame.payloads()[0].as_slice()).unwrap();
                assert_eq!(request.key, "DrbdOptions/auto-quorum");
                vec![responses_frame(msg_id, 1, "set")]
            }
            ApiCall::LstCtrlCfgProps => vec![
                encode_frame(
                    &MsgHeader::new(ApiCall::LstCtrlCfgProps, msg_id),
                    &[MsgLstCtrlCfgProps {
                        props: HashMap::from([(
                            "DrbdOptions/auto-quorum".to_string(),
                            "io-error".to_string(),
                        )]),
                    }],
                )
                .unwrap(),
            ],
            other => panic!("unexpected request {other}"),
        })
        .await;

        client
            .set_controller_property("DrbdOptions/auto-quorum", "io-error")
            .await
            .unwrap()
            .into_result()
            .unwrap();
        let props = client.controller_properties().await.unwrap();
        assert_eq!(props["DrbdOptions/auto-quorum"], "io-error");
        client.disconnect().await;
    }

    #[tokio::test]
    async fn ping_measures_round_trip() {
        let (client, _controller) = client_for(|_, msg_id, _| {
            vec![encode_header_only(&MsgHeader::new(ApiCall::Pong, msg_id)).unwrap()]
        })
        .await;

        let rtt = client.ping().await.unwrap();
        assert!(rtt < Duration::from_secs(5));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn concurrent_callers_get_their_own_replies() {
        // echoes each request's node name back in a node list
        let (client, _controller) = client_for(|_, msg_id, frame| {
            let filter = MsgFilter::decode(frame.payloads()[0].as_slice()).unwrap();
            let nodes = vec![Node {
                name: filter.node_names[0].clone(),
                ..Default::default()
            }];
            vec![
                encode_frame(
                    &MsgHeader::new(ApiCall::LstNode, msg_id),
                    &[MsgLstNode { nodes }],
                )
                .unwrap(),
            ]
        })
        .await;

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let client = client.clone();
                tokio::spawn(async move {
                    let name = format!("node-{i}");
                    let nodes = client.list_nodes(std::slice::from_ref(&name)).await.unwrap();
                    assert_eq!(nodes[0].name, name);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(client.connection().correlator().pending_count(), 0);
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_request_times_out() {
        let (client, _controller) = client_for(|_, _, _| Vec::new()).await;
        let client = client.with_request_timeout(Duration::from_secs(1));

        let err = client.list_storage_pools(&[], &[]).await.unwrap_err();
        assert!(matches!(err, ClientError::Timeout { .. }));
        assert!(client.connection().is_ready());
        client.disconnect().await;
    }

    #[tokio::test(start_paused = true)]
    async fn request_timeout_covers_stalled_write() {
        let (client_side, mut server_side) = tokio::io::duplex(256);
        let version = encode_frame(
            &MsgHeader::new(ApiCall::Version, 0),
            &[MsgApiVersion {
                version: 1,
                controller_info: "stalled".into(),
            }],
        )
        .unwrap();
        server_side.write_all(&version).await.unwrap();
        let options = ConnectOptions::default().with_request_timeout(Duration::from_secs(1));
        let client = Client::establish("stalled", client_side, &options).await.unwrap();

        let result =
            tokio::time::timeout(Duration::from_secs(5), client.delete_node(&"x".repeat(4096)))
                .await
                .expect("request should honor its timeout");

        assert!(matches!(result, Err(ClientError::Timeout { .. })));
        assert!(!client.connection().is_ready());
        assert!(client.connection().close_reason().unwrap().contains("timed out writing"));
        client.disconnect().await;
        drop(server_side);
    }

    #[tokio::test]
    async fn requests_after_disconnect_fail() {
        let (client, _controller) = client_for(|_, _, _| Vec::new()).await;
        client.disconnect().await;

        let err = client.delete_resource("alpha", "r0").await.unwrap_err();
        assert!(matches!(err, ClientError::ConnectionClosed { .. }));
    }

    #[tokio::test]
    async fn connect_without_endpoints_is_config_error() {
        let err = Client::connect(&[], &ConnectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }
}
