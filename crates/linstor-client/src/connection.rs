//! One connection to one controller.
//!
//! A [`Connection`] is only handed out once the version handshake has
//! succeeded. From then on a background reader task owns the read half of
//! the stream, while requests are written through a mutex-guarded write
//! half. `Closing` is terminal: reconnecting means creating a new
//! `Connection`.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use linstor_core::ControllerEndpoint;
use linstor_protocol::{
    ApiCall, FRAME_HEADER_LEN, FrameAssembler, Message, MsgApiVersion, ProtocolError, RawFrame,
    decode_header,
};

use crate::config::ConnectOptions;
use crate::correlator::Correlator;
use crate::error::{ClientError, ClientResult};
use crate::{reader, tls};

/// Upper bound for flushing and closing the write side during teardown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a connection.
///
/// A [`Connection`] is only handed out once it is `Ready`: `Disconnected`
/// and `Handshaking` are passed through inside [`Connection::connect`] and
/// [`Connection::establish`], which return an error instead of a handle if
/// the handshake fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Ready,
    /// Terminal.
    Closing,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "disconnected",
            Self::Handshaking => "handshaking",
            Self::Ready => "ready",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Byte stream a connection can run over: TCP, TLS, or an in-memory pipe.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

pub(crate) type BoxedTransport = Box<dyn Transport>;

/// What the controller announced during the handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerInfo {
    /// API version spoken by the controller.
    pub version: u32,
    /// Free-form build description.
    pub info: String,
}

/// State shared between the connection handle, its callers and the reader.
pub(crate) struct Shared {
    pub(crate) endpoint: String,
    pub(crate) correlator: Correlator,
    writer: tokio::sync::Mutex<Option<WriteHalf<BoxedTransport>>>,
    state: watch::Sender<ConnectionState>,
}

impl Shared {
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Writes one complete frame.
    ///
    /// The write is abandoned as soon as the connection starts closing, so
    /// a controller that stopped reading cannot block [`teardown`](Self::teardown).
    /// A write failure tears the connection down.
    pub(crate) async fn send_frame(&self, frame: &[u8]) -> ClientResult<()> {
        let mut closing = self.subscribe();
        if *closing.borrow() != ConnectionState::Ready {
            return Err(ClientError::network("Not connected"));
        }

        let mut guard = tokio::select! {
            biased;
            _ = wait_closing(&mut closing) => {
                return Err(self.closed_error());
            }
            guard = self.writer.lock() => guard,
        };
        let Some(writer) = guard.as_mut() else {
            return Err(ClientError::network("Not connected"));
        };

        let written = tokio::select! {
            biased;
            _ = wait_closing(&mut closing) => None,
            result = write_frame(writer, frame) => Some(result),
        };
        let Some(result) = written else {
            // part of the frame may be on the wire, the stream is unusable
            guard.take();
            return Err(self.closed_error());
        };
        if self.state() == ConnectionState::Closing {
            // teardown found the writer busy and left it to us
            guard.take();
        }
        drop(guard);

        if let Err(e) = result {
            let reason = format!("failed to write to {}: {}", self.endpoint, e);
            self.teardown(reason.clone()).await;
            return Err(ClientError::network_io(reason, e));
        }
        trace!(endpoint = %self.endpoint, bytes = frame.len(), "frame sent");
        Ok(())
    }

    /// Moves to `Closing`, wakes every waiter and shuts the write side down.
    ///
    /// Only the first call has an effect. Never waits for a write in
    /// progress: that sender sees `Closing` and drops the write half itself.
    pub(crate) async fn teardown(&self, reason: impl Into<String>) {
        if !self.begin_close(reason.into()) {
            return;
        }
        let writer = match self.writer.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(mut writer) = writer else {
            return;
        };
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, writer.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                debug!(endpoint = %self.endpoint, error = %e, "shutdown of write side failed");
            }
            Err(_) => debug!(endpoint = %self.endpoint, "shutdown of write side timed out"),
        }
    }

    fn closed_error(&self) -> ClientError {
        let reason = self
            .correlator
            .close_reason()
            .unwrap_or_else(|| "connection closing".to_string());
        ClientError::closed(reason)
    }

    /// Synchronous part of [`teardown`](Self::teardown). Returns `false` if
    /// the connection was already closing.
    fn begin_close(&self, reason: String) -> bool {
        if self.state.send_replace(ConnectionState::Closing) == ConnectionState::Closing {
            return false;
        }
        info!(endpoint = %self.endpoint, reason = %reason, "connection closing");
        self.correlator.close(reason);
        true
    }
}

/// A live, handshaken connection to a controller.
pub struct Connection {
    shared: Arc<Shared>,
    controller: ControllerInfo,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.shared.endpoint)
            .field("state", &self.state())
            .field("controller", &self.controller)
            .finish()
    }
}

impl Connection {
    /// Connects to `endpoint` and performs the version handshake.
    ///
    /// TCP connect, TLS negotiation (for `linstor+ssl`) and the handshake
    /// together are bounded by `options.connect_timeout`.
    pub async fn connect(
        endpoint: &ControllerEndpoint,
        options: &ConnectOptions,
    ) -> ClientResult<Self> {
        tokio::time::timeout(options.connect_timeout, Self::open(endpoint, options))
            .await
            .map_err(|_| ClientError::timeout(format!("connecting to {}", endpoint)))?
    }

    async fn open(endpoint: &ControllerEndpoint, options: &ConnectOptions) -> ClientResult<Self> {
        debug!(%endpoint, state = %ConnectionState::Disconnected, "connecting");

        let tcp = TcpStream::connect(endpoint.socket_addr())
            .await
            .map_err(|e| ClientError::network_io(format!("failed to connect to {}", endpoint), e))?;
        if let Err(e) = tcp.set_nodelay(true) {
            debug!(%endpoint, error = %e, "failed to set TCP_NODELAY");
        }

        let name = endpoint.to_string();
        if endpoint.is_ssl() {
            let stream = tls::wrap(tcp, &endpoint.host, &options.tls).await?;
            Self::establish(name, stream, options).await
        } else {
            Self::establish(name, tcp, options).await
        }
    }

    /// Performs the version handshake over an already open stream and starts
    /// the reader task.
    ///
    /// # Errors
    ///
    /// - [`ClientError::IncompatibleVersion`] if the controller's API version
    ///   is outside `options.api_versions`.
    /// - [`ClientError::Protocol`] if the first frame is not a valid
    ///   `Version` announcement.
    /// - [`ClientError::Timeout`] if the announcement does not arrive within
    ///   `options.connect_timeout`.
    pub async fn establish<S: Transport>(
        endpoint: impl Into<String>,
        stream: S,
        options: &ConnectOptions,
    ) -> ClientResult<Self> {
        let endpoint = endpoint.into();
        let mut stream: BoxedTransport = Box::new(stream);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        state.send_replace(ConnectionState::Handshaking);
        trace!(%endpoint, state = %ConnectionState::Handshaking, "waiting for version");
        let controller = tokio::time::timeout(
            options.connect_timeout,
            handshake(&mut stream, options),
        )
        .await
        .map_err(|_| ClientError::timeout(format!("version handshake with {}", endpoint)))??;

        let (read_half, write_half) = tokio::io::split(stream);
        state.send_replace(ConnectionState::Ready);
        let shared = Arc::new(Shared {
            endpoint,
            correlator: Correlator::new(),
            writer: tokio::sync::Mutex::new(Some(write_half)),
            state,
        });

        let reader = tokio::spawn(reader::run(
            Arc::clone(&shared),
            read_half,
            FrameAssembler::with_max_frame_size(options.max_frame_size),
            options.poll_interval,
        ));

        info!(
            endpoint = %shared.endpoint,
            api_version = controller.version,
            "connected to controller"
        );

        Ok(Self {
            shared,
            controller,
            reader: Mutex::new(Some(reader)),
        })
    }

    /// Writes one encoded frame.
    ///
    /// # Errors
    ///
    /// Returns a `Not connected` network error unless the connection is
    /// `Ready`; a failed write closes the connection.
    pub async fn send(&self, frame: &[u8]) -> ClientResult<()> {
        self.shared.send_frame(frame).await
    }

    /// Closes the connection and waits for the reader task to exit.
    ///
    /// Idempotent. Every pending request fails with "closed by client".
    pub async fn disconnect(&self) {
        self.shared.teardown("closed by client").await;

        let reader = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = reader
            && let Err(e) = handle.await
        {
            warn!(endpoint = %self.shared.endpoint, error = %e, "reader task failed");
        }
    }

    /// Closes the connection with `reason` without joining the reader.
    pub(crate) async fn abort(&self, reason: impl Into<String>) {
        self.shared.teardown(reason).await;
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Watches lifecycle changes, starting from `Ready`.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.shared.subscribe()
    }

    /// Whether requests can be sent.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Why the connection closed, once it has.
    pub fn close_reason(&self) -> Option<String> {
        self.shared.correlator.close_reason()
    }

    /// Controller endpoint this connection talks to.
    pub fn endpoint(&self) -> &str {
        &self.shared.endpoint
    }

    /// Version information announced by the controller.
    pub fn controller(&self) -> &ControllerInfo {
        &self.controller
    }

    /// Correlator of this connection.
    pub fn correlator(&self) -> &Correlator {
        &self.shared.correlator
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        // the reader notices Closing and exits on its own
        self.shared.begin_close("connection dropped".to_string());
    }
}

/// Resolves once the connection is `Closing`.
pub(crate) async fn wait_closing(state: &mut watch::Receiver<ConnectionState>) {
    let _ = state
        .wait_for(|state| *state == ConnectionState::Closing)
        .await;
}

async fn write_frame(
    writer: &mut WriteHalf<BoxedTransport>,
    frame: &[u8],
) -> std::io::Result<()> {
    writer.write_all(frame).await?;
    writer.flush().await
}

async fn handshake(
    stream: &mut BoxedTransport,
    options: &ConnectOptions,
) -> ClientResult<ControllerInfo> {
    let frame = read_frame(stream, options.max_frame_size).await?;
    let header = frame.header()?;

    if ApiCall::from_wire(&header.api_call) != Some(ApiCall::Version) {
        return Err(ProtocolError::UnexpectedApiCall {
            expected: ApiCall::Version.as_str(),
            received: header.api_call,
        }
        .into());
    }

    let payload = frame
        .payloads()
        .first()
        .ok_or(ProtocolError::MissingPayload {
            api_call: ApiCall::Version.as_str(),
        })?;
    let version = MsgApiVersion::decode(payload.as_slice())
        .map_err(|e| ProtocolError::decode("MsgApiVersion", e))?;

    if !options.api_versions.contains(&version.version) {
        return Err(ClientError::IncompatibleVersion {
            server: version.version,
            min: *options.api_versions.start(),
            max: *options.api_versions.end(),
        });
    }

    Ok(ControllerInfo {
        version: version.version,
        info: version.controller_info,
    })
}

/// Reads exactly one frame; only used before the reader task exists.
async fn read_frame<R>(stream: &mut R, max_frame_size: u32) -> ClientResult<RawFrame>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    stream
        .read_exact(&mut header)
        .await
        .map_err(|e| ClientError::network_io("failed to read frame header", e))?;

    let body_len = decode_header(&header)?;
    if body_len > max_frame_size {
        return Err(ProtocolError::FrameTooLarge {
            size: u64::from(body_len),
            max: max_frame_size,
        }
        .into());
    }

    let mut body = vec![0u8; body_len as usize];
    stream
        .read_exact(&mut body)
        .await
        .map_err(|e| ClientError::network_io("failed to read frame body", e))?;

    Ok(RawFrame::from_body(&body)?)
}
