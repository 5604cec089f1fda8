use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::kiss::KissDecoder;

const READ_BUFFER_SIZE: usize = 4096;

/// What the client reports to the ingest side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KissEvent {
    Connected { peer: SocketAddr },
    /// AX.25 frame from a KISS data frame, command byte stripped
    Frame(Vec<u8>),
    /// An established connection ended, whether the TNC closed it, it
    /// failed, or the client was told to disconnect
    Disconnected,
}

/// Result type for connection attempts
enum ConnectionResult {
    /// TNC closed the connection
    Closed,
    /// Caller asked the client to stop
    Cancelled,
    /// Nobody is listening for events any more
    ReceiverClosed,
    /// Connection could not be established
    ConnectionFailed(anyhow::Error),
    /// Connection was established but failed during operation
    OperationFailed(anyhow::Error),
}

#[derive(Debug, Clone)]
pub struct KissClientConfig {
    /// TNC hostname
    pub host: String,
    /// TNC KISS-over-TCP port
    pub port: u16,
    /// Fixed delay before reconnecting after a disconnect or failed attempt
    pub reconnect_interval: Duration,
}

impl Default for KissClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8001,
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

impl KissClientConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Builder pattern for creating KISS client configurations
pub struct KissClientConfigBuilder {
    config: KissClientConfig,
}

impl KissClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: KissClientConfig::default(),
        }
    }

    pub fn host<S: Into<String>>(mut self, host: S) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    pub fn build(self) -> KissClientConfig {
        self.config
    }
}

impl Default for KissClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Session {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Persistent connection to a KISS TNC over TCP.
///
/// `connect` starts a background task that connects, de-frames incoming
/// bytes and reconnects after a fixed interval until `disconnect` is called.
pub struct KissClient {
    config: KissClientConfig,
    session: Mutex<Session>,
    connected: Arc<AtomicBool>,
}

impl KissClient {
    pub fn new(config: KissClientConfig) -> Self {
        Self {
            config,
            session: Mutex::new(Session::default()),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    /// True while a TCP connection to the TNC is established
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// True while the connect/reconnect task is alive
    pub fn is_running(&self) -> bool {
        let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        session.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start connecting. Returns false, doing nothing, if the client is
    /// already connecting or connected.
    pub fn connect(&self, events: flume::Sender<KissEvent>) -> bool {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.task.as_ref().is_some_and(|task| !task.is_finished()) {
            debug!("KISS client already running; connect ignored");
            return false;
        }

        let cancel = CancellationToken::new();
        let task = tokio::spawn(Self::run(
            self.config.clone(),
            events,
            cancel.clone(),
            Arc::clone(&self.connected),
        ));
        session.cancel = Some(cancel);
        session.task = Some(task);
        true
    }

    /// Stop reconnecting and close the active connection, if any. Waits for
    /// the background task to finish.
    pub async fn disconnect(&self) {
        let (cancel, task) = {
            let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            (session.cancel.take(), session.task.take())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(task) = task
            && let Err(e) = task.await
        {
            error!("KISS client task ended abnormally: {}", e);
        }
    }

    /// Connection retry loop; runs until cancelled or the event receiver is dropped
    async fn run(
        config: KissClientConfig,
        events: flume::Sender<KissEvent>,
        cancel: CancellationToken,
        connected: Arc<AtomicBool>,
    ) {
        loop {
            let result = Self::connect_and_run(&config, &events, &cancel, &connected).await;

            match result {
                ConnectionResult::Closed => {
                    info!("KISS connection closed by TNC");
                }
                ConnectionResult::Cancelled => {
                    info!("KISS client stopped");
                    return;
                }
                ConnectionResult::ReceiverClosed => {
                    warn!("KISS event receiver dropped; stopping client");
                    return;
                }
                ConnectionResult::ConnectionFailed(e) => {
                    warn!("KISS connection failed: {}", e);
                    metrics::counter!("kiss.connection.failed_total").increment(1);
                }
                ConnectionResult::OperationFailed(e) => {
                    error!("KISS connection error: {}", e);
                }
            }

            info!(
                "Reconnecting to {} in {}ms",
                config.address(),
                config.reconnect_interval.as_millis()
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("KISS client stopped");
                    return;
                }
                _ = tokio::time::sleep(config.reconnect_interval) => {}
            }
        }
    }

    #[tracing::instrument(skip_all, fields(host = %config.host, port = %config.port))]
    async fn connect_and_run(
        config: &KissClientConfig,
        events: &flume::Sender<KissEvent>,
        cancel: &CancellationToken,
        connected: &AtomicBool,
    ) -> ConnectionResult {
        let address = config.address();
        info!("Connecting to KISS TNC at {}", address);

        let addrs: Vec<SocketAddr> = tokio::select! {
            _ = cancel.cancelled() => return ConnectionResult::Cancelled,
            lookup = tokio::net::lookup_host(&address) => match lookup {
                Ok(addrs) => addrs.collect(),
                Err(e) => {
                    return ConnectionResult::ConnectionFailed(anyhow::anyhow!(
                        "DNS resolution failed for {}: {}",
                        address,
                        e
                    ));
                }
            },
        };
        if addrs.is_empty() {
            return ConnectionResult::ConnectionFailed(anyhow::anyhow!(
                "DNS resolution returned no addresses for {}",
                address
            ));
        }

        let mut last_error = None;
        for addr in &addrs {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return ConnectionResult::Cancelled,
                attempt = TcpStream::connect(addr) => attempt,
            };
            match attempt {
                Ok(stream) => {
                    info!("Connected to KISS TNC at {}", addr);
                    metrics::counter!("kiss.connection.established_total").increment(1);
                    metrics::gauge!("kiss.connection.connected").set(1.0);
                    connected.store(true, Ordering::Release);

                    if events
                        .send_async(KissEvent::Connected { peer: *addr })
                        .await
                        .is_err()
                    {
                        Self::mark_disconnected(connected, events).await;
                        return ConnectionResult::ReceiverClosed;
                    }

                    let result = Self::process_connection(stream, *addr, events, cancel).await;
                    Self::mark_disconnected(connected, events).await;
                    return result;
                }
                Err(e) => {
                    debug!("Failed to connect to {}: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        ConnectionResult::ConnectionFailed(anyhow::anyhow!(
            "Failed to connect to any resolved address for {}: {:?}",
            address,
            last_error
        ))
    }

    async fn mark_disconnected(connected: &AtomicBool, events: &flume::Sender<KissEvent>) {
        connected.store(false, Ordering::Release);
        metrics::gauge!("kiss.connection.connected").set(0.0);
        // A dropped receiver is handled by the caller's result
        let _ = events.send_async(KissEvent::Disconnected).await;
    }

    /// Read and de-frame until the connection ends
    #[tracing::instrument(skip(stream, events, cancel), fields(peer = %peer))]
    async fn process_connection(
        mut stream: TcpStream,
        peer: SocketAddr,
        events: &flume::Sender<KissEvent>,
        cancel: &CancellationToken,
    ) -> ConnectionResult {
        let mut decoder = KissDecoder::new();
        let mut buffer = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let read = tokio::select! {
                _ = cancel.cancelled() => return ConnectionResult::Cancelled,
                read = stream.read(&mut buffer) => read,
            };

            match read {
                Ok(0) => return ConnectionResult::Closed,
                Ok(n) => {
                    trace!("Received {} bytes from TNC", n);
                    metrics::counter!("kiss.bytes_received_total").increment(n as u64);

                    for frame in decoder.feed(&buffer[..n]) {
                        let Some(payload) = frame.ax25_payload() else {
                            trace!(
                                "Ignoring KISS {:?} frame on port {}",
                                frame.command(),
                                frame.port()
                            );
                            metrics::counter!("kiss.frames_ignored_total").increment(1);
                            continue;
                        };

                        metrics::counter!("kiss.frames_received_total").increment(1);
                        if events
                            .send_async(KissEvent::Frame(payload.to_vec()))
                            .await
                            .is_err()
                        {
                            return ConnectionResult::ReceiverClosed;
                        }
                    }
                }
                Err(e) => {
                    return ConnectionResult::OperationFailed(anyhow::anyhow!(
                        "Read error from {}: {}",
                        peer,
                        e
                    ));
                }
            }
        }
    }
}
