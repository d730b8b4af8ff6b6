//! Transport listeners and the ingest worker.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use coriolis_record::ParsedMessage;
use coriolis_writers::LogWriter;
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::parser::{self, LogFormat, OctetDecoder};

/// Maximum accepted wire message size.
const MAX_MESSAGE_SIZE: usize = 8192;

/// Capacity of the parsed-message channel between transports and the
/// ingest worker.
const INGEST_BUFFER: usize = 1024;

/// A parsed message annotated with its receipt time.
type Ingest = (ParsedMessage, DateTime<Utc>);

/// Transport a listener binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// Datagram Unix socket.
    Unixgram,
    Tcp,
    Udp,
}

/// Syslog server configuration, fixed for the process lifetime.
#[derive(Debug, Clone)]
pub struct SyslogServerConfig {
    pub listener: ListenerKind,
    /// Socket path for unixgram, `host:port` otherwise.
    pub address: String,
    pub format: LogFormat,
}

/// Syslog server errors.
#[derive(Debug, thiserror::Error)]
pub enum SyslogError {
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured unixgram path exists and is not a socket; refusing
    /// to remove it.
    #[error("cannot use {0:?} as address: file exists and is not a socket")]
    NotASocket(PathBuf),

    #[error("removing stale socket {path:?}: {source}")]
    StaleSocket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unixgram listeners are not supported on this platform")]
    UnixgramUnsupported,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The ingestion front end: listeners plus the normalize-and-forward
/// worker.
pub struct SyslogServer {
    cfg: SyslogServerConfig,
    writer: Arc<dyn LogWriter>,
}

impl SyslogServer {
    pub fn new(cfg: SyslogServerConfig, writer: Arc<dyn LogWriter>) -> Self {
        Self { cfg, writer }
    }

    /// Bind the configured transport and run until cancelled.
    ///
    /// Returns once the transport has stopped and the worker has drained
    /// the in-flight messages. The unixgram socket file is removed on the
    /// way out.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SyslogError> {
        let (tx, rx) = mpsc::channel::<Ingest>(INGEST_BUFFER);

        info!(
            listener = ?self.cfg.listener,
            address = %self.cfg.address,
            format = ?self.cfg.format,
            "syslog server starting"
        );

        let transport: JoinHandle<Result<(), SyslogError>> = match self.cfg.listener {
            ListenerKind::Udp => {
                let socket = tokio::net::UdpSocket::bind(&self.cfg.address)
                    .await
                    .map_err(|e| SyslogError::Bind {
                        address: self.cfg.address.clone(),
                        source: e,
                    })?;
                let format = self.cfg.format;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    udp_loop(socket, format, tx, cancel).await;
                    Ok(())
                })
            }
            ListenerKind::Tcp => {
                let listener = tokio::net::TcpListener::bind(&self.cfg.address)
                    .await
                    .map_err(|e| SyslogError::Bind {
                        address: self.cfg.address.clone(),
                        source: e,
                    })?;
                let format = self.cfg.format;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    tcp_loop(listener, format, tx, cancel).await;
                    Ok(())
                })
            }
            ListenerKind::Unixgram => self.bind_unixgram(tx, cancel.clone())?,
        };

        let worker = tokio::spawn(ingest_loop(rx, Arc::clone(&self.writer)));

        match transport.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(error = %e, "transport failed"),
            Err(e) => error!(error = %e, "transport task panicked"),
        }
        // Transport exit dropped the sender; the worker drains and stops.
        if let Err(e) = worker.await {
            error!(error = %e, "ingest worker panicked");
        }

        if self.cfg.listener == ListenerKind::Unixgram {
            remove_stale_socket(Path::new(&self.cfg.address))?;
        }

        info!("syslog server stopped");
        Ok(())
    }

    #[cfg(unix)]
    fn bind_unixgram(
        &self,
        tx: mpsc::Sender<Ingest>,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<(), SyslogError>>, SyslogError> {
        let path = Path::new(&self.cfg.address);
        remove_stale_socket(path)?;

        let socket =
            tokio::net::UnixDatagram::bind(path).map_err(|e| SyslogError::Bind {
                address: self.cfg.address.clone(),
                source: e,
            })?;

        // Syslog clients run as arbitrary users.
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o666)) {
            warn!(path = %path.display(), error = %e, "cannot change socket permissions");
        }

        let format = self.cfg.format;
        Ok(tokio::spawn(async move {
            unixgram_loop(socket, format, tx, cancel).await;
            Ok(())
        }))
    }

    #[cfg(not(unix))]
    fn bind_unixgram(
        &self,
        _tx: mpsc::Sender<Ingest>,
        _cancel: CancellationToken,
    ) -> Result<JoinHandle<Result<(), SyslogError>>, SyslogError> {
        Err(SyslogError::UnixgramUnsupported)
    }
}

/// Remove a leftover socket file. Only sockets are touched; any other
/// file type at the path is an error.
fn remove_stale_socket(path: &Path) -> Result<(), SyslogError> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => {
            return Err(SyslogError::StaleSocket {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if !meta.file_type().is_socket() {
            return Err(SyslogError::NotASocket(path.to_path_buf()));
        }
    }
    #[cfg(not(unix))]
    let _ = meta;

    info!(path = %path.display(), "removing stale unix socket");
    std::fs::remove_file(path).map_err(|e| SyslogError::StaleSocket {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Normalize parsed messages and hand them to the writer. Runs until the
/// transport side closes the channel.
async fn ingest_loop(mut rx: mpsc::Receiver<Ingest>, writer: Arc<dyn LogWriter>) {
    while let Some((parsed, received_at)) = rx.recv().await {
        let record = match parsed.into_record(received_at) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "dropping unpersistable log message");
                continue;
            }
        };
        if let Err(e) = writer.write(record).await {
            error!(error = %e, "failed to write log message");
        }
    }
    debug!("ingest worker drained");
}

/// Parse one datagram or frame and queue it, dropping on a full queue
/// (datagram semantics: best effort, never block the socket).
fn enqueue_datagram(data: &[u8], format: LogFormat, tx: &mpsc::Sender<Ingest>) {
    let data = trim_trailing_newline(data);
    if data.is_empty() {
        return;
    }
    match parser::parse(format, data) {
        Ok(parsed) => {
            if tx.try_send((parsed, Utc::now())).is_err() {
                debug!("ingest queue full, dropping message");
            }
        }
        Err(e) => warn!(error = %e, "failed to parse log message"),
    }
}

async fn udp_loop(
    socket: tokio::net::UdpSocket,
    format: LogFormat,
    tx: mpsc::Sender<Ingest>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            recv = socket.recv_from(&mut buf) => {
                match recv {
                    Ok((len, _peer)) => enqueue_datagram(&buf[..len], format, &tx),
                    Err(e) => debug!(error = %e, "udp recv error"),
                }
            }
        }
    }
}

#[cfg(unix)]
async fn unixgram_loop(
    socket: tokio::net::UnixDatagram,
    format: LogFormat,
    tx: mpsc::Sender<Ingest>,
    cancel: CancellationToken,
) {
    let mut buf = vec![0u8; MAX_MESSAGE_SIZE];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            recv = socket.recv(&mut buf) => {
                match recv {
                    Ok(len) => enqueue_datagram(&buf[..len], format, &tx),
                    Err(e) => debug!(error = %e, "unixgram recv error"),
                }
            }
        }
    }
}

async fn tcp_loop(
    listener: tokio::net::TcpListener,
    format: LogFormat,
    tx: mpsc::Sender<Ingest>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "syslog client connected");
                        let tx = tx.clone();
                        let cancel = cancel.clone();
                        tokio::spawn(async move {
                            if let Err(e) = tcp_connection(stream, format, tx, cancel).await {
                                debug!(peer = %peer, error = %e, "connection ended");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                }
            }
        }
    }
}

/// Read one TCP connection to completion: octet-counted frames for
/// RFC 6587, newline-delimited messages otherwise. Stream transports get
/// backpressure instead of drops.
async fn tcp_connection(
    mut stream: tokio::net::TcpStream,
    format: LogFormat,
    tx: mpsc::Sender<Ingest>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let decoder = (format == LogFormat::Rfc6587).then(|| OctetDecoder::new(MAX_MESSAGE_SIZE));
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        while let Some(frame) = next_frame(&decoder, &mut buf)? {
            let frame = trim_trailing_newline(&frame);
            if frame.is_empty() {
                continue;
            }
            match parser::parse(format, frame) {
                Ok(parsed) => {
                    if tx.send((parsed, Utc::now())).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => warn!(error = %e, "failed to parse log message"),
            }
        }

        if buf.len() > MAX_MESSAGE_SIZE {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "message exceeds maximum size",
            ));
        }

        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = stream.read_buf(&mut buf) => {
                if read? == 0 {
                    // A final newline-framed message may arrive without
                    // its terminator.
                    if decoder.is_none() {
                        let rest = trim_trailing_newline(&buf);
                        if !rest.is_empty() {
                            match parser::parse(format, rest) {
                                Ok(parsed) => {
                                    let _ = tx.send((parsed, Utc::now())).await;
                                }
                                Err(e) => warn!(error = %e, "failed to parse log message"),
                            }
                        }
                    }
                    return Ok(());
                }
            }
        }
    }
}

/// Pull the next complete frame out of the buffer, by octet count or by
/// newline.
fn next_frame(
    decoder: &Option<OctetDecoder>,
    buf: &mut BytesMut,
) -> std::io::Result<Option<bytes::Bytes>> {
    match decoder {
        Some(decoder) => decoder
            .decode(buf)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
        None => match buf.iter().position(|&b| b == b'\n') {
            Some(pos) => Ok(Some(buf.split_to(pos + 1).freeze())),
            None => Ok(None),
        },
    }
}

/// Trim a trailing LF or CRLF (some syslog clients append one).
fn trim_trailing_newline(data: &[u8]) -> &[u8] {
    let mut end = data.len();
    if end > 0 && data[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && data[end - 1] == b'\r' {
            end -= 1;
        }
    }
    &data[..end]
}

#[cfg(test)]
#[path = "server_test.rs"]
mod tests;
