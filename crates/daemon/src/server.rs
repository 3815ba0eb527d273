//! Control server for the NVR daemon
//!
//! Accepts TCP connections on the configured address (127.0.0.1:9000 by
//! default) and serves the line protocol in [`crate::protocol`], one task
//! per connection.

use crate::protocol::handle_line;
use crate::service::NvrService;
use futures::stream::{Stream, StreamExt};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Pause after an accept error that is not tied to a single connection,
/// e.g. the process running out of file descriptors
const ACCEPT_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// Errors that can occur when running the control server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

/// Serve one connection until the peer closes it or a read fails.
///
/// Each request line is answered before the next one is read.
pub async fn handle_connection<S>(stream: S, service: Arc<NvrService>) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let mut response = handle_line(&service, &line).await;
        response.push('\n');
        writer.write_all(response.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Whether an accept error concerns only the connection being accepted.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

/// Serve every connection yielded by `incoming` until it ends.
///
/// Accept errors are logged and skipped; errors that are not tied to one
/// connection additionally pause accepting for [`ACCEPT_ERROR_PAUSE`].
pub async fn serve_incoming<S>(incoming: S, service: Arc<NvrService>)
where
    S: Stream<Item = io::Result<(TcpStream, SocketAddr)>>,
{
    futures::pin_mut!(incoming);
    while let Some(accepted) = incoming.next().await {
        let (stream, peer) = match accepted {
            Ok(accepted) => accepted,
            Err(e) if is_connection_error(&e) => {
                debug!(error = %e, "control connection aborted before accept");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "failed to accept control connection");
                tokio::time::sleep(ACCEPT_ERROR_PAUSE).await;
                continue;
            }
        };

        debug!(%peer, "control connection opened");
        let service = service.clone();
        tokio::spawn(async move {
            match handle_connection(stream, service).await {
                Ok(()) => debug!(%peer, "control connection closed"),
                Err(e) => warn!(%peer, error = %e, "control connection failed"),
            }
        });
    }
}

/// Accept connections on `listener` forever. Per-connection and accept
/// errors are logged and never end the loop.
pub async fn serve(listener: TcpListener, service: Arc<NvrService>) {
    let incoming = futures::stream::unfold(listener, |listener| async move {
        let accepted = listener.accept().await;
        Some((accepted, listener))
    });
    serve_incoming(incoming, service).await
}

/// Bind `addr` and run the control server.
///
/// # Arguments
/// * `addr` - Listen address, e.g. `127.0.0.1:9000`
/// * `service` - Shared service the commands operate on
pub async fn run_control_server(addr: &str, service: Arc<NvrService>) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;
    let local: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = ?local, "control server listening");
    serve(listener, service).await;
    Ok(())
}
