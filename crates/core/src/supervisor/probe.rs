//! TCP liveness probe.

use std::io;
use std::time::Duration;

use serde::Serialize;
use tokio::net::TcpStream;

/// Result of a liveness probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Up,
    Down,
}

/// Try to open a TCP connection to `host:port` within `timeout`.
///
/// A refused connection or a timeout means the server is down. Any other
/// error is logged and also treated as down.
pub async fn probe(host: &str, port: u16, timeout: Duration) -> Liveness {
    match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(_stream)) => Liveness::Up,
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            tracing::debug!(host, port, "Liveness probe refused");
            Liveness::Down
        }
        Ok(Err(e)) => {
            tracing::warn!(host, port, error = %e, "Liveness probe error, treating server as down");
            Liveness::Down
        }
        Err(_elapsed) => {
            tracing::debug!(host, port, timeout_ms = timeout.as_millis() as u64, "Liveness probe timed out");
            Liveness::Down
        }
    }
}
