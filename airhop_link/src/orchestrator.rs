//! One session, start to finish: link -> connect -> transfer -> restore.
//!
//! Dialing, accepting and pumping run in background tasks that report back
//! over one-shot channels. The orchestrator waits for each report before it
//! moves on, so the wireless link is never restored while a transfer task is
//! still running.

use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use airhop_core::TransferEvent;
use airhop_core::config::TransferConfig;
use airhop_core::error::TransferError;
use airhop_core::session::{Role, TransferSession};
use airhop_core::transfer::{
    ReceiveSummary, SendSummary, accept_one, bind_listener, dial_with_retry, receive_file,
    send_file,
};

use crate::error::LinkError;
use crate::link::WirelessLink;

/// Everything that can end a session early.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("wireless link reported no peer address")]
    NoPeerAddress,

    #[error("{0} task ended without reporting a result")]
    TaskLost(&'static str),
}

impl SessionError {
    /// Phase named in operator-facing failure messages
    pub fn phase(&self) -> &'static str {
        match self {
            SessionError::Link(_) | SessionError::NoPeerAddress => "wireless link",
            SessionError::Transfer(e) => e.phase(),
            SessionError::TaskLost(phase) => phase,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Completed(SendSummary),
    /// The receiver never became reachable; the link has been restored.
    PeerUnreachable { attempts: u32 },
}

async fn status(event_tx: &mpsc::Sender<TransferEvent>, message: String) {
    info!("{}", message);
    let _ = event_tx.send(TransferEvent::Status(message)).await;
}

/// Report a fatal error, restore the link and hand the error back.
async fn abort(
    link: &mut dyn WirelessLink,
    session: &TransferSession,
    event_tx: &mpsc::Sender<TransferEvent>,
    err: SessionError,
) -> SessionError {
    error!("Session failed during {}: {}", err.phase(), err);
    let _ = event_tx
        .send(TransferEvent::Error(format!("{} failed: {}", err.phase(), err)))
        .await;
    link.teardown(session).await;
    err
}

/// Normal end of session. A failed reset falls back to teardown.
async fn restore(link: &mut dyn WirelessLink, session: &TransferSession) {
    if let Err(e) = link.reset_wifi(session).await {
        warn!("Could not restore wireless state: {}", e);
        link.teardown(session).await;
    }
}

/// Bring the link up and enter the transfer phase.
async fn open_link(
    session: &mut TransferSession,
    link: &mut dyn WirelessLink,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<(), SessionError> {
    status(
        event_tx,
        format!("Associating on {} ({})", session.network_name(), session.role()),
    )
    .await;

    if let Err(e) = link.connect_to_peer(session).await {
        return Err(abort(link, session, event_tx, e.into()).await);
    }
    let _ = event_tx
        .send(TransferEvent::NetworkReady {
            network_name: session.network_name().to_string(),
        })
        .await;

    if let Err(e) = link.begin_transfer() {
        return Err(abort(link, session, event_tx, e.into()).await);
    }
    Ok(())
}

/// Sending role.
///
/// Dial exhaustion is not an error: the link is restored and
/// `SendOutcome::PeerUnreachable` is returned.
pub async fn run_send(
    session: &mut TransferSession,
    link: &mut dyn WirelessLink,
    config: &TransferConfig,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<SendOutcome, SessionError> {
    debug_assert_eq!(session.role(), Role::Sender);
    open_link(session, link, event_tx).await?;

    let Some(addr) = session.peer_addr() else {
        return Err(abort(link, session, event_tx, SessionError::NoPeerAddress).await);
    };

    status(event_tx, format!("Connecting to the receiver at {}", addr)).await;
    let (dial_tx, dial_rx) = oneshot::channel();
    let policy = config.dial_policy();
    let dial_events = event_tx.clone();
    tokio::spawn(async move {
        let _ = dial_tx.send(dial_with_retry(addr, policy, &dial_events).await);
    });

    let stream = match dial_rx.await {
        Ok(Ok(stream)) => stream,
        Ok(Err(TransferError::DialExhausted { addr, attempts })) => {
            status(
                event_tx,
                format!(
                    "Could not reach the receiver at {} after {} attempts. Check that both sides used the same passphrase.",
                    addr, attempts
                ),
            )
            .await;
            restore(link, session).await;
            return Ok(SendOutcome::PeerUnreachable { attempts });
        }
        Ok(Err(e)) => return Err(abort(link, session, event_tx, e.into()).await),
        Err(_) => return Err(abort(link, session, event_tx, SessionError::TaskLost("dial")).await),
    };

    session.attach_connection(stream);
    let _ = event_tx.send(TransferEvent::Connected { peer: addr }).await;

    let result = match session.take_connection() {
        Some(stream) => pump_send(stream, session, config.chunk_size, event_tx).await,
        None => Err(SessionError::TaskLost("dial")),
    };

    match result {
        Ok(summary) => {
            let _ = event_tx
                .send(TransferEvent::TransferCompleted {
                    file_name: summary.file_name.clone(),
                    bytes: summary.bytes_sent,
                })
                .await;
            status(event_tx, format!("Sent {} ({} bytes)", summary.file_name, summary.bytes_sent)).await;
            restore(link, session).await;
            Ok(SendOutcome::Completed(summary))
        }
        Err(e) => Err(abort(link, session, event_tx, e).await),
    }
}

async fn pump_send(
    mut stream: TcpStream,
    session: &TransferSession,
    chunk_size: usize,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<SendSummary, SessionError> {
    let (done_tx, done_rx) = oneshot::channel();
    let file_path = session.file_path().to_path_buf();
    let key = session.key();
    let events = event_tx.clone();

    tokio::spawn(async move {
        let result = send_file(&mut stream, &file_path, &key, chunk_size, &events).await;
        let _ = done_tx.send(result);
    });

    match done_rx.await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SessionError::TaskLost("transfer")),
    }
}

/// Receiving role.
pub async fn run_receive(
    session: &mut TransferSession,
    link: &mut dyn WirelessLink,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<ReceiveSummary, SessionError> {
    debug_assert_eq!(session.role(), Role::Receiver);
    open_link(session, link, event_tx).await?;

    let (ready_tx, ready_rx) = oneshot::channel::<Result<u16, TransferError>>();
    let (conn_tx, conn_rx) = oneshot::channel::<Result<(TcpStream, SocketAddr), TransferError>>();
    let port = session.port();

    tokio::spawn(async move {
        let listener = match bind_listener(port).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = ready_tx.send(Err(e));
                return;
            }
        };
        let bound = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                let _ = ready_tx.send(Err(e.into()));
                return;
            }
        };
        if ready_tx.send(Ok(bound)).is_err() {
            return;
        }
        let _ = conn_tx.send(accept_one(listener).await);
    });

    match ready_rx.await {
        Ok(Ok(bound)) => {
            status(event_tx, format!("Waiting for the sender on port {}", bound)).await;
            let _ = event_tx.send(TransferEvent::Listening { port: bound }).await;
        }
        Ok(Err(e)) => return Err(abort(link, session, event_tx, e.into()).await),
        Err(_) => return Err(abort(link, session, event_tx, SessionError::TaskLost("listen")).await),
    }

    let peer = match conn_rx.await {
        Ok(Ok((stream, peer))) => {
            session.attach_connection(stream);
            peer
        }
        Ok(Err(e)) => return Err(abort(link, session, event_tx, e.into()).await),
        Err(_) => return Err(abort(link, session, event_tx, SessionError::TaskLost("accept")).await),
    };
    let _ = event_tx.send(TransferEvent::Connected { peer }).await;

    let result = match session.take_connection() {
        Some(stream) => pump_receive(stream, session, event_tx).await,
        None => Err(SessionError::TaskLost("accept")),
    };

    match result {
        Ok(summary) => {
            let _ = event_tx
                .send(TransferEvent::TransferCompleted {
                    file_name: summary.file_name.clone(),
                    bytes: summary.bytes_received,
                })
                .await;
            status(
                event_tx,
                format!(
                    "Received {} from {} ({} bytes)",
                    summary.file_name, summary.sender_host, summary.bytes_received
                ),
            )
            .await;
            restore(link, session).await;
            Ok(summary)
        }
        Err(e) => Err(abort(link, session, event_tx, e).await),
    }
}

async fn pump_receive(
    mut stream: TcpStream,
    session: &TransferSession,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<ReceiveSummary, SessionError> {
    let (done_tx, done_rx) = oneshot::channel();
    let dest_path = session.file_path().to_path_buf();
    let key = session.key();
    let events = event_tx.clone();

    tokio::spawn(async move {
        let result = receive_file(&mut stream, &dest_path, &key, &events).await;
        let _ = done_tx.send(result);
    });

    match done_rx.await {
        Ok(result) => Ok(result?),
        Err(_) => Err(SessionError::TaskLost("transfer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_session_error_phases() {
        let link = SessionError::from(LinkError::AssociationTimeout {
            network: "airhop_abc123".into(),
            timeout: Duration::from_secs(60),
        });
        assert_eq!(link.phase(), "wireless link");

        let bind = SessionError::from(TransferError::Bind {
            port: 3290,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        });
        assert_eq!(bind.phase(), "listen");
        assert!(bind.to_string().contains("3290"));

        assert_eq!(SessionError::TaskLost("accept").phase(), "accept");
    }
}
