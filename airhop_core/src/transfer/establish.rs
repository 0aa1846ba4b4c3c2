//! Getting a connected TCP stream between the two ends.
//!
//! The receiving role binds and accepts exactly one connection. The sending
//! role dials on a fixed schedule, because the receiver's socket may not be
//! bound yet even though the wireless link is already up.

use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::TransferEvent;
use crate::config::DialPolicy;
use crate::error::TransferError;

/// Bind the listening socket on all interfaces
pub async fn bind_listener(port: u16) -> Result<TcpListener, TransferError> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransferError::Bind { port, source })?;
    info!("Listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept the single inbound connection of this session
pub async fn accept_one(listener: TcpListener) -> Result<(TcpStream, SocketAddr), TransferError> {
    let (stream, peer) = listener.accept().await.map_err(TransferError::Accept)?;
    stream.set_nodelay(true)?;
    info!("Connection accepted from {}", peer);
    Ok((stream, peer))
}

/// Dial `addr` up to `policy.attempts` times. First success wins.
pub async fn dial_with_retry(
    addr: SocketAddr,
    policy: DialPolicy,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<TcpStream, TransferError> {
    for attempt in 1..=policy.attempts {
        match tokio::time::timeout(policy.attempt_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                info!("Connected to {} on attempt {}", addr, attempt);
                return Ok(stream);
            }
            Ok(Err(e)) => debug!("Connection attempt {} to {} failed: {}", attempt, addr, e),
            Err(_) => debug!("Connection attempt {} to {} timed out", attempt, addr),
        }

        let _ = event_tx
            .send(TransferEvent::DialAttempt {
                attempt,
                max_attempts: policy.attempts,
                addr,
            })
            .await;

        if attempt < policy.attempts {
            tokio::time::sleep(policy.retry_delay).await;
        }
    }

    Err(TransferError::DialExhausted {
        addr,
        attempts: policy.attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};

    fn quick_policy(attempts: u32) -> DialPolicy {
        DialPolicy {
            attempts,
            attempt_timeout: Duration::from_millis(10),
            retry_delay: Duration::from_millis(20),
        }
    }

    async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_dial_gives_up_after_bounded_attempts() {
        let port = unused_port().await;
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let (tx, mut rx) = mpsc::channel(16);

        let start = Instant::now();
        let err = dial_with_retry(addr, quick_policy(3), &tx).await.unwrap_err();
        assert!(matches!(err, TransferError::DialExhausted { attempts: 3, .. }));
        assert!(!err.is_fatal());
        // Two delays between three attempts, each attempt capped
        assert!(start.elapsed() < Duration::from_secs(2));

        drop(tx);
        let mut attempts = Vec::new();
        while let Some(event) = rx.recv().await {
            if let TransferEvent::DialAttempt { attempt, .. } = event {
                attempts.push(attempt);
            }
        }
        assert_eq!(attempts, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_dial_succeeds_once_listener_appears() {
        let port = unused_port().await;
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let (tx, _rx) = mpsc::channel(64);

        let accept = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let listener = bind_listener(port).await.unwrap();
            accept_one(listener).await.unwrap()
        });

        let policy = DialPolicy {
            attempts: 50,
            attempt_timeout: Duration::from_millis(200),
            retry_delay: Duration::from_millis(20),
        };
        let stream = dial_with_retry(addr, policy, &tx).await.unwrap();
        let (_server, peer) = accept.await.unwrap();
        assert_eq!(stream.local_addr().unwrap(), peer);
    }

    #[tokio::test]
    async fn test_stalled_connect_is_cut_off_by_attempt_timeout() {
        // A listener that never accepts stops answering SYNs once its queue is full
        let socket = tokio::net::TcpSocket::new_v4().unwrap();
        socket.bind(([127, 0, 0, 1], 0).into()).unwrap();
        let listener = socket.listen(1).unwrap();
        let addr = listener.local_addr().unwrap();

        let mut queued = Vec::new();
        let mut stalled = false;
        for _ in 0..16 {
            match tokio::time::timeout(Duration::from_millis(200), TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => queued.push(stream),
                Ok(Err(_)) => break,
                Err(_) => {
                    stalled = true;
                    break;
                }
            }
        }
        if !stalled {
            // Kernel kept completing handshakes; nothing to time out here
            return;
        }

        let (tx, mut rx) = mpsc::channel(16);
        let policy = DialPolicy {
            attempts: 2,
            attempt_timeout: Duration::from_millis(100),
            retry_delay: Duration::from_millis(10),
        };
        let start = Instant::now();
        let err = dial_with_retry(addr, policy, &tx).await.unwrap_err();
        let elapsed = start.elapsed();

        assert!(matches!(err, TransferError::DialExhausted { attempts: 2, .. }));
        assert!(elapsed >= Duration::from_millis(150), "returned after {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "returned after {:?}", elapsed);

        drop(tx);
        let mut attempts = 0;
        while rx.recv().await.is_some() {
            attempts += 1;
        }
        assert_eq!(attempts, 2);
        drop(queued);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_bind_error() {
        let first = bind_listener(0).await.unwrap();
        let port = first.local_addr().unwrap().port();
        let err = bind_listener(port).await.unwrap_err();
        assert!(matches!(err, TransferError::Bind { port: p, .. } if p == port));
        assert_eq!(err.phase(), "listen");
    }
}
