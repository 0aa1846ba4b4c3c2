//! Wireless link capability contract and its lifecycle state machine.
//!
//! ```text
//! Idle -> Associating -> Associated -> Transferring -> Restoring -> Idle
//!              |              |              |              |
//!              +--------------+---> Failed <-+--------------+
//!                                     |
//!                                teardown -> Idle
//! ```
//!
//! Both variants hold the host's wireless association for the duration of one
//! session and give it back exactly once: through `reset_wifi` on a normal
//! end, or `teardown` on any error path. Calling either after the other is a
//! no-op.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use airhop_core::{LinkTimeouts, Role, TransferSession};

use crate::driver::WifiDriver;
use crate::error::LinkError;
use crate::hosted::HostedLink;
use crate::restoring::RestoringLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Associating,
    Associated,
    Transferring,
    Restoring,
    Failed,
}

impl LinkState {
    pub fn name(self) -> &'static str {
        match self {
            LinkState::Idle => "Idle",
            LinkState::Associating => "Associating",
            LinkState::Associated => "Associated",
            LinkState::Transferring => "Transferring",
            LinkState::Restoring => "Restoring",
            LinkState::Failed => "Failed",
        }
    }

    fn can_transition_to(self, next: LinkState) -> bool {
        use LinkState::*;
        matches!(
            (self, next),
            (Idle, Associating)
                | (Associating, Associated)
                | (Associated, Transferring)
                | (Associated, Restoring)
                | (Transferring, Restoring)
                | (Restoring, Idle)
                | (Associating | Associated | Transferring | Restoring, Failed)
        )
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared state tracking for both link variants.
#[derive(Debug)]
pub struct LinkLifecycle {
    state: LinkState,
    /// Set once the host's wireless state has been touched
    modified: bool,
}

impl Default for LinkLifecycle {
    fn default() -> Self {
        Self {
            state: LinkState::Idle,
            modified: false,
        }
    }
}

impl LinkLifecycle {
    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn mark_modified(&mut self) {
        self.modified = true;
    }

    pub fn transition(&mut self, next: LinkState) -> Result<(), LinkError> {
        if !self.state.can_transition_to(next) {
            return Err(LinkError::InvalidTransition {
                from: self.state.name(),
                to: next.name(),
            });
        }
        debug!("Link state {} -> {}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Record a failure from whatever state we are in.
    pub fn fail(&mut self) {
        if self.state != LinkState::Idle {
            debug!("Link state {} -> Failed", self.state);
            self.state = LinkState::Failed;
        }
    }

    /// Back to idle after restoration; nothing left to undo.
    pub fn settle(&mut self) {
        self.state = LinkState::Idle;
        self.modified = false;
    }
}

/// Capability set shared by the platform variants.
#[async_trait]
pub trait WirelessLink: Send + Sync {
    /// Sending role hosts the ad-hoc network and waits for the peer; receiving
    /// role joins it. Blocks until associated or a bounded timeout expires.
    async fn connect_to_peer(&mut self, session: &mut TransferSession) -> Result<(), LinkError>;

    /// Network the host is currently associated with
    async fn current_wifi(&self) -> Result<Option<String>, LinkError>;

    /// Give the host's wireless association back. Called once at normal session end.
    async fn reset_wifi(&mut self, session: &TransferSession) -> Result<(), LinkError>;

    /// Best-effort restoration on error paths. Never fails; idempotent with `reset_wifi`.
    async fn teardown(&mut self, session: &TransferSession);

    /// Enter the transfer phase; the link must not be touched until restoration.
    fn begin_transfer(&mut self) -> Result<(), LinkError>;

    fn state(&self) -> LinkState;
}

/// The two recognised peer platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerPlatform {
    Mac,
    Windows,
}

impl FromStr for PeerPlatform {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mac" => Ok(PeerPlatform::Mac),
            "windows" => Ok(PeerPlatform::Windows),
            other => Err(LinkError::UnknownPlatform(other.to_string())),
        }
    }
}

impl fmt::Display for PeerPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerPlatform::Mac => f.write_str("mac"),
            PeerPlatform::Windows => f.write_str("windows"),
        }
    }
}

/// Pick the link variant once, at session start.
pub fn link_for_platform(
    platform: PeerPlatform,
    driver: Box<dyn WifiDriver>,
    timeouts: LinkTimeouts,
) -> Box<dyn WirelessLink> {
    match platform {
        PeerPlatform::Windows => Box::new(RestoringLink::new(driver, timeouts)),
        PeerPlatform::Mac => Box::new(HostedLink::new(driver, timeouts)),
    }
}

/// Role-dependent association shared by both variants.
///
/// On success the sending role's session knows the peer's address.
pub(crate) async fn associate(
    driver: &dyn WifiDriver,
    session: &mut TransferSession,
    timeouts: &LinkTimeouts,
) -> Result<(), LinkError> {
    let network = session.network_name().to_string();
    let name: &str = &network;

    match session.role() {
        Role::Sender => {
            info!("Creating ad-hoc network {}", network);
            driver
                .host_network(name)
                .await
                .map_err(LinkError::driver("host_network"))?;

            poll_until(timeouts.join, timeouts.poll_interval, move || async move {
                Ok(driver.peer_associated().await?.then_some(()))
            })
            .await
            .map_err(LinkError::driver("peer_associated"))?
            .ok_or_else(|| LinkError::AssociationTimeout {
                network: network.clone(),
                timeout: timeouts.join,
            })?;

            let ip = poll_until(timeouts.find_peer, timeouts.poll_interval, move || async move {
                driver.peer_address().await
            })
            .await
            .map_err(LinkError::driver("peer_address"))?
            .ok_or_else(|| LinkError::PeerNotFound {
                network: network.clone(),
                timeout: timeouts.find_peer,
            })?;

            info!("Peer associated at {}", ip);
            session.set_peer_ip(ip);
        }
        Role::Receiver => {
            info!("Joining ad-hoc network {}", network);
            poll_until(timeouts.join, timeouts.poll_interval, move || async move {
                if let Err(e) = driver.join_network(name).await {
                    debug!("Join attempt failed: {:#}", e);
                    return Ok(None);
                }
                let current = driver.current_network().await?;
                Ok((current.as_deref() == Some(name)).then_some(()))
            })
            .await
            .map_err(LinkError::driver("join_network"))?
            .ok_or_else(|| LinkError::AssociationTimeout {
                network: network.clone(),
                timeout: timeouts.join,
            })?;
            info!("Joined {}", network);
        }
    }

    Ok(())
}

/// Poll `check` every `interval` until it yields a value or `timeout` passes.
/// `Ok(None)` means the timeout expired; driver errors propagate.
async fn poll_until<T, F, Fut>(
    timeout: Duration,
    interval: Duration,
    mut check: F,
) -> anyhow::Result<Option<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<Option<T>>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(value) = check().await? {
            return Ok(Some(value));
        }
        if Instant::now() + interval > deadline {
            return Ok(None);
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut lifecycle = LinkLifecycle::default();
        for next in [
            LinkState::Associating,
            LinkState::Associated,
            LinkState::Transferring,
            LinkState::Restoring,
            LinkState::Idle,
        ] {
            lifecycle.transition(next).unwrap();
        }
        assert_eq!(lifecycle.state(), LinkState::Idle);
    }

    #[test]
    fn test_failed_only_leaves_through_teardown() {
        let mut lifecycle = LinkLifecycle::default();
        lifecycle.transition(LinkState::Associating).unwrap();
        lifecycle.fail();
        assert_eq!(lifecycle.state(), LinkState::Failed);
        assert!(lifecycle.transition(LinkState::Associated).is_err());
        assert!(lifecycle.transition(LinkState::Restoring).is_err());
        lifecycle.settle();
        assert_eq!(lifecycle.state(), LinkState::Idle);
    }

    #[test]
    fn test_cannot_skip_association() {
        let mut lifecycle = LinkLifecycle::default();
        let err = lifecycle.transition(LinkState::Transferring).unwrap_err();
        assert!(matches!(
            err,
            LinkError::InvalidTransition { from: "Idle", to: "Transferring" }
        ));
    }

    #[test]
    fn test_fail_from_idle_stays_idle() {
        let mut lifecycle = LinkLifecycle::default();
        lifecycle.fail();
        assert_eq!(lifecycle.state(), LinkState::Idle);
    }

    #[test]
    fn test_platform_parsing() {
        assert_eq!("mac".parse::<PeerPlatform>().unwrap(), PeerPlatform::Mac);
        assert_eq!("Windows".parse::<PeerPlatform>().unwrap(), PeerPlatform::Windows);
        assert!(matches!(
            "linux".parse::<PeerPlatform>(),
            Err(LinkError::UnknownPlatform(_))
        ));
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let result: Option<()> =
            poll_until(Duration::from_millis(50), Duration::from_millis(10), || async { Ok(None) })
                .await
                .unwrap();
        assert!(result.is_none());

        let mut calls = 0;
        let found = poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            let ready = calls >= 3;
            async move { Ok(ready.then_some(calls)) }
        })
        .await
        .unwrap();
        assert_eq!(found, Some(3));
    }
}
