use async_trait::async_trait;
use tracing::{info, warn};

use airhop_core::{LinkTimeouts, Role, TransferSession};

use crate::driver::WifiDriver;
use crate::error::LinkError;
use crate::link::{LinkLifecycle, LinkState, WirelessLink, associate};

/// Link for platforms that do not return to the previous network on their
/// own. The association in place before the session is captured once, before
/// the first modification, and rejoined at the end.
pub struct RestoringLink {
    driver: Box<dyn WifiDriver>,
    timeouts: LinkTimeouts,
    lifecycle: LinkLifecycle,
    role: Option<Role>,
    previous_network: Option<String>,
    captured: bool,
}

impl RestoringLink {
    pub fn new(driver: Box<dyn WifiDriver>, timeouts: LinkTimeouts) -> Self {
        Self {
            driver,
            timeouts,
            lifecycle: LinkLifecycle::default(),
            role: None,
            previous_network: None,
            captured: false,
        }
    }

    /// Network captured before the session touched anything.
    pub fn previous_network(&self) -> Option<&str> {
        self.previous_network.as_deref()
    }

    async fn capture_previous(&mut self) -> Result<(), LinkError> {
        if self.captured {
            return Ok(());
        }
        self.previous_network = self
            .driver
            .current_network()
            .await
            .map_err(LinkError::driver("current_network"))?;
        self.captured = true;
        info!(
            "Previous network: {}",
            self.previous_network.as_deref().unwrap_or("<none>")
        );
        Ok(())
    }

    /// Undo the session's changes. With `best_effort`, keep going past
    /// failed steps and report only the first one.
    async fn restore(&mut self, best_effort: bool) -> Result<(), LinkError> {
        let mut first_error = None;

        if self.role == Some(Role::Sender) {
            if let Err(e) = self.driver.stop_hosted_network().await {
                let err = LinkError::Driver { operation: "stop_hosted_network", source: e };
                if !best_effort {
                    return Err(err);
                }
                warn!("{}", err);
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
        }

        let rejoin = match self.previous_network.as_deref() {
            Some(previous) => {
                info!("Rejoining {}", previous);
                self.driver
                    .join_network(previous)
                    .await
                    .map_err(LinkError::driver("join_network"))
            }
            None => self
                .driver
                .leave_network()
                .await
                .map_err(LinkError::driver("leave_network")),
        };
        if let Err(err) = rejoin {
            if !best_effort {
                return Err(err);
            }
            warn!("{}", err);
            if first_error.is_none() {
                first_error = Some(err);
            }
        }

        self.previous_network = None;
        self.captured = false;
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WirelessLink for RestoringLink {
    async fn connect_to_peer(&mut self, session: &mut TransferSession) -> Result<(), LinkError> {
        self.lifecycle.transition(LinkState::Associating)?;
        self.role = Some(session.role());

        if let Err(e) = self.capture_previous().await {
            self.lifecycle.fail();
            return Err(e);
        }

        self.lifecycle.mark_modified();
        match associate(self.driver.as_ref(), session, &self.timeouts).await {
            Ok(()) => self.lifecycle.transition(LinkState::Associated),
            Err(e) => {
                self.lifecycle.fail();
                Err(e)
            }
        }
    }

    async fn current_wifi(&self) -> Result<Option<String>, LinkError> {
        self.driver
            .current_network()
            .await
            .map_err(LinkError::driver("current_network"))
    }

    async fn reset_wifi(&mut self, _session: &TransferSession) -> Result<(), LinkError> {
        if self.lifecycle.state() == LinkState::Idle && !self.lifecycle.is_modified() {
            return Ok(());
        }
        self.lifecycle.transition(LinkState::Restoring)?;

        match self.restore(false).await {
            Ok(()) => {
                self.lifecycle.transition(LinkState::Idle)?;
                self.lifecycle.settle();
                Ok(())
            }
            Err(e) => {
                self.lifecycle.fail();
                Err(e)
            }
        }
    }

    async fn teardown(&mut self, _session: &TransferSession) {
        if self.lifecycle.is_modified() {
            info!("Tearing down wireless link");
            if let Err(e) = self.restore(true).await {
                warn!("Wireless teardown incomplete: {}", e);
            }
        }
        self.lifecycle.settle();
    }

    fn begin_transfer(&mut self) -> Result<(), LinkError> {
        self.lifecycle.transition(LinkState::Transferring)
    }

    fn state(&self) -> LinkState {
        self.lifecycle.state()
    }
}
