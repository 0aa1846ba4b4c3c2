use async_trait::async_trait;
use tracing::{info, warn};

use airhop_core::{LinkTimeouts, Role, TransferSession};

use crate::driver::WifiDriver;
use crate::error::LinkError;
use crate::link::{LinkLifecycle, LinkState, WirelessLink, associate};

/// Link for platforms whose wireless stack rejoins the preferred network by
/// itself once the ad-hoc association is dropped. Nothing is captured.
pub struct HostedLink {
    driver: Box<dyn WifiDriver>,
    timeouts: LinkTimeouts,
    lifecycle: LinkLifecycle,
    role: Option<Role>,
}

impl HostedLink {
    pub fn new(driver: Box<dyn WifiDriver>, timeouts: LinkTimeouts) -> Self {
        Self {
            driver,
            timeouts,
            lifecycle: LinkLifecycle::default(),
            role: None,
        }
    }

    async fn release(&self) -> Result<(), LinkError> {
        match self.role {
            Some(Role::Sender) => self
                .driver
                .stop_hosted_network()
                .await
                .map_err(LinkError::driver("stop_hosted_network")),
            Some(Role::Receiver) => self
                .driver
                .leave_network()
                .await
                .map_err(LinkError::driver("leave_network")),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl WirelessLink for HostedLink {
    async fn connect_to_peer(&mut self, session: &mut TransferSession) -> Result<(), LinkError> {
        self.lifecycle.transition(LinkState::Associating)?;
        self.role = Some(session.role());
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

        match self.release().await {
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
            if let Err(e) = self.release().await {
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
