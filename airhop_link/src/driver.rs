//! Boundary to the operating system's wireless stack.
//!
//! The link variants only ever talk to a `WifiDriver`. Two drivers ship:
//! `LoopbackDriver`, which pretends the radio is already shared and puts the
//! peer on 127.0.0.1, and `CommandDriver`, which runs operator-configured
//! command lines.

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Mutex;
use tokio::process::Command;
use tracing::debug;

use airhop_core::config::DriverCommands;

#[async_trait]
pub trait WifiDriver: Send + Sync {
    /// Network the host is associated with right now, if any
    async fn current_network(&self) -> Result<Option<String>>;

    /// Create an ad-hoc network advertising `network`
    async fn host_network(&self, network: &str) -> Result<()>;

    /// Disable the ad-hoc network created by `host_network`
    async fn stop_hosted_network(&self) -> Result<()>;

    /// Associate with `network`
    async fn join_network(&self, network: &str) -> Result<()>;

    /// Drop the current association
    async fn leave_network(&self) -> Result<()>;

    /// Whether a peer has associated with the hosted network
    async fn peer_associated(&self) -> Result<bool>;

    /// Address of the associated peer, once known
    async fn peer_address(&self) -> Result<Option<IpAddr>>;
}

/// Driver for two processes on one host: no radio, the peer is 127.0.0.1.
#[derive(Debug, Default)]
pub struct LoopbackDriver {
    current: Mutex<Option<String>>,
}

impl LoopbackDriver {
    pub fn new() -> Self {
        Self::default()
    }

    fn set_current(&self, network: Option<String>) -> Result<()> {
        let mut current = self
            .current
            .lock()
            .map_err(|_| anyhow!("loopback driver state poisoned"))?;
        *current = network;
        Ok(())
    }
}

#[async_trait]
impl WifiDriver for LoopbackDriver {
    async fn current_network(&self) -> Result<Option<String>> {
        let current = self
            .current
            .lock()
            .map_err(|_| anyhow!("loopback driver state poisoned"))?;
        Ok(current.clone())
    }

    async fn host_network(&self, network: &str) -> Result<()> {
        self.set_current(Some(network.to_string()))
    }

    async fn stop_hosted_network(&self) -> Result<()> {
        self.set_current(None)
    }

    async fn join_network(&self, network: &str) -> Result<()> {
        self.set_current(Some(network.to_string()))
    }

    async fn leave_network(&self) -> Result<()> {
        self.set_current(None)
    }

    async fn peer_associated(&self) -> Result<bool> {
        Ok(true)
    }

    async fn peer_address(&self) -> Result<Option<IpAddr>> {
        Ok(Some(IpAddr::V4(Ipv4Addr::LOCALHOST)))
    }
}

/// Driver that shells out to operator-configured argv templates.
#[derive(Debug, Clone)]
pub struct CommandDriver {
    commands: DriverCommands,
}

impl CommandDriver {
    pub fn new(commands: DriverCommands) -> Self {
        Self { commands }
    }

    /// Substitute `{network}` into every argument of a template
    fn render(template: &[String], network: Option<&str>) -> Vec<String> {
        template
            .iter()
            .map(|arg| match network {
                Some(name) => arg.replace("{network}", name),
                None => arg.clone(),
            })
            .collect()
    }

    async fn run(
        &self,
        operation: &str,
        template: &[String],
        network: Option<&str>,
    ) -> Result<std::process::Output> {
        let argv = Self::render(template, network);
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("no command configured for `{}`", operation))?;

        debug!("Running {} command: {:?}", operation, argv);
        Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to spawn `{}` for {}", program, operation))
    }

    async fn run_checked(&self, operation: &str, template: &[String], network: Option<&str>) -> Result<String> {
        let output = self.run(operation, template, network).await?;
        if !output.status.success() {
            bail!(
                "`{}` command exited with {}: {}",
                operation,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl WifiDriver for CommandDriver {
    async fn current_network(&self) -> Result<Option<String>> {
        let out = self
            .run_checked("current_network", &self.commands.current_network, None)
            .await?;
        Ok(Some(out).filter(|s| !s.is_empty()))
    }

    async fn host_network(&self, network: &str) -> Result<()> {
        self.run_checked("host_network", &self.commands.host_network, Some(network))
            .await
            .map(|_| ())
    }

    async fn stop_hosted_network(&self) -> Result<()> {
        self.run_checked("stop_hosted_network", &self.commands.stop_hosted_network, None)
            .await
            .map(|_| ())
    }

    async fn join_network(&self, network: &str) -> Result<()> {
        self.run_checked("join_network", &self.commands.join_network, Some(network))
            .await
            .map(|_| ())
    }

    async fn leave_network(&self) -> Result<()> {
        self.run_checked("leave_network", &self.commands.leave_network, None)
            .await
            .map(|_| ())
    }

    async fn peer_associated(&self) -> Result<bool> {
        let output = self
            .run("peer_associated", &self.commands.peer_associated, None)
            .await?;
        Ok(output.status.success())
    }

    async fn peer_address(&self) -> Result<Option<IpAddr>> {
        let out = self
            .run_checked("peer_address", &self.commands.peer_address, None)
            .await?;
        if out.is_empty() {
            return Ok(None);
        }
        let ip = out
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .parse()
            .with_context(|| format!("peer_address printed {:?}, not an IP address", out))?;
        Ok(Some(ip))
    }
}
