//! Wireless link lifecycle and session orchestration.

pub mod driver;
pub mod error;
pub mod hosted;
pub mod link;
pub mod orchestrator;
pub mod restoring;

pub use driver::{CommandDriver, LoopbackDriver, WifiDriver};
pub use error::LinkError;
pub use hosted::HostedLink;
pub use link::{LinkState, PeerPlatform, WirelessLink, link_for_platform};
pub use orchestrator::{SendOutcome, SessionError, run_receive, run_send};
pub use restoring::RestoringLink;
