//! Wireless link errors.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("could not associate with {network} within {}s", .timeout.as_secs())]
    AssociationTimeout { network: String, timeout: Duration },

    #[error("no peer appeared on {network} within {}s", .timeout.as_secs())]
    PeerNotFound { network: String, timeout: Duration },

    #[error("wireless driver failed during {operation}: {source}")]
    Driver {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid link state transition: {from} -> {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("unknown peer platform {0:?} (expected \"mac\" or \"windows\")")]
    UnknownPlatform(String),
}

impl LinkError {
    pub(crate) fn driver(operation: &'static str) -> impl FnOnce(anyhow::Error) -> LinkError {
        move |source| LinkError::Driver { operation, source }
    }
}
