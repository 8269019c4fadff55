use crate::types::{Dpid, MacAddr, PortNo};
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SwitchError {
    #[error("switch {0} is not connected")]
    NotConnected(Dpid),

    #[error("switch {dpid} rejected the request: {reason}")]
    Rejected { dpid: Dpid, reason: String },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("unknown device referenced: {0}")]
    UnknownDeviceReference(String),

    #[error("device already registered: {0}")]
    DuplicateDeviceRegistration(String),

    #[error("rule operation for {mac} on switch {dpid} failed: {source}")]
    RuleInstallFailure {
        dpid: Dpid,
        mac: MacAddr,
        #[source]
        source: SwitchError,
    },

    #[error("sending frame out of switch {dpid} port {port} failed: {source}")]
    FrameSendFailure {
        dpid: Dpid,
        port: PortNo,
        #[source]
        source: SwitchError,
    },

    #[error("no MAC address known for {0}")]
    UnresolvedAddress(Ipv4Addr),

    #[error("malformed frame from switch {dpid}: {reason}")]
    MalformedFrame { dpid: Dpid, reason: String },
}

impl ControllerError {
    /// No-op kinds are logged and dropped; everything else is surfaced.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            ControllerError::UnknownDeviceReference(_) | ControllerError::DuplicateDeviceRegistration(_)
        )
    }
}
