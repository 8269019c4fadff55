use serde::{Deserialize, Serialize};
use std::fmt;

pub use pnet::util::MacAddr;

/// Datapath identity of a switch.
pub type Dpid = u64;

/// Switch-local port number.
pub type PortNo = u16;

/// A port on a specific switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRef {
    pub dpid: Dpid,
    pub port_no: PortNo,
}

impl PortRef {
    pub fn new(dpid: Dpid, port_no: PortNo) -> Self {
        Self { dpid, port_no }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "switch{}/{}", self.dpid, self.port_no)
    }
}

/// Serializes a `MacAddr` as its colon-separated text form.
pub mod mac_format {
    use super::MacAddr;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(mac: &MacAddr, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(mac)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<MacAddr, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<MacAddr>()
            .map_err(|e| D::Error::custom(format!("invalid MAC address '{}': {:?}", text, e)))
    }
}
