use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use crate::network::SwitchPort;
use crate::types::{Dpid, MacAddr, PortNo, mac_format};

/// Notifications delivered by the switch-control runtime, one JSON object per
/// event on the wire (`{"event": "link_added", ...}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TopologyEvent {
    SwitchAdded {
        id: Dpid,
        #[serde(default)]
        ports: Vec<SwitchPort>,
    },
    SwitchRemoved {
        id: Dpid,
    },
    HostAdded {
        #[serde(with = "mac_format")]
        mac: MacAddr,
        #[serde(default)]
        ips: Vec<Ipv4Addr>,
        attach_switch: Dpid,
        attach_port: PortNo,
    },
    HostRemoved {
        #[serde(with = "mac_format")]
        mac: MacAddr,
    },
    LinkAdded {
        src_switch: Dpid,
        src_port: PortNo,
        dst_switch: Dpid,
        dst_port: PortNo,
    },
    LinkRemoved {
        src_switch: Dpid,
        src_port: PortNo,
        dst_switch: Dpid,
        dst_port: PortNo,
    },
    PortChanged {
        switch: Dpid,
        port: PortNo,
        live: bool,
    },
    PacketIn {
        switch: Dpid,
        in_port: PortNo,
        data: Vec<u8>,
    },
}

impl TopologyEvent {
    /// Whether the event can change the graph and so needs a path refresh.
    pub fn changes_topology(&self) -> bool {
        !matches!(self, TopologyEvent::PacketIn { .. })
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }
}
