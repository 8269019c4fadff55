use serde::{Deserialize, Serialize};
use crate::types::{MacAddr, PortNo, mac_format};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchPort {
    pub port_no: PortNo,
    #[serde(with = "mac_format", default = "unset_hw_addr")]
    pub hw_addr: MacAddr,
    #[serde(default = "default_live")]
    pub live: bool,
}

fn unset_hw_addr() -> MacAddr {
    MacAddr::zero()
}

fn default_live() -> bool {
    true
}

impl SwitchPort {
    pub fn new(port_no: PortNo, hw_addr: MacAddr) -> Self {
        Self {
            port_no,
            hw_addr,
            live: true,
        }
    }

    /// A port learned from a link or host attachment before the switch announced it.
    pub fn learned(port_no: PortNo) -> Self {
        Self::new(port_no, MacAddr::zero())
    }

    pub fn enable(&mut self) {
        self.live = true;
    }

    pub fn disable(&mut self) {
        self.live = false;
    }

    pub fn set_live(&mut self, live: bool) {
        if live {
            self.enable();
        } else {
            self.disable();
        }
    }
}
