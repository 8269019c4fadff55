use serde::Serialize;
use std::net::Ipv4Addr;
use crate::types::{MacAddr, mac_format};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArpEntry {
    pub ip: Ipv4Addr,
    #[serde(with = "mac_format")]
    pub mac: MacAddr,
}

/// IP to MAC associations learned from host arrivals.
#[derive(Debug, Clone, Default)]
pub struct ArpCache {
    entries: Vec<ArpEntry>,
}

impl ArpCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// First entry for `ip`. When two MACs have claimed the same IP the older
    /// claim wins until its host is evicted.
    pub fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.entries.iter().find(|e| e.ip == ip).map(|e| e.mac)
    }

    /// Re-keys the first entry owned by `mac` to `ip`, or appends a new entry.
    /// Later entries for the same MAC are left as they are.
    pub fn upsert(&mut self, mac: MacAddr, ip: Ipv4Addr) {
        match self.entries.iter_mut().find(|e| e.mac == mac) {
            Some(entry) => entry.ip = ip,
            None => self.entries.push(ArpEntry { ip, mac }),
        }
    }

    /// Drops every entry owned by `mac`.
    pub fn evict(&mut self, mac: MacAddr) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.mac != mac);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[ArpEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
