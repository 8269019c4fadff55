use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use log::{debug, info};
use crate::network::SwitchPort;
use crate::types::{Dpid, MacAddr, PortNo, PortRef};
use crate::{ControllerError, ControllerResult};

/// Stable key of a device in the graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceId {
    Switch(Dpid),
    Host(MacAddr),
}

impl DeviceId {
    pub fn is_switch(&self) -> bool {
        matches!(self, DeviceId::Switch(_))
    }

    pub fn is_host(&self) -> bool {
        matches!(self, DeviceId::Host(_))
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceId::Switch(dpid) => write!(f, "switch_{}", dpid),
            DeviceId::Host(mac) => write!(f, "host_{}", mac),
        }
    }
}

/// One directed adjacency entry. `port` is the local egress port on a switch,
/// `None` on a host's uplink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Adjacency {
    pub neighbor: DeviceId,
    pub port: Option<PortRef>,
}

#[derive(Debug, Clone)]
pub struct SwitchInfo {
    pub dpid: Dpid,
    pub ports: BTreeMap<PortNo, SwitchPort>,
}

#[derive(Debug, Clone)]
pub struct HostInfo {
    pub mac: MacAddr,
    pub ip_addresses: Vec<Ipv4Addr>,
    pub attachment: PortRef,
}

#[derive(Debug, Clone)]
pub enum DeviceKind {
    Switch(SwitchInfo),
    Host(HostInfo),
}

#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub name: String,
    pub kind: DeviceKind,
    neighbors: Vec<Adjacency>,
}

impl Device {
    fn new(id: DeviceId, kind: DeviceKind) -> Self {
        Self {
            id,
            name: id.to_string(),
            kind,
            neighbors: Vec::new(),
        }
    }

    pub fn neighbors(&self) -> &[Adjacency] {
        &self.neighbors
    }

    pub fn is_switch(&self) -> bool {
        self.id.is_switch()
    }

    pub fn is_host(&self) -> bool {
        self.id.is_host()
    }

    pub fn as_host(&self) -> Option<&HostInfo> {
        match &self.kind {
            DeviceKind::Host(host) => Some(host),
            DeviceKind::Switch(_) => None,
        }
    }

    pub fn as_switch(&self) -> Option<&SwitchInfo> {
        match &self.kind {
            DeviceKind::Switch(switch) => Some(switch),
            DeviceKind::Host(_) => None,
        }
    }

    fn has_neighbor(&self, id: DeviceId) -> bool {
        self.neighbors.iter().any(|adj| adj.neighbor == id)
    }
}

/// Arena of switches and hosts with directed, port-annotated adjacency.
///
/// Devices are keyed by datapath id or MAC. Insertion order is kept so that
/// iteration (and therefore tie-breaking in path computation) follows the
/// order in which devices were discovered.
#[derive(Debug, Clone, Default)]
pub struct TopologyGraph {
    devices: HashMap<DeviceId, Device>,
    order: Vec<DeviceId>,
}

impl TopologyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: DeviceId) -> bool {
        self.devices.contains_key(&id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&Device> {
        self.devices.get(&id)
    }

    /// Devices in discovery order.
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.order.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn host_ids(&self) -> Vec<DeviceId> {
        self.order.iter().copied().filter(DeviceId::is_host).collect()
    }

    pub fn switch_ids(&self) -> Vec<DeviceId> {
        self.order.iter().copied().filter(DeviceId::is_switch).collect()
    }

    pub fn add_switch(&mut self, dpid: Dpid, ports: Vec<SwitchPort>) -> ControllerResult<()> {
        let id = DeviceId::Switch(dpid);
        if self.devices.contains_key(&id) {
            return Err(ControllerError::DuplicateDeviceRegistration(id.to_string()));
        }

        let ports = ports.into_iter().map(|p| (p.port_no, p)).collect();
        let device = Device::new(id, DeviceKind::Switch(SwitchInfo { dpid, ports }));
        self.devices.insert(id, device);
        self.order.push(id);

        // Hosts reported before their switch are linked now.
        let waiting: Vec<MacAddr> = self
            .devices()
            .filter_map(Device::as_host)
            .filter(|host| host.attachment.dpid == dpid)
            .map(|host| host.mac)
            .collect();
        for mac in waiting {
            if self.attach_host(mac) {
                info!("Reattached host_{} to {}", mac, id);
            }
        }

        Ok(())
    }

    /// Removes a switch and every adjacency entry that points at it. Hosts
    /// attached to it become disconnected.
    pub fn remove_switch(&mut self, dpid: Dpid) -> ControllerResult<Device> {
        self.remove_device(DeviceId::Switch(dpid))
    }

    /// Adds a host and links it to its attachment switch when that switch is known.
    /// Returns whether the host ended up connected.
    pub fn add_host(&mut self, mac: MacAddr, ips: Vec<Ipv4Addr>, attachment: PortRef) -> ControllerResult<bool> {
        let id = DeviceId::Host(mac);
        if self.devices.contains_key(&id) {
            return Err(ControllerError::DuplicateDeviceRegistration(id.to_string()));
        }

        let host = HostInfo {
            mac,
            ip_addresses: ips,
            attachment,
        };
        self.devices.insert(id, Device::new(id, DeviceKind::Host(host)));
        self.order.push(id);

        let connected = self.attach_host(mac);
        if !connected {
            debug!("{} attached to unknown {}, kept disconnected", id, attachment);
        }
        Ok(connected)
    }

    pub fn remove_host(&mut self, mac: MacAddr) -> ControllerResult<Device> {
        self.remove_device(DeviceId::Host(mac))
    }

    /// Records the single directed edge `src.dpid -> dst.dpid` through `src.port_no`.
    /// Returns false when the same edge was already recorded.
    pub fn add_link(&mut self, src: PortRef, dst: PortRef) -> ControllerResult<bool> {
        let src_id = DeviceId::Switch(src.dpid);
        let dst_id = DeviceId::Switch(dst.dpid);
        self.require(src_id)?;
        self.require(dst_id)?;

        self.learn_port(src);
        self.learn_port(dst);

        let edge = Adjacency {
            neighbor: dst_id,
            port: Some(src),
        };
        let device = self.device_mut(src_id)?;
        if device.neighbors.contains(&edge) {
            return Ok(false);
        }
        device.neighbors.push(edge);
        Ok(true)
    }

    /// Strips adjacency between two switches in both directions. Returns the
    /// number of entries removed; zero for a link that was never recorded.
    pub fn remove_link(&mut self, src: Dpid, dst: Dpid) -> ControllerResult<usize> {
        let src_id = DeviceId::Switch(src);
        let dst_id = DeviceId::Switch(dst);
        self.require(src_id)?;
        self.require(dst_id)?;

        let mut removed = 0;
        for (from, to) in [(src_id, dst_id), (dst_id, src_id)] {
            let device = self.device_mut(from)?;
            let before = device.neighbors.len();
            device.neighbors.retain(|adj| adj.neighbor != to);
            removed += before - device.neighbors.len();
        }
        Ok(removed)
    }

    pub fn set_port_live(&mut self, port: PortRef, live: bool) -> ControllerResult<()> {
        let switch = self.switch_mut(port.dpid)?;
        switch
            .ports
            .entry(port.port_no)
            .or_insert_with(|| SwitchPort::learned(port.port_no))
            .set_live(live);
        Ok(())
    }

    pub fn is_port_live(&self, port: PortRef) -> bool {
        self.devices
            .get(&DeviceId::Switch(port.dpid))
            .and_then(Device::as_switch)
            .and_then(|switch| switch.ports.get(&port.port_no))
            .is_some_and(|p| p.live)
    }

    /// Whether `from` holds an adjacency entry pointing at `to`.
    pub fn has_edge(&self, from: DeviceId, to: DeviceId) -> bool {
        self.devices.get(&from).is_some_and(|d| d.has_neighbor(to))
    }

    /// Adjacency entries pointing at devices no longer in the arena.
    pub fn dangling_edges(&self) -> Vec<(DeviceId, DeviceId)> {
        self.devices()
            .flat_map(|d| {
                d.neighbors
                    .iter()
                    .filter(|adj| !self.devices.contains_key(&adj.neighbor))
                    .map(move |adj| (d.id, adj.neighbor))
            })
            .collect()
    }

    /// Hosts without an uplink.
    pub fn disconnected_hosts(&self) -> Vec<DeviceId> {
        self.devices()
            .filter(|d| d.is_host() && d.neighbors.is_empty())
            .map(|d| d.id)
            .collect()
    }

    fn remove_device(&mut self, id: DeviceId) -> ControllerResult<Device> {
        let device = self
            .devices
            .remove(&id)
            .ok_or_else(|| ControllerError::UnknownDeviceReference(id.to_string()))?;
        self.order.retain(|other| *other != id);

        for other in self.devices.values_mut() {
            other.neighbors.retain(|adj| adj.neighbor != id);
        }
        Ok(device)
    }

    /// Links a host to its attachment switch in both directions. A host keeps at
    /// most one uplink, so this is a no-op for an already connected host.
    fn attach_host(&mut self, mac: MacAddr) -> bool {
        let host_id = DeviceId::Host(mac);
        let attachment = match self.devices.get(&host_id) {
            Some(device) if device.neighbors.is_empty() => match device.as_host() {
                Some(host) => host.attachment,
                None => return false,
            },
            _ => return false,
        };

        let switch_id = DeviceId::Switch(attachment.dpid);
        if !self.devices.contains_key(&switch_id) {
            return false;
        }
        self.learn_port(attachment);

        if let Some(switch) = self.devices.get_mut(&switch_id) {
            switch.neighbors.retain(|adj| adj.neighbor != host_id);
            switch.neighbors.push(Adjacency {
                neighbor: host_id,
                port: Some(attachment),
            });
        }
        if let Some(host) = self.devices.get_mut(&host_id) {
            host.neighbors.push(Adjacency {
                neighbor: switch_id,
                port: None,
            });
        }
        true
    }

    fn learn_port(&mut self, port: PortRef) {
        if let Ok(switch) = self.switch_mut(port.dpid) {
            switch
                .ports
                .entry(port.port_no)
                .or_insert_with(|| SwitchPort::learned(port.port_no));
        }
    }

    fn require(&self, id: DeviceId) -> ControllerResult<()> {
        if self.devices.contains_key(&id) {
            Ok(())
        } else {
            Err(ControllerError::UnknownDeviceReference(id.to_string()))
        }
    }

    fn device_mut(&mut self, id: DeviceId) -> ControllerResult<&mut Device> {
        self.devices
            .get_mut(&id)
            .ok_or_else(|| ControllerError::UnknownDeviceReference(id.to_string()))
    }

    fn switch_mut(&mut self, dpid: Dpid) -> ControllerResult<&mut SwitchInfo> {
        let id = DeviceId::Switch(dpid);
        match self.devices.get_mut(&id).map(|d| &mut d.kind) {
            Some(DeviceKind::Switch(switch)) => Ok(switch),
            _ => Err(ControllerError::UnknownDeviceReference(id.to_string())),
        }
    }
}
