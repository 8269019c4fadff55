pub mod arp;
pub mod arp_cache;
pub mod events;
pub mod flow_sync;
pub mod flow_table;

pub use arp_cache::{ArpCache, ArpEntry};
pub use events::TopologyEvent;
pub use flow_sync::{FlowSynchronizer, SyncReport};
pub use flow_table::{FlowAction, FlowMatch, FlowTable};

use log::{debug, info, warn};
use std::net::Ipv4Addr;
use crate::algorithms::dijkstra::{ShortestPathTree, calculate_shortest_paths};
use crate::config::ControllerConfig;
use crate::network::{SwitchPort, TopologyGraph};
use crate::snapshot::TopologySnapshot;
use crate::switch_control::SwitchControl;
use crate::types::{Dpid, MacAddr, PortNo, PortRef};
use crate::{ControllerError, ControllerResult};

/// What handling one event produced.
#[derive(Debug, Default)]
pub struct EventOutcome {
    /// Paths were recomputed and pushed to the switches.
    pub refreshed: bool,
    pub sync: SyncReport,
    /// Number of ARP replies sent.
    pub replies: usize,
    /// Conditions surfaced to the caller. The controller keeps running.
    pub issues: Vec<ControllerError>,
}

/// Owns the topology and drives path computation and rule installation in
/// response to topology events, one event at a time.
pub struct TopologyController<S: SwitchControl> {
    config: ControllerConfig,
    topology: TopologyGraph,
    synchronizer: FlowSynchronizer,
    arp_cache: ArpCache,
    trees: Vec<ShortestPathTree>,
    switch: S,
}

impl<S: SwitchControl> TopologyController<S> {
    pub fn new(config: ControllerConfig, switch: S) -> Self {
        let synchronizer = FlowSynchronizer::new(config.rule_priority, config.eth_type);
        Self {
            config,
            topology: TopologyGraph::new(),
            synchronizer,
            arp_cache: ArpCache::new(),
            trees: Vec::new(),
            switch,
        }
    }

    pub fn topology(&self) -> &TopologyGraph {
        &self.topology
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn synchronizer(&self) -> &FlowSynchronizer {
        &self.synchronizer
    }

    pub fn switch(&self) -> &S {
        &self.switch
    }

    pub fn switch_mut(&mut self) -> &mut S {
        &mut self.switch
    }

    /// Shortest-path trees from the last refresh, one per host.
    pub fn trees(&self) -> &[ShortestPathTree] {
        &self.trees
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot::capture(&self.topology, &self.trees, &self.synchronizer, &self.arp_cache)
    }

    pub fn resolve(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.arp_cache.resolve(ip)
    }

    pub fn handle_event(&mut self, event: TopologyEvent) -> EventOutcome {
        let mut outcome = EventOutcome::default();
        let refresh = event.changes_topology();

        let result = match event {
            TopologyEvent::SwitchAdded { id, ports } => self.switch_added(id, ports),
            TopologyEvent::SwitchRemoved { id } => self.switch_removed(id),
            TopologyEvent::HostAdded {
                mac,
                ips,
                attach_switch,
                attach_port,
            } => self.host_added(mac, ips, PortRef::new(attach_switch, attach_port)),
            TopologyEvent::HostRemoved { mac } => self.host_removed(mac),
            TopologyEvent::LinkAdded {
                src_switch,
                src_port,
                dst_switch,
                dst_port,
            } => self.link_added(PortRef::new(src_switch, src_port), PortRef::new(dst_switch, dst_port)),
            TopologyEvent::LinkRemoved {
                src_switch,
                src_port,
                dst_switch,
                dst_port,
            } => self.link_removed(PortRef::new(src_switch, src_port), PortRef::new(dst_switch, dst_port)),
            TopologyEvent::PortChanged { switch, port, live } => self.port_changed(PortRef::new(switch, port), live),
            TopologyEvent::PacketIn { switch, in_port, data } => self.packet_in(switch, in_port, &data).map(|sent| {
                outcome.replies += usize::from(sent);
            }),
        };

        if let Err(e) = result {
            if e.is_benign() {
                debug!("Ignoring event: {}", e);
            } else {
                warn!("{}", e);
                outcome.issues.push(e);
            }
        }

        if refresh {
            let sync = self.refresh();
            outcome.issues.extend(sync.failures.iter().cloned());
            outcome.sync = sync;
            outcome.refreshed = true;
        }
        outcome
    }

    /// Recomputes a shortest-path tree from every known host and pushes each
    /// one to the switches, in discovery order. Later trees overwrite rules
    /// for the same destination installed by earlier ones.
    pub fn refresh(&mut self) -> SyncReport {
        let mut report = SyncReport::default();
        self.synchronizer.begin_cycle();
        self.trees.clear();

        for host in self.topology.host_ids() {
            let tree = calculate_shortest_paths(&self.topology, host);
            report.merge(self.synchronizer.synchronize(&self.topology, &tree, &mut self.switch));
            self.trees.push(tree);
        }
        report.merge(self.synchronizer.finish_cycle(&mut self.switch));

        debug!(
            "Refresh complete: {} trees, {} installs, {} withdrawals, {} failures",
            self.trees.len(),
            report.installs,
            report.withdrawals,
            report.failures.len()
        );
        if self.config.log_snapshots {
            info!("\n{}", self.snapshot());
        }
        report
    }

    fn switch_added(&mut self, dpid: Dpid, ports: Vec<SwitchPort>) -> ControllerResult<()> {
        info!("Added Switch switch{} with ports:", dpid);
        for port in &ports {
            info!("\t{}:  {}", port.port_no, port.hw_addr);
        }
        if let Err(e) = self.topology.add_switch(dpid, ports) {
            warn!("{}", e);
            return Err(e);
        }
        Ok(())
    }

    fn switch_removed(&mut self, dpid: Dpid) -> ControllerResult<()> {
        info!("Removed Switch switch{}", dpid);
        self.topology.remove_switch(dpid)?;
        self.synchronizer.forget_switch(dpid);
        self.switch.switch_departed(dpid);
        Ok(())
    }

    fn host_added(&mut self, mac: MacAddr, ips: Vec<Ipv4Addr>, attachment: PortRef) -> ControllerResult<()> {
        info!("Host Added:  {} (IPs:  {:?}) on {}", mac, ips, attachment);
        if let Some(ip) = ips.first() {
            self.arp_cache.upsert(mac, *ip);
        }
        match self.topology.add_host(mac, ips, attachment) {
            Ok(_) => Ok(()),
            Err(e) => {
                warn!("{}", e);
                Err(e)
            }
        }
    }

    fn host_removed(&mut self, mac: MacAddr) -> ControllerResult<()> {
        info!("Host Deleted:  {}", mac);
        self.topology.remove_host(mac)?;
        self.arp_cache.evict(mac);
        Ok(())
    }

    fn link_added(&mut self, src: PortRef, dst: PortRef) -> ControllerResult<()> {
        info!("Added Link:  {} -> {}", src, dst);
        self.topology.add_link(src, dst)?;
        Ok(())
    }

    fn link_removed(&mut self, src: PortRef, dst: PortRef) -> ControllerResult<()> {
        info!("Deleted Link:  {} -> {}", src, dst);
        let removed = self.topology.remove_link(src.dpid, dst.dpid)?;
        if removed == 0 {
            debug!("No adjacency recorded between switch{} and switch{}", src.dpid, dst.dpid);
        }
        Ok(())
    }

    fn port_changed(&mut self, port: PortRef, live: bool) -> ControllerResult<()> {
        info!("Port Changed:  {}:  {}", port, if live { "UP" } else { "DOWN" });
        self.topology.set_port_live(port, live)
    }

    /// Answers ARP requests from the cache. Returns whether a reply was sent.
    fn packet_in(&mut self, dpid: Dpid, in_port: PortNo, data: &[u8]) -> ControllerResult<bool> {
        let request = match arp::parse_arp_request(data) {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!("Ignoring non-ARP-request frame on switch{}/{}", dpid, in_port);
                return Ok(false);
            }
            Err(reason) => return Err(ControllerError::MalformedFrame { dpid, reason }),
        };

        info!(
            "Received ARP REQUEST on switch{}/{}:  Who has {}?  Tell {}",
            dpid, in_port, request.target_ip, request.sender_mac
        );
        let resolved = self
            .arp_cache
            .resolve(request.target_ip)
            .ok_or(ControllerError::UnresolvedAddress(request.target_ip))?;
        let reply = arp::build_arp_reply(&request, resolved).ok_or_else(|| ControllerError::MalformedFrame {
            dpid,
            reason: "could not build ARP reply".to_string(),
        })?;

        self.switch
            .send_frame(dpid, &reply, in_port)
            .map_err(|source| ControllerError::FrameSendFailure {
                dpid,
                port: in_port,
                source,
            })?;
        Ok(true)
    }
}
