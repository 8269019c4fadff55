use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::Ipv4Addr;
use crate::algorithms::dijkstra::ShortestPathTree;
use crate::network::{DeviceId, TopologyGraph};
use crate::protocol::arp_cache::{ArpCache, ArpEntry};
use crate::protocol::flow_sync::FlowSynchronizer;
use crate::types::{Dpid, PortNo};

#[derive(Debug, Clone, Serialize)]
pub struct HostView {
    pub name: String,
    pub ips: Vec<Ipv4Addr>,
    pub attached_to: Option<String>,
    pub port: PortNo,
}

#[derive(Debug, Clone, Serialize)]
pub struct PortView {
    pub port_no: PortNo,
    pub live: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborView {
    pub name: String,
    pub port: Option<PortNo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SwitchView {
    pub name: String,
    pub ports: Vec<PortView>,
    pub neighbors: Vec<NeighborView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathView {
    pub destination: String,
    /// `None` when unreachable.
    pub distance: Option<u32>,
    pub path: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathTable {
    pub source: String,
    pub paths: Vec<PathView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RuleView {
    pub switch: Dpid,
    pub dl_dst: String,
    pub port: PortNo,
}

/// Human-oriented dump of the controller state. Not a stable format.
#[derive(Debug, Clone, Serialize)]
pub struct TopologySnapshot {
    pub generated_at: DateTime<Utc>,
    pub hosts: Vec<HostView>,
    pub switches: Vec<SwitchView>,
    pub paths: Vec<PathTable>,
    pub rules: Vec<RuleView>,
    pub arp: Vec<ArpEntry>,
    pub dangling_edges: Vec<(String, String)>,
    pub disconnected_hosts: Vec<String>,
}

impl TopologySnapshot {
    pub fn capture(
        topology: &TopologyGraph,
        trees: &[ShortestPathTree],
        synchronizer: &FlowSynchronizer,
        arp: &ArpCache,
    ) -> Self {
        let mut hosts = Vec::new();
        let mut switches = Vec::new();

        for device in topology.devices() {
            if let Some(host) = device.as_host() {
                hosts.push(HostView {
                    name: device.name.clone(),
                    ips: host.ip_addresses.clone(),
                    attached_to: device.neighbors().first().map(|adj| adj.neighbor.to_string()),
                    port: host.attachment.port_no,
                });
            } else if let Some(switch) = device.as_switch() {
                switches.push(SwitchView {
                    name: device.name.clone(),
                    ports: switch
                        .ports
                        .values()
                        .map(|p| PortView {
                            port_no: p.port_no,
                            live: p.live,
                        })
                        .collect(),
                    neighbors: device
                        .neighbors()
                        .iter()
                        .map(|adj| NeighborView {
                            name: adj.neighbor.to_string(),
                            port: adj.port.map(|p| p.port_no),
                        })
                        .collect(),
                });
            }
        }

        let paths = trees
            .iter()
            .map(|tree| PathTable {
                source: tree.source.to_string(),
                paths: topology
                    .host_ids()
                    .into_iter()
                    .map(|host| PathView {
                        destination: host.to_string(),
                        distance: tree.is_reachable(host).then(|| tree.distance(host)),
                        path: tree
                            .route(host)
                            .iter()
                            .map(|hop| DeviceId::Switch(hop.dpid).to_string())
                            .collect(),
                    })
                    .collect(),
            })
            .collect();

        let rules = synchronizer
            .installed_rules()
            .into_iter()
            .map(|(switch, mac, port)| RuleView {
                switch,
                dl_dst: mac.to_string(),
                port,
            })
            .collect();

        Self {
            generated_at: Utc::now(),
            hosts,
            switches,
            paths,
            rules,
            arp: arp.entries().to_vec(),
            dangling_edges: topology
                .dangling_edges()
                .into_iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
            disconnected_hosts: topology
                .disconnected_hosts()
                .into_iter()
                .map(|id| id.to_string())
                .collect(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for TopologySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "------------Topology Table------------")?;
        writeln!(f, "(generated {})", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "Topology of Hosts:")?;
        for host in &self.hosts {
            match &host.attached_to {
                Some(switch) => writeln!(f, "    {} {:?} is connected to {} by Port_{}", host.name, host.ips, switch, host.port)?,
                None => writeln!(f, "    {} {:?} is disconnected", host.name, host.ips)?,
            }
        }
        writeln!(f, "Topology of Switch:")?;
        for switch in &self.switches {
            let down: Vec<PortNo> = switch.ports.iter().filter(|p| !p.live).map(|p| p.port_no).collect();
            if down.is_empty() {
                writeln!(f, "    {}", switch.name)?;
            } else {
                writeln!(f, "    {} (ports down: {:?})", switch.name, down)?;
            }
            for neighbor in &switch.neighbors {
                match neighbor.port {
                    Some(port) => writeln!(f, "        Connected to {} by Port_{}", neighbor.name, port)?,
                    None => writeln!(f, "        Connected to {}", neighbor.name)?,
                }
            }
        }
        writeln!(f, "--------------------------------------")?;

        writeln!(f, "------------Shortest Path Table------------")?;
        for table in &self.paths {
            writeln!(f, "From {}", table.source)?;
            for path in &table.paths {
                match path.distance {
                    Some(distance) => writeln!(
                        f,
                        "    To {}: shortest distance is {}, path is: {:?}",
                        path.destination, distance, path.path
                    )?,
                    None => writeln!(f, "    To {}: unreachable", path.destination)?,
                }
            }
        }
        writeln!(f, "-------------------------------------------")?;

        writeln!(f, "Forwarding rules: {}", self.rules.len())?;
        for rule in &self.rules {
            writeln!(f, "    switch_{} dl_dst={} -> port {}", rule.switch, rule.dl_dst, rule.port)?;
        }
        writeln!(f, "ARP cache: {}", self.arp.len())?;
        for entry in &self.arp {
            writeln!(f, "    {} is at {}", entry.ip, entry.mac)?;
        }

        if !self.dangling_edges.is_empty() {
            writeln!(f, "Inconsistent adjacency:")?;
            for (from, to) in &self.dangling_edges {
                writeln!(f, "    {} -> {} (missing)", from, to)?;
            }
        }
        if !self.disconnected_hosts.is_empty() {
            writeln!(f, "Disconnected hosts: {:?}", self.disconnected_hosts)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::dijkstra::calculate_shortest_paths;
    use crate::network::SwitchPort;
    use crate::protocol::flow_table::ETH_TYPE_IPV4;
    use crate::types::{MacAddr, PortRef};

    #[test]
    fn renders_topology_and_paths() {
        let mut graph = TopologyGraph::new();
        graph.add_switch(1, vec![SwitchPort::learned(1), SwitchPort::learned(2)]).unwrap();
        graph.add_switch(2, vec![SwitchPort::learned(1)]).unwrap();
        let h1 = MacAddr::new(0, 0, 0, 0, 0, 1);
        let h2 = MacAddr::new(0, 0, 0, 0, 0, 2);
        graph.add_host(h1, vec![Ipv4Addr::new(10, 0, 0, 1)], PortRef::new(1, 1)).unwrap();
        graph.add_host(h2, Vec::new(), PortRef::new(9, 1)).unwrap();
        graph.set_port_live(PortRef::new(1, 2), false).unwrap();

        let trees = vec![calculate_shortest_paths(&graph, DeviceId::Host(h1))];
        let sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut arp = ArpCache::new();
        arp.upsert(h1, Ipv4Addr::new(10, 0, 0, 1));

        let snapshot = TopologySnapshot::capture(&graph, &trees, &sync, &arp);
        let text = snapshot.to_string();

        assert!(text.contains("host_00:00:00:00:00:01 [10.0.0.1] is connected to switch_1 by Port_1"));
        assert!(text.contains("switch_1 (ports down: [2])"));
        assert!(text.contains("Connected to host_00:00:00:00:00:01 by Port_1"));
        assert!(text.contains("To host_00:00:00:00:00:01: shortest distance is 0"));
        assert!(text.contains("To host_00:00:00:00:00:02: unreachable"));
        assert!(text.contains("10.0.0.1 is at 00:00:00:00:00:01"));
        assert!(text.contains("Disconnected hosts: [\"host_00:00:00:00:00:02\"]"));

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"switch_2\""));
    }
}
