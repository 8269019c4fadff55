use std::collections::{BinaryHeap, HashMap, HashSet};
use std::cmp::Ordering;
use serde::Serialize;
use crate::network::{DeviceId, TopologyGraph};
use crate::types::{Dpid, PortNo};

/// Distance of a device the source cannot reach.
pub const INFINITY: u32 = u32::MAX;

/// One forwarding step: leave `dpid` through `port_no`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Hop {
    pub dpid: Dpid,
    pub port_no: PortNo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub distance: u32,
    pub route: Vec<Hop>,
}

impl PathEntry {
    fn unreachable() -> Self {
        Self {
            distance: INFINITY,
            route: Vec::new(),
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.distance != INFINITY
    }
}

/// Routes from one source to every device of the graph it was computed on.
#[derive(Debug, Clone)]
pub struct ShortestPathTree {
    pub source: DeviceId,
    entries: HashMap<DeviceId, PathEntry>,
}

impl ShortestPathTree {
    pub fn distance(&self, device: DeviceId) -> u32 {
        self.entries.get(&device).map_or(INFINITY, |e| e.distance)
    }

    pub fn route(&self, device: DeviceId) -> &[Hop] {
        self.entries
            .get(&device)
            .map(|e| e.route.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_reachable(&self, device: DeviceId) -> bool {
        self.distance(device) != INFINITY
    }

    pub fn entry(&self, device: DeviceId) -> Option<&PathEntry> {
        self.entries.get(&device)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct State {
    cost: u32,
    seq: u64,
    device: DeviceId,
}

impl Ord for State {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap, earlier pushes win ties
        other
            .cost
            .cmp(&self.cost)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for State {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Frontier {
    heap: BinaryHeap<State>,
    seq: u64,
}

impl Frontier {
    fn push(&mut self, cost: u32, device: DeviceId) {
        self.heap.push(State {
            cost,
            seq: self.seq,
            device,
        });
        self.seq += 1;
    }
}

/// Single-source shortest paths with unit hop cost.
///
/// Distance counts switch egress hops, so a host's uplink into its attachment
/// switch is free and `distance == route.len()` for every reachable device.
/// Hosts other than the source are leaves. A switch-to-switch edge is only
/// followed when the neighbor also lists the reverse edge, and only through a
/// live port. Stale frontier entries are skipped on pop instead of being
/// removed eagerly.
pub fn calculate_shortest_paths(topology: &TopologyGraph, source: DeviceId) -> ShortestPathTree {
    let mut distances: HashMap<DeviceId, u32> = HashMap::new();
    let mut routes: HashMap<DeviceId, Vec<Hop>> = HashMap::new();
    let mut visited: HashSet<DeviceId> = HashSet::new();
    let mut frontier = Frontier {
        heap: BinaryHeap::new(),
        seq: 0,
    };

    // Initialize distances, every device is seeded up front
    for device in topology.devices() {
        let cost = if device.id == source { 0 } else { INFINITY };
        distances.insert(device.id, cost);
        routes.insert(device.id, Vec::new());
        frontier.push(cost, device.id);
    }

    while let Some(State { cost, device: top, .. }) = frontier.heap.pop() {
        if cost == INFINITY || visited.contains(&top) {
            continue;
        }
        // Skip if we've already found a better path
        if cost > distances.get(&top).copied().unwrap_or(INFINITY) {
            continue;
        }
        let Some(device) = topology.device(top) else {
            continue;
        };

        match top {
            DeviceId::Host(_) => {
                visited.insert(top);
                if top != source {
                    continue;
                }
                for adjacency in device.neighbors() {
                    let next = adjacency.neighbor;
                    if cost < distances.get(&next).copied().unwrap_or(INFINITY) {
                        distances.insert(next, cost);
                        routes.insert(next, Vec::new());
                        frontier.push(cost, next);
                    }
                }
            }
            DeviceId::Switch(dpid) => {
                let here = routes.get(&top).cloned().unwrap_or_default();
                for adjacency in device.neighbors() {
                    let Some(port) = adjacency.port else {
                        continue;
                    };
                    let next = adjacency.neighbor;
                    if visited.contains(&next) || !topology.is_port_live(port) {
                        continue;
                    }
                    if next.is_switch() && !topology.has_edge(next, top) {
                        continue;
                    }

                    let candidate = cost + 1;
                    if candidate >= distances.get(&next).copied().unwrap_or(INFINITY) {
                        continue;
                    }

                    let mut route = here.clone();
                    route.push(Hop {
                        dpid,
                        port_no: port.port_no,
                    });
                    distances.insert(next, candidate);
                    routes.insert(next, route);
                    frontier.push(candidate, next);
                }
                visited.insert(top);
            }
        }
    }

    let entries = distances
        .into_iter()
        .map(|(id, distance)| {
            let entry = if distance == INFINITY {
                PathEntry::unreachable()
            } else {
                PathEntry {
                    distance,
                    route: routes.remove(&id).unwrap_or_default(),
                }
            };
            (id, entry)
        })
        .collect();

    ShortestPathTree { source, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::SwitchPort;
    use crate::types::{MacAddr, PortRef};
    use std::net::Ipv4Addr;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, last)
    }

    fn switch(graph: &mut TopologyGraph, dpid: Dpid) {
        graph
            .add_switch(dpid, (1..=4).map(SwitchPort::learned).collect())
            .unwrap();
    }

    fn both_ways(graph: &mut TopologyGraph, a: PortRef, b: PortRef) {
        graph.add_link(a, b).unwrap();
        graph.add_link(b, a).unwrap();
    }

    /// S1 -- S2 -- S3 with H1 on S1/1 and H2 on S3/1.
    /// S1/2 faces S2/1, S2/2 faces S3/2.
    fn line() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for dpid in 1..=3 {
            switch(&mut graph, dpid);
        }
        both_ways(&mut graph, PortRef::new(1, 2), PortRef::new(2, 1));
        both_ways(&mut graph, PortRef::new(2, 2), PortRef::new(3, 2));
        graph
            .add_host(mac(1), vec![Ipv4Addr::new(10, 0, 0, 1)], PortRef::new(1, 1))
            .unwrap();
        graph
            .add_host(mac(2), vec![Ipv4Addr::new(10, 0, 0, 2)], PortRef::new(3, 1))
            .unwrap();
        graph
    }

    fn assert_consistent(tree: &ShortestPathTree, graph: &TopologyGraph) {
        for device in graph.devices() {
            let entry = tree.entry(device.id).unwrap();
            if entry.is_reachable() {
                assert_eq!(entry.distance as usize, entry.route.len(), "{}", device.name);
            } else {
                assert!(entry.route.is_empty(), "{}", device.name);
            }
        }
    }

    #[test]
    fn line_topology_routes_through_every_switch() {
        let graph = line();
        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));

        assert_eq!(tree.distance(DeviceId::Host(mac(1))), 0);
        assert_eq!(tree.distance(DeviceId::Switch(1)), 0);
        assert_eq!(tree.distance(DeviceId::Switch(3)), 2);
        assert_eq!(
            tree.route(DeviceId::Switch(3)),
            &[Hop { dpid: 1, port_no: 2 }, Hop { dpid: 2, port_no: 2 }]
        );

        assert_eq!(tree.distance(DeviceId::Host(mac(2))), 3);
        assert_eq!(
            tree.route(DeviceId::Host(mac(2))),
            &[
                Hop { dpid: 1, port_no: 2 },
                Hop { dpid: 2, port_no: 2 },
                Hop { dpid: 3, port_no: 1 },
            ]
        );
        assert_consistent(&tree, &graph);
    }

    #[test]
    fn dead_port_cuts_the_path() {
        let mut graph = line();
        graph.set_port_live(PortRef::new(2, 2), false).unwrap();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        assert!(!tree.is_reachable(DeviceId::Host(mac(2))));
        assert_eq!(tree.distance(DeviceId::Host(mac(2))), INFINITY);
        assert!(tree.route(DeviceId::Host(mac(2))).is_empty());
        assert!(tree.is_reachable(DeviceId::Switch(2)));
        assert_consistent(&tree, &graph);
    }

    #[test]
    fn one_directional_link_is_never_crossed() {
        let mut graph = TopologyGraph::new();
        switch(&mut graph, 1);
        switch(&mut graph, 2);
        graph.add_link(PortRef::new(1, 2), PortRef::new(2, 1)).unwrap();
        graph.add_host(mac(1), Vec::new(), PortRef::new(1, 1)).unwrap();
        graph.add_host(mac(2), Vec::new(), PortRef::new(2, 2)).unwrap();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        assert!(!tree.is_reachable(DeviceId::Switch(2)));
        assert!(!tree.is_reachable(DeviceId::Host(mac(2))));

        let reverse = calculate_shortest_paths(&graph, DeviceId::Host(mac(2)));
        assert!(!reverse.is_reachable(DeviceId::Switch(1)));
    }

    #[test]
    fn unlinked_switches_stay_apart() {
        let mut graph = TopologyGraph::new();
        switch(&mut graph, 1);
        switch(&mut graph, 2);
        graph.add_host(mac(1), Vec::new(), PortRef::new(1, 1)).unwrap();
        graph.add_host(mac(2), Vec::new(), PortRef::new(1, 2)).unwrap();
        graph.add_host(mac(3), Vec::new(), PortRef::new(2, 1)).unwrap();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        assert_eq!(tree.distance(DeviceId::Host(mac(2))), 1);
        assert_eq!(tree.route(DeviceId::Host(mac(2))), &[Hop { dpid: 1, port_no: 2 }]);
        assert!(!tree.is_reachable(DeviceId::Switch(2)));
        assert!(!tree.is_reachable(DeviceId::Host(mac(3))));
    }

    #[test]
    fn shorter_path_wins_over_longer_ring_arc() {
        // Ring of five switches, H1 on S1 and H2 on S4: the arc through S5 is shorter.
        let mut graph = TopologyGraph::new();
        for dpid in 1..=5 {
            switch(&mut graph, dpid);
        }
        for dpid in 1..=5u64 {
            let next = dpid % 5 + 1;
            both_ways(&mut graph, PortRef::new(dpid, 2), PortRef::new(next, 3));
        }
        graph.add_host(mac(1), Vec::new(), PortRef::new(1, 1)).unwrap();
        graph.add_host(mac(2), Vec::new(), PortRef::new(4, 1)).unwrap();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        assert_eq!(tree.distance(DeviceId::Host(mac(2))), 3);
        assert_eq!(
            tree.route(DeviceId::Host(mac(2))),
            &[
                Hop { dpid: 1, port_no: 3 },
                Hop { dpid: 5, port_no: 3 },
                Hop { dpid: 4, port_no: 1 },
            ]
        );
        assert_consistent(&tree, &graph);
    }

    #[test]
    fn distances_match_route_lengths_on_grids() {
        for width in 1..=4u64 {
            let mut graph = TopologyGraph::new();
            let id = |row: u64, col: u64| row * 10 + col + 1;
            for row in 0..width {
                for col in 0..width {
                    switch(&mut graph, id(row, col));
                }
            }
            for row in 0..width {
                for col in 0..width {
                    if col + 1 < width {
                        both_ways(&mut graph, PortRef::new(id(row, col), 2), PortRef::new(id(row, col + 1), 1));
                    }
                    if row + 1 < width {
                        // One-directional downward links are ignored
                        graph
                            .add_link(PortRef::new(id(row, col), 3), PortRef::new(id(row + 1, col), 4))
                            .unwrap();
                    }
                }
            }
            graph.add_host(mac(1), Vec::new(), PortRef::new(id(0, 0), 4)).unwrap();
            graph
                .add_host(mac(2), Vec::new(), PortRef::new(id(width - 1, width - 1), 3))
                .unwrap();

            let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
            assert_consistent(&tree, &graph);
            assert_eq!(tree.distance(DeviceId::Switch(id(0, width - 1))), (width - 1) as u32);
            assert_eq!(tree.is_reachable(DeviceId::Host(mac(2))), width == 1);
        }
    }

    #[test]
    fn unknown_source_reaches_nothing() {
        let graph = line();
        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(9)));
        assert_eq!(tree.len(), graph.len());
        for device in graph.devices() {
            assert!(!tree.is_reachable(device.id));
        }
    }

    #[test]
    fn graph_is_untouched_by_computation() {
        let graph = line();
        let before: Vec<_> = graph.devices().map(|d| d.neighbors().to_vec()).collect();
        let first = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        let second = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        let after: Vec<_> = graph.devices().map(|d| d.neighbors().to_vec()).collect();
        assert_eq!(before, after);
        assert_eq!(first.route(DeviceId::Host(mac(2))), second.route(DeviceId::Host(mac(2))));
    }
}
