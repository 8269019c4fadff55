use std::collections::{HashMap, HashSet};
use log::{debug, info, warn};
use crate::algorithms::dijkstra::{Hop, ShortestPathTree};
use crate::network::{DeviceId, TopologyGraph};
use crate::protocol::flow_table::{FlowAction, FlowMatch};
use crate::switch_control::SwitchControl;
use crate::types::{Dpid, MacAddr, PortNo};
use crate::{ControllerError, SwitchError};

#[derive(Debug, Default)]
pub struct SyncReport {
    pub installs: usize,
    pub withdrawals: usize,
    pub failures: Vec<ControllerError>,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.installs += other.installs;
        self.withdrawals += other.withdrawals;
        self.failures.extend(other.failures);
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Pushes computed routes to the switches as destination-MAC rules.
///
/// A refresh cycle is `begin_cycle`, one `synchronize` per source tree, then
/// `finish_cycle`. Rules installed during an earlier cycle and not installed
/// again during the current one are withdrawn when the cycle finishes.
#[derive(Debug)]
pub struct FlowSynchronizer {
    priority: u16,
    eth_type: u16,
    installed: HashMap<(Dpid, MacAddr), PortNo>,
    staged: HashSet<Dpid>,
    touched_rules: HashSet<(Dpid, MacAddr)>,
    touched_staging: HashSet<Dpid>,
}

/// Per-call bookkeeping for a single `synchronize`.
struct Round<'a, S: SwitchControl> {
    switch: &'a mut S,
    failed: HashSet<Dpid>,
    report: SyncReport,
}

impl<S: SwitchControl> Round<'_, S> {
    fn withdraw(&mut self, dpid: Dpid, flow: &FlowMatch, priority: u16) -> bool {
        if self.failed.contains(&dpid) {
            return false;
        }
        match self.switch.remove_rule(dpid, flow, priority) {
            Ok(()) => {
                self.report.withdrawals += 1;
                true
            }
            Err(e) => {
                self.fail(dpid, flow.dl_dst, e);
                false
            }
        }
    }

    fn install(&mut self, dpid: Dpid, flow: &FlowMatch, priority: u16, actions: &[FlowAction]) -> bool {
        if self.failed.contains(&dpid) {
            return false;
        }
        match self.switch.install_rule(dpid, flow, priority, actions) {
            Ok(()) => {
                self.report.installs += 1;
                true
            }
            Err(e) => {
                self.fail(dpid, flow.dl_dst, e);
                false
            }
        }
    }

    /// The rest of this round skips the switch; the next event retries it.
    fn fail(&mut self, dpid: Dpid, mac: MacAddr, source: SwitchError) {
        warn!("Rule operation for {} on switch{} failed: {}", mac, dpid, source);
        self.failed.insert(dpid);
        self.report
            .failures
            .push(ControllerError::RuleInstallFailure { dpid, mac, source });
    }
}

impl FlowSynchronizer {
    pub fn new(priority: u16, eth_type: u16) -> Self {
        Self {
            priority,
            eth_type,
            installed: HashMap::new(),
            staged: HashSet::new(),
            touched_rules: HashSet::new(),
            touched_staging: HashSet::new(),
        }
    }

    /// Match used for the per-switch staging rule that carries the accumulated actions.
    pub fn staging_match(&self) -> FlowMatch {
        FlowMatch::new(MacAddr::zero(), self.eth_type)
    }

    pub fn host_match(&self, mac: MacAddr) -> FlowMatch {
        FlowMatch::new(mac, self.eth_type)
    }

    pub fn begin_cycle(&mut self) {
        self.touched_rules.clear();
        self.touched_staging.clear();
    }

    /// Installs, for every host with a route in `tree`, a rule matching the
    /// host's MAC on each switch of that route.
    pub fn synchronize<S: SwitchControl>(
        &mut self,
        topology: &TopologyGraph,
        tree: &ShortestPathTree,
        switch: &mut S,
    ) -> SyncReport {
        let routes: Vec<(MacAddr, &[Hop])> = topology
            .host_ids()
            .into_iter()
            .filter_map(|id| match id {
                DeviceId::Host(mac) => Some((mac, tree.route(id))),
                DeviceId::Switch(_) => None,
            })
            .collect();

        let mut round = Round {
            switch,
            failed: HashSet::new(),
            report: SyncReport::default(),
        };
        let staging = self.staging_match();

        // Withdraw pass: clear the staging rule on every switch carrying a route
        let mut switch_order: Vec<Dpid> = Vec::new();
        let mut pending: HashMap<Dpid, Vec<FlowAction>> = HashMap::new();
        for hop in routes.iter().flat_map(|(_, route)| route.iter()) {
            if pending.contains_key(&hop.dpid) {
                continue;
            }
            pending.insert(hop.dpid, Vec::new());
            switch_order.push(hop.dpid);
            if round.withdraw(hop.dpid, &staging, self.priority) {
                self.staged.remove(&hop.dpid);
            }
        }

        // Install pass: replace each host rule along its route
        for (mac, route) in &routes {
            let flow = self.host_match(*mac);
            for hop in route.iter() {
                if round.withdraw(hop.dpid, &flow, self.priority) {
                    self.installed.remove(&(hop.dpid, *mac));
                }
                let action = FlowAction::Output(hop.port_no);
                if round.install(hop.dpid, &flow, self.priority, &[action]) {
                    debug!("forwarding rule: switch{} dl_dst {} port {}", hop.dpid, mac, hop.port_no);
                    self.installed.insert((hop.dpid, *mac), hop.port_no);
                    self.touched_rules.insert((hop.dpid, *mac));
                    if let Some(actions) = pending.get_mut(&hop.dpid) {
                        actions.push(action);
                    }
                }
            }
        }

        // Commit pass: one staging rule per switch with the accumulated actions
        let mut committed: HashSet<Dpid> = HashSet::new();
        for dpid in switch_order {
            if !committed.insert(dpid) {
                continue;
            }
            let actions = pending.remove(&dpid).unwrap_or_default();
            if round.install(dpid, &staging, self.priority, &actions) {
                self.staged.insert(dpid);
                self.touched_staging.insert(dpid);
            }
        }

        round.report
    }

    /// Withdraws every rule the current cycle did not install again.
    pub fn finish_cycle<S: SwitchControl>(&mut self, switch: &mut S) -> SyncReport {
        let mut stale: Vec<(Dpid, MacAddr)> = self
            .installed
            .keys()
            .filter(|key| !self.touched_rules.contains(*key))
            .copied()
            .collect();
        stale.sort();
        let mut stale_staging: Vec<Dpid> = self.staged.difference(&self.touched_staging).copied().collect();
        stale_staging.sort();

        let mut round = Round {
            switch,
            failed: HashSet::new(),
            report: SyncReport::default(),
        };

        for (dpid, mac) in stale {
            let flow = self.host_match(mac);
            if round.withdraw(dpid, &flow, self.priority) {
                info!("Removed stale rule for {} on switch{}", mac, dpid);
                self.installed.remove(&(dpid, mac));
            }
        }
        let staging = self.staging_match();
        for dpid in stale_staging {
            if round.withdraw(dpid, &staging, self.priority) {
                self.staged.remove(&dpid);
            }
        }

        round.report
    }

    /// Drops bookkeeping for a switch that left the topology.
    pub fn forget_switch(&mut self, dpid: Dpid) {
        self.installed.retain(|(owner, _), _| *owner != dpid);
        self.staged.remove(&dpid);
    }

    /// Host rules believed to be on the switches, sorted by switch then MAC.
    pub fn installed_rules(&self) -> Vec<(Dpid, MacAddr, PortNo)> {
        let mut rules: Vec<_> = self
            .installed
            .iter()
            .map(|((dpid, mac), port)| (*dpid, *mac, *port))
            .collect();
        rules.sort();
        rules
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::dijkstra::calculate_shortest_paths;
    use crate::network::SwitchPort;
    use crate::protocol::flow_table::ETH_TYPE_IPV4;
    use crate::switch_control::RecordingSwitch;
    use crate::types::PortRef;

    fn mac(last: u8) -> MacAddr {
        MacAddr::new(0, 0, 0, 0, 0, last)
    }

    /// S1 -- S2 -- S3, H1 on S1/1, H2 on S3/1; S1/2-S2/1 and S2/2-S3/2.
    fn line() -> TopologyGraph {
        let mut graph = TopologyGraph::new();
        for dpid in 1..=3 {
            graph
                .add_switch(dpid, (1..=3).map(SwitchPort::learned).collect())
                .unwrap();
        }
        for (a, b) in [
            (PortRef::new(1, 2), PortRef::new(2, 1)),
            (PortRef::new(2, 2), PortRef::new(3, 2)),
        ] {
            graph.add_link(a, b).unwrap();
            graph.add_link(b, a).unwrap();
        }
        graph.add_host(mac(1), Vec::new(), PortRef::new(1, 1)).unwrap();
        graph.add_host(mac(2), Vec::new(), PortRef::new(3, 1)).unwrap();
        graph
    }

    fn full_cycle(sync: &mut FlowSynchronizer, graph: &TopologyGraph, switch: &mut RecordingSwitch) -> SyncReport {
        sync.begin_cycle();
        let mut report = SyncReport::default();
        for host in graph.host_ids() {
            let tree = calculate_shortest_paths(graph, host);
            report.merge(sync.synchronize(graph, &tree, switch));
        }
        report.merge(sync.finish_cycle(switch));
        report
    }

    fn output_for(switch: &RecordingSwitch, dpid: Dpid, dst: MacAddr) -> Option<Vec<FlowAction>> {
        let flow = FlowMatch::new(dst, ETH_TYPE_IPV4);
        switch
            .table(dpid)
            .and_then(|t| t.get_flow(&flow, 0))
            .map(<[FlowAction]>::to_vec)
    }

    #[test]
    fn installs_destination_rules_along_route() {
        let graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        sync.begin_cycle();
        let report = sync.synchronize(&graph, &tree, &mut switch);
        assert!(report.is_clean());

        assert_eq!(output_for(&switch, 1, mac(2)), Some(vec![FlowAction::Output(2)]));
        assert_eq!(output_for(&switch, 2, mac(2)), Some(vec![FlowAction::Output(2)]));
        assert_eq!(output_for(&switch, 3, mac(2)), Some(vec![FlowAction::Output(1)]));
        // The source host has an empty route, so nothing points at it yet
        assert_eq!(output_for(&switch, 1, mac(1)), None);

        let staging = sync.staging_match();
        assert_eq!(
            switch.table(3).unwrap().get_flow(&staging, 0),
            Some(&[FlowAction::Output(1)][..])
        );
    }

    #[test]
    fn staging_rule_accumulates_every_host_through_a_switch() {
        let mut graph = line();
        graph.add_host(mac(3), Vec::new(), PortRef::new(3, 3)).unwrap();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        sync.synchronize(&graph, &tree, &mut switch);

        let staging = sync.staging_match();
        assert_eq!(
            switch.table(3).unwrap().get_flow(&staging, 0),
            Some(&[FlowAction::Output(1), FlowAction::Output(3)][..])
        );
        assert_eq!(
            switch.table(2).unwrap().get_flow(&staging, 0),
            Some(&[FlowAction::Output(2), FlowAction::Output(2)][..])
        );
    }

    #[test]
    fn repeating_a_sync_leaves_the_same_rules() {
        let graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();

        full_cycle(&mut sync, &graph, &mut switch);
        let first = switch.tables().clone();
        let rules = sync.installed_rules();

        full_cycle(&mut sync, &graph, &mut switch);
        assert_eq!(switch.tables(), &first);
        assert_eq!(sync.installed_rules(), rules);
    }

    #[test]
    fn unreachable_destination_rules_are_pruned() {
        let mut graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();

        full_cycle(&mut sync, &graph, &mut switch);
        assert!(output_for(&switch, 1, mac(2)).is_some());
        assert!(output_for(&switch, 3, mac(1)).is_some());

        graph.set_port_live(PortRef::new(2, 2), false).unwrap();
        graph.set_port_live(PortRef::new(3, 2), false).unwrap();
        let report = full_cycle(&mut sync, &graph, &mut switch);
        assert!(report.is_clean());

        for dpid in 1..=3 {
            assert_eq!(output_for(&switch, dpid, mac(2)), None, "switch{}", dpid);
            assert_eq!(output_for(&switch, dpid, mac(1)), None, "switch{}", dpid);
        }
        assert!(sync.installed_rules().is_empty());
    }

    #[test]
    fn failing_switch_is_reported_and_retried_next_cycle() {
        let graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();
        switch.set_unreachable(2, true);

        let report = full_cycle(&mut sync, &graph, &mut switch);
        assert!(!report.is_clean());
        assert!(report.failures.iter().all(|e| matches!(
            e,
            ControllerError::RuleInstallFailure { dpid: 2, .. }
        )));
        assert!(output_for(&switch, 1, mac(2)).is_some());
        assert!(output_for(&switch, 3, mac(2)).is_some());
        assert!(switch.table(2).is_none());

        switch.set_unreachable(2, false);
        let report = full_cycle(&mut sync, &graph, &mut switch);
        assert!(report.is_clean());
        assert_eq!(output_for(&switch, 2, mac(2)), Some(vec![FlowAction::Output(2)]));
        assert_eq!(output_for(&switch, 2, mac(1)), Some(vec![FlowAction::Output(1)]));
    }

    #[test]
    fn failed_switch_gets_one_attempt_per_round() {
        let graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();
        switch.set_unreachable(2, true);

        let tree = calculate_shortest_paths(&graph, DeviceId::Host(mac(1)));
        let report = sync.synchronize(&graph, &tree, &mut switch);
        assert_eq!(report.failures.len(), 1);
    }

    #[test]
    fn forgotten_switch_is_not_pruned() {
        let graph = line();
        let mut sync = FlowSynchronizer::new(0, ETH_TYPE_IPV4);
        let mut switch = RecordingSwitch::new();
        full_cycle(&mut sync, &graph, &mut switch);

        sync.forget_switch(2);
        assert!(sync.installed_rules().iter().all(|(dpid, _, _)| *dpid != 2));

        // switch2 now refuses everything; pruning must not touch it
        switch.set_unreachable(2, true);
        sync.begin_cycle();
        let report = sync.finish_cycle(&mut switch);
        assert!(report.is_clean());
    }
}
