use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use crate::types::{MacAddr, PortNo, mac_format};

pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// Exact match on destination MAC and ethertype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowMatch {
    #[serde(with = "mac_format")]
    pub dl_dst: MacAddr,
    pub dl_type: u16,
}

impl FlowMatch {
    pub fn new(dl_dst: MacAddr, dl_type: u16) -> Self {
        Self { dl_dst, dl_type }
    }
}

impl fmt::Display for FlowMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dl_dst={},dl_type={:#06x}", self.dl_dst, self.dl_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlowAction {
    Output(PortNo),
}

impl fmt::Display for FlowAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowAction::Output(port) => write!(f, "output:{}", port),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowEntry {
    pub flow: FlowMatch,
    pub priority: u16,
    pub actions: Vec<FlowAction>,
}

impl fmt::Display for FlowEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let actions: Vec<String> = self.actions.iter().map(ToString::to_string).collect();
        write!(f, "priority={},{} actions={}", self.priority, self.flow, actions.join(","))
    }
}

/// The rules resident on one switch, keyed by match and priority.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlowTable {
    entries: HashMap<(FlowMatch, u16), Vec<FlowAction>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a rule, replacing any rule with the same match and priority.
    pub fn add_flow(&mut self, flow: FlowMatch, priority: u16, actions: Vec<FlowAction>) {
        self.entries.insert((flow, priority), actions);
    }

    pub fn remove_flow(&mut self, flow: &FlowMatch, priority: u16) -> Option<Vec<FlowAction>> {
        self.entries.remove(&(*flow, priority))
    }

    pub fn get_flow(&self, flow: &FlowMatch, priority: u16) -> Option<&[FlowAction]> {
        self.entries.get(&(*flow, priority)).map(Vec::as_slice)
    }

    /// First rule matching `dl_dst`, regardless of ethertype and priority.
    pub fn find_by_destination(&self, dl_dst: MacAddr) -> Option<&[FlowAction]> {
        self.entries
            .iter()
            .find(|((flow, _), _)| flow.dl_dst == dl_dst)
            .map(|(_, actions)| actions.as_slice())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries sorted by destination then priority.
    pub fn entries(&self) -> Vec<FlowEntry> {
        let mut entries: Vec<FlowEntry> = self
            .entries
            .iter()
            .map(|((flow, priority), actions)| FlowEntry {
                flow: *flow,
                priority: *priority,
                actions: actions.clone(),
            })
            .collect();
        entries.sort_by_key(|e| (e.flow.dl_dst, e.flow.dl_type, e.priority));
        entries
    }
}
