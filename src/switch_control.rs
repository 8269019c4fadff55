use std::collections::{BTreeMap, HashSet};
use log::debug;
use crate::protocol::flow_table::{FlowAction, FlowMatch, FlowTable};
use crate::types::{Dpid, PortNo};
use crate::SwitchError;

/// The southbound channel to the switches. Calls are synchronous from the
/// controller's point of view; a failure means the switch did not apply it.
pub trait SwitchControl {
    fn install_rule(
        &mut self,
        dpid: Dpid,
        flow: &FlowMatch,
        priority: u16,
        actions: &[FlowAction],
    ) -> Result<(), SwitchError>;

    fn remove_rule(&mut self, dpid: Dpid, flow: &FlowMatch, priority: u16) -> Result<(), SwitchError>;

    fn send_frame(&mut self, dpid: Dpid, payload: &[u8], out_port: PortNo) -> Result<(), SwitchError>;

    /// Called after a switch left the topology; its tables are gone with it.
    fn switch_departed(&mut self, _dpid: Dpid) {}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub dpid: Dpid,
    pub out_port: PortNo,
    pub payload: Vec<u8>,
}

/// In-memory switch backend: keeps one flow table per switch and records
/// every frame sent. Switches listed as unreachable reject every call.
#[derive(Debug, Default)]
pub struct RecordingSwitch {
    tables: BTreeMap<Dpid, FlowTable>,
    frames: Vec<SentFrame>,
    unreachable: HashSet<Dpid>,
    operations: usize,
}

impl RecordingSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, dpid: Dpid) -> Option<&FlowTable> {
        self.tables.get(&dpid)
    }

    pub fn tables(&self) -> &BTreeMap<Dpid, FlowTable> {
        &self.tables
    }

    pub fn sent_frames(&self) -> &[SentFrame] {
        &self.frames
    }

    /// Number of install and remove calls accepted so far.
    pub fn operations(&self) -> usize {
        self.operations
    }

    pub fn set_unreachable(&mut self, dpid: Dpid, unreachable: bool) {
        if unreachable {
            self.unreachable.insert(dpid);
        } else {
            self.unreachable.remove(&dpid);
        }
    }

    fn check(&self, dpid: Dpid) -> Result<(), SwitchError> {
        if self.unreachable.contains(&dpid) {
            Err(SwitchError::NotConnected(dpid))
        } else {
            Ok(())
        }
    }
}

impl SwitchControl for RecordingSwitch {
    fn install_rule(
        &mut self,
        dpid: Dpid,
        flow: &FlowMatch,
        priority: u16,
        actions: &[FlowAction],
    ) -> Result<(), SwitchError> {
        self.check(dpid)?;
        debug!("switch{}: add flow {} priority {} actions {:?}", dpid, flow, priority, actions);
        self.tables
            .entry(dpid)
            .or_default()
            .add_flow(*flow, priority, actions.to_vec());
        self.operations += 1;
        Ok(())
    }

    fn remove_rule(&mut self, dpid: Dpid, flow: &FlowMatch, priority: u16) -> Result<(), SwitchError> {
        self.check(dpid)?;
        debug!("switch{}: delete flow {} priority {}", dpid, flow, priority);
        if let Some(table) = self.tables.get_mut(&dpid) {
            table.remove_flow(flow, priority);
        }
        self.operations += 1;
        Ok(())
    }

    fn send_frame(&mut self, dpid: Dpid, payload: &[u8], out_port: PortNo) -> Result<(), SwitchError> {
        self.check(dpid)?;
        self.frames.push(SentFrame {
            dpid,
            out_port,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn switch_departed(&mut self, dpid: Dpid) {
        self.tables.remove(&dpid);
    }
}
