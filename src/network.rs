pub mod interface;
pub mod topology;

pub use interface::SwitchPort;
pub use topology::{Adjacency, Device, DeviceId, DeviceKind, HostInfo, SwitchInfo, TopologyGraph};
