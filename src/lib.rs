pub mod algorithms;
pub mod config;
pub mod control_server;
pub mod error;
pub mod event_loop;
pub mod network;
pub mod protocol;
pub mod snapshot;
pub mod switch_control;
pub mod types;

pub use error::{ControllerError, SwitchError};
pub use types::{Dpid, MacAddr, PortNo, PortRef};

pub type ControllerResult<T> = std::result::Result<T, ControllerError>;
