use anyhow::{Result, anyhow};
use log::{info, warn};
use serde_json::json;
use std::net::Ipv4Addr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use crate::control_server::ControlResponse;
use crate::protocol::{TopologyController, TopologyEvent};
use crate::switch_control::SwitchControl;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    Topology,
    TopologyText,
    Rules,
    Resolve(Ipv4Addr),
}

#[derive(Debug)]
pub enum ControllerCommand {
    Event(TopologyEvent),
    Query {
        query: Query,
        respond_to: oneshot::Sender<ControlResponse>,
    },
    Shutdown,
}

/// Processes commands strictly in arrival order, each one to completion,
/// until `Shutdown` arrives or every sender is gone. Returns the controller.
pub async fn run_event_loop<S: SwitchControl>(
    mut controller: TopologyController<S>,
    mut commands: mpsc::Receiver<ControllerCommand>,
) -> TopologyController<S> {
    let mut handled = 0usize;
    while let Some(command) = commands.recv().await {
        match command {
            ControllerCommand::Event(event) => {
                let outcome = controller.handle_event(event);
                handled += 1;
                for issue in &outcome.issues {
                    warn!("Event {}: {}", handled, issue);
                }
            }
            ControllerCommand::Query { query, respond_to } => {
                if respond_to.send(answer_query(&controller, query)).is_err() {
                    warn!("Query {:?} abandoned by its client", query);
                }
            }
            ControllerCommand::Shutdown => break,
        }
    }
    info!("Event loop stopped after {} events", handled);
    controller
}

pub fn answer_query<S: SwitchControl>(controller: &TopologyController<S>, query: Query) -> ControlResponse {
    match query {
        Query::Topology => match serde_json::to_value(controller.snapshot()) {
            Ok(data) => ControlResponse::ok("Topology snapshot", Some(data)),
            Err(e) => ControlResponse::failure(format!("Failed to encode snapshot: {}", e)),
        },
        Query::TopologyText => ControlResponse::ok(controller.snapshot().to_string(), None),
        Query::Rules => {
            let rules: Vec<_> = controller
                .synchronizer()
                .installed_rules()
                .into_iter()
                .map(|(switch, mac, port)| json!({ "switch": switch, "dl_dst": mac.to_string(), "port": port }))
                .collect();
            ControlResponse::ok(format!("Retrieved {} rules", rules.len()), Some(serde_json::Value::from(rules)))
        }
        Query::Resolve(ip) => match controller.resolve(ip) {
            Some(mac) => ControlResponse::ok(
                format!("{} is at {}", ip, mac),
                Some(json!({ "ip": ip.to_string(), "mac": mac.to_string() })),
            ),
            None => ControlResponse::failure(format!("{} is unresolved", ip)),
        },
    }
}

/// Feeds a JSON-lines event stream into the event loop. Blank lines and lines
/// starting with `#` are skipped; malformed lines are logged and skipped.
/// Returns the number of events forwarded.
pub async fn replay_events<R: AsyncBufRead + Unpin>(
    mut reader: R,
    commands: &mpsc::Sender<ControllerCommand>,
) -> Result<usize> {
    let mut buf = Vec::new();
    let mut line_no = 0usize;
    let mut forwarded = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;
        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                warn!("Skipping non UTF-8 line {}: {}", line_no, e);
                continue;
            }
        };
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match TopologyEvent::from_json(line) {
            Ok(event) => {
                commands
                    .send(ControllerCommand::Event(event))
                    .await
                    .map_err(|_| anyhow!("controller stopped before line {}", line_no))?;
                forwarded += 1;
            }
            Err(e) => warn!("Skipping malformed event on line {}: {}", line_no, e),
        }
    }
    Ok(forwarded)
}
