use crate::event_loop::{ControllerCommand, Query};
use anyhow::Result;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlResponse {
    pub success: bool,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

impl ControlResponse {
    pub fn ok(message: impl Into<String>, data: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ControlCommand {
    pub command: String,
    pub args: Option<serde_json::Value>,
}

/// Read-only diagnostics over TCP: one JSON command per line in, one JSON
/// response per line out. Queries are answered by the event loop between
/// events.
pub struct ControlServer {
    listener: TcpListener,
    commands: mpsc::Sender<ControllerCommand>,
}

impl ControlServer {
    pub async fn bind(addr: SocketAddr, commands: mpsc::Sender<ControllerCommand>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Control server listening on {}", listener.local_addr()?);
        Ok(Self { listener, commands })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Control connection from {}", addr);
                    let commands = self.commands.clone();
                    tokio::spawn(async move {
                        if let Err(e) = Self::handle_client(stream, commands).await {
                            error!("Error handling control client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept control connection: {}", e);
                }
            }
        }
    }

    async fn handle_client(mut stream: TcpStream, commands: mpsc::Sender<ControllerCommand>) -> Result<()> {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            if buf_reader.read_line(&mut line).await? == 0 {
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let response = match serde_json::from_str::<ControlCommand>(trimmed) {
                Ok(command) => Self::process_command(command, &commands).await,
                Err(e) => ControlResponse::failure(format!("Invalid JSON command: {}", e)),
            };

            let response_json = serde_json::to_string(&response)?;
            writer.write_all(format!("{}\n", response_json).as_bytes()).await?;
            writer.flush().await?;
        }

        Ok(())
    }

    async fn process_command(command: ControlCommand, commands: &mpsc::Sender<ControllerCommand>) -> ControlResponse {
        let query = match command.command.as_str() {
            "topology" => Query::Topology,
            "topology_text" => Query::TopologyText,
            "rules" => Query::Rules,
            "resolve" => match Self::ip_argument(command.args) {
                Some(ip) => Query::Resolve(ip),
                None => return ControlResponse::failure("resolve requires an IPv4 address"),
            },
            "help" => return Self::get_help(),
            _ => return ControlResponse::failure(format!("Unknown command: {}", command.command)),
        };

        let (respond_to, answer) = oneshot::channel();
        if commands.send(ControllerCommand::Query { query, respond_to }).await.is_err() {
            return ControlResponse::failure("Controller is not running");
        }
        answer
            .await
            .unwrap_or_else(|_| ControlResponse::failure("Controller dropped the query"))
    }

    /// Accepts `"10.0.0.1"` or `{"ip": "10.0.0.1"}`.
    fn ip_argument(args: Option<serde_json::Value>) -> Option<Ipv4Addr> {
        match args? {
            serde_json::Value::String(ip) => ip.parse().ok(),
            obj if obj.is_object() => obj.get("ip")?.as_str()?.parse().ok(),
            _ => None,
        }
    }

    fn get_help() -> ControlResponse {
        let commands = vec![
            ("topology", "Snapshot of hosts, switches, paths and rules as JSON"),
            ("topology_text", "Snapshot in the log format"),
            ("rules", "Forwarding rules currently installed"),
            ("resolve", "Look up the MAC for an IPv4 address (requires ip)"),
            ("help", "Show this help message"),
        ];
        ControlResponse::ok("Available commands", serde_json::to_value(commands).ok())
    }
}
