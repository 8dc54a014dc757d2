// Copyright 2025 Juan Miguel Giraldo
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program; if not, write to the Free Software Foundation,
// Inc., 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! A user node: the sending end builds a fresh onion per outgoing message
//! (circuit drawn, used once, discarded); the receiving end is just the
//! final hop address relays forward plaintext to. A sender only ever
//! learns whether the entry relay accepted the message, never whether it
//! was delivered further down the circuit.

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::onion::{self, OnionError};
use crate::protocol::{NodeRequest, NodeResponse, RegistryRequest, RegistryResponse};
use crate::transport::{self, TransportError};

#[derive(Default)]
struct UserState {
    last_received_message: Option<String>,
    last_sent_message: Option<String>,
    last_circuit: Vec<u32>,
}

pub async fn run(user_id: u32, cfg: Config) -> anyhow::Result<()> {
    let listen_addr = format!("127.0.0.1:{}", cfg.ports.user_port(user_id));
    let listener = TcpListener::bind(&listen_addr).await?;
    info!(user_id, "user listening on {listen_addr}");

    let cfg = Arc::new(cfg);
    let state = Arc::new(Mutex::new(UserState::default()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let cfg = cfg.clone();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, cfg, state).await {
                warn!(user_id, "connection from {addr} failed: {e:#}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    cfg: Arc<Config>,
    state: Arc<Mutex<UserState>>,
) -> anyhow::Result<()> {
    let request: NodeRequest = transport::read_frame(&mut stream).await?;

    let response = match request {
        NodeRequest::Message { payload } => {
            // Whatever reaches a user is plaintext: the exit relay stripped
            // the last layer before forwarding here.
            state.lock().await.last_received_message = Some(payload);
            NodeResponse::Ack
        }
        NodeRequest::SendMessage {
            message,
            destination_user_id,
        } => {
            send_message(&message, destination_user_id, &cfg, &state).await?;
            NodeResponse::Ack
        }
        NodeRequest::Status => NodeResponse::Live,
        NodeRequest::LastReceivedMessage => {
            NodeResponse::Payload(state.lock().await.last_received_message.clone())
        }
        NodeRequest::LastSentMessage => {
            NodeResponse::Payload(state.lock().await.last_sent_message.clone())
        }
        NodeRequest::LastCircuit => NodeResponse::Circuit(state.lock().await.last_circuit.clone()),
        _ => NodeResponse::Unsupported,
    };

    transport::write_frame(&mut stream, &response).await?;
    Ok(())
}

/// Builds and dispatches one onion. Construction failures abort before any
/// traffic is sent; a partial onion never leaves this function.
async fn send_message(
    message: &str,
    destination_user_id: u32,
    cfg: &Config,
    state: &Mutex<UserState>,
) -> Result<(), OnionError> {
    let response: RegistryResponse =
        transport::request(&cfg.registry_addr(), &RegistryRequest::ListNodes).await?;
    let nodes = match response {
        RegistryResponse::NodeList(nodes) => nodes,
        RegistryResponse::Ack => {
            return Err(OnionError::DirectoryUnavailable(
                TransportError::UnexpectedResponse,
            ))
        }
    };

    let destination_port = cfg.ports.user_port(destination_user_id);
    let built = onion::build_onion(message, destination_port, &nodes, cfg.ports.relay_base)?;

    info!(circuit = ?built.circuit, entry = built.entry_port, "sending onion");
    state.lock().await.last_circuit = built.circuit.clone();

    let entry_addr = format!("127.0.0.1:{}", built.entry_port);
    let accepted = transport::request::<_, NodeResponse>(
        &entry_addr,
        &NodeRequest::Message {
            payload: built.payload,
        },
    )
    .await;
    match accepted {
        Ok(NodeResponse::Ack) => {}
        Ok(_) => {
            return Err(OnionError::ForwardingFailed {
                dest: built.entry_port,
                source: TransportError::UnexpectedResponse,
            })
        }
        Err(source) => {
            return Err(OnionError::ForwardingFailed {
                dest: built.entry_port,
                source,
            })
        }
    }

    state.lock().await.last_sent_message = Some(message.to_string());
    Ok(())
}
