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

//! A relay node: strips exactly one layer from each incoming payload and
//! forwards the remainder to whatever address that layer revealed. The key
//! pair is generated at startup and immutable afterwards; the only other
//! state is a diagnostic snapshot of the last message handled, overwritten
//! on every message (last-write-wins, never read for routing).

use std::sync::Arc;

use anyhow::Context;
use rsa::RsaPrivateKey;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::crypto;
use crate::onion::{self, OnionError};
use crate::protocol::{NodeEntry, NodeRequest, NodeResponse, RegistryRequest, RegistryResponse};
use crate::transport;

#[derive(Default)]
struct RelayState {
    last_received_encrypted: Option<String>,
    last_received_decrypted: Option<String>,
    last_destination: Option<u16>,
}

pub async fn run(node_id: u32, cfg: Config) -> anyhow::Result<()> {
    // Key generation is CPU-bound; keep it off the async worker.
    let private_key = tokio::task::spawn_blocking(crypto::generate_rsa_keys)
        .await?
        .context("relay key generation failed")?;
    let public_key = private_key.to_public_key();

    // Bind before registering: once the registry lists this relay, a
    // sender may address it immediately.
    let listen_addr = format!("127.0.0.1:{}", cfg.ports.relay_port(node_id));
    let listener = TcpListener::bind(&listen_addr).await?;

    let entry = NodeEntry {
        node_id,
        public_key,
    };
    let response: RegistryResponse = transport::request(
        &cfg.registry_addr(),
        &RegistryRequest::Register { entry },
    )
    .await
    .context("failed to reach the registry")?;
    match response {
        RegistryResponse::Ack => info!(node_id, "relay listening on {listen_addr}"),
        other => anyhow::bail!("registry rejected registration: {other:?}"),
    }

    let private_key = Arc::new(private_key);
    let state = Arc::new(Mutex::new(RelayState::default()));

    loop {
        let (stream, addr) = listener.accept().await?;
        let private_key = private_key.clone();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, private_key, state).await {
                warn!(node_id, "connection from {addr} failed: {e:#}");
            }
        });
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    private_key: Arc<RsaPrivateKey>,
    state: Arc<Mutex<RelayState>>,
) -> anyhow::Result<()> {
    let request: NodeRequest = transport::read_frame(&mut stream).await?;

    let response = match request {
        NodeRequest::Message { payload } => {
            // A peel failure aborts this message only; the connection is
            // dropped without an ack and the relay keeps serving.
            let peeled = onion::peel_onion(&payload, &private_key)?;

            {
                let mut snapshot = state.lock().await;
                snapshot.last_received_encrypted = Some(payload);
                snapshot.last_received_decrypted = Some(peeled.remainder.clone());
                snapshot.last_destination = Some(peeled.next_port);
            }

            // Forward off the accept path so a slow next hop never blocks
            // unrelated messages. No retry, and no signal back to the
            // sender: there is no reverse path.
            let dest = peeled.next_port;
            let remainder = peeled.remainder;
            tokio::spawn(async move {
                let addr = format!("127.0.0.1:{dest}");
                let forward = transport::request::<_, NodeResponse>(
                    &addr,
                    &NodeRequest::Message { payload: remainder },
                )
                .await;
                match forward {
                    Ok(_) => debug!(dest, "forwarded payload"),
                    Err(source) => {
                        let err = OnionError::ForwardingFailed { dest, source };
                        warn!("{err}");
                    }
                }
            });

            NodeResponse::Ack
        }
        NodeRequest::Status => NodeResponse::Live,
        NodeRequest::LastReceivedEncrypted => {
            NodeResponse::Payload(state.lock().await.last_received_encrypted.clone())
        }
        NodeRequest::LastReceivedDecrypted => {
            NodeResponse::Payload(state.lock().await.last_received_decrypted.clone())
        }
        NodeRequest::LastDestination => {
            NodeResponse::Destination(state.lock().await.last_destination)
        }
        _ => NodeResponse::Unsupported,
    };

    transport::write_frame(&mut stream, &response).await?;
    Ok(())
}
