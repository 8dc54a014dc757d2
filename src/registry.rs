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

//! The node directory: relays register their public keys here, senders
//! fetch the full node set to draw circuits from. Keys are trusted as
//! supplied; there is no registration authentication and no persistence.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::protocol::{NodeEntry, RegistryRequest, RegistryResponse};
use crate::transport::{self, TransportError};

type NodeTable = Arc<Mutex<HashMap<u32, NodeEntry>>>;

pub async fn run(listen_addr: &str) -> anyhow::Result<()> {
    let nodes: NodeTable = Arc::new(Mutex::new(HashMap::new()));
    let listener = TcpListener::bind(listen_addr).await?;
    info!("registry listening on {listen_addr}");

    loop {
        let (stream, addr) = listener.accept().await?;
        let nodes = nodes.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, nodes).await {
                warn!("registry connection from {addr} failed: {e}");
            }
        });
    }
}

async fn handle_connection(mut stream: TcpStream, nodes: NodeTable) -> Result<(), TransportError> {
    let request: RegistryRequest = transport::read_frame(&mut stream).await?;

    match request {
        RegistryRequest::Register { entry } => {
            let mut table = nodes.lock().await;
            // Re-registration replaces the previous key for that id.
            table.insert(entry.node_id, entry);
            let total = table.len();
            drop(table);

            info!(total, "relay registered");
            transport::write_frame(&mut stream, &RegistryResponse::Ack).await?;
        }
        RegistryRequest::ListNodes => {
            let list: Vec<NodeEntry> = nodes.lock().await.values().cloned().collect();
            transport::write_frame(&mut stream, &RegistryResponse::NodeList(list)).await?;
        }
    }
    Ok(())
}
