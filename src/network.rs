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

//! One-process overlay launcher: boots the registry, then the configured
//! number of relays and users, as independent tasks. Useful for local runs
//! and for the end-to-end tests; a production overlay would run each node
//! as its own process in `registry`/`relay`/`user` mode instead.

use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{error, info};

use crate::config::Config;
use crate::protocol::{NodeRequest, NodeResponse, RegistryRequest, RegistryResponse};
use crate::{registry, relay, transport, user};

const STARTUP_DEADLINE: Duration = Duration::from_secs(60);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Boots every node and returns once the overlay is ready: all relays
/// registered, all users accepting connections.
pub async fn spawn(cfg: Config) -> anyhow::Result<()> {
    let registry_addr = cfg.registry_addr();

    let registry_cfg = cfg.clone();
    tokio::spawn(async move {
        if let Err(e) = registry::run(&registry_cfg.registry_addr()).await {
            error!("registry terminated: {e:#}");
        }
    });
    await_registry(&registry_addr, 0).await?;

    for node_id in 0..cfg.network.relays {
        let cfg = cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = relay::run(node_id, cfg).await {
                error!(node_id, "relay terminated: {e:#}");
            }
        });
    }
    await_registry(&registry_addr, cfg.network.relays as usize).await?;

    for user_id in 0..cfg.network.users {
        let cfg = cfg.clone();
        tokio::spawn(async move {
            if let Err(e) = user::run(user_id, cfg).await {
                error!(user_id, "user terminated: {e:#}");
            }
        });
    }
    for user_id in 0..cfg.network.users {
        await_live(&format!("127.0.0.1:{}", cfg.ports.user_port(user_id))).await?;
    }

    info!(
        relays = cfg.network.relays,
        users = cfg.network.users,
        "overlay up"
    );
    Ok(())
}

pub async fn run(cfg: Config) -> anyhow::Result<()> {
    spawn(cfg).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}

/// Polls the registry until it lists at least `want` relays.
async fn await_registry(addr: &str, want: usize) -> anyhow::Result<()> {
    let deadline = Instant::now() + STARTUP_DEADLINE;
    loop {
        if let Ok(RegistryResponse::NodeList(nodes)) =
            transport::request(addr, &RegistryRequest::ListNodes).await
        {
            if nodes.len() >= want {
                return Ok(());
            }
        }
        if Instant::now() >= deadline {
            anyhow::bail!("registry did not reach {want} relays within {STARTUP_DEADLINE:?}");
        }
        sleep(POLL_INTERVAL).await;
    }
}

async fn await_live(addr: &str) -> anyhow::Result<()> {
    let deadline = Instant::now() + STARTUP_DEADLINE;
    loop {
        if let Ok(NodeResponse::Live) =
            transport::request(addr, &NodeRequest::Status).await
        {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("node at {addr} did not come up within {STARTUP_DEADLINE:?}");
        }
        sleep(POLL_INTERVAL).await;
    }
}
