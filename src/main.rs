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

use std::path::Path;

use anyhow::Result;
use tracing::info;

use onionet::config::{self, Config, Mode};
use onionet::{logging, network, registry, relay, user};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cfg = match config::load_config(Path::new("config.toml")) {
        Ok(cfg) => cfg,
        Err(e) => {
            info!("no usable config.toml ({e:#}); using defaults");
            Config::default()
        }
    };
    info!(mode = ?cfg.mode, "starting");

    match cfg.mode {
        Mode::Registry => registry::run(&cfg.registry_addr()).await,
        Mode::Relay => relay::run(cfg.relay.node_id, cfg.clone()).await,
        Mode::User => user::run(cfg.user.user_id, cfg.clone()).await,
        Mode::Network => network::run(cfg).await,
    }
}
