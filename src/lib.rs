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

//! Minimal onion-routing overlay.
//!
//! A sender wraps each message in three layers of encryption, one per hop
//! of a randomly drawn relay circuit. Each relay strips exactly one layer,
//! learning only its successor's address, and forwards the remainder; the
//! innermost layer reaches the recipient as plaintext. Circuits live for
//! one message and are never reused.
//!
//! # Modules
//!
//! - [`crypto`] - RSA / AES-256-GCM primitives and the base64 codec
//! - [`protocol`] - wire types and the fixed-width framing invariants
//! - [`transport`] - length-prefixed bincode frames over TCP
//! - [`onion`] - circuit selection, layered construction, peeling
//! - [`registry`] - the node directory service
//! - [`relay`] - peel-and-forward relay nodes
//! - [`user`] - sending and receiving endpoints
//! - [`network`] - one-process overlay launcher
//! - [`config`] - TOML configuration and the port numbering scheme
//! - [`logging`] - tracing subscriber setup

pub mod config;
pub mod crypto;
pub mod logging;
pub mod network;
pub mod onion;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod transport;
pub mod user;
