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

//! Onion construction and peeling.
//!
//! A payload on the wire is one layer: a 344-character base64 RSA
//! ciphertext of a fresh AES key, followed by the base64 AES ciphertext of
//! `hop_address || inner_payload`. The inner payload is either the next
//! hop's full layer or, innermost, the raw plaintext. Each relay learns
//! exactly its predecessor's blob and its successor's address; local state
//! reveals neither its circuit position nor the endpoints.

use rand::seq::SliceRandom;
use rsa::RsaPrivateKey;
use thiserror::Error;

use crate::crypto::{self, CryptoError};
use crate::protocol::{self, NodeEntry, ADDR_WIDTH, CIRCUIT_LEN, RSA_SEGMENT_LEN};
use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum OnionError {
    #[error("node directory unavailable: {0}")]
    DirectoryUnavailable(#[from] TransportError),
    #[error("need at least 3 registered relays, found {found}")]
    InsufficientNodes { found: usize },
    #[error("onion construction failed: {0}")]
    EncryptionFailed(#[source] CryptoError),
    #[error("payload too short or badly framed")]
    MalformedPayload,
    #[error("layer decryption failed: {0}")]
    DecryptionFailed(#[source] CryptoError),
    #[error("forwarding to port {dest} failed: {source}")]
    ForwardingFailed { dest: u16, source: TransportError },
}

/// A fully layered onion ready to hand to the entry relay.
#[derive(Debug)]
pub struct BuiltOnion {
    /// Relay ids in forward traversal order; kept for introspection only.
    pub circuit: Vec<u32>,
    pub entry_port: u16,
    pub payload: String,
}

/// The result of stripping one layer.
#[derive(Debug)]
pub struct PeeledLayer {
    pub next_port: u16,
    pub remainder: String,
}

/// Draws [`CIRCUIT_LEN`] distinct relays uniformly at random, by partial
/// shuffle rather than retry-until-distinct.
pub fn select_circuit(nodes: &[NodeEntry]) -> Result<Vec<&NodeEntry>, OnionError> {
    if nodes.len() < CIRCUIT_LEN {
        return Err(OnionError::InsufficientNodes { found: nodes.len() });
    }
    let mut picks: Vec<&NodeEntry> = nodes.iter().collect();
    picks.shuffle(&mut rand::thread_rng());
    picks.truncate(CIRCUIT_LEN);
    Ok(picks)
}

/// Builds the full onion for `message` addressed to `destination_port`,
/// over a freshly drawn circuit. Any primitive failure aborts the whole
/// construction; a partial onion is never returned.
pub fn build_onion(
    message: &str,
    destination_port: u16,
    nodes: &[NodeEntry],
    relay_base: u16,
) -> Result<BuiltOnion, OnionError> {
    let hops = select_circuit(nodes)?;
    let (payload, entry_port) = wrap_layers(message, destination_port, &hops, relay_base)?;
    Ok(BuiltOnion {
        circuit: hops.iter().map(|hop| hop.node_id).collect(),
        entry_port,
        payload,
    })
}

/// Layers from the destination outward: the innermost body carries the real
/// destination, each wrap re-targets the previous relay's listening port.
fn wrap_layers(
    message: &str,
    destination_port: u16,
    hops: &[&NodeEntry],
    relay_base: u16,
) -> Result<(String, u16), OnionError> {
    let mut payload = message.to_string();
    let mut target_port = destination_port;

    for hop in hops.iter().rev() {
        let body = format!("{}{}", protocol::format_hop_address(target_port), payload);

        let aes_key = crypto::generate_aes_key();
        let encrypted_body =
            crypto::aes_encrypt(&aes_key, body.as_bytes()).map_err(OnionError::EncryptionFailed)?;
        let encrypted_key =
            crypto::rsa_encrypt(&hop.public_key, &aes_key).map_err(OnionError::EncryptionFailed)?;

        let key_segment = crypto::encode_b64(&encrypted_key);
        debug_assert_eq!(key_segment.len(), RSA_SEGMENT_LEN);

        payload = format!("{}{}", key_segment, crypto::encode_b64(&encrypted_body));
        target_port = relay_port(relay_base, hop.node_id);
    }

    // After wrapping in reverse, the last target is the entry relay.
    Ok((payload, target_port))
}

/// Strips exactly one layer: split off the fixed-width key segment, recover
/// the AES key with this relay's private key, decrypt the body, split off
/// the fixed-width next-hop address. The remainder is opaque to the relay:
/// it cannot tell another layer from final plaintext.
pub fn peel_onion(payload: &str, private_key: &RsaPrivateKey) -> Result<PeeledLayer, OnionError> {
    let raw = payload.as_bytes();
    if raw.len() < RSA_SEGMENT_LEN {
        return Err(OnionError::MalformedPayload);
    }
    let (key_segment, body_segment) = raw.split_at(RSA_SEGMENT_LEN);

    let encrypted_key = crypto::decode_b64(key_segment).map_err(|_| OnionError::MalformedPayload)?;
    let encrypted_body =
        crypto::decode_b64(body_segment).map_err(|_| OnionError::MalformedPayload)?;

    let exported = crypto::rsa_decrypt(private_key, &encrypted_key)
        .map_err(OnionError::DecryptionFailed)?;
    let aes_key = crypto::import_aes_key(&exported).map_err(OnionError::DecryptionFailed)?;

    let body = crypto::aes_decrypt(&aes_key, &encrypted_body)
        .map_err(OnionError::DecryptionFailed)?;

    if body.len() < ADDR_WIDTH {
        return Err(OnionError::MalformedPayload);
    }
    let (addr_bytes, rest) = body.split_at(ADDR_WIDTH);
    let addr = std::str::from_utf8(addr_bytes).map_err(|_| OnionError::MalformedPayload)?;
    let next_port = protocol::parse_hop_address(addr).ok_or(OnionError::MalformedPayload)?;
    let remainder = String::from_utf8(rest.to_vec()).map_err(|_| OnionError::MalformedPayload)?;

    Ok(PeeledLayer {
        next_port,
        remainder,
    })
}

pub fn relay_port(relay_base: u16, node_id: u32) -> u16 {
    relay_base + node_id as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const RELAY_BASE: u16 = 4000;

    fn test_pool(ids: &[u32]) -> Vec<(NodeEntry, RsaPrivateKey)> {
        ids.iter()
            .map(|&node_id| {
                let private_key = crypto::generate_rsa_keys().unwrap();
                let entry = NodeEntry {
                    node_id,
                    public_key: private_key.to_public_key(),
                };
                (entry, private_key)
            })
            .collect()
    }

    fn key_for(pool: &[(NodeEntry, RsaPrivateKey)], node_id: u32) -> &RsaPrivateKey {
        &pool.iter().find(|(e, _)| e.node_id == node_id).unwrap().1
    }

    #[test]
    fn builds_and_peels_in_circuit_order() {
        let pool = test_pool(&[1, 2, 3]);
        let nodes: Vec<NodeEntry> = pool.iter().map(|(e, _)| e.clone()).collect();

        let built = build_onion("round trip", 19091, &nodes, RELAY_BASE).unwrap();
        assert_eq!(built.circuit.len(), CIRCUIT_LEN);
        assert_eq!(built.entry_port, relay_port(RELAY_BASE, built.circuit[0]));

        let mut payload = built.payload;
        let mut next_port = built.entry_port;
        for (i, &hop_id) in built.circuit.iter().enumerate() {
            assert_eq!(next_port, relay_port(RELAY_BASE, hop_id));
            assert!(payload.len() > RSA_SEGMENT_LEN);

            let peeled = peel_onion(&payload, key_for(&pool, hop_id)).unwrap();
            payload = peeled.remainder;
            next_port = peeled.next_port;

            if i < CIRCUIT_LEN - 1 {
                assert_ne!(payload, "round trip");
            }
        }

        assert_eq!(payload, "round trip");
        assert_eq!(next_port, 19091);
    }

    #[test]
    fn scenario_five_nodes_fixed_circuit() {
        // Directory {1..5}, circuit [3, 1, 4], destination 0000019090.
        let pool = test_pool(&[1, 2, 3, 4, 5]);
        let hops: Vec<&NodeEntry> = [3u32, 1, 4]
            .iter()
            .map(|&id| &pool.iter().find(|(e, _)| e.node_id == id).unwrap().0)
            .collect();

        let (payload, entry_port) = wrap_layers("hello", 19090, &hops, RELAY_BASE).unwrap();
        assert_eq!(entry_port, relay_port(RELAY_BASE, 3));

        let first = peel_onion(&payload, key_for(&pool, 3)).unwrap();
        assert_eq!(first.next_port, relay_port(RELAY_BASE, 1));

        let second = peel_onion(&first.remainder, key_for(&pool, 1)).unwrap();
        assert_eq!(second.next_port, relay_port(RELAY_BASE, 4));

        let third = peel_onion(&second.remainder, key_for(&pool, 4)).unwrap();
        assert_eq!(third.next_port, 19090);
        assert_eq!(third.remainder, "hello");

        // Peeling out of order ([1, 3, 4]) must fail at the first step.
        assert!(matches!(
            peel_onion(&payload, key_for(&pool, 1)),
            Err(OnionError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn circuits_are_three_distinct_nodes() {
        let pool = test_pool(&[1, 2, 3, 4, 5]);
        let nodes: Vec<NodeEntry> = pool.iter().map(|(e, _)| e.clone()).collect();

        for _ in 0..20 {
            let circuit = select_circuit(&nodes).unwrap();
            assert_eq!(circuit.len(), CIRCUIT_LEN);
            let ids: HashSet<u32> = circuit.iter().map(|hop| hop.node_id).collect();
            assert_eq!(ids.len(), CIRCUIT_LEN);
        }
    }

    #[test]
    fn too_few_nodes_aborts_before_any_traffic() {
        let pool = test_pool(&[1, 2]);
        let nodes: Vec<NodeEntry> = pool.iter().map(|(e, _)| e.clone()).collect();

        assert!(matches!(
            build_onion("hello", 19090, &nodes, RELAY_BASE),
            Err(OnionError::InsufficientNodes { found: 2 })
        ));
    }

    #[test]
    fn short_payload_is_malformed() {
        let pool = test_pool(&[1]);
        assert!(matches!(
            peel_onion("too short", key_for(&pool, 1)),
            Err(OnionError::MalformedPayload)
        ));
    }

    #[test]
    fn key_segment_width_is_stable_across_messages() {
        let pool = test_pool(&[7]);
        let hop = &pool[0].0;

        for message in ["a", "a much longer message body", ""] {
            let (payload, _) = wrap_layers(message, 19090, &[hop], RELAY_BASE).unwrap();

            // The key segment is always exactly 344 chars: splitting there
            // yields a decodable 256-byte RSA ciphertext.
            let key_segment = crypto::decode_b64(&payload.as_bytes()[..RSA_SEGMENT_LEN]).unwrap();
            assert_eq!(key_segment.len(), crypto::RSA_BITS / 8);

            let peeled = peel_onion(&payload, &pool[0].1).unwrap();
            assert_eq!(peeled.remainder, message);
        }
    }
}
