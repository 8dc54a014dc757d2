//! Wire types and framing invariants shared by every node.
//!
//! Two widths are protocol-fixed and must match bit-exactly between the
//! sender and every relay: the asymmetric key segment (344 base64
//! characters, the ciphertext size of a 2048-bit RSA key) and the hop
//! address field (10 left-zero-padded ASCII decimal digits). Fixed widths
//! let a receiver split a payload without any length prefix.

use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};

use crate::crypto::RSA_BITS;

/// Every circuit is exactly this many relays, drawn without replacement.
pub const CIRCUIT_LEN: usize = 3;

/// Base64 length of an RSA ciphertext: 256 raw bytes pad out to 344 chars.
pub const RSA_SEGMENT_LEN: usize = (RSA_BITS / 8).div_ceil(3) * 4;

/// Width of the fixed hop address field.
pub const ADDR_WIDTH: usize = 10;

mod serde_rsa_public_key {
    use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
    use rsa::RsaPublicKey;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(key: &RsaPublicKey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let pem = key
            .to_public_key_pem(LineEnding::LF)
            .map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&pem)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<RsaPublicKey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let pem = String::deserialize(deserializer)?;
        RsaPublicKey::from_public_key_pem(&pem).map_err(serde::de::Error::custom)
    }
}

/// One relay as the registry knows it. The relay's listening address is not
/// stored: it is derivable from the node id via the fixed port numbering
/// scheme (relay base port + node id).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NodeEntry {
    pub node_id: u32,
    #[serde(with = "serde_rsa_public_key")]
    pub public_key: RsaPublicKey,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum RegistryRequest {
    Register { entry: NodeEntry },
    ListNodes,
}

#[derive(Serialize, Deserialize, Debug)]
pub enum RegistryResponse {
    Ack,
    NodeList(Vec<NodeEntry>),
}

/// Requests understood by relay and user nodes. Both kinds accept
/// `Message`: a relay forwarding a peeled remainder cannot know whether
/// the next hop is another relay or the final recipient, so both listen
/// for the same envelope. Nodes answer `Unsupported` to introspection
/// requests for state they do not keep.
#[derive(Serialize, Deserialize, Debug)]
pub enum NodeRequest {
    Message { payload: String },
    SendMessage { message: String, destination_user_id: u32 },
    Status,
    LastReceivedEncrypted,
    LastReceivedDecrypted,
    LastDestination,
    LastReceivedMessage,
    LastSentMessage,
    LastCircuit,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum NodeResponse {
    Ack,
    Live,
    Payload(Option<String>),
    Destination(Option<u16>),
    Circuit(Vec<u32>),
    Unsupported,
}

/// Renders a port as the fixed-width hop address field.
pub fn format_hop_address(port: u16) -> String {
    format!("{:0>width$}", port, width = ADDR_WIDTH)
}

/// Parses a hop address field. `None` unless the input is exactly
/// [`ADDR_WIDTH`] ASCII digits encoding a valid port; a decrypted body that
/// fails this check is treated as malformed, never forwarded.
pub fn parse_hop_address(text: &str) -> Option<u16> {
    if text.len() != ADDR_WIDTH || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse::<u32>().ok().and_then(|port| u16::try_from(port).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsa_segment_width_is_protocol_constant() {
        assert_eq!(RSA_SEGMENT_LEN, 344);
    }

    #[test]
    fn hop_address_is_fixed_width() {
        assert_eq!(format_hop_address(80), "0000000080");
        assert_eq!(format_hop_address(19090), "0000019090");
        assert_eq!(format_hop_address(u16::MAX), "0000065535");
    }

    #[test]
    fn hop_address_round_trips() {
        for port in [0, 80, 4003, 19090, u16::MAX] {
            assert_eq!(parse_hop_address(&format_hop_address(port)), Some(port));
        }
    }

    #[test]
    fn hop_address_rejects_malformed_fields() {
        assert_eq!(parse_hop_address("19090"), None);
        assert_eq!(parse_hop_address("00000190900"), None);
        assert_eq!(parse_hop_address("00000x9090"), None);
        assert_eq!(parse_hop_address("0000099999"), None); // beyond u16
        assert_eq!(parse_hop_address(""), None);
    }
}
