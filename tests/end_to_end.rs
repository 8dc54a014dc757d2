//! Boots a full overlay on loopback (registry, five relays, two users)
//! and drives a message from user 0 to user 1 through a three-hop circuit.
//!
//! Ports sit in a high range so the test never collides with a locally
//! running overlay on the default scheme.

use std::time::Duration;

use onionet::config::{Config, Mode, NetworkConfig, PortMap};
use onionet::network;
use onionet::protocol::{NodeRequest, NodeResponse};
use onionet::transport;

fn test_config() -> Config {
    Config {
        mode: Mode::Network,
        ports: PortMap {
            registry: 28080,
            relay_base: 24000,
            user_base: 29090,
        },
        network: NetworkConfig {
            relays: 5,
            users: 2,
        },
        ..Config::default()
    }
}

async fn ask(addr: &str, request: &NodeRequest) -> NodeResponse {
    transport::request(addr, request)
        .await
        .expect("node unreachable")
}

#[tokio::test(flavor = "multi_thread")]
async fn message_traverses_three_relays_to_its_destination() {
    let cfg = test_config();
    network::spawn(cfg.clone()).await.expect("overlay failed to start");

    let sender = format!("127.0.0.1:{}", cfg.ports.user_port(0));
    let recipient = format!("127.0.0.1:{}", cfg.ports.user_port(1));

    let accepted = ask(
        &sender,
        &NodeRequest::SendMessage {
            message: "hello".into(),
            destination_user_id: 1,
        },
    )
    .await;
    assert_eq!(accepted, NodeResponse::Ack);

    // Delivery is asynchronous past the entry hop; poll the recipient.
    let mut received = None;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let NodeResponse::Payload(Some(message)) =
            ask(&recipient, &NodeRequest::LastReceivedMessage).await
        {
            received = Some(message);
            break;
        }
    }
    assert_eq!(received.as_deref(), Some("hello"));

    // The sender recorded the cleartext and a circuit of 3 distinct relays.
    assert_eq!(
        ask(&sender, &NodeRequest::LastSentMessage).await,
        NodeResponse::Payload(Some("hello".into()))
    );
    match ask(&sender, &NodeRequest::LastCircuit).await {
        NodeResponse::Circuit(circuit) => {
            assert_eq!(circuit.len(), 3);
            let mut distinct = circuit.clone();
            distinct.sort_unstable();
            distinct.dedup();
            assert_eq!(distinct.len(), 3, "circuit repeats a relay: {circuit:?}");

            // Every relay on the circuit saw the message pass through.
            for node_id in circuit {
                let relay = format!("127.0.0.1:{}", cfg.ports.relay_port(node_id));
                match ask(&relay, &NodeRequest::LastDestination).await {
                    NodeResponse::Destination(Some(_)) => {}
                    other => panic!("relay {node_id} recorded no destination: {other:?}"),
                }
            }
        }
        other => panic!("expected a circuit, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn relays_answer_status_and_reject_user_introspection() {
    let cfg = Config {
        ports: PortMap {
            registry: 28081,
            relay_base: 25000,
            user_base: 29290,
        },
        network: NetworkConfig { relays: 3, users: 1 },
        ..test_config()
    };
    network::spawn(cfg.clone()).await.expect("overlay failed to start");

    let relay = format!("127.0.0.1:{}", cfg.ports.relay_port(0));
    assert_eq!(ask(&relay, &NodeRequest::Status).await, NodeResponse::Live);
    assert_eq!(
        ask(&relay, &NodeRequest::LastReceivedEncrypted).await,
        NodeResponse::Payload(None)
    );
    assert_eq!(
        ask(&relay, &NodeRequest::LastCircuit).await,
        NodeResponse::Unsupported
    );
}
