//! Length-prefixed bincode frames over TCP.
//!
//! Every conversation between nodes is a single request frame followed by a
//! single response frame on a fresh connection: best effort, one attempt,
//! no delivery guarantee beyond the peer's acknowledgement.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),
    #[error("peer sent an unexpected response")]
    UnexpectedResponse,
}

pub async fn write_frame<S, T>(stream: &mut S, msg: &T) -> Result<(), TransportError>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let bytes = bincode::serialize(msg)?;
    stream.write_u32(bytes.len() as u32).await?;
    stream.write_all(&bytes).await?;
    Ok(())
}

pub async fn read_frame<S, T>(stream: &mut S) -> Result<T, TransportError>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let len = stream.read_u32().await?;
    let mut buf = vec![0; len as usize];
    stream.read_exact(&mut buf).await?;
    Ok(bincode::deserialize(&buf)?)
}

/// One-shot request/response exchange with the node at `addr`.
pub async fn request<Req, Resp>(addr: &str, req: &Req) -> Result<Resp, TransportError>
where
    Req: Serialize,
    Resp: DeserializeOwned,
{
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
    write_frame(&mut stream, req).await?;
    read_frame(&mut stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{NodeRequest, NodeResponse};

    #[tokio::test]
    async fn frames_round_trip_over_a_socket_pair() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let req: NodeRequest = read_frame(&mut stream).await.unwrap();
            match req {
                NodeRequest::Status => {
                    write_frame(&mut stream, &NodeResponse::Live).await.unwrap();
                }
                other => panic!("unexpected request: {other:?}"),
            }
        });

        let resp: NodeResponse = request(&addr.to_string(), &NodeRequest::Status)
            .await
            .unwrap();
        assert_eq!(resp, NodeResponse::Live);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn connect_failure_names_the_peer() {
        // Port 9 on loopback should refuse immediately.
        let err = request::<_, NodeResponse>("127.0.0.1:9", &NodeRequest::Status)
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Connect { .. }));
    }
}
