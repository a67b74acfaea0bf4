use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use mqtt_fuzz::{
    codec::RawPacketCodec,
    types::{DecodeError, EncodeError},
};
use std::{io, time::Duration};
use tokio::{net::TcpStream, time};
use tokio_util::codec::Framed;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to send session stream: {0}")]
    Send(#[source] EncodeError),
    #[error("failed to read broker response: {0}")]
    Receive(#[source] io::Error),
    #[error("broker response is not framed as MQTT: {0}")]
    Response(#[source] DecodeError),
}

/// What came back from the broker for one session stream.
#[derive(Debug, Default)]
pub struct Exchange {
    /// Whole packets read before the response window closed.
    pub responses: Vec<Bytes>,
    /// The broker reset or aborted the connection.
    pub reset: bool,
    /// Bytes of a packet the broker started but never finished before
    /// closing the connection.
    pub partial: Option<Bytes>,
}

fn is_reset(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Opens a fresh connection per session stream and closes it afterwards.
#[derive(Debug, Clone)]
pub struct BrokerTransport {
    addr: String,
    response_delay: Duration,
}

impl BrokerTransport {
    pub fn new(host: &str, port: u16, response_delay: Duration) -> Self {
        Self { addr: format!("{}:{}", host, port), response_delay }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Writes `stream` and collects response packets for up to the response
    /// delay. A connection reset or a close in the middle of a packet ends the
    /// exchange without an error.
    pub async fn send_session(&self, stream: Bytes) -> Result<Exchange, TransportError> {
        let socket = TcpStream::connect(&self.addr)
            .await
            .map_err(|source| TransportError::Connect { addr: self.addr.clone(), source })?;

        let mut framed = Framed::new(socket, RawPacketCodec::new());
        let mut exchange = Exchange::default();

        match framed.send(stream).await {
            Ok(()) => {},
            Err(EncodeError::Io(e)) if is_reset(&e) => {
                exchange.reset = true;
                return Ok(exchange);
            },
            Err(e) => return Err(TransportError::Send(e)),
        }

        let deadline = time::Instant::now() + self.response_delay;

        loop {
            match time::timeout_at(deadline, framed.next()).await {
                Err(_) | Ok(None) => break,
                Ok(Some(Ok(packet))) => exchange.responses.push(packet),
                Ok(Some(Err(DecodeError::TruncatedStream(rest)))) => {
                    exchange.partial = Some(rest);
                    break;
                },
                Ok(Some(Err(DecodeError::Io(e)))) if is_reset(&e) => {
                    exchange.reset = true;
                    break;
                },
                Ok(Some(Err(DecodeError::Io(e)))) => return Err(TransportError::Receive(e)),
                Ok(Some(Err(e))) => return Err(TransportError::Response(e)),
            }
        }

        // The broker may already be gone; there is nothing left to flush.
        let _ = framed.close().await;

        Ok(exchange)
    }
}
