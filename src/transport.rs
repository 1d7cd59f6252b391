use crate::error::Error;
use crate::prelude::*;
use crate::{ascii, checksum};

use async_trait::async_trait;
use bytes::BytesMut;
use futures::future::BoxFuture;
use net2::TcpStreamExt;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

/// Byte exchange with one device. Implementations know nothing about the
/// protocol beyond where a response ends.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Spaced upper-case hex, `"51 50 49 47 53"`.
pub fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses hex with or without whitespace between bytes.
pub fn from_hex(text: &str) -> Result<Vec<u8>, Error> {
    let compact: String = text.split_whitespace().collect();
    hex::decode(&compact).map_err(|err| Error::TransportFailure(format!("bad hex response: {}", err)))
}

pub type HexSendFn = dyn Fn(String) -> BoxFuture<'static, Result<String, Error>> + Send + Sync;

/// Adapts a hex-speaking send function (cloud relays, debug consoles) to
/// [`Transport`].
pub struct HexTransport {
    send: Box<HexSendFn>,
}

impl HexTransport {
    pub fn new<F>(send: F) -> Self
    where
        F: Fn(String) -> BoxFuture<'static, Result<String, Error>> + Send + Sync + 'static,
    {
        Self {
            send: Box::new(send),
        }
    }
}

#[async_trait]
impl Transport for HexTransport {
    async fn send(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let response = (self.send)(to_hex(request)).await?;
        from_hex(&response)
    }
}

/// Where a response ends on a raw stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseFraming {
    /// ASCII protocol, ends at this byte (CR)
    Terminator(u8),
    /// length implied by the Modbus-RTU header
    ModbusRtu,
}

impl ResponseFraming {
    /// Length of the complete response at the start of `buf`, once there is
    /// one. A terminator byte only ends an ASCII frame when the checksum in
    /// front of it matches, since the checksum bytes may themselves be CR.
    pub fn frame_len(&self, buf: &[u8]) -> Option<usize> {
        match self {
            Self::Terminator(t) => {
                let len = buf.len();
                if len < ascii::packet::MIN_RESPONSE_LEN || buf[len - 1] != *t {
                    return None;
                }
                let received = checksum::wire_crc([buf[len - 3], buf[len - 2]]);
                (checksum::crc16(&buf[..len - 3]) == received).then_some(len)
            }
            Self::ModbusRtu => {
                let len = match buf {
                    [_, function, ..] if function & 0x80 != 0 => 5,
                    [_, 0x10, ..] => 8,
                    [_, _, byte_count, ..] => 3 + usize::from(*byte_count) + 2,
                    _ => return None,
                };
                (buf.len() >= len).then_some(len)
            }
        }
    }

    pub fn is_complete(&self, buf: &[u8]) -> bool {
        self.frame_len(buf).is_some()
    }
}

const TCP_KEEPALIVE_SECS: u64 = 60;
const MAX_RESPONSE_SIZE: usize = 4096;

/// Serial-to-TCP bridge connection, opened lazily and dropped after any
/// failure so the next exchange reconnects.
pub struct TcpTransport {
    host: String,
    port: u16,
    framing: ResponseFraming,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    pub fn new(host: &str, port: u16, framing: ResponseFraming) -> Self {
        Self {
            host: host.to_owned(),
            port,
            framing,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            stream: Mutex::new(None),
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    async fn connect(&self) -> Result<TcpStream, Error> {
        let stream = match tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(Error::TransportFailure(format!(
                    "connect to {}:{} failed: {}",
                    self.host, self.port, e
                )))
            }
            Err(_) => return Err(Error::TransportTimeout(self.connect_timeout)),
        };

        let std_stream = stream.into_std()?;
        if let Err(e) = std_stream.set_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS))) {
            warn!("Failed to set TCP keepalive: {}", e);
        }
        let stream = TcpStream::from_std(std_stream)?;
        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to set TCP_NODELAY: {}", e);
        }

        info!("connected to {}:{}", self.host, self.port);
        Ok(stream)
    }

    /// Discards bytes that arrived after the last response, so they cannot
    /// be read as the answer to the next request.
    fn drain_stale(&self, stream: &TcpStream) -> Result<(), Error> {
        let mut scratch = [0u8; 256];
        let mut stale = 0;
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => {
                    return Err(Error::TransportFailure("connection closed by peer".to_owned()))
                }
                Ok(n) => stale += n,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            }
        }
        if stale > 0 {
            warn!("{}:{} discarded {} stale bytes", self.host, self.port, stale);
        }
        Ok(())
    }

    async fn exchange(&self, stream: &mut TcpStream, request: &[u8]) -> Result<Vec<u8>, Error> {
        stream.write_all(request).await?;

        let mut buf = BytesMut::with_capacity(256);
        let len = loop {
            if let Some(len) = self.framing.frame_len(&buf) {
                break len;
            }
            if buf.len() >= MAX_RESPONSE_SIZE {
                return Err(Error::TransportFailure(format!(
                    "response exceeds {} bytes",
                    MAX_RESPONSE_SIZE
                )));
            }

            let n = match tokio::time::timeout(self.read_timeout, stream.read_buf(&mut buf)).await {
                Ok(r) => r?,
                Err(_) => return Err(Error::TransportTimeout(self.read_timeout)),
            };
            if n == 0 {
                return Err(Error::TransportFailure("connection closed by peer".to_owned()));
            }
        };

        if len != buf.len() {
            return Err(Error::TransportFailure(format!(
                "{} bytes trailing a {} byte response",
                buf.len() - len,
                len
            )));
        }

        Ok(buf.to_vec())
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        let mut guard = self.stream.lock().await;

        let mut stream = match guard.take() {
            Some(stream) => match self.drain_stale(&stream) {
                Ok(()) => stream,
                Err(e) => {
                    debug!("{}:{} reconnecting: {}", self.host, self.port, e);
                    self.connect().await?
                }
            },
            None => self.connect().await?,
        };

        debug!("TX {}:{} {}", self.host, self.port, to_hex(request));
        let response = self.exchange(&mut stream, request).await?;
        debug!("RX {}:{} {}", self.host, self.port, to_hex(&response));

        // only a clean exchange puts the connection back
        *guard = Some(stream);
        Ok(response)
    }
}
