#![allow(dead_code)]

use async_trait::async_trait;
use dess_bridge::checksum;
use dess_bridge::error::Error;
use dess_bridge::transport::Transport;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory device: answers each known request with a canned response.
#[derive(Default)]
pub struct ScriptedTransport {
    responses: HashMap<Vec<u8>, Result<Vec<u8>, Error>>,
    delay: Option<Duration>,
    requests: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, request: Vec<u8>, response: Vec<u8>) -> Self {
        self.responses.insert(request, Ok(response));
        self
    }

    pub fn fail(mut self, request: Vec<u8>, err: Error) -> Self {
        self.responses.insert(request, Err(err));
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &[u8]) -> Result<Vec<u8>, Error> {
        self.requests.lock().unwrap().push(request.to_vec());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.responses
            .get(request)
            .cloned()
            .unwrap_or_else(|| Err(Error::TransportFailure("no scripted response".to_owned())))
    }
}

pub struct Factory;
impl Factory {
    /// `payload + crc + CR`, as an ASCII-protocol device answers.
    pub fn ascii_frame(payload: &str) -> Vec<u8> {
        let mut r = checksum::append_crc(payload.as_bytes());
        r.push(b'\r');
        r
    }

    pub fn qpigs_payload() -> &'static str {
        "(230.0 50.0 230.0 50.0 0800 0600 030 392 52.4 010 062 0035 01.2 380.5 52.40 00000 00010110 00 00 00456 010 0 00 0000"
    }

    pub fn qpiri_payload() -> &'static str {
        "(230.0 21.7 230.0 50.0 21.7 5000 5000 48.0 46.0 42.0 56.4 54.0 2 30 060 0 2 3 9 01 0 0 54.0 0 1 200 0 000"
    }

    pub fn qpigs2_payload() -> &'static str {
        "(02.1 310.4 00651"
    }

    /// A valid Read-Holding-Registers response.
    pub fn read_response(slave_id: u8, values: &[u16]) -> Vec<u8> {
        let mut data = vec![slave_id, 0x03, (values.len() * 2) as u8];
        for v in values {
            data.extend_from_slice(&v.to_be_bytes());
        }
        checksum::append_crc(&data)
    }

    /// Registers packed two ASCII bytes each, high byte first, NUL padded.
    pub fn ascii_registers(text: &str, words: usize) -> Vec<u16> {
        let mut bytes = text.as_bytes().to_vec();
        bytes.resize(words * 2, 0);
        bytes
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c[1]]))
            .collect()
    }

    /// Registers 171..=237 of a battery-powered inverter.
    pub fn runtime_registers() -> Vec<u16> {
        let mut regs = vec![0u16; 67];
        let mut set = |address: usize, value: u16| regs[address - 171] = value;

        set(171, 1);
        set(184, 7);
        set(201, 2); // battery mode
        set(202, 2301);
        set(203, 5000);
        set(204, 120);
        set(210, 2300);
        set(212, 5000);
        set(213, 600);
        set(214, 650);
        set(215, 539);
        set(216, 30);
        set(217, 160);
        set(219, 3805);
        set(220, 12);
        set(223, 456);
        set(225, 12);
        set(227, 41);
        set(229, 80);
        // pv connected, battery discharging, load on
        set(231, 0b01_10_00_01);

        for (i, v) in Self::ascii_registers("ANERN-5K", 12).into_iter().enumerate() {
            regs[172 - 171 + i] = v;
        }
        for (i, v) in Self::ascii_registers("SN123", 12).into_iter().enumerate() {
            regs[186 - 171 + i] = v;
        }

        regs
    }
}
