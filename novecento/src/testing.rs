//! In-memory transport for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use novecento_core::constants::RESPONSE_SIZE;
use novecento_transport::{Error, Result, Transport};

enum Reply {
    Data(Bytes),
    Timeout,
}

/// Replays scripted replies and records everything sent
///
/// An exhausted script reads as a closed connection.
pub(crate) struct ScriptedTransport {
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    pub buffer_requests: Vec<usize>,
    replies: VecDeque<Reply>,
    connected: bool,
    fail_sends: bool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            sent: Arc::default(),
            buffer_requests: Vec::new(),
            replies: VecDeque::new(),
            connected: true,
            fail_sends: false,
        }
    }

    pub fn with_reply(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.replies.push_back(Reply::Data(Bytes::from(data.into())));
        self
    }

    pub fn with_timeout(mut self) -> Self {
        self.replies.push_back(Reply::Timeout);
        self
    }

    /// Frames sent so far
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Shared view of the sent frames, usable after the transport moved
    pub fn sent_log(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        Arc::clone(&self.sent)
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    fn next(&mut self, max_len: usize) -> Result<Bytes> {
        match self.replies.pop_front() {
            None => Err(Error::ConnectionClosed),
            Some(Reply::Timeout) => Err(Error::ReadTimeout),
            Some(Reply::Data(mut data)) => {
                if data.len() > max_len {
                    let rest = data.split_off(max_len);
                    self.replies.push_front(Reply::Data(rest));
                }
                Ok(data)
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        if !self.connected {
            return Err(Error::NotConnected);
        }
        if self.fail_sends {
            return Err(Error::ConnectionClosed);
        }
        self.sent.lock().unwrap().push(data.to_vec());
        Ok(())
    }

    async fn receive(&mut self, max_len: usize, _timeout: Duration) -> Result<BytesMut> {
        let data = self.next(max_len)?;
        Ok(BytesMut::from(&data[..]))
    }

    async fn receive_exact(&mut self, len: usize, _timeout: Duration) -> Result<BytesMut> {
        let data = self.next(len)?;
        if data.len() < len {
            return Err(Error::ShortRead {
                expected: len,
                actual: data.len(),
            });
        }
        Ok(BytesMut::from(&data[..]))
    }

    fn set_receive_buffer_size(&mut self, bytes: usize) -> Result<usize> {
        self.buffer_requests.push(bytes);
        Ok(bytes)
    }

    fn remote_addr(&self) -> String {
        "scripted".to_string()
    }
}

/// A 20-byte response echoing `code` followed by `payload`
pub(crate) fn response(code: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0u8; RESPONSE_SIZE];
    bytes[0] = code;
    bytes[1..1 + payload.len()].copy_from_slice(payload);
    bytes
}

/// A settings response with the given probe type codes and status
pub(crate) fn settings(type_codes: [u8; 10], status: u8) -> Vec<u8> {
    novecento_core::SettingsResponse::new(type_codes, status)
        .raw()
        .as_bytes()
        .to_vec()
}
