//! In-memory bulk transport for testing.
//!
//! Without a responder the mock is purely scripted: queue IN packets with
//! [`MockTransport::queue_in`] and inspect what the host wrote afterwards.
//! With a responder it behaves like a bulk-only device: every CBW written to
//! it is parsed and answered with a data packet (if any) and a CSW.

use std::collections::VecDeque;

use super::BulkTransport;
use crate::commands::{cbw::Cbw, cbw::Direction, csw::Csw};

/// How the simulated device answers one command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockReply {
    /// Sent on IN before the status. Empty means no data packet at all.
    pub data: Vec<u8>,
    pub status: u8,
    /// Tag echoed in the CSW. `None` echoes the command's own tag.
    pub tag: Option<u32>,
}

impl MockReply {
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// A status-only reply.
    pub fn status(status: u8) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = Some(tag);
        self
    }
}

type Responder = Box<dyn FnMut(&Cbw, &[u8]) -> MockReply>;

/// Mock transport for unit testing the engine and everything above it.
#[derive(Default)]
pub struct MockTransport {
    responder: Option<Responder>,
    incoming: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    pending_out: Option<Cbw>,
    in_halts_cleared: usize,
}

impl MockTransport {
    /// A scripted transport with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// A simulated device. The responder sees every command and, for OUT
    /// commands, the data the host sent with it.
    pub fn with_responder(responder: impl FnMut(&Cbw, &[u8]) -> MockReply + 'static) -> Self {
        Self {
            responder: Some(Box::new(responder)),
            ..Self::default()
        }
    }

    /// Queue a packet to be returned by the next IN read.
    pub fn queue_in(&mut self, bytes: impl Into<Vec<u8>>) {
        self.incoming.push_back(bytes.into());
    }

    /// All captured OUT writes, in order.
    pub fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// Every CBW the host sent so far.
    pub fn commands(&self) -> Vec<Cbw> {
        self.writes.iter().filter_map(|w| Cbw::parse(w)).collect()
    }

    pub fn in_halts_cleared(&self) -> usize {
        self.in_halts_cleared
    }

    fn respond(&mut self, cbw: &Cbw, out_data: &[u8]) {
        let Some(responder) = self.responder.as_mut() else {
            return;
        };
        let reply = responder(cbw, out_data);

        if !reply.data.is_empty() {
            self.incoming.push_back(reply.data.clone());
        }

        let delivered = if cbw.direction == Direction::Out {
            out_data.len()
        } else {
            reply.data.len()
        };
        let residue = (cbw.data_transfer_length as usize).saturating_sub(delivered) as u32;
        let csw = Csw::new(reply.tag.unwrap_or(cbw.tag), residue, reply.status);
        self.incoming.push_back(csw.to_bytes().to_vec());
    }
}

impl BulkTransport for MockTransport {
    fn write_bulk(&mut self, data: &[u8]) -> rusb::Result<usize> {
        self.writes.push(data.to_vec());

        if let Some(cbw) = self.pending_out.take() {
            self.respond(&cbw, data);
        } else if let Some(cbw) = Cbw::parse(data) {
            if cbw.direction == Direction::Out && cbw.data_transfer_length > 0 {
                self.pending_out = Some(cbw);
            } else {
                self.respond(&cbw, &[]);
            }
        }

        Ok(data.len())
    }

    fn read_bulk(&mut self, buf: &mut [u8]) -> rusb::Result<usize> {
        let packet = self.incoming.pop_front().ok_or(rusb::Error::Timeout)?;
        if packet.len() > buf.len() {
            return Err(rusb::Error::Overflow);
        }
        buf[..packet.len()].copy_from_slice(&packet);
        Ok(packet.len())
    }

    fn clear_in_halt(&mut self) -> rusb::Result<()> {
        self.in_halts_cleared += 1;
        Ok(())
    }
}
