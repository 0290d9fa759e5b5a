//! Bulk-Only Transport engine: CBW, optional data phase, CSW.

use log::{debug, warn};
use thiserror::Error;

use crate::commands::{
    CommandBlock,
    cbw::{CBW_LEN, Cbw, Direction},
    csw::{CSW_LEN, Csw},
};
use crate::transport::BulkTransport;

/// Data stage of a command.
#[derive(Debug)]
pub enum DataPhase<'a> {
    None,
    /// Device to host; the buffer length is the expected transfer length.
    In(&'a mut [u8]),
    /// Host to device.
    Out(&'a [u8]),
}

impl DataPhase<'_> {
    pub fn len(&self) -> usize {
        match self {
            DataPhase::None => 0,
            DataPhase::In(buf) => buf.len(),
            DataPhase::Out(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn direction(&self) -> Direction {
        match self {
            // The flag is ignored when no data moves; the devices expect IN.
            DataPhase::None | DataPhase::In(_) => Direction::In,
            DataPhase::Out(_) => Direction::Out,
        }
    }
}

/// A status wrapper that cannot be paired with the command just sent.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    #[error("status wrapper truncated to {len} bytes")]
    ShortStatus { len: usize },
    #[error("bad status signature {found:#010x}")]
    BadSignature { found: u32 },
    #[error("status tag {found} does not match command tag {expected}")]
    TagMismatch { expected: u32, found: u32 },
}

#[derive(Error, Debug)]
pub enum BotError {
    #[error("bulk transfer failed")]
    Transport(#[from] rusb::Error),
    /// A status packet for some other command showed up in the data phase.
    #[error("stray status wrapper (tag {found}) while waiting for data of tag {expected}")]
    StrayStatus { expected: u32, found: u32 },
    #[error("protocol framing error")]
    Framing(#[from] FramingError),
    /// The device answered the data phase with its status, no data was delivered.
    #[error("device sent status {status:#04x} instead of data")]
    UnsolicitedStatus { status: u8 },
}

impl BotError {
    /// True for errors of the USB link itself rather than of the protocol.
    pub fn is_transport(&self) -> bool {
        matches!(self, BotError::Transport(_) | BotError::StrayStatus { .. })
    }
}

/// Runs bulk-only commands over a claimed transport.
///
/// The engine owns the tag counter. Tags start at 1 and grow by one per
/// command; only one engine talks to a device at a time, so a CSW carrying a
/// different tag always belongs to a stale or foreign exchange.
pub struct BulkOnly<T> {
    transport: T,
    tag: u32,
}

impl<T: BulkTransport> BulkOnly<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, tag: 0 }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Tag of the most recently sent command (0 before the first one).
    pub fn last_tag(&self) -> u32 {
        self.tag
    }

    fn next_tag(&mut self) -> u32 {
        self.tag = self.tag.wrapping_add(1);
        self.tag
    }

    /// Send `command`, move its data and collect the status.
    ///
    /// Returns the raw CSW status byte: 0 means the device succeeded, anything
    /// else is a device-level failure the caller interprets. Nothing is retried.
    pub fn execute<C: CommandBlock>(
        &mut self,
        command: &C,
        data: DataPhase<'_>,
    ) -> Result<u8, BotError> {
        let tag = self.next_tag();
        let cbw = Cbw::new(tag, data.len() as u32, data.direction(), command);

        debug!("Start command {:#04x} - tag: {}", cbw.opcode(), tag);

        let written = self.transport.write_bulk(&cbw.to_bytes())?;
        if written != CBW_LEN {
            warn!(
                "Not all of the CBW transferred at out endpoint, {} instead of {}",
                written, CBW_LEN
            );
        }

        match data {
            DataPhase::In(buf) if !buf.is_empty() => {
                let expected = buf.len();
                let received = self.transport.read_bulk(buf)?;
                if received < expected {
                    if Csw::is_status_packet(&buf[..received]) {
                        return self.recover_unsolicited_status(tag, &buf[..received]);
                    }
                    // TODO: a short read of any other length leaves the stream
                    // unsynchronised; settle this against a device that does it.
                    warn!(
                        "Not all data transferred at in endpoint, {} instead of {}",
                        received, expected
                    );
                }
            }
            DataPhase::Out(buf) if !buf.is_empty() => {
                let sent = self.transport.write_bulk(buf)?;
                if sent != buf.len() {
                    warn!(
                        "Not all data transferred at out endpoint, {} instead of {}",
                        sent,
                        buf.len()
                    );
                }
            }
            _ => {}
        }

        let mut raw = [0u8; CSW_LEN];
        let received = self.transport.read_bulk(&mut raw)?;
        let Some(csw) = Csw::parse(&raw[..received]) else {
            return self.framing_failure(FramingError::ShortStatus { len: received });
        };

        if !csw.has_signature() {
            return self.framing_failure(FramingError::BadSignature {
                found: csw.signature,
            });
        }
        if csw.tag != tag {
            return self.framing_failure(FramingError::TagMismatch {
                expected: tag,
                found: csw.tag,
            });
        }

        debug!(
            "CSW status {:#04x} - {}",
            csw.status,
            if csw.status == 0 { "OK" } else { "FAILED" }
        );
        Ok(csw.status)
    }

    fn recover_unsolicited_status(&mut self, tag: u32, raw: &[u8]) -> Result<u8, BotError> {
        let Some(csw) = Csw::parse(raw) else {
            return self.framing_failure(FramingError::ShortStatus { len: raw.len() });
        };

        if !csw.has_signature() || csw.tag != tag {
            warn!(
                "Out of order CSW with tag {} while waiting for data of tag {}",
                csw.tag, tag
            );
            self.clear_in_halt();
            return Err(BotError::StrayStatus {
                expected: tag,
                found: csw.tag,
            });
        }

        warn!(
            "Device returned status {:#04x} in the data phase of tag {}",
            csw.status, tag
        );
        Err(BotError::UnsolicitedStatus { status: csw.status })
    }

    fn framing_failure(&mut self, error: FramingError) -> Result<u8, BotError> {
        warn!("CSW framing error: {error}");
        self.clear_in_halt();
        Err(error.into())
    }

    fn clear_in_halt(&mut self) {
        if let Err(err) = self.transport.clear_in_halt() {
            warn!("Failed to clear halt on in endpoint: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::actions::{IdentifyCommand, NandArea, ReadSectorCommand};
    use crate::commands::write10::Write10Command;
    use crate::transport::{MockReply, MockTransport};

    #[test]
    fn returns_status_and_fills_buffer() {
        let mock = MockTransport::with_responder(|_, _| MockReply::ok(vec![0x5A; 13]));
        let mut bot = BulkOnly::new(mock);

        let mut buf = [0u8; 13];
        let status = bot
            .execute(&IdentifyCommand, DataPhase::In(&mut buf))
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(buf, [0x5A; 13]);
    }

    #[test]
    fn tags_increase_per_command() {
        let mock = MockTransport::with_responder(|_, _| MockReply::status(0));
        let mut bot = BulkOnly::new(mock);

        for _ in 0..3 {
            bot.execute(&IdentifyCommand, DataPhase::None).unwrap();
        }

        let tags: Vec<u32> = bot.transport().commands().iter().map(|c| c.tag).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert_eq!(bot.last_tag(), 3);
    }

    #[test]
    fn nonzero_status_is_not_a_transport_error() {
        let mock = MockTransport::with_responder(|_, _| MockReply::status(1));
        let mut bot = BulkOnly::new(mock);
        assert_eq!(bot.execute(&IdentifyCommand, DataPhase::None).unwrap(), 1);
    }

    #[test]
    fn mismatched_tag_is_a_framing_error() {
        let mock =
            MockTransport::with_responder(|cbw, _| MockReply::status(0).with_tag(cbw.tag + 1));
        let mut bot = BulkOnly::new(mock);

        let err = bot.execute(&IdentifyCommand, DataPhase::None).unwrap_err();
        assert!(matches!(
            err,
            BotError::Framing(FramingError::TagMismatch {
                expected: 1,
                found: 2
            })
        ));
        assert!(!err.is_transport());
        assert_eq!(bot.transport().in_halts_cleared(), 1);
    }

    #[test]
    fn bad_signature_is_a_framing_error() {
        let mut mock = MockTransport::new();
        let mut csw = Csw::new(1, 0, 0).to_bytes();
        csw[0..4].copy_from_slice(b"XXXX");
        mock.queue_in(csw.to_vec());

        let mut bot = BulkOnly::new(mock);
        let err = bot.execute(&IdentifyCommand, DataPhase::None).unwrap_err();
        assert!(matches!(
            err,
            BotError::Framing(FramingError::BadSignature { .. })
        ));
    }

    #[test]
    fn truncated_status_is_a_framing_error() {
        let mut mock = MockTransport::new();
        mock.queue_in(Csw::new(1, 0, 0).to_bytes()[..10].to_vec());

        let mut bot = BulkOnly::new(mock);
        let err = bot.execute(&IdentifyCommand, DataPhase::None).unwrap_err();
        assert!(matches!(
            err,
            BotError::Framing(FramingError::ShortStatus { len: 10 })
        ));
    }

    #[test]
    fn status_in_place_of_data_is_a_hard_failure() {
        // An empty reply makes the mock send only the CSW.
        let mock = MockTransport::with_responder(|_, _| MockReply::status(0x01));
        let mut bot = BulkOnly::new(mock);

        let mut sector = [0u8; 512];
        let err = bot
            .execute(
                &ReadSectorCommand::new(0, 8, NandArea::Logical),
                DataPhase::In(&mut sector),
            )
            .unwrap_err();
        assert!(matches!(err, BotError::UnsolicitedStatus { status: 0x01 }));
        assert_eq!(bot.transport().in_halts_cleared(), 0);
    }

    #[test]
    fn stray_status_in_data_phase_clears_halt() {
        let mut mock = MockTransport::new();
        mock.queue_in(Csw::new(99, 0, 0).to_bytes().to_vec());

        let mut bot = BulkOnly::new(mock);
        let mut sector = [0u8; 512];
        let err = bot
            .execute(
                &ReadSectorCommand::new(0, 8, NandArea::Logical),
                DataPhase::In(&mut sector),
            )
            .unwrap_err();

        assert!(matches!(
            err,
            BotError::StrayStatus {
                expected: 1,
                found: 99
            }
        ));
        assert!(err.is_transport());
        assert_eq!(bot.transport().in_halts_cleared(), 1);
    }

    #[test]
    fn other_short_reads_still_collect_a_status() {
        let mut mock = MockTransport::new();
        mock.queue_in(vec![1, 2, 3]);
        mock.queue_in(Csw::new(1, 509, 0).to_bytes().to_vec());

        let mut bot = BulkOnly::new(mock);
        let mut sector = [0u8; 512];
        let status = bot
            .execute(
                &ReadSectorCommand::new(0, 0, NandArea::Logical),
                DataPhase::In(&mut sector),
            )
            .unwrap();
        assert_eq!(status, 0);
        assert_eq!(&sector[..3], &[1, 2, 3]);
    }

    #[test]
    fn timeout_surfaces_as_transport_error() {
        let mut bot = BulkOnly::new(MockTransport::new());
        let err = bot.execute(&IdentifyCommand, DataPhase::None).unwrap_err();
        assert!(matches!(err, BotError::Transport(rusb::Error::Timeout)));
    }

    #[test]
    fn out_phase_sends_data_after_the_wrapper() {
        let mock = MockTransport::with_responder(|_, _| MockReply::status(0));
        let mut bot = BulkOnly::new(mock);

        let sector = [0x11u8; 512];
        bot.execute(&Write10Command::new(0, 5), DataPhase::Out(&sector))
            .unwrap();

        let writes = bot.transport().writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].len(), CBW_LEN);
        assert_eq!(writes[0][12], 0x00);
        assert_eq!(writes[1], sector.to_vec());
    }
}
