//! Bulk endpoint abstraction.
//!
//! The bulk-only engine only needs three things from a device: push bytes to
//! the OUT endpoint, pull bytes from the IN endpoint and clear a stalled IN
//! endpoint. [`UsbMassStorage`](crate::storage::UsbMassStorage) provides them
//! over `rusb`, [`mock::MockTransport`] provides them in memory.

pub mod mock;

pub use mock::{MockReply, MockTransport};

/// A claimed pair of bulk endpoints.
pub trait BulkTransport {
    /// Write to the OUT endpoint. Returns the number of bytes sent.
    fn write_bulk(&mut self, data: &[u8]) -> rusb::Result<usize>;

    /// Read from the IN endpoint into `buf`. Returns the number of bytes received.
    fn read_bulk(&mut self, buf: &mut [u8]) -> rusb::Result<usize>;

    /// Clear a halt condition on the IN endpoint.
    fn clear_in_halt(&mut self) -> rusb::Result<()>;
}

impl<T: BulkTransport + ?Sized> BulkTransport for &mut T {
    fn write_bulk(&mut self, data: &[u8]) -> rusb::Result<usize> {
        (**self).write_bulk(data)
    }

    fn read_bulk(&mut self, buf: &mut [u8]) -> rusb::Result<usize> {
        (**self).read_bulk(buf)
    }

    fn clear_in_halt(&mut self) -> rusb::Result<()> {
        (**self).clear_in_halt()
    }
}
