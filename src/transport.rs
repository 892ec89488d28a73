//! The boundary between the channel engine and the host SSH transport.

#[allow(unused_imports)]
use {
    crate::error::{Error, Result, TrapBug},
    log::{debug, error, info, log, trace, warn},
};

/// Outcome of a non-blocking channel read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadStatus {
    /// `len` bytes were placed at the start of the buffer.
    ///
    /// A zero length is treated the same as [`Pending`](Self::Pending).
    Data(usize),
    /// Nothing buffered, a read would have blocked.
    Pending,
    /// The peer has finished sending on this channel.
    ///
    /// Closure itself arrives separately through the transport's EOF or
    /// close event, this just terminates the current drain loop.
    Eof,
}

/// A non-blocking handle to one multiplexed SSH channel.
///
/// The engine takes exclusive ownership of the handle at construction
/// and drops it exactly once, during the close transition.
/// Implementations must release the underlying resource in `Drop`; there
/// is no separate free step.
///
/// Every method is non-blocking by contract. An `Err` from
/// [`read_nonblocking`](Self::read_nonblocking) is fatal to the channel
/// and should use [`Error::Transport`].
pub trait ChannelIo {
    /// Identity of the low-level handle.
    ///
    /// Used by the multiplexer to route transport events to the engine
    /// instance owning the handle.
    type Token: PartialEq;

    fn token(&self) -> Self::Token;

    /// Reads whatever is currently buffered, up to `buf.len()` bytes.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> Result<ReadStatus>;

    /// Queues bytes for transmission to the peer.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Signals half-close, no more data will be sent from this side.
    fn send_eof(&mut self) -> Result<()>;

    /// Reports a command exit status to the peer.
    fn send_exit_status(&mut self, status: u32) -> Result<()>;
}
