//! SFTP subsystem attachment.
//!
//! A channel becomes an SFTP subsystem when the peer requests it; from
//! then on its byte stream is reinterpreted as framed protocol messages.
//! Decoding and replying are the host's concern, behind [`SftpSession`].

#[allow(unused_imports)]
use {
    crate::error::{Error, Result, TrapBug},
    log::{debug, error, info, log, trace, warn},
};

use crate::channel::{ChanId, SessionId};

/// A server-side SFTP subsystem bound to one channel.
///
/// Owned by the engine once attached, never detached.
/// [`server_init`](Self::server_init) is the one-time version handshake;
/// a failure is recoverable and the engine retries it on every drain
/// until it succeeds or the channel closes.
pub trait SftpSession {
    /// A fully decoded inbound SFTP protocol message.
    ///
    /// Opaque to the engine, which only counts and forwards them.
    type Message;

    fn server_init(&mut self) -> Result<()>;

    /// Non-blocking pull of the next decoded message.
    ///
    /// `Ok(None)` when nothing is buffered. An `Err` is fatal to the
    /// channel, like a transport read failure.
    fn next_message(&mut self) -> Result<Option<Self::Message>>;
}

/// One decoded SFTP message as handed to the upper layer.
///
/// Stamped with the originating session and channel so replies can be
/// routed without the upper layer holding channel state of its own.
#[derive(Debug)]
pub struct SftpEnvelope<M> {
    pub session: SessionId,
    pub channel: ChanId,
    pub message: M,
}
