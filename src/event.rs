//! Notification sinks the engine calls into as it produces units.

#[allow(unused_imports)]
use {
    crate::error::{Error, Result, TrapBug},
    log::{debug, error, info, log, trace, warn},
};

use crate::channel::ChanId;
use crate::sftp::SftpEnvelope;

/// Upper layer notifications, delivered synchronously as each unit is
/// produced.
///
/// Default implementations drop the unit silently; an application
/// overrides only the kinds it listens for. Notifications for a single
/// channel arrive strictly in production order.
///
/// A returned error propagates out of the engine call that produced the
/// unit. The engine makes no attempt to restore channel state afterwards,
/// so handlers should not fail casually.
pub trait EventSink<M> {
    /// One chunk of raw channel data.
    ///
    /// The slice is only valid for the duration of the call; copy it to
    /// keep it. Never fired for a channel in SFTP mode.
    fn on_data(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    /// Reserved for non-SFTP structured messages.
    ///
    /// Part of the dispatch contract but unused by the base engine.
    fn on_message(&mut self, _msg: SftpEnvelope<M>) -> Result<()> {
        Ok(())
    }

    /// One decoded SFTP protocol message.
    fn on_sftp_message(&mut self, _msg: SftpEnvelope<M>) -> Result<()> {
        Ok(())
    }

    /// The channel has transitioned to closed.
    ///
    /// Fired exactly once per channel, after the multiplexer has already
    /// been told to deregister it.
    fn on_close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Deregistration sink invoked during the close transition.
///
/// Fires before the upper layer's
/// [`on_close`](EventSink::on_close), so by the time the application
/// observes the close the channel can no longer be routed new events.
pub trait CloseHook {
    fn channel_closed(&mut self, id: ChanId);
}
