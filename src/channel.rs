#[allow(unused_imports)]
use {
    crate::error::{self, Error, Result, TrapBug},
    log::{debug, error, info, log, trace, warn},
};

use heapless::Vec;
use pretty_hex::PrettyHex;

use crate::config::{MAX_CHANNELS, READ_CHUNK};
use crate::event::{CloseHook, EventSink};
use crate::sftp::{SftpEnvelope, SftpSession};
use crate::transport::{ChannelIo, ReadStatus};

/// Channel engine identity.
///
/// Monotonically assigned by the owning [`ChannelMux`], unique for its
/// lifetime. Used for diagnostics and close-hook correlation only; it is
/// not an SSH wire channel number.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ChanId(pub u32);

impl core::fmt::Display for ChanId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Non-owning reference to the SSH session a channel is multiplexed on.
///
/// The engine never manages the session's lifecycle through this; it is
/// only used to stamp outgoing [`SftpEnvelope`]s.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct SessionId(pub u32);

impl core::fmt::Display for SessionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        self.0.fmt(f)
    }
}

/// Drives non-blocking I/O for one multiplexed SSH channel.
///
/// An engine is created in plain mode when the transport accepts a new
/// logical channel; [`attach_sftp`](Self::attach_sftp) fixes it into SFTP
/// mode. Both that transition and the close transition are one-way.
///
/// The host transport invokes [`drain`](Self::drain) whenever the socket
/// underlying the session is readable. One notification is emitted per
/// unit produced: a byte chunk in plain mode, a decoded message in SFTP
/// mode. Peer EOF and close events both route to the single close path,
/// which releases the owned handle exactly once.
///
/// Notification sinks are passed into each call rather than stored, so
/// the upper layer keeps ownership of its own state.
pub struct ChannelEngine<C: ChannelIo, F: SftpSession> {
    id: ChanId,
    session: SessionId,
    /// `None` once the channel has closed. Taking the handle out is the
    /// single release of the underlying resource.
    io: Option<C>,
    /// Present only for an SFTP subsystem channel. Never detached.
    sftp: Option<F>,
    sftp_initialized: bool,
}

impl<C: ChannelIo, F: SftpSession> ChannelEngine<C, F> {
    pub fn new(session: SessionId, id: ChanId, io: C) -> Self {
        trace!("new channel engine {id}");
        ChannelEngine { id, session, io: Some(io), sftp: None, sftp_initialized: false }
    }

    pub fn id(&self) -> ChanId {
        self.id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_closed(&self) -> bool {
        self.io.is_none()
    }

    pub fn is_sftp(&self) -> bool {
        self.sftp.is_some()
    }

    /// Fixes this channel into SFTP mode.
    ///
    /// Must be called at most once, before the first drain that should
    /// see SFTP semantics. A second call is a caller error; the first
    /// attachment wins.
    pub fn attach_sftp(&mut self, sftp: F) {
        debug_assert!(self.sftp.is_none());
        if self.sftp.is_none() {
            self.sftp = Some(sftp);
        }
    }

    /// Identity test used by the multiplexer to route low-level events.
    ///
    /// Always false once the channel has closed.
    pub fn is_channel(&self, token: &C::Token) -> bool {
        self.io.as_ref().map_or(false, |io| io.token() == *token)
    }

    fn io_mut(&mut self) -> Result<&mut C> {
        self.io.as_mut().ok_or(error::ChannelClosed.build())
    }

    /// Forwards bytes to the peer. Errors once closed.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.io_mut()?.write(data)
    }

    /// Forwards a command exit status to the peer. Errors once closed.
    pub fn send_exit_status(&mut self, status: u32) -> Result<()> {
        self.io_mut()?.send_exit_status(status)
    }

    /// Signals half-close to the peer. Errors once closed.
    pub fn send_eof(&mut self) -> Result<()> {
        self.io_mut()?.send_eof()
    }

    /// Drains everything currently buffered, emitting one notification
    /// per unit produced.
    ///
    /// Returns the unit count; `0` means the peer had nothing for us.
    /// A closed channel always returns `Ok(0)`.
    ///
    /// In SFTP mode a failed subsystem init is recoverable: it is logged,
    /// the call returns `Ok(0)` and init is retried on the next drain.
    /// A transport read failure instead runs the close path before the
    /// error is returned.
    pub fn drain<E, D>(&mut self, sink: &mut E, hook: &mut D) -> Result<usize>
    where
        E: EventSink<F::Message>,
        D: CloseHook,
    {
        if self.is_closed() {
            return Ok(0);
        }
        match self.pull(sink) {
            Err(e @ Error::Transport { .. }) => {
                warn!("read failure on channel {}, closing: {e}", self.id);
                self.shutdown(sink, hook)?;
                Err(e)
            }
            r => r,
        }
    }

    /// Peer sent EOF. The peer is finished with us; runs the close path.
    pub fn notify_eof<E, D>(&mut self, sink: &mut E, hook: &mut D) -> Result<()>
    where
        E: EventSink<F::Message>,
        D: CloseHook,
    {
        trace!("eof from peer on channel {}", self.id);
        self.close(sink, hook)
    }

    /// Peer closed the channel. Same shutdown path as EOF.
    pub fn notify_close<E, D>(&mut self, sink: &mut E, hook: &mut D) -> Result<()>
    where
        E: EventSink<F::Message>,
        D: CloseHook,
    {
        trace!("close from peer on channel {}", self.id);
        self.close(sink, hook)
    }

    /// Peer delivered a terminal signal.
    ///
    /// Accepted but has no effect on engine state; signal semantics are
    /// out of scope.
    pub fn notify_signal(&mut self, sig: &str) {
        debug!("ignoring signal {sig:?} on channel {}", self.id);
    }

    /// Closes the channel.
    ///
    /// One last-chance drain to flush data racing the close signal, then
    /// the handles are released, the deregistration hook fires, and
    /// finally the upper layer's `on_close`. Each fires exactly once per
    /// channel lifetime; a second `close` call is a no-op.
    pub fn close<E, D>(&mut self, sink: &mut E, hook: &mut D) -> Result<()>
    where
        E: EventSink<F::Message>,
        D: CloseHook,
    {
        if self.is_closed() {
            return Ok(());
        }
        self.shutdown(sink, hook)
    }

    // The single close transition. Callers must have checked !is_closed().
    fn shutdown<E, D>(&mut self, sink: &mut E, hook: &mut D) -> Result<()>
    where
        E: EventSink<F::Message>,
        D: CloseHook,
    {
        // One last read. Failures can't save the channel at this point,
        // they are reported once the transition has completed.
        let flush = self.pull(sink);
        trace!("channel {} closed", self.id);
        // Dropping the handles is the release. No further use is possible.
        self.io = None;
        self.sftp = None;
        hook.channel_closed(self.id);
        sink.on_close()?;
        flush?;
        Ok(())
    }

    // The drain loop proper. Leaves lifecycle state alone; callers route
    // fatal errors through shutdown().
    fn pull<E>(&mut self, sink: &mut E) -> Result<usize>
    where
        E: EventSink<F::Message>,
    {
        if self.sftp.is_some() {
            self.pull_sftp(sink)
        } else {
            self.pull_plain(sink)
        }
    }

    fn pull_plain<E>(&mut self, sink: &mut E) -> Result<usize>
    where
        E: EventSink<F::Message>,
    {
        let io = self.io.as_mut().trap()?;
        let mut buf = [0u8; READ_CHUNK];
        let mut produced = 0;
        loop {
            match io.read_nonblocking(&mut buf)? {
                ReadStatus::Data(len) if len > 0 => {
                    let data = &buf[..len];
                    trace!("channel {} read:\n{:#?}", self.id, data.hex_dump());
                    sink.on_data(data)?;
                    produced += 1;
                }
                _ => break,
            }
        }
        Ok(produced)
    }

    fn pull_sftp<E>(&mut self, sink: &mut E) -> Result<usize>
    where
        E: EventSink<F::Message>,
    {
        let sftp = self.sftp.as_mut().trap()?;

        if !self.sftp_initialized {
            if let Err(e) = sftp.server_init() {
                // The subsystem just isn't ready yet. Tried again on the
                // next drain.
                debug!("sftp init failed on channel {}: {e}", self.id);
                return Ok(0);
            }
            self.sftp_initialized = true;
            debug!("sftp subsystem ready on channel {}", self.id);
        }

        let mut produced = 0;
        while let Some(message) = sftp.next_message()? {
            trace!("channel {} sftp message", self.id);
            sink.on_sftp_message(SftpEnvelope {
                session: self.session,
                channel: self.id,
                message,
            })?;
            produced += 1;
        }
        Ok(produced)
    }
}

// Channels retired during a mux call, swept into free slots afterwards.
// Removal is deferred so an engine never invalidates its own slot while
// the mux still holds a borrow of it.
struct Retired(Vec<ChanId, MAX_CHANNELS>);

impl CloseHook for Retired {
    fn channel_closed(&mut self, id: ChanId) {
        // cannot overflow, at most one retirement per live channel
        let _ = self.0.push(id);
    }
}

/// Per-session registry of channel engines.
///
/// Owns one engine per multiplexed channel, plus the monotonic id
/// counter. The host transport routes low-level events here: on socket
/// readability call [`drain_all`](Self::drain_all), on per-channel
/// lifecycle events look the engine up with [`find`](Self::find) and call
/// the matching `notify_*` operation.
///
/// Slots are reused after a channel closes and is swept.
pub struct ChannelMux<C: ChannelIo, F: SftpSession> {
    session: SessionId,
    ch: [Option<ChannelEngine<C, F>>; MAX_CHANNELS],
    next_id: u32,
    retired: Retired,
}

impl<C: ChannelIo, F: SftpSession> ChannelMux<C, F> {
    pub fn new(session: SessionId) -> Self {
        ChannelMux {
            session,
            ch: Default::default(),
            next_id: 0,
            retired: Retired(Vec::new()),
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Number of live channels.
    pub fn len(&self) -> usize {
        self.ch.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a freshly opened channel handle.
    pub fn open(&mut self, io: C) -> Result<ChanId> {
        let slot = self
            .ch
            .iter_mut()
            .find(|c| c.is_none())
            .ok_or(Error::NoChannels)?;
        let id = ChanId(self.next_id);
        self.next_id += 1;
        *slot = Some(ChannelEngine::new(self.session, id, io));
        Ok(id)
    }

    fn lookup<'m>(
        ch: &'m mut [Option<ChannelEngine<C, F>>; MAX_CHANNELS],
        num: ChanId,
    ) -> Result<&'m mut ChannelEngine<C, F>> {
        ch.iter_mut()
            .flatten()
            .find(|e| e.id() == num)
            .ok_or(error::BadChannel { num }.build())
    }

    fn get_mut(&mut self, num: ChanId) -> Result<&mut ChannelEngine<C, F>> {
        Self::lookup(&mut self.ch, num)
    }

    /// Routes a low-level handle to the engine owning it.
    pub fn find(&self, token: &C::Token) -> Option<ChanId> {
        self.ch
            .iter()
            .flatten()
            .find(|e| e.is_channel(token))
            .map(|e| e.id())
    }

    /// Designates an existing channel as an SFTP subsystem.
    ///
    /// Attaches state to the already-created engine, it does not create a
    /// new entity.
    pub fn attach_sftp(&mut self, num: ChanId, sftp: F) -> Result<()> {
        self.get_mut(num)?.attach_sftp(sftp);
        Ok(())
    }

    pub fn write(&mut self, num: ChanId, data: &[u8]) -> Result<()> {
        self.get_mut(num)?.write(data)
    }

    pub fn send_exit_status(&mut self, num: ChanId, status: u32) -> Result<()> {
        self.get_mut(num)?.send_exit_status(status)
    }

    pub fn send_eof(&mut self, num: ChanId) -> Result<()> {
        self.get_mut(num)?.send_eof()
    }

    /// Drains one channel. Returns the number of units produced.
    pub fn drain<E>(&mut self, num: ChanId, sink: &mut E) -> Result<usize>
    where
        E: EventSink<F::Message>,
    {
        let Self { ch, retired, .. } = self;
        let r = Self::lookup(ch, num).and_then(|e| e.drain(sink, retired));
        self.sweep();
        r
    }

    /// Drains every channel on the session once.
    ///
    /// The per-readiness entry point: the host calls this whenever the
    /// socket underlying the session becomes readable. Returns the total
    /// unit count across channels.
    pub fn drain_all<E>(&mut self, sink: &mut E) -> Result<usize>
    where
        E: EventSink<F::Message>,
    {
        let Self { ch, retired, .. } = self;
        let mut produced = 0;
        let mut r = Ok(());
        for eng in ch.iter_mut().flatten() {
            match eng.drain(sink, retired) {
                Ok(n) => produced += n,
                Err(e) => {
                    r = Err(e);
                    break;
                }
            }
        }
        self.sweep();
        r.map(|_| produced)
    }

    /// Peer EOF for a channel. Unknown ids are ignored with a warning,
    /// late events for an already-swept channel are expected.
    pub fn notify_eof<E>(&mut self, num: ChanId, sink: &mut E) -> Result<()>
    where
        E: EventSink<F::Message>,
    {
        let Self { ch, retired, .. } = self;
        let r = match Self::lookup(ch, num) {
            Ok(eng) => eng.notify_eof(sink, retired),
            Err(_) => {
                warn!("ignoring eof for unknown channel {num}");
                Ok(())
            }
        };
        self.sweep();
        r
    }

    /// Peer close for a channel. Same routing rules as EOF.
    pub fn notify_close<E>(&mut self, num: ChanId, sink: &mut E) -> Result<()>
    where
        E: EventSink<F::Message>,
    {
        let Self { ch, retired, .. } = self;
        let r = match Self::lookup(ch, num) {
            Ok(eng) => eng.notify_close(sink, retired),
            Err(_) => {
                warn!("ignoring close for unknown channel {num}");
                Ok(())
            }
        };
        self.sweep();
        r
    }

    /// Peer signal for a channel. Logged only.
    pub fn notify_signal(&mut self, num: ChanId, sig: &str) {
        match self.get_mut(num) {
            Ok(eng) => eng.notify_signal(sig),
            Err(_) => warn!("ignoring signal {sig:?} for unknown channel {num}"),
        }
    }

    /// Explicit close requested by the upper layer.
    pub fn close<E>(&mut self, num: ChanId, sink: &mut E) -> Result<()>
    where
        E: EventSink<F::Message>,
    {
        let Self { ch, retired, .. } = self;
        let r = Self::lookup(ch, num).and_then(|e| e.close(sink, retired));
        self.sweep();
        r
    }

    fn sweep(&mut self) {
        if self.retired.0.is_empty() {
            return;
        }
        for slot in self.ch.iter_mut() {
            let gone = slot.as_ref().map_or(false, |e| self.retired.0.contains(&e.id()));
            if gone {
                if let Some(e) = slot.take() {
                    trace!("removing channel {}", e.id());
                }
            }
        }
        self.retired.0.clear();
    }
}
