// Tests use std as it's easier
#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![forbid(unsafe_code)]
// avoids headscratching
#![deny(unused_must_use)]

pub mod config;
// exported so that sink implementations can create Error variants with
// .fail().
pub mod error;

mod channel;
mod event;
mod sftp;
mod shoallog;
mod transport;

// Application API
pub use channel::{ChanId, ChannelEngine, ChannelMux, SessionId};
pub use error::{Error, Result};
pub use event::{CloseHook, EventSink};
pub use sftp::{SftpEnvelope, SftpSession};
pub use transport::{ChannelIo, ReadStatus};
