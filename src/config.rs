// This can be increased arbitrarily, though note that some code paths
// assume a linear scan of channels can happen quickly, so may need
// reworking for performance.
pub const MAX_CHANNELS: usize = 8;

/// Bytes pulled per read attempt in the plain-mode drain loop.
///
/// Each non-empty read becomes one `on_data` notification, so this also
/// bounds the chunk size the upper layer sees.
pub const READ_CHUNK: usize = 1024;
