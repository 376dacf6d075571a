//! Byte-transport and time seams the engine is built on.
//!
//! The engine owns exactly one [`Transport`] and performs all socket I/O
//! through it. Implementations map handles onto whatever the platform
//! provides: lwIP socket descriptors, smoltcp socket slots, or in-memory
//! fakes in tests. All timeouts are expressed in transport ticks, with 0
//! meaning "return immediately".

/// Multiplexed byte transport: one stream connection plus any auxiliary
/// readable handles (the publish bridge endpoint among them).
///
/// `receive` is non-blocking at timeout 0 and may short-read; callers that
/// need exact counts loop under their own wait budget. `wait_readable` is the
/// only place the engine blocks in steady state.
pub trait Transport {
    /// Opaque readable/writable endpoint identifier.
    type Handle: Copy + PartialEq + core::fmt::Debug;
    /// Associated error type.
    type Error: core::fmt::Debug;

    /// Resolves `host` and opens a stream connection to `host:port`.
    fn connect(&mut self, host: &str, port: u16) -> Result<Self::Handle, Self::Error>;

    /// Writes `buf` to the handle, returning the number of bytes accepted.
    fn send(&mut self, handle: Self::Handle, buf: &[u8]) -> Result<usize, Self::Error>;

    /// Reads up to `buf.len()` bytes, waiting at most `timeout` ticks.
    /// Returns the number of bytes read; 0 when nothing arrived in time.
    fn receive(
        &mut self,
        handle: Self::Handle,
        buf: &mut [u8],
        timeout: u32,
    ) -> Result<usize, Self::Error>;

    /// Blocks until at least one handle is readable or `timeout` ticks
    /// elapse. The returned set indexes into `handles`; an empty set means
    /// the timeout expired.
    fn wait_readable(
        &mut self,
        handles: &[Self::Handle],
        timeout: u32,
    ) -> Result<ReadySet, Self::Error>;

    /// Closes the handle. Errors are not observable; the engine is done with
    /// the handle either way.
    fn close(&mut self, handle: Self::Handle);
}

/// Set of readable handles returned by [`Transport::wait_readable`],
/// indexed by position in the `handles` slice passed in.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub struct ReadySet(u8);

impl ReadySet {
    /// An empty set (timeout expiry).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Marks the handle at `index` readable.
    pub fn insert(&mut self, index: usize) {
        self.0 |= 1 << index;
    }

    /// Whether the handle at `index` is readable.
    pub fn contains(self, index: usize) -> bool {
        self.0 & (1 << index) != 0
    }

    /// Whether no handle is readable.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Monotonic tick source driving keep-alive scheduling and reconnect backoff.
pub trait Clock {
    /// Monotonic seconds since an arbitrary epoch.
    fn now(&self) -> u32;

    /// Blocks the calling context for `secs` seconds.
    fn sleep(&self, secs: u32);
}
