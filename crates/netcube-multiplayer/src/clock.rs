//! Local time, network time, and the clock-offset handshake.
//!
//! A client estimates the authority's clock with a single request/response
//! round trip: it remembers when it asked, the authority answers with its own
//! local time, and the client assumes the answer was produced halfway through
//! the round trip. Network time is local time plus that offset.

/// Millisecond clocks consumed by the pawn.
pub trait TimeSource {
    /// Time since this peer started, in milliseconds.
    fn local_time_ms(&self) -> i32;

    /// Best estimate of the authority's local time, in milliseconds.
    fn network_time_ms(&self) -> i32;
}

// ---------------------------------------------------------------------------
// LocalClock
// ---------------------------------------------------------------------------

/// Accumulates frame deltas into elapsed time.
#[derive(Debug, Clone, Default)]
pub struct LocalClock {
    accumulated_secs: f64,
}

impl LocalClock {
    /// Add one frame's delta.
    pub fn advance(&mut self, delta_seconds: f32) {
        self.accumulated_secs += f64::from(delta_seconds);
    }

    /// Seconds since start.
    pub fn elapsed_secs(&self) -> f64 {
        self.accumulated_secs
    }

    /// `floor(elapsed * 1000)`.
    pub fn local_time_ms(&self) -> i32 {
        (self.accumulated_secs * 1000.0).floor() as i32
    }
}

// ---------------------------------------------------------------------------
// ClockSync
// ---------------------------------------------------------------------------

/// Result of a completed timestamp round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSample {
    /// Measured round trip (ms).
    pub rtt_ms: i32,
    /// New offset: authority time minus local time (ms).
    pub offset_ms: i32,
}

/// Client side of the timestamp handshake.
///
/// The committed offset only changes when a round trip completes. While a
/// request is outstanding the timestamp is flagged invalid, but network time
/// keeps using the last committed offset.
#[derive(Debug, Clone, Default)]
pub struct ClockSync {
    request_sent_ms: Option<i32>,
    offset_ms: i32,
    has_valid_timestamp: bool,
    last_sample: Option<ClockSample>,
}

impl ClockSync {
    /// Start a round trip at local time `local_now_ms`.
    pub fn begin_request(&mut self, local_now_ms: i32) {
        self.request_sent_ms = Some(local_now_ms);
        self.has_valid_timestamp = false;
    }

    /// Finish the round trip with the authority's reply.
    ///
    /// Returns `None`, leaving the offset untouched, when no request is in flight.
    pub fn complete(&mut self, server_time_ms: i32, local_now_ms: i32) -> Option<ClockSample> {
        let sent = self.request_sent_ms.take()?;
        let rtt_ms = local_now_ms - sent;
        let offset_ms = (server_time_ms - rtt_ms / 2) - sent;

        self.offset_ms = offset_ms;
        self.has_valid_timestamp = true;
        let sample = ClockSample { rtt_ms, offset_ms };
        self.last_sample = Some(sample);
        Some(sample)
    }

    /// Last committed offset (0 before the first round trip).
    pub fn offset_ms(&self) -> i32 {
        self.offset_ms
    }

    /// The committed offset, only while no re-request is pending and at least
    /// one round trip has completed.
    pub fn trusted_offset(&self) -> Option<i32> {
        self.has_valid_timestamp.then_some(self.offset_ms)
    }

    /// Whether the offset is backed by a completed, current round trip.
    pub fn has_valid_timestamp(&self) -> bool {
        self.has_valid_timestamp
    }

    /// Whether a request awaits its reply.
    pub fn request_in_flight(&self) -> bool {
        self.request_sent_ms.is_some()
    }

    /// The most recent completed round trip.
    pub fn last_sample(&self) -> Option<ClockSample> {
        self.last_sample
    }

    /// `local_ms` shifted by the committed offset.
    pub fn network_time_ms(&self, local_ms: i32) -> i32 {
        local_ms + self.offset_ms
    }
}
