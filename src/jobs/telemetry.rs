//! # Per-stream heartbeat and timestamp state.
//!
//! A live job's worker demuxes one source into several streams and feeds one
//! or more encoders. For each of those endpoints the supervisor keeps a
//! [`StreamPulse`]: the stream's current media timestamp and the wall-clock
//! instant of its last heartbeat. The health monitor judges staleness and
//! inter-stream drift from this state; the ingest boundary (whatever relays
//! worker liveness into the record) updates it.
//!
//! Entries are created on first pulse and survive a respawn with their
//! clocks reset, so the monitor never judges a fresh worker by its
//! predecessor's heartbeats.

use std::time::{Duration, SystemTime};

/// Heartbeat/timestamp state of one monitored stream endpoint.
#[derive(Debug, Clone)]
pub struct StreamPulse {
    /// Stream name as reported by the worker (`video_0`, `audio_1`, ...).
    pub name: String,
    /// Media timestamp of the most recent buffer.
    pub current_timestamp: Duration,
    /// Wall-clock time of the last heartbeat.
    pub last_heartbeat: SystemTime,
}

impl StreamPulse {
    /// Creates a fresh pulse with the heartbeat set to `now`.
    pub fn new(name: impl Into<String>, now: SystemTime) -> Self {
        Self {
            name: name.into(),
            current_timestamp: Duration::ZERO,
            last_heartbeat: now,
        }
    }

    /// True for audio/video streams, the only ones whose heartbeats and
    /// timestamps take part in health decisions. Subtitle and data streams
    /// pulse too irregularly to judge.
    pub fn is_av(&self) -> bool {
        self.name.starts_with("video") || self.name.starts_with("audio")
    }

    pub(crate) fn reset(&mut self, now: SystemTime) {
        self.current_timestamp = Duration::ZERO;
        self.last_heartbeat = now;
    }
}

/// Telemetry of the job's demuxed source streams.
#[derive(Debug, Clone, Default)]
pub struct SourceTelemetry {
    /// One entry per demuxed stream.
    pub streams: Vec<StreamPulse>,
    /// Consecutive monitor ticks on which the sync spread exceeded the
    /// threshold. Reset to zero by a healthy tick and on respawn.
    pub sync_error_streak: u32,
}

impl SourceTelemetry {
    /// Records a heartbeat for `stream`, creating the entry on first sight.
    pub fn pulse(&mut self, stream: &str, timestamp: Duration, now: SystemTime) {
        match self.streams.iter_mut().find(|s| s.name == stream) {
            Some(s) => {
                s.current_timestamp = timestamp;
                s.last_heartbeat = now;
            }
            None => {
                let mut pulse = StreamPulse::new(stream, now);
                pulse.current_timestamp = timestamp;
                self.streams.push(pulse);
            }
        }
    }

    /// Spread between the fastest and slowest audio/video stream timestamps.
    ///
    /// `None` when no audio/video stream has reported yet.
    pub fn sync_spread(&self) -> Option<Duration> {
        let mut min: Option<Duration> = None;
        let mut max: Option<Duration> = None;
        for s in self.streams.iter().filter(|s| s.is_av()) {
            let ts = s.current_timestamp;
            min = Some(min.map_or(ts, |m| m.min(ts)));
            max = Some(max.map_or(ts, |m| m.max(ts)));
        }
        match (min, max) {
            (Some(lo), Some(hi)) => Some(hi - lo),
            _ => None,
        }
    }

    pub(crate) fn reset(&mut self, now: SystemTime) {
        for s in &mut self.streams {
            s.reset(now);
        }
        self.sync_error_streak = 0;
    }
}

/// Telemetry of one encoder output.
#[derive(Debug, Clone)]
pub struct EncoderTelemetry {
    /// Encoder name.
    pub name: String,
    /// One entry per stream feeding this encoder.
    pub streams: Vec<StreamPulse>,
    /// Aggregate heartbeat of the encoder's output side.
    pub output_heartbeat: SystemTime,
    /// Count of output segments produced, for the status surface.
    pub output_count: u64,
}

impl EncoderTelemetry {
    /// Creates encoder telemetry with the output heartbeat set to `now`.
    pub fn new(name: impl Into<String>, now: SystemTime) -> Self {
        Self {
            name: name.into(),
            streams: Vec::new(),
            output_heartbeat: now,
            output_count: 0,
        }
    }

    /// Records a heartbeat for one of the encoder's streams.
    pub fn pulse_stream(&mut self, stream: &str, timestamp: Duration, now: SystemTime) {
        match self.streams.iter_mut().find(|s| s.name == stream) {
            Some(s) => {
                s.current_timestamp = timestamp;
                s.last_heartbeat = now;
            }
            None => {
                let mut pulse = StreamPulse::new(stream, now);
                pulse.current_timestamp = timestamp;
                self.streams.push(pulse);
            }
        }
    }

    pub(crate) fn reset(&mut self, now: SystemTime) {
        for s in &mut self.streams {
            s.reset(now);
        }
        self.output_heartbeat = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_av_classification() {
        let now = SystemTime::now();
        assert!(StreamPulse::new("video_0", now).is_av());
        assert!(StreamPulse::new("audio_1", now).is_av());
        assert!(!StreamPulse::new("subtitle_0", now).is_av());
    }

    #[test]
    fn test_pulse_upserts() {
        let now = SystemTime::now();
        let mut src = SourceTelemetry::default();
        src.pulse("video_0", Duration::from_secs(1), now);
        src.pulse("video_0", Duration::from_secs(2), now);
        src.pulse("audio_0", Duration::from_secs(2), now);
        assert_eq!(src.streams.len(), 2);
        assert_eq!(src.streams[0].current_timestamp, Duration::from_secs(2));
    }

    #[test]
    fn test_sync_spread_ignores_non_av() {
        let now = SystemTime::now();
        let mut src = SourceTelemetry::default();
        assert_eq!(src.sync_spread(), None);

        src.pulse("video_0", Duration::from_secs(10), now);
        assert_eq!(src.sync_spread(), Some(Duration::ZERO));

        src.pulse("audio_0", Duration::from_secs(7), now);
        src.pulse("subtitle_0", Duration::from_secs(60), now);
        assert_eq!(src.sync_spread(), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_reset_keeps_layout_clears_clocks() {
        let now = SystemTime::now();
        let mut src = SourceTelemetry::default();
        src.pulse("video_0", Duration::from_secs(9), now);
        src.sync_error_streak = 2;

        let later = now + Duration::from_secs(30);
        src.reset(later);
        assert_eq!(src.streams.len(), 1);
        assert_eq!(src.streams[0].current_timestamp, Duration::ZERO);
        assert_eq!(src.streams[0].last_heartbeat, later);
        assert_eq!(src.sync_error_streak, 0);
    }
}
