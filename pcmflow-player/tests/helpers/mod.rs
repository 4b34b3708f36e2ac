//! Test helper modules for pcmflow-player integration tests
//!
//! Provides reusable test infrastructure components:
//! - RecordingSink: OutputSink that keeps every scheduled segment
//! - SinkLog: shared handle for inspecting what the sink received
//! - PCM byte builders for the supported encodings

#![allow(dead_code)]

use parking_lot::Mutex;
use pcmflow_player::{Error, OutputSink, Result, Segment};
use std::sync::Arc;

/// One segment as received by the sink
#[derive(Debug, Clone)]
pub struct ScheduledCall {
    pub segment: Segment,
    pub start_time: f64,
    pub gain: f32,
}

/// Everything the sink has been asked to do
#[derive(Debug, Default)]
pub struct SinkState {
    pub now: f64,
    pub gain: f32,
    pub scheduled: Vec<ScheduledCall>,
    pub close_calls: usize,
    pub reject_next: bool,
}

/// Shared view of a [`RecordingSink`]
#[derive(Debug, Clone, Default)]
pub struct SinkLog(Arc<Mutex<SinkState>>);

impl SinkLog {
    pub fn scheduled(&self) -> Vec<ScheduledCall> {
        self.0.lock().scheduled.clone()
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.0.lock().scheduled.iter().map(|c| c.start_time).collect()
    }

    pub fn segment_count(&self) -> usize {
        self.0.lock().scheduled.len()
    }

    pub fn close_calls(&self) -> usize {
        self.0.lock().close_calls
    }

    pub fn gain(&self) -> f32 {
        self.0.lock().gain
    }

    pub fn set_now(&self, now: f64) {
        self.0.lock().now = now;
    }

    pub fn reject_next(&self) {
        self.0.lock().reject_next = true;
    }
}

/// In-memory OutputSink with a manually driven clock
pub struct RecordingSink {
    log: SinkLog,
}

impl RecordingSink {
    /// Sink whose clock reads `now` until changed through the log
    pub fn new(now: f64) -> (Self, SinkLog) {
        let log = SinkLog::default();
        {
            let mut state = log.0.lock();
            state.now = now;
            state.gain = 1.0;
        }
        (Self { log: log.clone() }, log)
    }
}

impl OutputSink for RecordingSink {
    fn current_time(&self) -> f64 {
        self.log.0.lock().now
    }

    fn schedule_segment(&mut self, segment: Segment, start_time: f64) -> Result<()> {
        let mut state = self.log.0.lock();
        if state.close_calls > 0 {
            return Err(Error::AudioOutput("sink closed".to_string()));
        }
        if state.reject_next {
            state.reject_next = false;
            return Err(Error::AudioOutput("rejected by test".to_string()));
        }
        let gain = state.gain;
        state.scheduled.push(ScheduledCall {
            segment,
            start_time,
            gain,
        });
        Ok(())
    }

    fn set_gain(&mut self, level: f32) {
        self.log.0.lock().gain = level;
    }

    fn close(&mut self) -> Result<()> {
        self.log.0.lock().close_calls += 1;
        Ok(())
    }
}

/// Native-endian bytes for i16 samples
pub fn i16_bytes(values: &[i16]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// Native-endian bytes for i32 samples
pub fn i32_bytes(values: &[i32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// Native-endian bytes for f32 samples
pub fn f32_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

/// Interleaved i16 samples alternating `+value` / `-value`
pub fn alternating_i16(count: usize, value: i16) -> Vec<i16> {
    (0..count)
        .map(|i| if i % 2 == 0 { value } else { -value })
        .collect()
}
