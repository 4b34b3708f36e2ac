//! Accumulation, segment scheduling and the timer-driven player

pub mod player;
pub mod scheduler;

pub use player::PcmPlayer;
pub use scheduler::{build_segment, FlushOutcome, SchedulerStats, SegmentScheduler};
