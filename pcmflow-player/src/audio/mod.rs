//! Audio types, format normalization and output sinks

pub mod normalize;
pub mod output;
pub mod sink;
pub mod types;

pub use normalize::{normalize, normalize_samples, PcmSample};
pub use output::CpalSink;
pub use sink::OutputSink;
pub use types::Segment;
