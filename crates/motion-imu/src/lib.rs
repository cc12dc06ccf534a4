//! Inertial samples: raw and physical types, unit conversion, smoothing,
//! and the live/recorded sources that produce them.

pub mod codec;
pub mod filter;
pub mod resp;
pub mod source;
pub mod types;

pub use codec::CodecError;
pub use filter::TemporalFilter;
pub use source::{
    LiveQueueSource, MemoryQueue, MotionSource, RecordedSequenceSource, SourceError, SourceKind,
};
pub use types::{FrameRecord, MotionFrame, PhysicalSample, RawSample};
