//! Transport-layer decode/encode engine for a network intrusion-detection
//! sensor.
//!
//! The host feeds each codec a raw byte span positioned at the start of its
//! layer, after IP decoding has produced addresses and the layer length. The
//! codec validates the header, fills the shared per-packet record, raises
//! anomaly events through an injected sink, and can synthesize response
//! segments with recomputed checksums. Decoding is synchronous and
//! run-to-completion; the hot path performs no heap allocation.

pub mod codec;
pub mod conf;
pub mod error;
pub mod events;
pub mod packet;
pub mod profiler;
