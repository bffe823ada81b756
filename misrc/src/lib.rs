//! Pure processing core for the MISRC capture/extract pipeline.
//!
//! ## Technical overview
//!
//! This crate owns no file descriptors beyond the ring buffer's memory
//! mapping and spawns no threads; everything else is a deterministic,
//! total function over byte/word slices, which keeps the hot path
//! (extraction kernels, format converters, framing decoder) straightforward
//! to unit test and fuzz in isolation from the capture backend and sink I/O
//! that live in the `misrc-capture` binary crate.
//!
//! ### Pipeline stages
//!
//! 1. [`ring`]: bounded SPSC byte queue with a double virtual mapping, so
//!    any read or write of length up to capacity is linearly addressable
//!    regardless of wraparound.
//! 2. [`framing`]: per-video-frame state machine that demultiplexes the
//!    HDMI-encoded envelope into RF and audio byte streams, verifying frame
//!    counters, CRC-16, and idle counters along the way.
//! 3. [`kernels`] and [`dispatch`]: bit-exact extraction of signed 12-bit
//!    ADC samples, aux bits, and clip/peak statistics from packed 32-bit
//!    (or 16-bit single-channel) input words, with a SIMD fast path chosen
//!    once at startup.
//! 4. [`convert`]: saturating bit-depth conversions used ahead of
//!    resampling or FLAC encoding.
//!
//! ```rust
//! use misrc::kernels::{self, KernelConfig, ChannelSelect};
//!
//! let words: [u32; 2] = [0x0000_0000, 0xFFFF_FFFF];
//! let mut out_a = [0i16; 2];
//! let mut out_b = [0i16; 2];
//!
//! let cfg = KernelConfig { channels: ChannelSelect::Both, pad: false, peak: false };
//! kernels::extract(cfg, &words, Some(&mut out_a), Some(&mut out_b), None, &mut [0u64; 2], None);
//! assert_eq!(out_a, [2047, -2048]);
//! ```

/// Dual-mapped ring buffer ([`ring::RingBuffer`]): the bounded SPSC byte
/// queue at the heart of the two-producer/multi-consumer pipeline.
pub mod ring;

/// Bit-exact extraction kernels: packed ADC/aux words to signed PCM plus
/// clip/peak statistics.
pub mod kernels;

/// Saturating bit-depth converters used ahead of resampling/FLAC encoding.
pub mod convert;

/// HDMI framing/sync protocol decoder: frame counter continuity, CRC-16,
/// idle-count verification, stream-ID demux, and sync acquisition/loss.
pub mod framing;

/// Runtime CPU feature detection and kernel dispatch, cached after the
/// first call.
pub mod dispatch;

/// Error types shared across the processing core.
pub mod errors;

/// Events emitted by the framing decoder.
pub mod message;
