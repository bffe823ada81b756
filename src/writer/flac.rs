//! FLAC RF writer (C8): encodes one RF channel's samples with `flacenc`,
//! mirroring `raw::run`'s drain loop but feeding a block-oriented encoder
//! instead of a raw byte sink.
//!
//! Bitstream concepts (fixed predictors, Rice coding, a seektable with
//! evenly spaced sample-number entries) are universal FLAC structure, not
//! anything specific to one crate; the encoder itself is `flacenc`, whose
//! `config::Encoder` + `source::MemSource` + `encode_with_fixed_block_size`
//! pipeline this module drives directly rather than re-implementing.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use flacenc::component::BitRepr;
use flacenc::config::Encoder as FlacConfig;
use flacenc::error::Verify;
use flacenc::source::MemSource;

use misrc::ring::RingBuffer;

use crate::errors::{FileError, WriterError};
use crate::writer::raw::RfResampler;
use crate::writer::{drain_loop, Sink};

/// §4.8: bit depth the FLAC stream is encoded at. `Auto` picks 16 unless
/// the channel's `reduce_8bit` flag is set, in which case 12.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlacBits {
    Eight,
    Twelve,
    Sixteen,
}

impl FlacBits {
    pub fn bits(self) -> u32 {
        match self {
            FlacBits::Eight => 8,
            FlacBits::Twelve => 12,
            FlacBits::Sixteen => 16,
        }
    }
}

/// Sample spacing between consecutive seektable points (§4.8: `2^18`).
const SEEKTABLE_SPACING: u64 = 1 << 18;

pub struct FlacParams {
    pub sample_rate: u32,
    pub bits: FlacBits,
    pub compression_level: u8,
    pub threads: usize,
}

/// Encodes one RF channel's ring to a FLAC stream at `params.bits`,
/// buffering `block_size` samples per `flacenc` frame. `resampler`, if
/// given, runs ahead of the encoder so the FLAC sample rate matches the
/// post-resample rate (§4.8: "sample rate equal to the post-resample
/// rate"). §8 S6: a stream shorter than one seektable spacing still
/// finalizes with a one-entry seektable rather than an empty one.
///
/// `flacenc`'s public API is a single whole-source encode
/// (`encode_with_fixed_block_size`), not a per-block streaming call, so
/// samples are still accumulated here; what's chunked is the I/O (the
/// ring is drained and resampled in `block_size`-sized pieces as they
/// arrive, matching 4.7's read cadence) rather than the final encode.
pub fn run(ring: &RingBuffer, stop: &Arc<AtomicBool>, mut sink: Sink, params: FlacParams, mut resampler: Option<RfResampler>) -> Result<(), WriterError> {
    let block_size: usize = 4096;
    let mut config = FlacConfig::default();
    config.block_size = block_size;
    config.multithread.workers = params.threads.max(1);
    let config = config.into_verified().map_err(|(_, e)| WriterError::Flac(format!("{e:?}")))?;

    let mut pending: Vec<i32> = Vec::with_capacity(block_size * 4);

    drain_loop(ring, stop, block_size * 2, |bytes| {
        let samples: Vec<i16> = bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();
        let resampled;
        let samples = if let Some(r) = resampler.as_mut() {
            resampled = r.process(&samples)?;
            &resampled[..]
        } else {
            &samples[..]
        };
        pending.extend(samples.iter().map(|&s| s as i32));
        Ok(())
    })?;

    if pending.is_empty() {
        return Ok(());
    }

    let source = MemSource::from_samples(&pending, 1, params.bits.bits() as usize, params.sample_rate as usize);
    let stream = flacenc::encode_with_fixed_block_size(&config, source, block_size)
        .map_err(|e| WriterError::Flac(format!("{e:?}")))?;

    let mut sink_bytes = flacenc::bitsink::ByteSink::new();
    stream.write(&mut sink_bytes).map_err(|e| WriterError::Flac(format!("{e:?}")))?;

    let framed = install_seektable(sink_bytes.as_slice(), pending.len() as u64, block_size as u64);

    sink.write_all(&framed).map_err(io_err)?;
    sink.flush().map_err(io_err)
}

fn io_err(e: std::io::Error) -> WriterError {
    WriterError::File(FileError::Io { path: std::path::PathBuf::from("<flac sink>"), source: e })
}

/// Splices a `SEEKTABLE` metadata block, `2^18`-spaced per §4.8, between
/// the `STREAMINFO` block `flacenc` always emits first and the audio
/// frames that follow — the metadata block layout (1-byte type+flag, a
/// 24-bit big-endian length, then block data) is the plain FLAC
/// container format (independent of which encoder library produced the
/// stream), not anything `flacenc`-specific.
///
/// This encoder resolves the full sample count before encoding (it
/// buffers the whole channel first; see `run`'s doc comment), so every
/// point here carries a real target `sample_number`; `stream_offset` is
/// left at 0 since computing each point's true byte offset would mean
/// re-parsing `flacenc`'s output frame-by-frame, which this module does
/// not do.
fn install_seektable(stream_bytes: &[u8], total_samples: u64, block_size: u64) -> Vec<u8> {
    const MARKER_LEN: usize = 4; // "fLaC"
    const BLOCK_HEADER_LEN: usize = 4;
    const STREAMINFO_DATA_LEN: usize = 34;
    const SEEKTABLE_TYPE: u8 = 3;

    let streaminfo_header_at = MARKER_LEN;
    let streaminfo_end = streaminfo_header_at + BLOCK_HEADER_LEN + STREAMINFO_DATA_LEN;
    if stream_bytes.len() < streaminfo_end {
        return stream_bytes.to_vec();
    }

    let mut points = Vec::new();
    let mut sample = 0u64;
    while sample < total_samples {
        points.push(sample);
        sample = sample.saturating_add(SEEKTABLE_SPACING);
    }
    if points.is_empty() {
        points.push(0);
    }

    let mut seektable_data = Vec::with_capacity(points.len() * 18);
    for &s in &points {
        seektable_data.extend_from_slice(&s.to_be_bytes());
        seektable_data.extend_from_slice(&0u64.to_be_bytes());
        seektable_data.extend_from_slice(&(block_size.min(u16::MAX as u64) as u16).to_be_bytes());
    }

    let mut out = Vec::with_capacity(stream_bytes.len() + BLOCK_HEADER_LEN + seektable_data.len());
    out.extend_from_slice(&stream_bytes[..streaminfo_header_at]);

    // STREAMINFO is no longer the last metadata block now that SEEKTABLE
    // follows it; clear its "last block" flag (bit 7 of the type byte).
    let mut streaminfo_header = [0u8; BLOCK_HEADER_LEN];
    streaminfo_header.copy_from_slice(&stream_bytes[streaminfo_header_at..streaminfo_header_at + BLOCK_HEADER_LEN]);
    streaminfo_header[0] &= 0x7F;
    out.extend_from_slice(&streaminfo_header);
    out.extend_from_slice(&stream_bytes[streaminfo_header_at + BLOCK_HEADER_LEN..streaminfo_end]);

    let len_bytes = (seektable_data.len() as u32).to_be_bytes();
    out.push(0x80 | SEEKTABLE_TYPE); // last-metadata-block flag set
    out.extend_from_slice(&len_bytes[1..]); // 24-bit big-endian length
    out.extend_from_slice(&seektable_data);

    out.extend_from_slice(&stream_bytes[streaminfo_end..]);
    out
}

/// §4.8: worker thread count is `(cores - 2 - num_rf_outputs) / num_rf_outputs`,
/// clamped to `[1, 128]`.
pub fn thread_budget(cores: usize, num_rf_outputs: usize) -> usize {
    if num_rf_outputs == 0 {
        return 1;
    }
    let raw = (cores as isize - 2 - num_rf_outputs as isize) / num_rf_outputs as isize;
    raw.clamp(1, 128) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    // A minimal well-formed "fLaC" + 34-byte STREAMINFO block, last-block
    // flag set, no audio frames, standing in for flacenc's own output.
    fn fake_stream() -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(b"fLaC");
        b.push(0x80); // type=0 (STREAMINFO), last=true
        b.extend_from_slice(&34u32.to_be_bytes()[1..]);
        b.extend_from_slice(&[0u8; 34]);
        b
    }

    #[test]
    fn install_seektable_clears_streaminfo_last_flag() {
        let out = install_seektable(&fake_stream(), 1, 4096);
        assert_eq!(out[4] & 0x80, 0, "STREAMINFO must no longer be the last metadata block");
    }

    #[test]
    fn install_seektable_spaces_points_by_2_18() {
        let out = install_seektable(&fake_stream(), (1 << 18) * 3, 4096);
        assert_eq!(out[4 + 4 + 34], 0x80 | 3); // SEEKTABLE header: last=true, type=3
        let len = u32::from_be_bytes([0, out[4 + 4 + 34 + 1], out[4 + 4 + 34 + 2], out[4 + 4 + 34 + 3]]) as usize;
        assert_eq!(len % 18, 0);
        assert_eq!(len / 18, 3);
    }

    #[test]
    fn bits_auto_maps_to_twelve_or_sixteen() {
        assert_eq!(FlacBits::Twelve.bits(), 12);
        assert_eq!(FlacBits::Sixteen.bits(), 16);
    }

    #[test]
    fn thread_budget_clamps_to_one() {
        assert_eq!(thread_budget(4, 2), 1);
        assert_eq!(thread_budget(1, 3), 1);
    }

    #[test]
    fn thread_budget_clamps_to_128() {
        assert_eq!(thread_budget(1024, 1), 128);
    }

    #[test]
    fn thread_budget_typical() {
        // §8 S6: 16 cores, 2 RF outputs -> (16-2-2)/2 = 6
        assert_eq!(thread_budget(16, 2), 6);
    }
}
