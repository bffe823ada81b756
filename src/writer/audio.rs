//! Audio writer (C9): demultiplexes the interleaved 24-bit, 4-channel,
//! 78125 Hz PCM stream the framing decoder hands back into the sink
//! layout §4.9 asks for (4ch / 2ch pair / 1ch), and packs each frame into
//! the RIFF/RF64 container via `crate::wave::WaveWriter`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use misrc::ring::RingBuffer;

use crate::errors::{FileError, WriterError};
use crate::wave::WaveWriter;
use crate::writer::{drain_loop, Sink};

pub const SAMPLE_RATE: u32 = 78125;
pub const BITS_PER_SAMPLE: u16 = 24;
const BYTES_PER_SAMPLE: usize = 3;
const INPUT_CHANNELS: usize = 4;

/// Which input channels (of the 4-channel interleaved stream) a sink
/// carries, per §4.9's three layouts.
#[derive(Clone, Copy)]
pub enum AudioLayout {
    FourChannel,
    Pair([usize; 2]),
    Single(usize),
}

impl AudioLayout {
    fn channels(self) -> Vec<usize> {
        match self {
            AudioLayout::FourChannel => vec![0, 1, 2, 3],
            AudioLayout::Pair(ch) => ch.to_vec(),
            AudioLayout::Single(ch) => vec![ch],
        }
    }
}

/// One sink fed by the audio ring: a layout plus the file it writes to.
pub struct AudioSink {
    pub layout: AudioLayout,
    pub sink: Sink,
}

/// Drains the single interleaved audio ring once, demuxing into every
/// configured sink. Each `AudioSink` gets its own `WaveWriter` so a
/// crash mid-capture still leaves every other file's placeholder header
/// intact for later repair.
pub fn run(ring: &RingBuffer, stop: &Arc<AtomicBool>, sinks: Vec<AudioSink>) -> Result<(), WriterError> {
    struct Active {
        channels: Vec<usize>,
        writer: WaveWriter<Sink>,
    }

    let mut active: Vec<Active> = Vec::with_capacity(sinks.len());
    for AudioSink { layout, sink } in sinks {
        let channels = layout.channels();
        let mut writer = WaveWriter::new(sink, SAMPLE_RATE, channels.len() as u16, BITS_PER_SAMPLE);
        writer.write_header().map_err(io_err)?;
        active.push(Active { channels, writer });
    }

    let frame_bytes = INPUT_CHANNELS * BYTES_PER_SAMPLE;
    let chunk_frames = 2048;

    drain_loop(ring, stop, frame_bytes * chunk_frames, |bytes| {
        for a in active.iter_mut() {
            let mut out = Vec::with_capacity(bytes.len() / INPUT_CHANNELS * a.channels.len());
            for frame in bytes.chunks_exact(frame_bytes) {
                for &ch in &a.channels {
                    let off = ch * BYTES_PER_SAMPLE;
                    out.extend_from_slice(&frame[off..off + BYTES_PER_SAMPLE]);
                }
            }
            a.writer.write_pcm(&out).map_err(io_err)?;
        }
        Ok(())
    })?;

    for a in active.iter_mut() {
        a.writer.finish().map_err(io_err)?;
    }

    Ok(())
}

fn io_err(e: std::io::Error) -> WriterError {
    WriterError::File(FileError::Io { path: std::path::PathBuf::from("<audio sink>"), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_channel_sets() {
        assert_eq!(AudioLayout::FourChannel.channels(), vec![0, 1, 2, 3]);
        assert_eq!(AudioLayout::Pair([0, 1]).channels(), vec![0, 1]);
        assert_eq!(AudioLayout::Single(2).channels(), vec![2]);
    }
}
