//! Raw RF writer (C7): one per channel, draining that channel's ring into
//! a sink as packed `int16` or `int32` samples, with optional resampling
//! and 8-bit reduction per §4.7's init_scale table.
//!
//! Grounded on the resampler wrapper shape in `resample/src/lib.rs`: a
//! `rubato::FastFixedIn<f32>` driven through `process_into_buffer`, fed
//! fixed-size input chunks and drained into a growable output `Vec`.

use std::io::Write;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use rubato::{FastFixedIn, PolynomialDegree, Resampler};

use misrc::ring::RingBuffer;

use crate::cli::command::ResampleQuality;
use crate::errors::WriterError;
use crate::writer::{drain_loop, Sink};

impl From<ResampleQuality> for PolynomialDegree {
    fn from(q: ResampleQuality) -> Self {
        match q {
            ResampleQuality::Qq => PolynomialDegree::Nearest,
            ResampleQuality::Lq => PolynomialDegree::Linear,
            ResampleQuality::Mq => PolynomialDegree::Cubic,
            ResampleQuality::Hq => PolynomialDegree::Quintic,
            ResampleQuality::Vhq => PolynomialDegree::Septic,
        }
    }
}

/// One row of §4.7's table: how an RF channel's 16-bit samples are packed
/// on the way to the sink.
#[derive(Clone, Copy)]
pub struct RawFormat {
    pub out_size: usize,
    pub reduce_8bit: bool,
    pub pad: bool,
}

impl RawFormat {
    pub fn init_scale(&self) -> f64 {
        match (self.out_size, self.reduce_8bit, self.pad) {
            (2, false, _) => 1.0,
            (2, true, false) => 0.0625,
            (2, true, true) => 0.00390625,
            (4, false, _) => 65536.0,
            (4, true, false) => 4096.0,
            (4, true, true) => 256.0,
            _ => unreachable!("out_size is either 2 or 4"),
        }
    }
}

/// Resamples a stream of `i16` RF samples to a new rational rate, carrying
/// the fractional phase across chunk boundaries the way `AudioResampler`
/// does: one `FastFixedIn` instance lives for the whole writer lifetime.
pub struct RfResampler {
    inner: FastFixedIn<f32>,
    input_buf: Vec<Vec<f32>>,
    output_buf: Vec<Vec<f32>>,
    scale: f32,
}

impl RfResampler {
    /// `gain_db` is applied multiplicatively as `10^(gain_db/20)`, per
    /// §4.7's gain contract.
    pub fn new(
        input_rate: u32,
        output_rate: u32,
        quality: ResampleQuality,
        chunk_frames: usize,
        gain_db: f64,
    ) -> Result<Self, WriterError> {
        let inner = FastFixedIn::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            quality.into(),
            chunk_frames,
            1,
        )
        .map_err(|e| WriterError::Resample(e.to_string()))?;

        Ok(Self {
            input_buf: vec![Vec::with_capacity(chunk_frames)],
            output_buf: vec![vec![0.0f32; inner.output_frames_max()]],
            inner,
            scale: 10f32.powf(gain_db as f32 / 20.0),
        })
    }

    /// Resamples one full chunk of `i16` samples, scaled to `[-1.0, 1.0]`
    /// and back, returning the produced `i16` samples.
    pub fn process(&mut self, samples: &[i16]) -> Result<Vec<i16>, WriterError> {
        self.input_buf[0].clear();
        self.input_buf[0].extend(samples.iter().map(|&s| s as f32 / 32768.0));

        let (_, produced) = self
            .inner
            .process_into_buffer(&self.input_buf, &mut self.output_buf, None)
            .map_err(|e| WriterError::Resample(e.to_string()))?;

        Ok(self.output_buf[0][..produced]
            .iter()
            .map(|&s| (s * 32768.0 * self.scale).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
            .collect())
    }
}

/// Drives one RF channel's ring to its sink, applying `format`'s packing
/// and an optional resampler, until `stop` is observed and the ring runs
/// dry.
pub fn run(
    ring: &RingBuffer,
    stop: &Arc<AtomicBool>,
    mut sink: Sink,
    format: RawFormat,
    mut resampler: Option<RfResampler>,
) -> Result<(), WriterError> {
    let chunk_samples = 4096;
    let chunk_bytes = chunk_samples * 2;
    let scale = format.init_scale();

    drain_loop(ring, stop, chunk_bytes, |bytes| {
        let samples: Vec<i16> = bytes.chunks_exact(2).map(|c| i16::from_le_bytes([c[0], c[1]])).collect();

        let resampled;
        let samples = if let Some(r) = resampler.as_mut() {
            resampled = r.process(&samples)?;
            &resampled[..]
        } else {
            &samples[..]
        };

        match format.out_size {
            2 => {
                if format.reduce_8bit {
                    let mut narrow = vec![0i8; samples.len()];
                    misrc::convert::narrow_i16_to_i8_sat(samples, &mut narrow);
                    for v in narrow {
                        let scaled = (v as f64 * scale).round() as i16;
                        sink.write_all(&scaled.to_le_bytes()).map_err(io_err)?;
                    }
                } else {
                    for &s in samples {
                        sink.write_all(&s.to_le_bytes()).map_err(io_err)?;
                    }
                }
            }
            4 => {
                if format.reduce_8bit {
                    let mut narrow = vec![0i32; samples.len()];
                    misrc::convert::narrow_i16_to_i32_sat8(samples, &mut narrow);
                    for v in narrow {
                        sink.write_all(&((v as f64 * scale) as i32).to_le_bytes()).map_err(io_err)?;
                    }
                } else {
                    let mut wide = vec![0i32; samples.len()];
                    misrc::convert::widen_i16_to_i32(samples, &mut wide);
                    for v in wide {
                        sink.write_all(&((v as f64 * scale) as i32).to_le_bytes()).map_err(io_err)?;
                    }
                }
            }
            _ => unreachable!(),
        }
        Ok(())
    })?;

    sink.flush().map_err(io_err)
}

fn io_err(e: std::io::Error) -> WriterError {
    WriterError::File(crate::errors::FileError::Io { path: std::path::PathBuf::from("<raw sink>"), source: e })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_scale_table() {
        assert_eq!(RawFormat { out_size: 2, reduce_8bit: false, pad: false }.init_scale(), 1.0);
        assert_eq!(RawFormat { out_size: 2, reduce_8bit: true, pad: false }.init_scale(), 0.0625);
        assert_eq!(RawFormat { out_size: 2, reduce_8bit: true, pad: true }.init_scale(), 0.00390625);
        assert_eq!(RawFormat { out_size: 4, reduce_8bit: false, pad: false }.init_scale(), 65536.0);
        assert_eq!(RawFormat { out_size: 4, reduce_8bit: true, pad: false }.init_scale(), 4096.0);
        assert_eq!(RawFormat { out_size: 4, reduce_8bit: true, pad: true }.init_scale(), 256.0);
    }
}
