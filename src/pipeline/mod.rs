//! Capture pipeline coordinator (C6).
//!
//! Owns the rings between the capture callback and the writer threads:
//! one ring carries interleaved RF packed words out of the framing
//! decoder, one carries demultiplexed audio bytes. A single decode
//! thread drains the RF ring through [`misrc::kernels`] and fans the
//! split channel-A/channel-B/aux bytes out to three more small rings,
//! each owned by exactly one writer thread, per §5's ownership rule.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use misrc::dispatch::{select_kernel, KernelBackend};
use misrc::framing::{FrameInput, FramingConfig, FramingDecoder};
use misrc::kernels::{extract, ChannelSelect, KernelConfig};
use misrc::ring::RingBuffer;

use crate::capture::{CaptureSource, CapturedFrame};
use crate::errors::AppError;

const PAGE: usize = 4096;
const RING_CAPACITY: usize = PAGE * 1024; // 4 MiB per ring

/// Per-channel extraction request: whether this channel's samples are
/// wanted at all, and how they should be shaped.
#[derive(Clone, Copy, Default)]
pub struct ChannelDecodeConfig {
    pub enabled: bool,
    pub pad: bool,
}

pub struct PipelineConfig {
    pub channel_a: ChannelDecodeConfig,
    pub channel_b: ChannelDecodeConfig,
    pub aux_enabled: bool,
    pub audio_enabled: bool,
    pub peak: bool,
    /// Tee the undecoded packed-word RF stream to its own ring, for
    /// `--raw` (a dump of the same bytes `extract` consumes).
    pub raw_tee_enabled: bool,
}

/// Running totals the coordinator exposes for logging/progress: total
/// samples decoded and each channel's clip count, updated from the
/// decode thread and read by `main`'s progress bar.
#[derive(Default)]
pub struct Stats {
    pub total_samples: AtomicU64,
    pub clip_a: AtomicU64,
    pub clip_b: AtomicU64,
}

/// Rings the writer threads drain; constructed by the coordinator and
/// handed one each to the writer-thread closures the caller spawns.
pub struct Rings {
    pub channel_a: Option<Arc<RingBuffer>>,
    pub channel_b: Option<Arc<RingBuffer>>,
    pub aux: Option<Arc<RingBuffer>>,
    pub audio: Option<Arc<RingBuffer>>,
    pub raw: Option<Arc<RingBuffer>>,
}

pub struct Coordinator {
    cfg: PipelineConfig,
    stop: Arc<AtomicBool>,
    pub stats: Arc<Stats>,
}

impl Coordinator {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg, stop: Arc::new(AtomicBool::new(false)), stats: Arc::new(Stats::default()) }
    }

    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn build_rings(&self) -> Result<Rings, AppError> {
        let ring = || RingBuffer::new(RING_CAPACITY).map_err(|e| AppError::Memory(e.to_string()));
        Ok(Rings {
            channel_a: if self.cfg.channel_a.enabled { Some(Arc::new(ring()?)) } else { None },
            channel_b: if self.cfg.channel_b.enabled { Some(Arc::new(ring()?)) } else { None },
            aux: if self.cfg.aux_enabled { Some(Arc::new(ring()?)) } else { None },
            // the audio ring is the framing decoder's own raw ring, attached
            // once decoding starts (see `spawn`), not allocated here.
            audio: None,
            raw: None,
        })
    }

    /// Spawns the framing-decode thread and drives `source` until `count`
    /// samples have been decoded (if given) or `self.stop` is set by a
    /// writer thread or a signal handler installed by the caller.
    ///
    /// Returns the output rings for the caller to hand to writer threads,
    /// plus a join handle for the decode/capture thread; the caller is
    /// responsible for spawning writers against the rings *before*
    /// joining, since both sides must run concurrently to drain bounded
    /// capacity.
    pub fn spawn(
        &self,
        mut source: Box<dyn CaptureSource>,
        rf_ring_capacity_words: Option<u64>,
    ) -> Result<(Rings, std::thread::JoinHandle<Result<(), AppError>>), AppError> {
        let rings = self.build_rings()?;
        let raw_ring = Arc::new(RingBuffer::new(RING_CAPACITY).map_err(|e| AppError::Memory(e.to_string()))?);
        let audio_raw_ring = Arc::new(RingBuffer::new(RING_CAPACITY).map_err(|e| AppError::Memory(e.to_string()))?);
        let raw_tee_ring = if self.cfg.raw_tee_enabled {
            Some(Arc::new(RingBuffer::new(RING_CAPACITY).map_err(|e| AppError::Memory(e.to_string()))?))
        } else {
            None
        };

        let stop = self.stop.clone();
        let capture_stop = self.stop.clone();
        let raw_ring_ingest = raw_ring.clone();
        let audio_raw_ring_ingest = audio_raw_ring.clone();
        let raw_tee_ingest = raw_tee_ring.clone();

        let framing_cfg = FramingConfig {
            rf_enabled: self.cfg.channel_a.enabled || self.cfg.channel_b.enabled || self.cfg.aux_enabled,
            audio_enabled: self.cfg.audio_enabled,
        };

        let capture_thread = std::thread::spawn(move || -> Result<(), AppError> {
            let mut decoder = FramingDecoder::new(framing_cfg);
            let result = source.start_stream(Box::new(move |frame: CapturedFrame| {
                if capture_stop.load(Ordering::Acquire) {
                    return;
                }
                let input = FrameInput { words: &frame.words, width: frame.width, height: frame.height };
                let out = decoder.process_frame(input);
                if !out.rf_bytes.is_empty() {
                    raw_ring_ingest.write_wrapped(&out.rf_bytes);
                    if let Some(tee) = &raw_tee_ingest {
                        tee.write_wrapped(&out.rf_bytes);
                    }
                }
                if !out.audio_bytes.is_empty() {
                    audio_raw_ring_ingest.write_wrapped(&out.audio_bytes);
                }
                for event in out.events {
                    log::debug!("framing event: {event:?}");
                }
                if decoder.shutdown_requested() {
                    capture_stop.store(true, Ordering::Release);
                }
            }));
            source.stop();
            result.map_err(AppError::Capture)
        });

        let decode_cfg = self.cfg.channel_a;
        let decode_cfg_b = self.cfg.channel_b;
        let aux_enabled = self.cfg.aux_enabled;
        let peak = self.cfg.peak;
        let stats = self.stats.clone();
        let decode_stop = self.stop.clone();
        let out_a = rings.channel_a.clone();
        let out_b = rings.channel_b.clone();
        let out_aux = rings.aux.clone();
        let budget = rf_ring_capacity_words;

        let decode_thread = std::thread::spawn(move || -> Result<(), AppError> {
            run_decode_loop(
                &raw_ring,
                &decode_stop,
                decode_cfg,
                decode_cfg_b,
                aux_enabled,
                peak,
                out_a.as_deref(),
                out_b.as_deref(),
                out_aux.as_deref(),
                &stats,
                budget,
            )
        });

        let stop_for_join = stop;
        let joined = std::thread::spawn(move || -> Result<(), AppError> {
            capture_thread.join().map_err(|_| AppError::Memory("capture thread panicked".into()))??;
            stop_for_join.store(true, Ordering::Release);
            decode_thread.join().map_err(|_| AppError::Memory("decode thread panicked".into()))??;
            Ok(())
        });

        let audio = if self.cfg.audio_enabled { Some(audio_raw_ring) } else { None };
        Ok((Rings { channel_a: rings.channel_a, channel_b: rings.channel_b, aux: rings.aux, audio, raw: raw_tee_ring }, joined))
    }
}

/// Decodes packed 32-bit RF words drained from `raw_ring` into the
/// per-channel/aux byte rings, until `stop` is set and the ring runs
/// dry. `count_budget`, if given, stops decoding once that many samples
/// have been produced (§4.3's `--count` contract).
#[allow(clippy::too_many_arguments)]
fn run_decode_loop(
    raw_ring: &RingBuffer,
    stop: &Arc<AtomicBool>,
    cfg_a: ChannelDecodeConfig,
    cfg_b: ChannelDecodeConfig,
    aux_enabled: bool,
    peak_enabled: bool,
    out_a: Option<&RingBuffer>,
    out_b: Option<&RingBuffer>,
    out_aux: Option<&RingBuffer>,
    stats: &Stats,
    count_budget: Option<u64>,
) -> Result<(), AppError> {
    const BLOCK_WORDS: usize = 4096;
    let block_bytes = BLOCK_WORDS * 4;

    let want_both = cfg_a.enabled && cfg_b.enabled;
    let same_pad = cfg_a.pad == cfg_b.pad;

    crate::writer::drain_loop(raw_ring, stop, block_bytes, |bytes| {
        if let Some(budget) = count_budget {
            if stats.total_samples.load(Ordering::Relaxed) >= budget {
                stop.store(true, Ordering::Release);
                return Ok(());
            }
        }

        let words: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let n = words.len();
        if n == 0 {
            return Ok(());
        }

        let mut clip = [0u64; 2];
        let mut peak_out = [0u16; 2];
        let mut buf_a = vec![0i16; if cfg_a.enabled { n } else { 0 }];
        let mut buf_b = vec![0i16; if cfg_b.enabled { n } else { 0 }];
        let mut aux_buf = vec![0u8; if aux_enabled { n } else { 0 }];

        if want_both && same_pad {
            let kernel_cfg = KernelConfig { channels: ChannelSelect::Both, pad: cfg_a.pad, peak: peak_enabled };
            match select_kernel(kernel_cfg) {
                #[cfg(target_arch = "x86_64")]
                KernelBackend::SimdBothNoPad16NoPeak if aux_enabled => unsafe {
                    misrc::kernels::simd::extract_both_16_nopad(&words, &mut buf_a, &mut buf_b, &mut aux_buf, &mut clip);
                },
                _ => {
                    let peak_arg = if peak_enabled { Some(&mut peak_out) } else { None };
                    let aux_arg = if aux_enabled { Some(aux_buf.as_mut_slice()) } else { None };
                    extract(kernel_cfg, &words, Some(&mut buf_a), Some(&mut buf_b), aux_arg, &mut clip, peak_arg);
                }
            }
        } else {
            if cfg_a.enabled {
                let kernel_cfg = KernelConfig { channels: ChannelSelect::A, pad: cfg_a.pad, peak: peak_enabled };
                let peak_arg = if peak_enabled { Some(&mut peak_out) } else { None };
                let aux_arg = if aux_enabled { Some(aux_buf.as_mut_slice()) } else { None };
                extract::<i16>(kernel_cfg, &words, Some(&mut buf_a), None, aux_arg, &mut clip, peak_arg);
            }
            if cfg_b.enabled {
                let kernel_cfg = KernelConfig { channels: ChannelSelect::B, pad: cfg_b.pad, peak: peak_enabled };
                let mut clip_b_only = [0u64; 2];
                let mut peak_b_only = [0u16; 2];
                let peak_arg = if peak_enabled { Some(&mut peak_b_only) } else { None };
                extract::<i16>(kernel_cfg, &words, None, Some(&mut buf_b), None, &mut clip_b_only, peak_arg);
                clip[1] = clip_b_only[1];
                peak_out[1] = peak_b_only[1];
            }
        }

        if cfg_a.enabled {
            if let Some(ring) = out_a {
                let bytes: Vec<u8> = buf_a.iter().flat_map(|s| s.to_le_bytes()).collect();
                ring.write_wrapped(&bytes);
            }
        }
        if cfg_b.enabled {
            if let Some(ring) = out_b {
                let bytes: Vec<u8> = buf_b.iter().flat_map(|s| s.to_le_bytes()).collect();
                ring.write_wrapped(&bytes);
            }
        }
        if aux_enabled {
            if let Some(ring) = out_aux {
                ring.write_wrapped(&aux_buf);
            }
        }

        stats.total_samples.fetch_add(n as u64, Ordering::Relaxed);
        stats.clip_a.fetch_add(clip[0], Ordering::Relaxed);
        stats.clip_b.fetch_add(clip[1], Ordering::Relaxed);
        Ok(())
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::SyntheticSource;

    fn synthetic_frame(fcnt: u16, payload: &[u16]) -> CapturedFrame {
        let width = payload.len() + 3;
        let height = 2u32;
        let mut words = vec![0u16; width * height as usize];
        words[0] = (misrc::framing::HSDAOH_MAGIC & 0xFFFF) as u16;
        words[1] = (misrc::framing::HSDAOH_MAGIC >> 16) as u16;
        words[2] = fcnt;
        words[3] = 0;
        words[4] = 0;
        words[width..width + payload.len()].copy_from_slice(payload);
        words[width * 2 - 1] = payload.len() as u16;
        CapturedFrame { words, width: width as u32, height }
    }

    #[test]
    fn coordinator_decodes_synthetic_stream() {
        let cfg = PipelineConfig {
            channel_a: ChannelDecodeConfig { enabled: true, pad: false },
            channel_b: ChannelDecodeConfig { enabled: true, pad: false },
            aux_enabled: false,
            audio_enabled: false,
            peak: false,
            raw_tee_enabled: false,
        };
        let coord = Coordinator::new(cfg);

        let word: u32 = 0x1234_5678;
        let frame = synthetic_frame(1, &[(word & 0xFFFF) as u16, (word >> 16) as u16]);
        let source: Box<dyn CaptureSource> = Box::new(SyntheticSource { frames: vec![frame] });

        let (rings, handle) = coord.spawn(source, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(50));
        coord.stop_flag().store(true, Ordering::Release);
        handle.join().unwrap().unwrap();

        assert!(rings.channel_a.is_some());
        assert!(rings.channel_b.is_some());
    }
}
