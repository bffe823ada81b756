use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use crate::capture;
use crate::cli::command::{CaptureArgs, Cli, FlacBits as CliFlacBits};
use crate::errors::AppError;
use crate::pipeline::{ChannelDecodeConfig, Coordinator, PipelineConfig};
use crate::writer::audio::{AudioLayout, AudioSink};
use crate::writer::flac::{FlacBits, FlacParams};
use crate::writer::raw::{RawFormat, RfResampler};
use crate::writer::Sink;

/// Parses `--time`'s `s` / `m:s` / `h:m:s` forms into a sample-count
/// budget at the fixed 40 MHz RF rate (§4.3).
fn parse_duration_to_samples(s: &str) -> Option<u64> {
    let parts: Vec<&str> = s.split(':').collect();
    let secs: f64 = match parts.as_slice() {
        [sec] => sec.parse().ok()?,
        [min, sec] => min.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?,
        [h, min, sec] => h.parse::<f64>().ok()? * 3600.0 + min.parse::<f64>().ok()? * 60.0 + sec.parse::<f64>().ok()?,
        _ => return None,
    };
    const RF_SAMPLE_COUNT_RATE: f64 = 40_000_000.0;
    Some((secs * RF_SAMPLE_COUNT_RATE) as u64)
}

fn resolve_flac_bits(cli_bits: CliFlacBits, reduce_8bit: bool) -> FlacBits {
    match cli_bits {
        CliFlacBits::Auto if reduce_8bit => FlacBits::Twelve,
        CliFlacBits::Auto => FlacBits::Sixteen,
        CliFlacBits::Twelve => FlacBits::Twelve,
        CliFlacBits::Sixteen => FlacBits::Sixteen,
    }
}

pub fn cmd_capture(args: &CaptureArgs, cli: &Cli, pb: Option<&MultiProgress>) -> Result<()> {
    let count_budget = args.count.or_else(|| args.time.as_deref().and_then(parse_duration_to_samples));

    let audio_enabled = args.audio_enabled();
    let rf_outputs = [args.channel_a.rf.is_some(), args.channel_b.rf.is_some()]
        .into_iter()
        .filter(|b| *b)
        .count();

    let pipeline_cfg = PipelineConfig {
        channel_a: ChannelDecodeConfig { enabled: args.channel_a.rf.is_some(), pad: args.channel_a.pad },
        channel_b: ChannelDecodeConfig { enabled: args.channel_b.rf.is_some(), pad: args.channel_b.pad },
        aux_enabled: args.aux.is_some(),
        audio_enabled,
        peak: args.channel_a.level || args.channel_b.level,
        raw_tee_enabled: args.raw.is_some(),
    };

    let coordinator = Coordinator::new(pipeline_cfg);
    let source = capture::open(args.device.as_deref()).map_err(AppError::from)?;

    let (rings, join_handle) = coordinator.spawn(source, count_budget).map_err(anyhow::Error::from)?;
    let stop = coordinator.stop_flag();

    let progress = pb.map(|multi| {
        let bar = multi.add(ProgressBar::new_spinner());
        bar.set_style(ProgressStyle::with_template("{spinner} {msg}").unwrap());
        bar
    });

    let mut threads = Vec::new();

    if let Some(ring) = rings.channel_a.clone() {
        let sink = Sink::open(args.channel_a.rf.as_deref().unwrap(), args.overwrite, args.non_interactive)?;
        let stop = stop.clone();
        threads.push(spawn_rf_writer_impl(
            ring,
            stop,
            sink,
            args.channel_a.resample,
            args.channel_a.resample_quality,
            args.channel_a.resample_gain,
            args.channel_a.eightbit,
            args.channel_a.pad,
            args,
            rf_outputs,
        )?);
    }
    if let Some(ring) = rings.channel_b.clone() {
        let sink = Sink::open(args.channel_b.rf.as_deref().unwrap(), args.overwrite, args.non_interactive)?;
        let stop = stop.clone();
        threads.push(spawn_rf_writer_impl(
            ring,
            stop,
            sink,
            args.channel_b.resample,
            args.channel_b.resample_quality,
            args.channel_b.resample_gain,
            args.channel_b.eightbit,
            args.channel_b.pad,
            args,
            rf_outputs,
        )?);
    }
    if let Some(ring) = rings.aux.clone() {
        let sink = Sink::open(args.aux.as_deref().unwrap(), args.overwrite, args.non_interactive)?;
        let stop = stop.clone();
        threads.push(spawn_byte_tee(ring, stop, sink));
    }
    if let Some(ring) = rings.raw.clone() {
        let sink = Sink::open(args.raw.as_deref().unwrap(), args.overwrite, args.non_interactive)?;
        let stop = stop.clone();
        threads.push(spawn_byte_tee(ring, stop, sink));
    }
    if let Some(ring) = rings.audio.clone() {
        let mut sinks = Vec::new();
        if let Some(path) = &args.audio_4ch {
            sinks.push(AudioSink { layout: AudioLayout::FourChannel, sink: Sink::open(path, args.overwrite, args.non_interactive)? });
        }
        if let Some(path) = &args.audio_2ch_12 {
            sinks.push(AudioSink { layout: AudioLayout::Pair([0, 1]), sink: Sink::open(path, args.overwrite, args.non_interactive)? });
        }
        if let Some(path) = &args.audio_2ch_34 {
            sinks.push(AudioSink { layout: AudioLayout::Pair([2, 3]), sink: Sink::open(path, args.overwrite, args.non_interactive)? });
        }
        for (i, path) in [&args.audio_1ch_1, &args.audio_1ch_2, &args.audio_1ch_3, &args.audio_1ch_4].into_iter().enumerate() {
            if let Some(path) = path {
                sinks.push(AudioSink { layout: AudioLayout::Single(i), sink: Sink::open(path, args.overwrite, args.non_interactive)? });
            }
        }
        let stop = stop.clone();
        threads.push(std::thread::spawn(move || -> Result<()> {
            crate::writer::audio::run(&ring, &stop, sinks).map_err(anyhow::Error::from)
        }));
    }

    if cli.progress {
        if let Some(bar) = &progress {
            let stats = coordinator.stats.clone();
            let stop_watch = stop.clone();
            while !stop_watch.load(Ordering::Acquire) {
                bar.set_message(format!(
                    "samples={} clip_a={} clip_b={}",
                    stats.total_samples.load(Ordering::Relaxed),
                    stats.clip_a.load(Ordering::Relaxed),
                    stats.clip_b.load(Ordering::Relaxed)
                ));
                std::thread::sleep(std::time::Duration::from_millis(200));
            }
            bar.finish_and_clear();
        }
    }

    join_handle.join().map_err(|_| anyhow::anyhow!("capture thread panicked"))?.map_err(anyhow::Error::from)?;

    for t in threads {
        t.join().map_err(|_| anyhow::anyhow!("writer thread panicked"))??;
    }

    if !args.channel_a.suppress_clip {
        log::info!("channel A clip count: {}", coordinator.stats.clip_a.load(Ordering::Relaxed));
    }
    if !args.channel_b.suppress_clip {
        log::info!("channel B clip count: {}", coordinator.stats.clip_b.load(Ordering::Relaxed));
    }

    Ok(())
}

/// Drains `ring` straight to `sink` with no decoding: used for `--aux`
/// and `--raw`, which are both byte-identical copies of one of the
/// framing decoder's demultiplexed streams.
fn spawn_byte_tee(ring: Arc<misrc::ring::RingBuffer>, stop: Arc<std::sync::atomic::AtomicBool>, mut sink: Sink) -> std::thread::JoinHandle<Result<()>> {
    std::thread::spawn(move || -> Result<()> {
        use std::io::Write;
        crate::writer::drain_loop(&ring, &stop, 4096, |bytes| {
            sink.write_all(bytes).map_err(|e| {
                crate::errors::WriterError::File(crate::errors::FileError::Io { path: std::path::PathBuf::from("<tee sink>"), source: e })
            })
        })
        .map_err(anyhow::Error::from)?;
        Ok(sink.flush()?)
    })
}

#[allow(clippy::too_many_arguments)]
fn spawn_rf_writer_impl(
    ring: Arc<misrc::ring::RingBuffer>,
    stop: Arc<std::sync::atomic::AtomicBool>,
    sink: Sink,
    resample_hz: u32,
    resample_quality: crate::cli::command::ResampleQuality,
    resample_gain: f64,
    reduce_8bit: bool,
    pad: bool,
    capture_args: &CaptureArgs,
    rf_outputs: usize,
) -> Result<std::thread::JoinHandle<Result<()>>> {
    const NATIVE_RATE: u32 = 40_000;

    let resampler = if resample_hz != NATIVE_RATE {
        Some(RfResampler::new(NATIVE_RATE, resample_hz, resample_quality, 4096, resample_gain)?)
    } else {
        None
    };

    if capture_args.rf_flac {
        let cores = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4);
        let threads = crate::writer::flac::thread_budget(cores, rf_outputs.max(1));
        let params = FlacParams {
            sample_rate: if resampler.is_some() { resample_hz } else { NATIVE_RATE },
            bits: resolve_flac_bits(capture_args.rf_flac_bits, reduce_8bit),
            compression_level: capture_args.rf_flac_level,
            threads,
        };
        return Ok(std::thread::spawn(move || -> Result<()> {
            crate::writer::flac::run(&ring, &stop, sink, params, resampler).map_err(anyhow::Error::from)
        }));
    }

    let format = RawFormat { out_size: if reduce_8bit { 2 } else { 4 }, reduce_8bit, pad };

    Ok(std::thread::spawn(move || -> Result<()> {
        crate::writer::raw::run(&ring, &stop, sink, format, resampler).map_err(anyhow::Error::from)
    }))
}
