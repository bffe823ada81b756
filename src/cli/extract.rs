//! `extract`: runs the same bit-exact kernels against a file or pipe of
//! already-captured packed words, with no framing/sync layer involved.
//! Reuses `InputReader` for the file/stdin split and `writer::raw` for
//! output packing, since both are untouched by the live-capture-specific
//! parts of the pipeline.

use std::io::Write;

use anyhow::Result;
use indicatif::MultiProgress;

use crate::cli::command::{Cli, ExtractArgs};
use crate::input::InputReader;
use crate::writer::raw::RawFormat;
use crate::writer::Sink;

const BLOCK_WORDS: usize = 16384;

pub fn cmd_extract(args: &ExtractArgs, _cli: &Cli, _pb: Option<&MultiProgress>) -> Result<()> {
    let mut reader = InputReader::new(&args.input)?;

    let want_a = args.channel_a.rf.is_some();
    let want_b = args.channel_b.rf.is_some();
    let want_aux = args.aux.is_some();

    let mut sink_a = args.channel_a.rf.as_deref().map(|p| Sink::open(p, true, true)).transpose()?;
    let mut sink_b = args.channel_b.rf.as_deref().map(|p| Sink::open(p, true, true)).transpose()?;
    let mut sink_aux = args.aux.as_deref().map(|p| Sink::open(p, true, true)).transpose()?;

    let format_a = RawFormat { out_size: if args.channel_a.eightbit { 2 } else { 4 }, reduce_8bit: args.channel_a.eightbit, pad: args.channel_a.pad };
    let format_b = RawFormat { out_size: if args.channel_b.eightbit { 2 } else { 4 }, reduce_8bit: args.channel_b.eightbit, pad: args.channel_b.pad };

    let mut clip = [0u64; 2];

    if args.single {
        let chunk_bytes = BLOCK_WORDS * 2;
        reader.process_chunks(chunk_bytes, |bytes| {
            let words: Vec<u16> = bytes.chunks_exact(2).map(|c| u16::from_le_bytes([c[0], c[1]])).collect();
            let mut buf_a = vec![0i16; if want_a { words.len() } else { 0 }];
            let mut aux_buf = vec![0u8; if want_aux { words.len() } else { 0 }];

            misrc::kernels::extract_single(
                &words,
                if want_a { Some(buf_a.as_mut_slice()) } else { None },
                if want_aux { Some(aux_buf.as_mut_slice()) } else { None },
                &mut clip[0],
                args.channel_a.pad,
                None,
            );

            if let Some(sink) = sink_a.as_mut() {
                write_packed(sink, &buf_a, &format_a)?;
            }
            if let Some(sink) = sink_aux.as_mut() {
                sink.write_all(&aux_buf)?;
            }
            Ok(true)
        })?;
    } else {
        let chunk_bytes = BLOCK_WORDS * 4;
        reader.process_chunks(chunk_bytes, |bytes| {
            let words: Vec<u32> = bytes.chunks_exact(4).map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect();
            let n = words.len();
            let mut buf_a = vec![0i16; if want_a { n } else { 0 }];
            let mut buf_b = vec![0i16; if want_b { n } else { 0 }];
            let mut aux_buf = vec![0u8; if want_aux { n } else { 0 }];

            let same_pad = args.channel_a.pad == args.channel_b.pad;

            if want_a && want_b && same_pad {
                let cfg = misrc::kernels::KernelConfig { channels: misrc::kernels::ChannelSelect::Both, pad: args.channel_a.pad, peak: false };
                misrc::kernels::extract::<i16>(
                    cfg,
                    &words,
                    Some(buf_a.as_mut_slice()),
                    Some(buf_b.as_mut_slice()),
                    if want_aux { Some(aux_buf.as_mut_slice()) } else { None },
                    &mut clip,
                    None,
                );
            } else {
                // Channels A and B disagree on `pad` (or only one is wanted):
                // each gets its own single-channel call with its own pad
                // setting, since `KernelConfig::pad` is one flag shared by
                // both channels in the combined call.
                if want_a {
                    let cfg = misrc::kernels::KernelConfig { channels: misrc::kernels::ChannelSelect::A, pad: args.channel_a.pad, peak: false };
                    misrc::kernels::extract::<i16>(
                        cfg,
                        &words,
                        Some(buf_a.as_mut_slice()),
                        None,
                        if want_aux { Some(aux_buf.as_mut_slice()) } else { None },
                        &mut clip,
                        None,
                    );
                }
                if want_b {
                    let cfg = misrc::kernels::KernelConfig { channels: misrc::kernels::ChannelSelect::B, pad: args.channel_b.pad, peak: false };
                    let mut clip_b_only = [0u64; 2];
                    misrc::kernels::extract::<i16>(
                        cfg,
                        &words,
                        None,
                        Some(buf_b.as_mut_slice()),
                        if want_aux && !want_a { Some(aux_buf.as_mut_slice()) } else { None },
                        &mut clip_b_only,
                        None,
                    );
                    clip[1] = clip_b_only[1];
                }
                if want_aux && !want_a && !want_b {
                    let cfg = misrc::kernels::KernelConfig { channels: misrc::kernels::ChannelSelect::AuxOnly, pad: args.channel_a.pad, peak: false };
                    misrc::kernels::extract::<i16>(cfg, &words, None, None, Some(aux_buf.as_mut_slice()), &mut clip, None);
                }
            }

            if let Some(sink) = sink_a.as_mut() {
                write_packed(sink, &buf_a, &format_a)?;
            }
            if let Some(sink) = sink_b.as_mut() {
                write_packed(sink, &buf_b, &format_b)?;
            }
            if let Some(sink) = sink_aux.as_mut() {
                sink.write_all(&aux_buf)?;
            }
            Ok(true)
        })?;
    }

    if let Some(sink) = sink_a.as_mut() {
        sink.flush()?;
    }
    if let Some(sink) = sink_b.as_mut() {
        sink.flush()?;
    }
    if let Some(sink) = sink_aux.as_mut() {
        sink.flush()?;
    }

    if !args.channel_a.suppress_clip {
        log::info!("channel A clip count: {}", clip[0]);
    }
    if !args.channel_b.suppress_clip {
        log::info!("channel B clip count: {}", clip[1]);
    }

    Ok(())
}

fn write_packed(sink: &mut Sink, samples: &[i16], format: &RawFormat) -> Result<()> {
    let scale = format.init_scale();
    match format.out_size {
        2 => {
            if format.reduce_8bit {
                let mut narrow = vec![0i8; samples.len()];
                misrc::convert::narrow_i16_to_i8_sat(samples, &mut narrow);
                for v in narrow {
                    sink.write_all(&((v as f64 * scale) as i16).to_le_bytes())?;
                }
            } else {
                for &s in samples {
                    sink.write_all(&s.to_le_bytes())?;
                }
            }
        }
        4 => {
            if format.reduce_8bit {
                let mut narrow = vec![0i32; samples.len()];
                misrc::convert::narrow_i16_to_i32_sat8(samples, &mut narrow);
                for v in narrow {
                    sink.write_all(&((v as f64 * scale) as i32).to_le_bytes())?;
                }
            } else {
                let mut wide = vec![0i32; samples.len()];
                misrc::convert::widen_i16_to_i32(samples, &mut wide);
                for v in wide {
                    sink.write_all(&((v as f64 * scale) as i32).to_le_bytes())?;
                }
            }
        }
        _ => unreachable!(),
    }
    Ok(())
}
