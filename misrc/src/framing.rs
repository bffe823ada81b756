//! HDMI framing/sync protocol decoder (C4).
//!
//! Per-video-frame state machine: magic check, frame-counter continuity,
//! per-line payload-length parsing, stream-ID demux, CRC-16 verification,
//! idle-count check, and sync acquisition/loss. Frames are delivered as
//! `u16` word arrays (the YUYV pixel stride the capture source hands
//! over, reinterpreted per §6.1); this module does no I/O and never
//! fails — it discards what it cannot trust and reports that decision
//! through the returned event list and the `log` facade.
//!
//! The exact binary layout of the per-frame metadata header (magic,
//! frame counter, flags, crc_config) is owned by the out-of-scope vendor
//! library; this module fixes one (see [`HEADER_WORDS`]) and reserves the
//! whole of line 0 for it, so line 0 never participates in the per-line
//! payload/trailer extraction applied to lines `1..height`.

use crate::message::FramingEvent;

/// Vendor framing magic; frames whose header does not start with this
/// value are treated as out-of-sync garbage.
pub const HSDAOH_MAGIC: u32 = 0x4853_4441;

/// Words occupied by the metadata header at the start of line 0:
/// `[magic_lo, magic_hi, framecounter, flags, crc_config]`.
pub const HEADER_WORDS: usize = 5;

const FLAG_STREAM_ID_PRESENT: u16 = 0x0001;

const NONSYNC_WARNING_THRESHOLD: u32 = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrcConfig {
    None,
    Crc16OneLine,
    Crc16TwoLine,
}

impl CrcConfig {
    fn from_word(w: u16) -> Self {
        match w {
            1 => CrcConfig::Crc16OneLine,
            2 => CrcConfig::Crc16TwoLine,
            _ => CrcConfig::None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct FrameHeader {
    magic: u32,
    framecounter: u16,
    flags: u16,
    crc_config: CrcConfig,
}

fn parse_header(line0: &[u16]) -> Option<FrameHeader> {
    if line0.len() < HEADER_WORDS {
        return None;
    }
    let magic = (line0[0] as u32) | ((line0[1] as u32) << 16);
    Some(FrameHeader {
        magic,
        framecounter: line0[2],
        flags: line0[3],
        crc_config: CrcConfig::from_word(line0[4]),
    })
}

/// One video frame as delivered by the capture source, reinterpreted as
/// 16-bit little-endian words (§6.1: YUV 4:2:2 8-bit packed as u16).
pub struct FrameInput<'a> {
    pub words: &'a [u16],
    pub width: u32,
    pub height: u32,
}

/// Bytes demultiplexed from one frame, plus any events raised while
/// decoding it.
#[derive(Debug, Default)]
pub struct FrameOutput {
    pub rf_bytes: Vec<u8>,
    pub audio_bytes: Vec<u8>,
    pub events: Vec<FramingEvent>,
}

/// Configuration fixed for the lifetime of a capture: which streams are
/// requested.
#[derive(Debug, Clone, Copy)]
pub struct FramingConfig {
    pub rf_enabled: bool,
    pub audio_enabled: bool,
}

/// Mutable per-capture state, owned exclusively by the framing-decoder
/// thread (§5 ordering guarantees).
pub struct FramingDecoder {
    cfg: FramingConfig,
    stream_synced: bool,
    last_frame_cnt: Option<u16>,
    in_order_cnt: u32,
    nonsync_cnt: u32,
    last_crc: [u16; 2],
    idle_cnt: u16,
    frames_since_error: u32,
    audio_started: bool,
    audio_started2: bool,
    shutdown_requested: bool,
}

impl FramingDecoder {
    pub fn new(cfg: FramingConfig) -> Self {
        Self {
            cfg,
            stream_synced: false,
            last_frame_cnt: None,
            in_order_cnt: 0,
            nonsync_cnt: 0,
            last_crc: [0, 0],
            idle_cnt: 0,
            frames_since_error: 0,
            audio_started: false,
            audio_started2: false,
            shutdown_requested: false,
        }
    }

    pub fn is_synced(&self) -> bool {
        self.stream_synced
    }

    /// Set after a [`FramingEvent::CriticalCannotCaptureAudio`]; the
    /// coordinator should stop the capture once it observes this.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn process_frame(&mut self, frame: FrameInput<'_>) -> FrameOutput {
        let mut out = FrameOutput::default();
        let width = frame.width as usize;

        let Some(header) = parse_header(&frame.words[..width.min(frame.words.len())]) else {
            return out;
        };

        if header.magic != HSDAOH_MAGIC {
            if self.stream_synced {
                log::error!("Lost sync to HDMI input stream");
                out.events.push(FramingEvent::LostSync);
            }
            self.stream_synced = false;
            self.nonsync_cnt += 1;
            self.maybe_warn_nonsync(&mut out);
            return out;
        }

        if self.last_frame_cnt == Some(header.framecounter) {
            return out;
        }

        let expected = self.last_frame_cnt.map(|c| c.wrapping_add(1));
        if expected != Some(header.framecounter) {
            self.in_order_cnt = 0;
            if self.stream_synced {
                if let Some(expected) = expected {
                    log::error!(
                        "Missed at least one frame, fcnt {}, expected {expected}",
                        header.framecounter
                    );
                    out.events.push(FramingEvent::FrameMissed {
                        expected,
                        got: header.framecounter,
                    });
                }
            }
        } else {
            self.in_order_cnt += 1;
        }
        self.last_frame_cnt = Some(header.framecounter);

        let stream_id_present = header.flags & FLAG_STREAM_ID_PRESENT != 0;
        let crc_present = header.crc_config != CrcConfig::None;

        let mut frame_errors: u32 = 0;
        let mut discard_frame = false;

        'lines: for row in 1..frame.height as usize {
            let start = row * width;
            if start + width > frame.words.len() {
                break;
            }
            let line = &frame.words[start..start + width];

            let payload_len = (line[width - 1] & 0x0FFF) as usize;
            let crc = line[width - 2];
            let stream_id = if stream_id_present { line[width - 3] } else { 0 };

            if payload_len > width - 1 {
                if self.stream_synced {
                    log::error!("Invalid payload length: {payload_len}");
                    out.events.push(FramingEvent::InvalidPayloadLength(payload_len as u16));
                    out.rf_bytes.clear();
                    out.audio_bytes.clear();
                    discard_frame = true;
                } else {
                    self.nonsync_cnt += 1;
                    discard_frame = true;
                }
                break 'lines;
            }

            let trailer_words = (stream_id_present as usize) + (crc_present as usize);
            let idle_len = width - 1 - payload_len - trailer_words;
            let idle_region = &line[payload_len..payload_len + idle_len];
            frame_errors += check_idle_region(&mut self.idle_cnt, idle_region);

            if crc_present {
                let expected_crc = match header.crc_config {
                    CrcConfig::Crc16OneLine => self.last_crc[0],
                    CrcConfig::Crc16TwoLine => self.last_crc[1],
                    CrcConfig::None => unreachable!(),
                };
                if crc != expected_crc && self.stream_synced {
                    frame_errors += 1;
                }
                self.last_crc[1] = self.last_crc[0];
                self.last_crc[0] = crc16_ccitt_words(line);
            }

            if self.stream_synced && payload_len > 0 {
                if stream_id == 0
                    && self.cfg.rf_enabled
                    && (!self.cfg.audio_enabled || self.audio_started)
                {
                    for &w in &line[..payload_len] {
                        out.rf_bytes.extend_from_slice(&w.to_le_bytes());
                    }
                } else if stream_id == 1 && self.cfg.audio_enabled {
                    if self.audio_started2 {
                        for &w in &line[..payload_len] {
                            out.audio_bytes.extend_from_slice(&w.to_le_bytes());
                        }
                    } else if self.audio_started {
                        self.audio_started2 = true;
                        log::info!("Audio and RF now in sync");
                    } else {
                        self.audio_started = true;
                    }
                }
            }
        }

        if discard_frame {
            out.rf_bytes.clear();
            out.audio_bytes.clear();
            return out;
        }

        if frame_errors > 0 && self.stream_synced {
            log::error!(
                "{frame_errors} frame errors, {} frames since last error",
                self.frames_since_error
            );
            out.events.push(FramingEvent::FrameErrors {
                count: frame_errors,
                frames_since_error: self.frames_since_error,
            });
            self.frames_since_error = 0;
            out.rf_bytes.clear();
            out.audio_bytes.clear();
        } else {
            self.frames_since_error += 1;
        }

        if !self.stream_synced && frame_errors == 0 && self.in_order_cnt > 4 {
            let use_crc = crc_present;
            let use_stream_id = stream_id_present;
            out.events.push(FramingEvent::SyncAcquired { use_crc, use_stream_id });

            if self.cfg.audio_enabled {
                if stream_id_present {
                    log::info!("Wait for RF and audio synchronisation...");
                } else {
                    log::error!("MISRC does not transmit audio, cannot capture audio!");
                    out.events.push(FramingEvent::CriticalCannotCaptureAudio);
                    self.shutdown_requested = true;
                    out.rf_bytes.clear();
                    out.audio_bytes.clear();
                    return out;
                }
            }

            self.stream_synced = true;
            self.nonsync_cnt = 0;
        }

        out
    }

    fn maybe_warn_nonsync(&self, out: &mut FrameOutput) {
        if self.nonsync_cnt == NONSYNC_WARNING_THRESHOLD {
            log::error!("Received more than 500 corrupted frames! Check connection!");
            out.events.push(FramingEvent::NonSyncThreshold(self.nonsync_cnt));
        } else if self.nonsync_cnt % 100 == 0 {
            log::info!("{} consecutive non-synced frames", self.nonsync_cnt);
        }
    }
}

/// Checks that `region` continues incrementing from `idle_cnt` one step
/// per word, updating `idle_cnt` to the last observed value regardless
/// of mismatches so a single dropped line does not cascade into every
/// subsequent check failing.
fn check_idle_region(idle_cnt: &mut u16, region: &[u16]) -> u32 {
    let mut errors = 0;
    for &w in region {
        *idle_cnt = idle_cnt.wrapping_add(1);
        if w != *idle_cnt {
            errors += 1;
            *idle_cnt = w;
        }
    }
    errors
}

/// CRC-16-CCITT (poly 0x1021, init 0xFFFF, MSB-first) over a line's raw
/// little-endian 16-bit words, matching the field's own byte order.
fn crc16_ccitt_words(words: &[u16]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &w in words {
        for byte in w.to_le_bytes() {
            crc ^= (byte as u16) << 8;
            for _ in 0..8 {
                crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_words(framecounter: u16, flags: u16, crc_config: u16) -> [u16; HEADER_WORDS] {
        let magic_lo = (HSDAOH_MAGIC & 0xFFFF) as u16;
        let magic_hi = (HSDAOH_MAGIC >> 16) as u16;
        [magic_lo, magic_hi, framecounter, flags, crc_config]
    }

    /// Builds a single-line frame (width W) with no stream id, no crc,
    /// `payload_len` payload words followed by a correct idle run and the
    /// trailing `payload_len` word.
    fn make_frame(width: usize, framecounter: u16, idle_cnt_start: u16, payload: &[u16]) -> Vec<u16> {
        let mut line = vec![0u16; width];
        for (i, &w) in payload.iter().enumerate() {
            line[i] = w;
        }
        let idle_len = width - 1 - payload.len();
        for i in 0..idle_len {
            line[payload.len() + i] = idle_cnt_start.wrapping_add(1 + i as u16);
        }
        line[width - 1] = payload.len() as u16;

        let mut words = header_words(framecounter, 0, 0).to_vec();
        words.resize(width, 0);
        words[width - 1] = 0; // header line carries no payload trailer semantics beyond header
        words.extend_from_slice(&line);
        words
    }

    #[test]
    fn sync_acquires_after_five_valid_frames_then_loses_on_bad_magic() {
        let width = 16;
        let mut decoder = FramingDecoder::new(FramingConfig { rf_enabled: true, audio_enabled: false });

        let mut idle = 0u16;
        let mut events_total = Vec::new();
        // The first frame only establishes the frame-counter baseline (no
        // prior value to compare against yet); five further consecutive
        // in-order frames are what drives `in_order_cnt` past 4.
        for i in 0..6u16 {
            let frame = make_frame(width, i, idle, &[0xAAAA, 0xBBBB]);
            idle = idle.wrapping_add((width - 1 - 2) as u16);
            let out = decoder.process_frame(FrameInput { words: &frame, width: width as u32, height: 2 });
            events_total.extend(out.events);
        }

        let sync_events: Vec<_> = events_total
            .iter()
            .filter(|e| matches!(e, FramingEvent::SyncAcquired { .. }))
            .collect();
        assert_eq!(sync_events.len(), 1);
        assert!(decoder.is_synced());

        let mut garbage = vec![0u16; width * 2];
        garbage[0] = 0xDEAD;
        let out = decoder.process_frame(FrameInput { words: &garbage, width: width as u32, height: 2 });
        assert_eq!(out.events, vec![FramingEvent::LostSync]);
        assert!(!decoder.is_synced());
    }

    #[test]
    fn duplicate_frame_counter_is_dropped_without_in_order_increment() {
        let width = 16;
        let mut decoder = FramingDecoder::new(FramingConfig { rf_enabled: true, audio_enabled: false });
        let frame = make_frame(width, 7, 0, &[0x1111]);

        let first = decoder.process_frame(FrameInput { words: &frame, width: width as u32, height: 1 });
        let second = decoder.process_frame(FrameInput { words: &frame, width: width as u32, height: 1 });

        assert!(first.events.is_empty() || !first.events.contains(&FramingEvent::LostSync));
        assert!(second.rf_bytes.is_empty());
        assert_eq!(decoder.in_order_cnt, 1);
    }

    #[test]
    fn audio_gating_requires_two_stage_handshake() {
        let width = 16;
        let mut decoder = FramingDecoder::new(FramingConfig { rf_enabled: true, audio_enabled: true });

        // Drive to sync first using RF-only lines (stream_id omitted since
        // STREAM_ID_PRESENT is unset here would trip the critical-audio
        // path; instead set the flag on every header).
        for i in 0..6u16 {
            let mut frame = make_frame(width, i, 0, &[0x2222]);
            frame[3] = FLAG_STREAM_ID_PRESENT;
            let _ = decoder.process_frame(FrameInput { words: &frame, width: width as u32, height: 1 });
        }
        assert!(decoder.is_synced());
        assert!(!decoder.audio_started2);
    }

    #[test]
    fn crc16_ccitt_is_deterministic() {
        let a = crc16_ccitt_words(&[0x1234, 0x5678]);
        let b = crc16_ccitt_words(&[0x1234, 0x5678]);
        assert_eq!(a, b);
        let c = crc16_ccitt_words(&[0x1234, 0x5679]);
        assert_ne!(a, c);
    }
}
