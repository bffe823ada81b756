//! RIFF/RF64 WAVE header writer (§6.3). Same placeholder-then-finalize
//! shape as a Sony Wave64 writer (write zeroed header at open, seek back
//! and rewrite once the final size is known), but the on-disk layout is
//! the fixed 82-byte RIFF/`ds64` structure §6.3 specifies rather than a
//! GUID-keyed W64 chunk chain.
//!
//! The struct below follows the byte offsets in §6.3 literally; their sum
//! is 82 bytes, not the 88 the prose rounds to (the same kind of rounding
//! slip as the §8 S1 worked table — see `DESIGN.md`). `sample_count` is
//! populated in both RIFF and RF64 modes; only `riff_size`/`data_size`
//! become `0xFFFF_FFFF` sentinels when RF64 is selected.

use std::io::{self, Seek, SeekFrom, Write};

use misrc_macros::ToBytes;

use crate::byteorder::WriteBytesLe;

/// Threshold from §4.9: switch to RF64 once `data_size + 80 > 2^31 - 1`.
const RF64_THRESHOLD: u64 = (1u64 << 31) - 1;

#[derive(ToBytes)]
struct WaveHeader {
    riff_id: [u8; 4],
    riff_size: u32,
    wave_id: [u8; 4],
    junk_id: [u8; 4],
    junk_size: u32,
    riff64_size: u64,
    data64_size: u64,
    sample_count: u64,
    extra_table_size: u32,
    fmt_id: [u8; 4],
    fmt_size: u32,
    format_type: u16,
    channel_count: u16,
    sample_rate: u32,
    bytes_per_second: u32,
    block_align: u16,
    bits_per_sample: u16,
    cb_size: u16,
    data_id: [u8; 4],
    data_size: u32,
}

/// Byte length of [`WaveHeader`] as serialized; computed from its field
/// widths rather than hardcoded so the placeholder and the finalized
/// header can never drift apart.
const HEADER_LEN: usize = 4 + 4 + 4 + 4 + 4 + 8 + 8 + 8 + 4 + 4 + 4 + 2 + 2 + 4 + 4 + 2 + 2 + 2 + 4 + 4;

pub struct WaveWriter<W: Write + Seek> {
    writer: W,
    start: u64,
    data_written: u64,
    sample_rate: u32,
    channels: u16,
    bits_per_sample: u16,
}

impl<W: Write + Seek> WaveWriter<W> {
    pub fn new(writer: W, sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self { writer, start: 0, data_written: 0, sample_rate, channels, bits_per_sample }
    }

    /// Writes the zero-filled placeholder header; call once at open.
    pub fn write_header(&mut self) -> io::Result<()> {
        self.start = self.writer.stream_position()?;
        self.writer.write_all(&[0u8; HEADER_LEN])
    }

    /// Writes already-packed little-endian PCM bytes (one sample frame is
    /// `channels * bits_per_sample/8` bytes); the caller is responsible for
    /// bit-depth packing (see `writer::audio`).
    pub fn write_pcm(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)?;
        self.data_written += bytes.len() as u64;
        Ok(())
    }

    pub fn data_written(&self) -> u64 {
        self.data_written
    }

    /// Rewinds to the placeholder and writes the finalized header,
    /// choosing RIFF or RF64 per the §4.9 threshold.
    pub fn finish(&mut self) -> io::Result<()> {
        let end = self.writer.stream_position()?;
        let block_align = self.channels * (self.bits_per_sample / 8);
        let sample_count = if block_align > 0 { self.data_written / block_align as u64 } else { 0 };

        let use_rf64 = self.data_written + 80 > RF64_THRESHOLD;

        let header = if use_rf64 {
            WaveHeader {
                riff_id: *b"RF64",
                riff_size: 0xFFFF_FFFF,
                wave_id: *b"WAVE",
                junk_id: *b"ds64",
                junk_size: 28,
                riff64_size: (HEADER_LEN as u64 - 8) + self.data_written,
                data64_size: self.data_written,
                sample_count,
                extra_table_size: 0,
                fmt_id: *b"fmt ",
                fmt_size: 18,
                format_type: 1,
                channel_count: self.channels,
                sample_rate: self.sample_rate,
                bytes_per_second: self.sample_rate * block_align as u32,
                block_align,
                bits_per_sample: self.bits_per_sample,
                cb_size: 0,
                data_id: *b"data",
                data_size: 0xFFFF_FFFF,
            }
        } else {
            WaveHeader {
                riff_id: *b"RIFF",
                riff_size: (HEADER_LEN as u32 - 8) + self.data_written as u32,
                wave_id: *b"WAVE",
                junk_id: *b"JUNK",
                junk_size: 28,
                riff64_size: 0,
                data64_size: 0,
                sample_count,
                extra_table_size: 0,
                fmt_id: *b"fmt ",
                fmt_size: 18,
                format_type: 1,
                channel_count: self.channels,
                sample_rate: self.sample_rate,
                bytes_per_second: self.sample_rate * block_align as u32,
                block_align,
                bits_per_sample: self.bits_per_sample,
                cb_size: 0,
                data_id: *b"data",
                data_size: self.data_written as u32,
            }
        };

        let mut bytes = Vec::with_capacity(HEADER_LEN);
        header.write_le(&mut bytes);
        debug_assert_eq!(bytes.len(), HEADER_LEN);

        self.writer.seek(SeekFrom::Start(self.start))?;
        self.writer.write_all(&bytes)?;
        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // §8 scenario S5: 10 four-channel input frames (120 bytes), written to
    // a 2-channel sink (60 bytes after the channel split done upstream by
    // `writer::audio`).
    #[test]
    fn s5_wave_header_small() {
        let mut w = WaveWriter::new(Cursor::new(Vec::new()), 78125, 2, 24);
        w.write_header().unwrap();
        w.write_pcm(&vec![0u8; 60]).unwrap();
        w.finish().unwrap();

        let buf = w.writer.into_inner();
        assert_eq!(&buf[0..4], b"RIFF");
        assert_eq!(&buf[8..12], b"WAVE");
        assert_eq!(&buf[12..16], b"JUNK");
        assert_eq!(u32::from_le_bytes(buf[16..20].try_into().unwrap()), 28);
        assert_eq!(&buf[48..52], b"fmt ");
        assert_eq!(u16::from_le_bytes(buf[58..60].try_into().unwrap()), 2);
        assert_eq!(u32::from_le_bytes(buf[60..64].try_into().unwrap()), 78125);
        assert_eq!(u32::from_le_bytes(buf[64..68].try_into().unwrap()), 468_750);
        assert_eq!(u16::from_le_bytes(buf[68..70].try_into().unwrap()), 6);
        assert_eq!(u16::from_le_bytes(buf[70..72].try_into().unwrap()), 24);
        assert_eq!(&buf[74..78], b"data");
        assert_eq!(u32::from_le_bytes(buf[78..82].try_into().unwrap()), 60);
        assert_eq!(buf.len() as u64, HEADER_LEN as u64 + 60);
    }

    #[test]
    fn selects_rf64_past_threshold() {
        let mut w = WaveWriter::new(Cursor::new(Vec::new()), 78125, 2, 24);
        w.write_header().unwrap();
        w.data_written = RF64_THRESHOLD; // avoid writing 2GiB in a test
        w.finish().unwrap();

        let buf = w.writer.into_inner();
        assert_eq!(&buf[0..4], b"RF64");
        assert_eq!(u32::from_le_bytes(buf[4..8].try_into().unwrap()), 0xFFFF_FFFF);
        assert_eq!(&buf[12..16], b"ds64");
        assert_eq!(u32::from_le_bytes(buf[78..82].try_into().unwrap()), 0xFFFF_FFFF);
    }

    #[test]
    fn roundtrip_sample_count() {
        let mut w = WaveWriter::new(Cursor::new(Vec::new()), 78125, 1, 24);
        w.write_header().unwrap();
        w.write_pcm(&[0u8; 3 * 7]).unwrap();
        w.finish().unwrap();
        let buf = w.writer.into_inner();
        assert_eq!(u64::from_le_bytes(buf[36..44].try_into().unwrap()), 7);
    }
}
