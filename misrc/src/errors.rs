#[derive(thiserror::Error, Debug)]
pub enum RingError {
    #[error("ring buffer capacity must be a multiple of the page size, got {0}")]
    CapacityNotPageAligned(usize),

    #[error("write of {len} bytes exceeds ring buffer capacity {capacity}")]
    WriteExceedsCapacity { len: usize, capacity: usize },

    #[error("double mapping failed: {0}")]
    MappingFailed(std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum FramingError {
    #[error("line length {0} is shorter than the framing header")]
    LineTooShort(usize),

    #[error("unknown stream id {0}, expected 0 (RF) or 1 (audio)")]
    UnknownStreamId(u8),

    #[error(
        "frame counter discontinuity: expected {expected}, got {actual}, {lost} frame(s) lost"
    )]
    FrameCounterGap {
        expected: u32,
        actual: u32,
        lost: u32,
    },

    #[error("CRC-16 mismatch on line {line}: calculated {calculated:#06X}, received {received:#06X}")]
    CrcMismatch {
        line: u32,
        calculated: u16,
        received: u16,
    },

    #[error("idle counter did not advance for {0} consecutive frames")]
    IdleStalled(u32),
}

#[derive(thiserror::Error, Debug)]
pub enum ConvertError {
    #[error("source width {src} bits cannot convert to destination width {dst} bits")]
    UnsupportedWidth { src: u8, dst: u8 },
}
