use std::path::PathBuf;

use clap::{Args, Parser as ClapParser, Subcommand, ValueEnum};

#[derive(Debug, ClapParser)]
#[command(
    name       = env!("CARGO_PKG_NAME"),
    version    = env!("CARGO_PKG_VERSION"),
    author     = env!("CARGO_PKG_AUTHORS"),
    about      = "Capture and extraction tools for the MISRC HDMI-encoded dual-ADC/audio acquisition stream",
    long_about = None,
)]
pub struct Cli {
    /// Set the log level
    #[arg(long, global = true, value_enum, default_value_t = LogLevel::Info)]
    pub loglevel: LogLevel,

    /// Treat warnings as fatal errors (fail on first warning).
    #[arg(long, global = true)]
    pub strict: bool,

    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Plain)]
    pub log_format: LogFormat,

    /// Show progress bars during operations.
    #[arg(long, global = true)]
    pub progress: bool,

    /// Choose an operation to perform.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Capture from an MISRC device (default).
    Capture(CaptureArgs),

    /// Extract packed words from stdin or a file instead of a live device.
    Extract(ExtractArgs),
}

/// Per-channel RF options. Generated twice below as two distinct structs
/// (`ChannelAArgs`, `ChannelBArgs`) rather than one struct flattened
/// twice: clap's derive macro has no way to parametrize a flag's long
/// name per flatten site, and this family of options needs distinct
/// `-a`/`-b` suffixed flags (`--rf-a` vs `--rf-b`, etc).
macro_rules! channel_args {
    ($name:ident, $suffix:literal, $rf_short:literal, $pad_short:literal) => {
        #[derive(Debug, Args)]
        pub struct $name {
            #[doc = concat!("RF output sink for channel ", $suffix, " (\"-\" for stdout).")]
            #[arg(short = $rf_short, long = concat!("rf-", $suffix), value_name = "PATH")]
            pub rf: Option<PathBuf>,

            #[doc = concat!("Shift channel ", $suffix, " samples into the high bits of the output word.")]
            #[arg(short = $pad_short, long = concat!("pad-", $suffix))]
            pub pad: bool,

            #[doc = concat!("Emit peak-level statistics for channel ", $suffix, ".")]
            #[arg(long = concat!("level-", $suffix))]
            pub level: bool,

            #[doc = concat!("Skip clip-indicator log messages for channel ", $suffix, ".")]
            #[arg(long = concat!("suppress-clip-", $suffix))]
            pub suppress_clip: bool,

            #[doc = concat!("Channel ", $suffix, " output sample rate in Hz; 40000 disables resampling.")]
            #[arg(long = concat!("resample-rf-", $suffix), value_name = "HZ", default_value_t = 40_000)]
            pub resample: u32,

            #[doc = concat!("Channel ", $suffix, " resampler quality.")]
            #[arg(long = concat!("resample-rf-quality-", $suffix), value_enum, default_value_t = ResampleQuality::Hq)]
            pub resample_quality: ResampleQuality,

            #[doc = concat!("Channel ", $suffix, " resampler gain, in dB.")]
            #[arg(long = concat!("resample-rf-gain-", $suffix), value_name = "DB", default_value_t = 0.0)]
            pub resample_gain: f64,

            #[doc = concat!("Reduce channel ", $suffix, " to 8-bit output (implies resampling if none is configured).")]
            #[arg(long = concat!("8bit-rf-", $suffix))]
            pub eightbit: bool,
        }
    };
}

channel_args!(ChannelAArgs, "a", 'A', 'P');
channel_args!(ChannelBArgs, "b", 'B', 'Q');

#[derive(Debug, Args)]
pub struct CaptureArgs {
    /// Device index (vendor backend) or "impl://opaque" (generic backend).
    #[arg(long, value_name = "DEVICE")]
    pub device: Option<String>,

    /// Sample budget; stops the capture once reached.
    #[arg(long, value_name = "N")]
    pub count: Option<u64>,

    /// Capture duration: accepts `s`, `m:s`, or `h:m:s`. Ignored if `count` is set.
    #[arg(long, value_name = "DURATION")]
    pub time: Option<String>,

    /// Overwrite existing output files without prompting.
    #[arg(long)]
    pub overwrite: bool,

    /// Fail instead of prompting when an output file already exists.
    #[arg(long)]
    pub non_interactive: bool,

    /// Channel A options.
    #[command(flatten)]
    pub channel_a: ChannelAArgs,

    /// Channel B options.
    #[command(flatten)]
    pub channel_b: ChannelBArgs,

    /// AUX bitstream sink.
    #[arg(long, value_name = "PATH")]
    pub aux: Option<PathBuf>,

    /// Raw packed-word sink.
    #[arg(long, value_name = "PATH")]
    pub raw: Option<PathBuf>,

    /// Encode RF outputs with FLAC instead of raw/resampled PCM.
    #[arg(long)]
    pub rf_flac: bool,

    /// FLAC bit depth.
    #[arg(long, value_enum, default_value_t = FlacBits::Auto)]
    pub rf_flac_bits: FlacBits,

    /// FLAC compression level (0..8).
    #[arg(long, value_name = "LEVEL", default_value_t = 5)]
    pub rf_flac_level: u8,

    /// FLAC encoder threads per file; 0 = auto.
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub rf_flac_threads: u32,

    /// Write a single 4-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_4ch: Option<PathBuf>,

    /// Write the channel 1-2 pair as a 2-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_2ch_12: Option<PathBuf>,

    /// Write the channel 3-4 pair as a 2-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_2ch_34: Option<PathBuf>,

    /// Write channel 1 as a 1-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_1ch_1: Option<PathBuf>,

    /// Write channel 2 as a 1-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_1ch_2: Option<PathBuf>,

    /// Write channel 3 as a 1-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_1ch_3: Option<PathBuf>,

    /// Write channel 4 as a 1-channel audio sink.
    #[arg(long, value_name = "PATH")]
    pub audio_1ch_4: Option<PathBuf>,
}

impl CaptureArgs {
    pub fn audio_enabled(&self) -> bool {
        self.audio_4ch.is_some()
            || self.audio_2ch_12.is_some()
            || self.audio_2ch_34.is_some()
            || self.audio_1ch_1.is_some()
            || self.audio_1ch_2.is_some()
            || self.audio_1ch_3.is_some()
            || self.audio_1ch_4.is_some()
    }
}

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// Input file of packed words (use "-" for stdin).
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Treat the input as 16-bit single-channel words instead of 32-bit packed words.
    #[arg(long)]
    pub single: bool,

    /// Channel A options.
    #[command(flatten)]
    pub channel_a: ChannelAArgs,

    /// Channel B options.
    #[command(flatten)]
    pub channel_b: ChannelBArgs,

    /// AUX bitstream sink.
    #[arg(long, value_name = "PATH")]
    pub aux: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum LogFormat {
    /// Colorized human-readable text.
    Plain,
    /// Structured JSON per log record.
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ResampleQuality {
    /// Quick quality.
    Qq,
    /// Low quality.
    Lq,
    /// Medium quality.
    Mq,
    /// High quality.
    Hq,
    /// Very high quality.
    Vhq,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum FlacBits {
    Auto,
    #[value(name = "12")]
    Twelve,
    #[value(name = "16")]
    Sixteen,
}
