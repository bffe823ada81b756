//! Bin-crate error taxonomy (§7). Each leaf component gets its own
//! `thiserror` enum; `exit_code` maps the taxonomy onto the process exit
//! codes spec.md §6.4/§7 define, mirrored by `main`'s top-level handler.

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("{0}")]
    Invalid(String),
}

#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("failed to open capture device {0}")]
    DeviceOpen(String),

    #[error("lost sync to HDMI input stream for more than 500 frames, check connection")]
    SyncLost,
}

#[derive(thiserror::Error, Debug)]
pub enum FileError {
    #[error("{path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: file exists and --overwrite was not given")]
    Exists(std::path::PathBuf),

    #[error("user aborted: {0} exists and overwrite was declined")]
    UserAborted(std::path::PathBuf),
}

#[derive(thiserror::Error, Debug)]
pub enum WriterError {
    #[error(transparent)]
    File(#[from] FileError),

    #[error("failed to spawn writer thread: {0}")]
    ThreadSpawn(std::io::Error),

    #[error("FLAC encoder error: {0}")]
    Flac(String),

    #[error("resampler error: {0}")]
    Resample(String),
}

/// Top-level error carried from `Coordinator::run`/`cmd_extract` to `main`,
/// tagged with the exit code spec.md §6.4/§7 assigns to its category.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    File(#[from] FileError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error("memory error: {0}")]
    Memory(String),
}

impl AppError {
    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Settings(_) => -1,
            AppError::Capture(_) => -2,
            AppError::File(_) => -3,
            AppError::Writer(WriterError::ThreadSpawn(_)) => -5,
            AppError::Writer(_) => -3,
            AppError::Memory(_) => -6,
        }
    }
}
