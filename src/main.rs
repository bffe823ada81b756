#![allow(dead_code)]

use anyhow::Result;
use clap::Parser as ClapParser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;

use cli::capture::cmd_capture;
use cli::command::{Cli, Commands, LogFormat};
use cli::extract::cmd_extract;

mod byteorder;
mod capture;
mod cli;
mod errors;
mod input;
mod pipeline;
pub(crate) mod timestamp;
mod wave;
mod writer;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let base_level = cli.loglevel.to_level_filter();

    let multi = MultiProgress::new();

    let mut env_builder = env_logger::Builder::from_default_env();
    env_builder.filter_level(base_level);
    match cli.log_format {
        LogFormat::Plain => {
            env_builder.format_timestamp_secs();
        }
        LogFormat::Json => {
            env_builder.format(|buf, record| {
                use std::io::Write;
                writeln!(
                    buf,
                    "{{\"ts\":{},\"lvl\":\"{}\",\"msg\":\"{}\"}}",
                    buf.timestamp(),
                    record.level(),
                    record.args()
                )
            });
        }
    }

    let pb = if cli.progress {
        let logger = env_builder.build();
        LogWrapper::new(multi.clone(), logger).try_init()?;
        Some(&multi)
    } else {
        env_builder.try_init()?;
        None
    };

    let result = match cli.command {
        Commands::Capture(ref args) => cmd_capture(args, &cli, pb),
        Commands::Extract(ref args) => cmd_extract(args, &cli, pb),
    };

    if let Err(e) = result {
        let code = e
            .downcast_ref::<errors::AppError>()
            .map(|app_err| app_err.exit_code())
            .unwrap_or(-1);
        log::error!("{e}");
        std::process::exit(code);
    }

    Ok(())
}
