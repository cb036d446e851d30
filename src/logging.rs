use std::fs::File;
use std::path::Path;

use log::LevelFilter;
use simplelog::{
    ColorChoice, CombinedLogger, Config, ConfigBuilder, TermLogger, TerminalMode, WriteLogger,
};

use crate::error::StartupError;

/// Terminal plus per-process log file, both at `level`.
pub fn init(level: LevelFilter, log_file: &Path) -> Result<(), StartupError> {
    let file = File::create(log_file)?;
    let term_config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .set_thread_level(LevelFilter::Off)
        .build();
    CombinedLogger::init(vec![
        TermLogger::new(level, term_config, TerminalMode::Mixed, ColorChoice::Auto),
        WriteLogger::new(level, Config::default(), file),
    ])?;
    log::info!(target: "app", "logging at {level} to {}", log_file.display());
    Ok(())
}
