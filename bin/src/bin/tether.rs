use anyhow::Result;
use clap::Parser;
use tether_bin::{
    cli::{Cli, Command},
    commands,
};
use tether_log::LogConfig;
use tether_text::Settings;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let _log_guard = match tether_log::init(LogConfig {
        log_file_path: cli.log_file.clone(),
    }) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Warning: Failed to initialize logging: {e}");
            None
        },
    };

    let settings = Settings::load_with_overrides(cli.config.as_deref(), None)?;
    let mut stdout = std::io::stdout().lock();

    match cli.command {
        Command::Lex { file, checkpoints } => {
            commands::lex::run(&file, checkpoints, &settings, &mut stdout)
        },
        Command::Replay { file, edits, print } => {
            commands::replay::run(&file, &edits, print, &settings, &mut stdout)
        },
    }
}
