use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::debug;

use crate::shell::Shell;
use crate::utils::config::Config;
use crate::utils::log::init_logger;

mod error;
mod shell;
mod utils;

/// ash: a small interactive shell
#[derive(Parser, Debug)]
#[command(name = "ash", version, about)]
struct Args {
    /// Run one command line and exit with its status
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// Script file to run line by line
    #[arg(value_name = "SCRIPT", conflicts_with = "command")]
    script: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = Config::new();
    init_logger(&config);
    debug!("配置加载成功 {}", config.config_dir.display());

    let status = {
        let mut shell = Shell::new(&config);
        match (&args.command, &args.script) {
            (Some(line), _) => shell.run_command(line),
            (None, Some(script)) => shell.run_script(script)?,
            (None, None) => shell.run()?,
        }
    };
    process::exit(status)
}
