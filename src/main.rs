use std::process::ExitCode;

use briskdb::Opts;
use briskdb::cli::SubCommandExtend;
use briskdb::config::SubCommand;
use clap::Parser;
use log::error;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let result = match &opts.subcmd {
        SubCommand::Build(config) => config.run(&opts),
        SubCommand::Inspect(config) => config.run(&opts),
        SubCommand::Show(config) => config.run(&opts),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
