#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::struct_excessive_bools)]

mod commands;
mod logging;

use clap::Parser;
use esmd_core::{Config, Target};
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "esmd")]
#[command(author, version, about = "Inspect npm-to-ESM package resolution", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Load configuration from a JSON file
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Print version information
    Version,

    /// Parse a request path without network access
    Parse {
        /// Request path, e.g. /react@18/jsx-runtime
        path: String,
    },

    /// Resolve a request path against the registry to its canonical build path
    Resolve {
        path: String,

        /// User agent used to infer the target when the path has none
        #[arg(long)]
        user_agent: Option<String>,
    },

    /// List the dist-tags of a package
    Tags {
        /// Package name, e.g. react or @types/node
        name: String,
    },

    /// Resolve the entry files of a package directory on disk
    Entry {
        /// Package root (the directory holding package.json)
        dir: PathBuf,

        /// Subpath inside the package, e.g. "jsx-runtime"
        #[arg(default_value = "")]
        subpath: String,

        #[arg(long, default_value = "es2022", value_parser = parse_target)]
        target: Target,

        /// Resolve for a development build
        #[arg(long)]
        dev: bool,

        /// Extra export condition (repeatable)
        #[arg(long = "condition", value_name = "NAME")]
        conditions: Vec<String>,
    },

    /// Encode or decode build-args tokens
    Args {
        #[command(subcommand)]
        args_cmd: ArgsCommands,
    },

    /// Infer the build target from a User-Agent string
    Target { user_agent: String },
}

#[derive(clap::Subcommand, Debug)]
enum ArgsCommands {
    /// Encode build args into an X- token
    Encode(commands::args::EncodeOptions),

    /// Decode an X- token (with or without the prefix)
    Decode { token: String },
}

fn parse_target(s: &str) -> std::result::Result<Target, String> {
    s.parse::<Target>().map_err(|e| e.to_string())
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => Config::load(path).into_diagnostic()?,
        None => Config::default().with_env().into_diagnostic()?,
    };
    Ok(config.with_verbosity(cli.verbose).with_json_logs(cli.json))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    logging::init(config.verbosity, config.json_logs);

    match &cli.command {
        Commands::Version => commands::version::run(),
        Commands::Parse { path } => commands::parse::run(path, cli.json),
        Commands::Resolve { path, user_agent } => {
            commands::resolve::run(&config, path, user_agent.as_deref(), cli.json)
        }
        Commands::Tags { name } => commands::tags::run(&config, name, cli.json),
        Commands::Entry {
            dir,
            subpath,
            target,
            dev,
            conditions,
        } => commands::entry::run(dir, subpath, *target, *dev, conditions, cli.json),
        Commands::Args { args_cmd } => match args_cmd {
            ArgsCommands::Encode(options) => commands::args::encode(options, cli.json),
            ArgsCommands::Decode { token } => commands::args::decode(token, cli.json),
        },
        Commands::Target { user_agent } => commands::target::run(user_agent, cli.json),
    }
}
