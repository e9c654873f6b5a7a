use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{debug, info};
use scribe::config::{EditorConfig, config_file_path, load_config, save_config};
use scribe::richtext::commands::{Command, CommandExecutor, CommandOutcome};
use scribe::richtext::markup_converter::{document_to_markup, markup_to_document};
use scribe::richtext::sanitizer::sanitize_markup;
use scribe::richtext::selection::Selection;
use scribe::richtext::structured_document::DocumentPosition;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "scribe")]
#[command(about = "Inspect and normalize rich-text article markup", long_about = None)]
struct Args {
    /// Config file (defaults to the per-user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Strip unsafe elements and attributes, keeping the markup structure
    Sanitize {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,
    },
    /// Parse into the document model and serialize it again
    Normalize {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,
    },
    /// Verify that normalized markup survives another round trip unchanged
    Check {
        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,
    },
    /// Apply formatting commands to the whole document, e.g. `-c bold -c header=2`
    Format {
        /// Command as `name` or `name=value`
        #[arg(short = 'c', long = "command", required = true)]
        commands: Vec<String>,

        /// Input file (reads stdin when omitted)
        input: Option<PathBuf>,
    },
    /// Show the effective configuration
    Config {
        /// Write the defaults to the config file if it does not exist yet
        #[arg(long)]
        init: bool,
    },
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn normalize(markup: &str) -> String {
    let document = markup_to_document(markup);
    debug!("{}", document);
    document_to_markup(&document)
}

fn load(config: Option<&Path>) -> Result<(EditorConfig, Option<PathBuf>)> {
    let path = config.map(Path::to_path_buf).or_else(config_file_path);
    let config = match &path {
        Some(path) => load_config(path)?,
        None => EditorConfig::default(),
    };
    Ok((config, path))
}

fn apply_commands(config: &EditorConfig, markup: &str, commands: &[String]) -> Result<String> {
    let mut document = markup_to_document(markup);
    let mut executor = CommandExecutor::new(config.history_limit);

    for text in commands {
        let command: Command = text.parse()?;
        let mut selection = Selection::new(DocumentPosition::start(), document.end_position());
        match executor.execute(&mut document, &mut selection, command) {
            CommandOutcome::Rejected(reason) => bail!("Command {} rejected: {}", text, reason),
            outcome => info!("{}: {}", text, outcome),
        }
    }
    Ok(document_to_markup(&document))
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let (config, config_path) = load(args.config.as_deref())?;

    match args.command {
        Commands::Sanitize { input } => {
            println!("{}", sanitize_markup(&read_input(input.as_deref())?));
        }
        Commands::Normalize { input } => {
            println!("{}", normalize(&read_input(input.as_deref())?));
        }
        Commands::Check { input } => {
            let once = normalize(&read_input(input.as_deref())?);
            let twice = normalize(&once);
            if once != twice {
                bail!("Round trip is not stable:\n  first:  {}\n  second: {}", once, twice);
            }
            println!("ok");
        }
        Commands::Format { commands, input } => {
            let markup = read_input(input.as_deref())?;
            println!("{}", apply_commands(&config, &markup, &commands)?);
        }
        Commands::Config { init } => {
            if init {
                let path = config_path.context("No config directory available")?;
                if path.exists() {
                    info!("{} already exists", path.display());
                } else {
                    save_config(&path, &config)?;
                    println!("Wrote {}", path.display());
                }
            }
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to serialize config")?
            );
        }
    }
    Ok(())
}
