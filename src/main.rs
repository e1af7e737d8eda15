use anyhow::{bail, Context, Result};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use photark::catalog::CatalogStore;
use photark::config::Config;
use photark::engine::{IngestProgress, Ingester};
use photark::logging;

struct Args {
    config_path: Option<PathBuf>,
    batch_size: Option<usize>,
    assume_yes: bool,
    source: PathBuf,
    dest: PathBuf,
}

fn parse_args() -> Args {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;
    let mut batch_size = None;
    let mut assume_yes = false;
    let mut positional = Vec::new();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("photark {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--batch-size" => {
                if i + 1 < args.len() {
                    match args[i + 1].parse() {
                        Ok(n) => batch_size = Some(n),
                        Err(_) => {
                            eprintln!("Error: --batch-size requires a number");
                            std::process::exit(1);
                        }
                    }
                    i += 1;
                } else {
                    eprintln!("Error: --batch-size requires a number");
                    std::process::exit(1);
                }
            }
            "--yes" | "-y" => {
                assume_yes = true;
            }
            arg if arg.starts_with('-') => {
                eprintln!("Unknown argument: {}", arg);
                print_help();
                std::process::exit(1);
            }
            arg => {
                positional.push(PathBuf::from(arg));
            }
        }
        i += 1;
    }

    if positional.len() != 2 {
        eprintln!("Error: expected a source and a destination directory");
        print_help();
        std::process::exit(1);
    }
    let dest = positional.pop().unwrap_or_default();
    let source = positional.pop().unwrap_or_default();

    Args {
        config_path,
        batch_size,
        assume_yes,
        source,
        dest,
    }
}

fn print_help() {
    println!(
        r#"photark - collect photos into a date-partitioned library

USAGE:
    photark [OPTIONS] <SOURCE> <DEST>

ARGS:
    SOURCE              Directory to collect files from
    DEST                Library root to collect files into

OPTIONS:
    --config, -c PATH   Path to config file
    --batch-size N      Files per catalog transaction
    --yes, -y           Skip destination confirmation prompts
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    PHOTARK_LOG         Log level (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/photark/config.toml"#
    );
}

/// Yes/no prompt on stdin. Anything but y/yes declines.
fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let answer = line.trim().to_lowercase();
    Ok(answer == "y" || answer == "yes")
}

fn main() -> Result<()> {
    let args = parse_args();

    let _ = logging::init(Some(Config::config_dir().join("logs")));

    let mut config = match args.config_path {
        Some(ref path) => Config::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::load()?,
    };
    if let Some(batch_size) = args.batch_size {
        config.engine.source_batch_size = batch_size;
    }

    if !args.source.is_dir() {
        bail!("source {} is not a directory", args.source.display());
    }

    if args.dest.exists() {
        let occupied = std::fs::read_dir(&args.dest)?.next().is_some();
        if occupied && !args.assume_yes {
            if !confirm("The destination folder is not empty. Do you want to proceed?")? {
                return Ok(());
            }
        }
    } else {
        if !args.assume_yes
            && !confirm("The destination folder does not exist. Do you want to create it?")?
        {
            return Ok(());
        }
        std::fs::create_dir_all(&args.dest)
            .with_context(|| format!("failed to create {}", args.dest.display()))?;
    }

    let catalog = CatalogStore::open(&config.catalog_path)
        .with_context(|| format!("failed to open catalog at {}", config.catalog_path.display()))?;
    let ingester = Ingester::new(catalog, config.engine_options());

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for event in rx {
            match event {
                IngestProgress::ReconcileStarted => {
                    println!("Collecting photo information...");
                }
                IngestProgress::ReconcileCompleted { registered, skipped } => {
                    println!(
                        "Collecting photo information has finished ({} added, {} duplicates).",
                        registered, skipped
                    );
                    println!("Copying and collecting photos...");
                }
                IngestProgress::Scanning { directory } => {
                    println!("{}", directory);
                }
                IngestProgress::Copied { .. } => {}
                IngestProgress::Error { message } => {
                    eprintln!("Warning: {}", message);
                }
                IngestProgress::Completed { copied, skipped, failed, cataloged } => {
                    println!(
                        "Copying and collecting photos has finished: {} copied, {} already collected, {} failed, {} cataloged in total.",
                        copied, skipped, failed, cataloged
                    );
                }
            }
        }
    });

    let result = ingester
        .reconcile(&args.dest, Some(&tx))
        .and_then(|_| ingester.ingest(&args.source, &args.dest, Some(&tx)));

    drop(tx);
    let _ = printer.join();

    result.context("run aborted")?;
    Ok(())
}
