//! Tarn compiler CLI
//!
//! Command-line driver for the front-end: parse checks and IR listings.

use clap::{Parser as ClapParser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use tarnc::{compile, CompilerOptions};

#[derive(ClapParser)]
#[command(name = "tarnc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tarn compiler - lower .tarn sources to IR", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and resolve a source file without lowering it
    Check {
        /// Input .tarn source file
        input: PathBuf,
    },

    /// Compile a source file and print the IR listing
    Ir {
        /// Input .tarn source file
        input: PathBuf,

        /// Compiler options file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Name for the generated top-level closure constructor
        #[arg(long, default_value = "main")]
        main_name: String,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(message) = run(cli) {
        eprintln!("Error: {}", message);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Commands::Check { input } => {
            let (source, name) = read_source(&input)?;
            let options = CompilerOptions::new().with_linearize(false);
            compile(&source, &name, &options).map_err(|e| e.message().to_string())?;
            println!("{}: ok", name);
            Ok(())
        }
        Commands::Ir {
            input,
            config,
            main_name,
        } => {
            let (source, name) = read_source(&input)?;
            let mut options = match config {
                Some(path) => {
                    let text = fs::read_to_string(&path)
                        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
                    CompilerOptions::from_toml_str(&text)?
                }
                None => CompilerOptions::new(),
            };
            options = options.with_main_func_name(main_name);
            options.validate()?;
            let result = compile(&source, &name, &options).map_err(|e| e.message().to_string())?;
            if let Some(module) = &result.module {
                print!("{}", module.listing(&result.tree, &result.strings));
            }
            Ok(())
        }
    }
}

fn read_source(input: &Path) -> Result<(String, String), String> {
    let source = fs::read_to_string(input)
        .map_err(|e| format!("failed to read {}: {}", input.display(), e))?;
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    Ok((source, name))
}
