//! adbr-cli - ADB public key tools.
//!
//! Converts and fingerprints the `adbkey.pub` files generated by ADB.

use adbr_client::auth;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "adbr-cli")]
#[command(about = "ADB public key tools")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum KeyFormat {
    #[default]
    Pem,
    Openssh,
}

#[derive(Subcommand)]
enum Commands {
    /// Converts an ADB-generated public key into PEM or OpenSSH format
    PubkeyConvert {
        /// Path to the public key file (e.g. ~/.android/adbkey.pub)
        file: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "pem")]
        format: KeyFormat,
    },

    /// Outputs the fingerprint of an ADB-generated public key
    PubkeyFingerprint {
        /// Path to the public key file
        file: PathBuf,
    },
}

fn run(command: Commands) -> Result<(), String> {
    match command {
        Commands::PubkeyConvert { file, format } => {
            let data = std::fs::read(&file).map_err(|err| format!("{}: {err}", file.display()))?;
            let key = auth::parse_public_key(&data).map_err(|err| err.to_string())?;
            match format {
                KeyFormat::Pem => {
                    print!("{}", auth::to_pem(&key.key).map_err(|err| err.to_string())?)
                }
                KeyFormat::Openssh => println!("{}", auth::to_openssh(&key.key, &key.comment)),
            }
            Ok(())
        }
        Commands::PubkeyFingerprint { file } => {
            let data = std::fs::read(&file).map_err(|err| format!("{}: {err}", file.display()))?;
            let key = auth::parse_public_key(&data).map_err(|err| err.to_string())?;
            println!("{} {}", key.fingerprint, key.comment);
            Ok(())
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("{} {message}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
