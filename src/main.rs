use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};

use loan_cleanse::config::Config;
use loan_cleanse::logging;
use loan_cleanse::pipeline::processing::{reveal_column, EncryptionKey, Redactor};
use loan_cleanse::pipeline::{Pipeline, RunSummary};
use loan_cleanse::table::RecordTable;

#[derive(Parser)]
#[command(name = "loan_cleanse")]
#[command(about = "Loan record data-quality pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean every CSV file in the configured input directory
    Run {
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
    },
    /// Recover the plaintext of a reversibly redacted column
    Decrypt {
        /// Cleaned CSV file
        #[arg(long)]
        input: PathBuf,
        /// Column to decrypt
        #[arg(long)]
        column: String,
        #[arg(long, default_value = "config.toml")]
        config: PathBuf,
        /// Defaults to `<stem>_decrypted.csv` next to the input
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print a fresh random encryption key
    GenerateKey,
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run {}", summary.run_id);
    for file in &summary.files {
        println!(
            "   ✅ {}: {} → {} rows, {} → {} columns ({})",
            file.file,
            file.rows_in,
            file.rows_out,
            file.columns_in,
            file.columns_out,
            file.output.display()
        );
        if let Some(profile) = &file.profile {
            println!("      profile: {}", profile.display());
        }
    }
    for failure in &summary.failures {
        println!("   ⚠️  {} skipped: {}", failure.file, failure.error);
    }
}

fn run(config_path: PathBuf) -> anyhow::Result<()> {
    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let _guard = logging::init_logging(&config.log_dir)
        .with_context(|| format!("creating log directory {}", config.log_dir.display()))?;

    println!("🚀 Running loan data cleaning pipeline...");
    let mut pipeline = Pipeline::new(config)?;
    match pipeline.run() {
        Ok(summary) => {
            print_summary(&summary);
            Ok(())
        }
        Err(e) => {
            error!("Pipeline run failed: {}", e);
            println!("❌ Pipeline run failed: {}", e);
            Err(e.into())
        }
    }
}

fn decrypt(input: PathBuf, column: String, config_path: PathBuf, output: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_console_logging();

    let config = Config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    let key = config
        .redaction
        .encryption_key
        .clone()
        .context("decrypting requires redaction.encryption_key")?;

    let mut table = RecordTable::read_csv(&input)
        .with_context(|| format!("reading {}", input.display()))?;
    let revealed = reveal_column(&mut table, &column, &Redactor::Reversible(key))?;

    let output = output.unwrap_or_else(|| {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        input.with_file_name(format!("{}_decrypted.csv", stem))
    });
    table.write_csv(&output)?;

    info!("Decrypted {} values of '{}' into {}", revealed, column, output.display());
    println!("🔓 Decrypted {} values → {}", revealed, output.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => run(config),
        Commands::Decrypt {
            input,
            column,
            config,
            output,
        } => decrypt(input, column, config, output),
        Commands::GenerateKey => {
            println!("{}", EncryptionKey::generate().to_base64());
            Ok(())
        }
    }
}
