use clap::{Parser, Subcommand};

mod commands;

use commands::{DimDateArgs, RunArgs, ValidateArgs};

#[derive(Parser)]
#[command(name = "ticket-etl")]
#[command(about = "Ticket sales, capacity and weather star schema builder", long_about = None)]
struct Cli {
    /// Optional log file path (logs to file instead of stderr)
    #[arg(long, global = true)]
    log_file: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline and publish the warehouse tables
    Run(RunArgs),
    /// Run the pipeline without writing tables and print the run summary
    Validate(ValidateArgs),
    /// Write the calendar dimension for a date window
    DimDate(DimDateArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if let Some(path) = &cli.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Run(args) => commands::run_pipeline(args).await?,
        Commands::Validate(args) => commands::run_validate(args).await?,
        Commands::DimDate(args) => commands::run_dim_date(&args)?,
    }

    Ok(())
}
