use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use transit_report::export::DOWNLOAD_FILE_NAME;
use transit_report::{ReportConfig, generate_report, load_config_from_json};

#[derive(Parser)]
#[command(name = "cli")]
#[command(about = "Fill the transit report template from a data spreadsheet", long_about = None)]
struct Cli {
    /// Spreadsheet with the `Data Usuarios` and `Data Kilometros` sheets
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// First report date (YYYY-MM-DD or DD-MM-YY)
    #[arg(short, long)]
    start: String,

    /// Last report date, at most 7 days after the first
    #[arg(short, long)]
    end: String,

    /// Report template; overrides the configured one
    #[arg(short, long, env = "TRANSIT_REPORT_TEMPLATE")]
    template: Option<PathBuf>,

    /// Where to write the filled workbook
    #[arg(short, long, default_value = DOWNLOAD_FILE_NAME)]
    output: PathBuf,

    /// Also write the JSON cell dump here
    #[arg(long)]
    json: Option<PathBuf>,

    /// JSON report configuration
    #[arg(short, long, env = "TRANSIT_REPORT_CONFIG")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from_json(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if let Some(template) = cli.template {
        config.template_path = template;
    }

    let upload = fs::read(&cli.input)
        .with_context(|| format!("reading input {}", cli.input.display()))?;
    let report = generate_report(&upload, &cli.start, &cli.end, &config)?;

    fs::write(&cli.output, &report.workbook)
        .with_context(|| format!("writing workbook {}", cli.output.display()))?;
    if let Some(path) = &cli.json {
        let dump = serde_json::to_vec_pretty(&report.dump)?;
        fs::write(path, dump).with_context(|| format!("writing dump {}", path.display()))?;
    }

    println!(
        "Report for {} to {} written to {}",
        report.window.start(),
        report.window.end(),
        cli.output.display()
    );
    for sheet in &report.touched {
        println!("  {sheet}");
    }
    Ok(())
}
