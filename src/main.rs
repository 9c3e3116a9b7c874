use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use datespot_aggregator::app::PublisherPort;
use datespot_aggregator::config::{Config, Credentials};
use datespot_aggregator::infra::{
    http_client, BlogToClient, ClaudeCategorizer, FsPublisher, GitHubPublisher, GoogleGeocoder,
    VisualCrossingClient,
};
use datespot_aggregator::logging;
use datespot_aggregator::pipeline::{Collaborators, Orchestrator, RunReport, StageOutcome};

#[derive(Parser)]
#[command(name = "datespot_aggregator")]
#[command(about = "Aggregates Toronto events with location, weather and category data")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline once and publish the schema
    Run {
        /// Path to a TOML config file (defaults to ./datespot.toml when present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Number of days to aggregate, starting today
        #[arg(long)]
        days: Option<u32>,
        /// Publish into this directory instead of GitHub
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Directory for the rolling JSON log
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
    },
    /// Validate configuration and environment, then print the effective config
    CheckConfig {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn build_collaborators(
    config: &Config,
    credentials: &Credentials,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<Collaborators> {
    let services = &config.services;
    let pipeline = &config.pipeline;
    let http = http_client::build_client(Duration::from_secs(pipeline.request_timeout_secs))?;
    let slow_http = http_client::build_client(Duration::from_secs(pipeline.categorize_timeout_secs))?;

    let publisher: Arc<dyn PublisherPort> = match output_dir {
        Some(dir) => {
            info!("Dry run: publishing into {}", dir.display());
            Arc::new(FsPublisher::new(dir))
        }
        None => {
            let token = credentials
                .github_token
                .clone()
                .context("GITHUB_TOKEN is required to publish to GitHub")?;
            Arc::new(GitHubPublisher::new(
                http.clone(),
                services.github_api_base.clone(),
                services.github_repo.clone(),
                token,
                pipeline.timezone,
            ))
        }
    };

    Ok(Collaborators {
        events: Arc::new(BlogToClient::new(http.clone(), services.events_api_base.clone())),
        geocoder: Arc::new(GoogleGeocoder::new(
            http.clone(),
            services.geocode_api_base.clone(),
            credentials.google_maps_api_key.clone(),
        )),
        weather: Arc::new(VisualCrossingClient::new(
            http,
            services.weather_api_base.clone(),
            services.weather_location.clone(),
            credentials.weather_api_key.clone(),
        )),
        categorizer: Arc::new(
            ClaudeCategorizer::new(
                slow_http,
                services.anthropic_api_base.clone(),
                credentials.anthropic_api_key.clone(),
                services.anthropic_model.clone(),
            )
            .with_sampling(services.anthropic_max_tokens, services.anthropic_temperature),
        ),
        publisher,
    })
}

fn print_report(report: &RunReport) {
    println!("\n📊 Run Results:");
    for stage in report.reports() {
        let outcome = match &stage.outcome {
            StageOutcome::Success => "success".to_string(),
            StageOutcome::Partial => "partial".to_string(),
            StageOutcome::Fatal(cause) => format!("FATAL ({})", cause),
            StageOutcome::Skipped => "skipped".to_string(),
        };
        println!(
            "   {:<10} {:<24} attempted {:>4}  ok {:>4}  failed {:>4}  items {:>4} → {:<4} {:>6}ms",
            stage.stage.as_str(),
            outcome,
            stage.attempted,
            stage.succeeded,
            stage.failed,
            stage.items_before,
            stage.items_after,
            stage.elapsed.as_millis()
        );
    }

    if report.succeeded() {
        println!("\n📅 Events per date:");
        for (date, count) in report.event_counts() {
            println!("   {}: {}", date, count);
        }
        if let Some(receipt) = &report.state.published {
            println!("\n🚀 Published {} (version {})", receipt.path, receipt.version);
        }
    } else if let Some(stage) = report.failed_stage() {
        println!("\n💥 Run failed at stage {}", stage);
    }
    println!("⏱️  Total elapsed: {:.1}s", report.elapsed.as_secs_f64());
}

async fn run(
    config_path: Option<PathBuf>,
    days: Option<u32>,
    output_dir: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let mut config = Config::load(config_path.as_deref())?;
    if let Some(days) = days {
        config.pipeline.days = days;
    }
    let credentials = Credentials::from_env(output_dir.is_none())?;
    let collaborators = build_collaborators(&config, &credentials, output_dir)?;
    let orchestrator = Orchestrator::new(config.pipeline, collaborators)?;

    let report = orchestrator.run().await;
    print_report(&report);

    if report.succeeded() {
        Ok(ExitCode::SUCCESS)
    } else {
        error!("Run failed: {}", report.summary());
        Ok(ExitCode::from(1))
    }
}

fn check_config(config_path: Option<PathBuf>) -> anyhow::Result<ExitCode> {
    let config = Config::load(config_path.as_deref())?;
    let credentials = Credentials::from_env(false)?;
    println!("✅ Configuration is valid\n");
    println!("{}", toml::to_string_pretty(&config)?);
    println!("credentials: {:?}", credentials);
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, days, output_dir, log_dir } => {
            let _guard = logging::init_logging(&log_dir);
            run(config, days, output_dir).await
        }
        Commands::CheckConfig { config } => check_config(config),
    }
}
