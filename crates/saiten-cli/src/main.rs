//! saiten CLI — the user-facing command-line interface.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{AnswerArgs, OutputFormat};

#[derive(Parser)]
#[command(name = "saiten", version, about = "LLM-assisted exam answer grading")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one answer: rule pre-screen, then the model if no rule decides
    Grade {
        #[command(flatten)]
        input: AnswerArgs,

        /// Provider name from the config (default: config's default_provider)
        #[arg(long)]
        provider: Option<String>,

        /// Model to grade with (default: config's default_model)
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Run the rule checks only, without contacting a model
    Check {
        #[command(flatten)]
        input: AnswerArgs,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Grade a JSON array of answers concurrently
    Batch {
        /// Path to .toml problem set or directory
        #[arg(long)]
        problems: PathBuf,

        /// JSON array of {problem_id, answer, rater_id?}
        #[arg(long)]
        answers: PathBuf,

        /// Write results here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,

        /// Max concurrent gradings
        #[arg(long, default_value = "4")]
        parallelism: usize,

        /// Provider name from the config
        #[arg(long)]
        provider: Option<String>,

        /// Model to grade with
        #[arg(long)]
        model: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate problem set TOML files
    Validate {
        /// Path to problem set file or directory
        #[arg(long)]
        problems: PathBuf,
    },

    /// Review statistics over exported grading history
    Stats {
        /// JSON array of history entries
        #[arg(long)]
        history: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List models served by the configured providers
    ListModels {
        /// Filter to specific provider
        #[arg(long)]
        provider: Option<String>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Create starter config and example problem set
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("saiten=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Grade {
            input,
            provider,
            model,
            config,
            format,
        } => commands::grade::execute(input, provider, model, config, format).await,
        Commands::Check {
            input,
            config,
            format,
        } => commands::check::execute(input, config, format),
        Commands::Batch {
            problems,
            answers,
            output,
            parallelism,
            provider,
            model,
            config,
        } => {
            commands::batch::execute(
                problems,
                answers,
                output,
                parallelism,
                provider,
                model,
                config,
            )
            .await
        }
        Commands::Validate { problems } => commands::validate::execute(problems),
        Commands::Stats { history, format } => commands::stats::execute(history, format),
        Commands::ListModels { provider, config } => {
            commands::list_models::execute(provider, config).await
        }
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
