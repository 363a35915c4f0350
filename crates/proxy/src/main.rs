use clap::Parser;

use freescan_core::criteria::{FilterCriteria, SortField};
use freescan_service::ProxyOptions;

/// OpenAI-compatible proxy over OpenRouter free models with automatic
/// retry and failover across the discovered candidate list.
#[derive(Parser, Debug)]
#[command(name = "freescan-proxy", version)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value_t = freescan_service::DEFAULT_PORT)]
    port: u16,

    /// Limit the number of candidate models
    #[arg(long)]
    limit: Option<usize>,

    /// Filter models by display name (case-insensitive substring)
    #[arg(long)]
    name: Option<String>,

    /// Filter by minimum context length
    #[arg(long)]
    min_context_length: Option<u64>,

    /// Filter by provider (the id segment before '/')
    #[arg(long)]
    provider: Option<String>,

    /// Sort candidates by field: name, context_length, or id
    #[arg(long, default_value = "context_length")]
    sort_by: String,

    /// Reverse the sort order (defaults to largest context first)
    #[arg(long, action = clap::ArgAction::Set, num_args = 0..=1,
          default_value_t = true, default_missing_value = "true")]
    reverse: bool,

    /// Keep only models supporting all of these request parameters
    #[arg(long = "require-params", value_name = "PARAM")]
    require_params: Vec<String>,

    /// Consecutive errors before a model is pulled from rotation
    #[arg(long, default_value_t = freescan_service::DEFAULT_ERROR_THRESHOLD)]
    error_threshold: u32,
}

fn run(cli: Cli) -> Result<(), String> {
    let sort_field: SortField = cli.sort_by.parse()?;
    let options = ProxyOptions {
        criteria: FilterCriteria {
            name: cli.name,
            provider: cli.provider,
            min_context_length: cli.min_context_length,
            require_params: cli.require_params,
            limit: cli.limit,
        },
        sort_field,
        reverse: cli.reverse,
        error_threshold: cli.error_threshold,
    };

    println!("Fetching free models from OpenRouter...");
    let state = freescan_service::bootstrap_gateway(options)?;

    let candidates = state.candidates();
    println!("\nLoaded {} free models:", candidates.len());
    for (index, model) in candidates.iter().take(10).enumerate() {
        println!("  {}. {} (context: {})", index + 1, model.id, model.context_length);
    }
    if candidates.len() > 10 {
        println!("  ... and {} more", candidates.len() - 10);
    }

    let addr = format!("0.0.0.0:{}", cli.port);
    println!("\nOpenRouter free proxy listening on http://{addr}");
    println!("  - GET  http://localhost:{}/v1/models", cli.port);
    println!("  - POST http://localhost:{}/v1/chat/completions", cli.port);
    println!("  - GET  http://localhost:{}/health", cli.port);

    freescan_service::start_server(&addr, state).map_err(|err| format!("server stopped: {err}"))
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("freescan-proxy: {err}");
        std::process::exit(1);
    }
}
