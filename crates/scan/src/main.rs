use clap::Parser;

use freescan_core::criteria::{select_candidates, FilterCriteria, SortField};

/// Fetch the free-tier model listing from the OpenRouter catalog, narrowed
/// by the given criteria.
#[derive(Parser, Debug)]
#[command(name = "freescan", version)]
struct Cli {
    /// Limit the number of models returned
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

    /// Sort models by field: name, context_length, or id
    #[arg(long, default_value = "name")]
    sort_by: String,

    /// Reverse the sort order
    #[arg(long)]
    reverse: bool,

    /// Keep only models supporting all of these request parameters
    /// (e.g. --require-params tools)
    #[arg(long = "require-params", value_name = "PARAM")]
    require_params: Vec<String>,

    /// Write the listing to a JSON file instead of stdout
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<std::path::PathBuf>,
}

fn run(cli: Cli) -> Result<(), String> {
    let sort_field: SortField = cli.sort_by.parse()?;
    let criteria = FilterCriteria {
        name: cli.name,
        provider: cli.provider,
        min_context_length: cli.min_context_length,
        require_params: cli.require_params,
        limit: cli.limit,
    };

    let models = freescan_service::catalog::fetch::fetch_free_models_default()?;
    let selected = select_candidates(models, &criteria, sort_field, cli.reverse);
    let rendered = serde_json::to_string_pretty(&selected)
        .map_err(|err| format!("listing encode failed: {err}"))?;

    match cli.output {
        Some(path) => {
            std::fs::write(&path, rendered)
                .map_err(|err| format!("write {} failed: {err}", path.display()))?;
            println!("Successfully saved {} models to {}", selected.len(), path.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn main() {
    if let Err(err) = run(Cli::parse()) {
        eprintln!("freescan: {err}");
        std::process::exit(1);
    }
}
