use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::Parser;
use miette::IntoDiagnostic;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fos_harvest::aggregate::aggregate;
use fos_harvest::config::ConfigLoader;
use fos_harvest::error::HarvestError;
use fos_harvest::harvest::Harvester;
use fos_harvest::openalex::{OpenAlexClient, ThreadSleeper};
use fos_harvest::output::{HarvestSummary, JsonOutput, write_globals, write_works};
use fos_harvest::paginate::CursorPaginator;
use fos_harvest::resolver::UnitResolver;
use fos_harvest::roster::read_roster_ids;
use fos_harvest::rules::{load_aliases, load_overrides};

#[derive(Parser)]
#[command(name = "fos-harvest")]
#[command(about = "Harvest OpenAlex works for an author roster and attribute them to units")]
#[command(version, author)]
struct Cli {
    /// Roster CSV with an OpenAlexID column.
    #[arg(long, default_value = "data/roster_with_metrics.csv")]
    roster: Utf8PathBuf,

    /// Optional alias rules (pattern, unit_id, unit_name, priority).
    #[arg(long, default_value = "seeds/unit_aliases.csv")]
    aliases: Utf8PathBuf,

    /// Optional per-author overrides (author_openalex_id, unit_id, unit_name).
    #[arg(long, default_value = "seeds/author_overrides.csv")]
    overrides: Utf8PathBuf,

    #[arg(long, default_value = "data/works.csv")]
    works_out: Utf8PathBuf,

    #[arg(long, default_value = "data/globals_concepts.csv")]
    globals_out: Utf8PathBuf,

    /// Authors harvested concurrently.
    #[arg(long, default_value_t = 1)]
    workers: usize,

    /// Print the run summary as JSON on stdout.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<HarvestError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &HarvestError) -> u8 {
    match error {
        err if err.is_configuration() => 2,
        HarvestError::Transport { .. }
        | HarvestError::AccessDenied { .. }
        | HarvestError::ApiStatus { .. }
        | HarvestError::RetriesExhausted { .. }
        | HarvestError::InvalidResponse(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = ConfigLoader::from_env()?;
    let authors = read_roster_ids(cli.roster.as_std_path())?;
    let aliases = load_aliases(cli.aliases.as_std_path())?;
    let overrides = load_overrides(cli.overrides.as_std_path())?;
    let resolver = UnitResolver::new(aliases, overrides);
    info!(
        authors = authors.len(),
        aliases = resolver.alias_count(),
        overrides = resolver.override_count(),
        start_date = %config.start_date,
        "starting harvest"
    );

    let client = OpenAlexClient::from_config(&config)?;
    let paginator = CursorPaginator::new(client, ThreadSleeper, config.rate);
    let harvester = Harvester::new(paginator, resolver, config.start_date);
    let report = harvester.harvest_parallel(&authors, cli.workers);

    write_works(cli.works_out.as_std_path(), &report.rows)?;
    info!("Wrote {} ({} rows)", cli.works_out, report.rows.len());

    let globals = aggregate(&report.rows);
    write_globals(cli.globals_out.as_std_path(), &globals)?;
    info!("Wrote {} ({} rows)", cli.globals_out, globals.len());

    let summary = HarvestSummary {
        authors_attempted: report.authors_attempted,
        authors_failed: report.failures.len(),
        failures: report.failures,
        works_rows: report.rows.len(),
        global_rows: globals.len(),
        works_path: cli.works_out.to_string(),
        globals_path: cli.globals_out.to_string(),
    };
    if cli.json {
        JsonOutput::print_summary(&summary).into_diagnostic()?;
    } else if summary.authors_failed > 0 {
        info!(
            failed = summary.authors_failed,
            attempted = summary.authors_attempted,
            "harvest finished with skipped authors"
        );
    }
    Ok(())
}
