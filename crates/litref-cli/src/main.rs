use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use litref_core::backoff::ExponentialBackoff;
use litref_core::config_file::{self, ConfigFile};
use litref_core::rate_limit;
use litref_core::resolver::AbstractChain;
use litref_core::sources::core::Core;
use litref_core::sources::openalex::{OpenAlex, WorkFilter};
use litref_core::verify::{Verifier, VerifyQuery};
use litref_core::{AbstractQuery, Error};

mod output;

/// Research-assistant lookups against bibliographic APIs
#[derive(Parser, Debug)]
#[command(name = "litref", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve a paper's abstract through the source fallback chain
    Abstract(AbstractArgs),
    /// Verify paper existence and metadata via CrossRef
    Verify(VerifyArgs),
    /// Search OpenAlex works
    SearchOpenalex(SearchOpenalexArgs),
    /// Search the CORE open-access aggregator
    SearchCore(SearchCoreArgs),
    /// Inspect or clear shared rate limiter state
    Limits {
        #[command(subcommand)]
        action: LimitsAction,
    },
}

#[derive(Args, Debug)]
struct AbstractArgs {
    /// Paper DOI (tries OpenAlex, then CORE)
    #[arg(long)]
    doi: Option<String>,

    /// Semantic Scholar paper ID (tries Semantic Scholar first)
    #[arg(long)]
    s2_id: Option<String>,

    /// Paper title (CORE search)
    #[arg(long)]
    title: Option<String>,

    /// Author name (use with --title)
    #[arg(long)]
    author: Option<String>,

    /// Publication year (use with --title)
    #[arg(long)]
    year: Option<i64>,

    /// Semantic Scholar API key (default: S2_API_KEY)
    #[arg(long)]
    s2_api_key: Option<String>,

    /// Email for the OpenAlex polite pool (default: OPENALEX_EMAIL)
    #[arg(long)]
    openalex_email: Option<String>,

    /// CORE API key (default: CORE_API_KEY)
    #[arg(long)]
    core_api_key: Option<String>,
}

#[derive(Args, Debug)]
struct VerifyArgs {
    /// DOI to verify directly
    #[arg(long)]
    doi: Option<String>,

    /// Paper title to search for
    #[arg(long)]
    title: Option<String>,

    /// Author family name (improves matching)
    #[arg(long)]
    author: Option<String>,

    /// Publication year (filters results +/- 1 year)
    #[arg(long)]
    year: Option<i64>,

    /// With --doi, also require the record's title to match --title
    #[arg(long)]
    verify_metadata: bool,

    /// Email for the CrossRef polite pool (default: CROSSREF_MAILTO)
    #[arg(long)]
    mailto: Option<String>,
}

#[derive(Args, Debug)]
struct SearchOpenalexArgs {
    /// Search query string
    query: Option<String>,

    /// Direct lookup by DOI
    #[arg(long)]
    doi: Option<String>,

    /// Direct lookup by OpenAlex ID (e.g. W2741809807)
    #[arg(long)]
    id: Option<String>,

    /// Find papers citing this OpenAlex ID
    #[arg(long)]
    cites: Option<String>,

    /// Year filter: YYYY or YYYY-YYYY range
    #[arg(long)]
    year: Option<String>,

    /// Maximum number of results
    #[arg(long, default_value_t = 25)]
    limit: usize,

    /// Only return open access papers
    #[arg(long)]
    oa_only: bool,

    /// Minimum citation count filter
    #[arg(long)]
    min_citations: Option<u32>,

    /// Filter by work type (e.g. journal-article, book-chapter)
    #[arg(long = "type")]
    work_type: Option<String>,

    /// Email for the polite pool (default: OPENALEX_EMAIL)
    #[arg(long)]
    email: Option<String>,
}

#[derive(Args, Debug)]
struct SearchCoreArgs {
    /// Search query string
    query: Option<String>,

    /// Direct lookup by DOI
    #[arg(long)]
    doi: Option<String>,

    /// Search by title (can combine with --author)
    #[arg(long)]
    title: Option<String>,

    /// Author name filter (use with --title or a query)
    #[arg(long)]
    author: Option<String>,

    /// Year filter: YYYY or YYYY-YYYY range
    #[arg(long)]
    year: Option<String>,

    /// Maximum number of results
    #[arg(long, default_value_t = 20)]
    limit: usize,

    /// CORE API key (default: CORE_API_KEY)
    #[arg(long)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum LimitsAction {
    /// List APIs with persisted limiter state
    List,
    /// Remove all persisted limiter state
    Clear,
    /// Clear one API's recorded last-request time
    Reset {
        /// Registered API name (e.g. crossref, semantic_scholar)
        api: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config_file::load_config();

    match cli.command {
        Command::Abstract(args) => run_abstract(args, &config).await,
        Command::Verify(args) => run_verify(args, &config).await,
        Command::SearchOpenalex(args) => run_search_openalex(args, &config).await,
        Command::SearchCore(args) => run_search_core(args, &config).await,
        Command::Limits { action } => run_limits(action),
    }
}

/// Resolution order for every setting: CLI flag > env var > config file.
fn resolve_setting(flag: Option<String>, env_var: &str, file_value: Option<String>) -> Option<String> {
    flag.or_else(|| std::env::var(env_var).ok().filter(|value| !value.is_empty()))
        .or(file_value)
}

fn request_timeout(config: &ConfigFile) -> Duration {
    let secs = config
        .http
        .as_ref()
        .and_then(|http| http.timeout_secs)
        .unwrap_or(30);
    Duration::from_secs(secs)
}

fn backoff_from(config: &ConfigFile, default_attempts: u32) -> ExponentialBackoff {
    let retry = config.retry.clone().unwrap_or_default();
    ExponentialBackoff::new(
        retry.max_attempts.unwrap_or(default_attempts),
        Duration::from_secs_f64(retry.base_delay_secs.unwrap_or(1.0)),
        Duration::from_secs_f64(retry.max_delay_secs.unwrap_or(60.0)),
    )
}

async fn run_abstract(args: AbstractArgs, config: &ConfigFile) -> ExitCode {
    let query = AbstractQuery {
        doi: args.doi,
        s2_id: args.s2_id,
        title: args.title,
        author: args.author,
        year: args.year,
    };
    let query_echo = serde_json::to_value(&query).unwrap_or_else(|_| json!({}));

    if !query.has_identifier() {
        let err = Error::Config("must provide --doi, --s2-id, or --title".into());
        output::print_json(&output::abstract_error(&query_echo, &err));
        return output::exit(&err);
    }

    let creds = config.credentials.clone().unwrap_or_default();
    let chain = match AbstractChain::standard(
        resolve_setting(args.s2_api_key, "S2_API_KEY", creds.s2_api_key),
        resolve_setting(args.openalex_email, "OPENALEX_EMAIL", creds.openalex_mailto),
        resolve_setting(args.core_api_key, "CORE_API_KEY", creds.core_api_key),
        backoff_from(config, 3),
    ) {
        Ok(chain) => chain,
        Err(err) => {
            output::print_json(&output::abstract_error(&query_echo, &err));
            return output::exit(&err);
        }
    };

    let client = reqwest::Client::new();
    match chain.resolve(&query, &client, request_timeout(config)).await {
        Ok(result) => {
            if !result.is_found() {
                tracing::info!("no abstract found from any source");
            }
            let source = result.source().and_then(|s| serde_json::to_value(s).ok());
            output::print_json(&output::abstract_document(
                &query_echo,
                result.text(),
                source.as_ref(),
            ));
            ExitCode::SUCCESS
        }
        Err(err) => {
            output::print_json(&output::abstract_error(&query_echo, &err));
            output::exit(&err)
        }
    }
}

async fn run_verify(args: VerifyArgs, config: &ConfigFile) -> ExitCode {
    let mut echo = Map::new();
    if let Some(ref doi) = args.doi {
        echo.insert("doi".into(), json!(doi));
    }
    if let Some(ref title) = args.title {
        echo.insert("title".into(), json!(title));
    }
    if let Some(ref author) = args.author {
        echo.insert("author".into(), json!(author));
    }
    if let Some(year) = args.year {
        echo.insert("year".into(), json!(year));
    }
    let query_echo = Value::Object(echo);

    if args.doi.is_none() && args.title.is_none() {
        let err = Error::Config("must provide either --doi or --title".into());
        output::print_json(&output::error_document("crossref", &query_echo, &err));
        return output::exit(&err);
    }

    let creds = config.credentials.clone().unwrap_or_default();
    let mailto = resolve_setting(args.mailto, "CROSSREF_MAILTO", creds.crossref_mailto);
    let verifier = match Verifier::new(mailto, backoff_from(config, 5)) {
        Ok(verifier) => verifier,
        Err(err) => {
            output::print_json(&output::error_document("crossref", &query_echo, &err));
            return output::exit(&err);
        }
    };

    let query = VerifyQuery {
        doi: args.doi,
        title: args.title,
        author: args.author,
        year: args.year,
        check_title: args.verify_metadata,
    };
    let client = reqwest::Client::new();
    match verifier.verify(&query, &client, request_timeout(config)).await {
        Ok(paper) => {
            let result = serde_json::to_value(&paper).unwrap_or_else(|_| json!({}));
            output::print_json(&output::success_document("crossref", &query_echo, vec![result]));
            ExitCode::SUCCESS
        }
        Err(err) => {
            output::print_json(&output::error_document("crossref", &query_echo, &err));
            output::exit(&err)
        }
    }
}

async fn run_search_openalex(args: SearchOpenalexArgs, config: &ConfigFile) -> ExitCode {
    let query_echo = json!(
        args.query
            .clone()
            .or_else(|| args.doi.clone())
            .or_else(|| args.id.clone())
            .unwrap_or_default()
    );

    if args.query.is_none() && args.doi.is_none() && args.id.is_none() && args.cites.is_none() {
        let err = Error::Config("must provide a query, --doi, --id, or --cites".into());
        output::print_json(&output::error_document("openalex", &query_echo, &err));
        return output::exit(&err);
    }

    let creds = config.credentials.clone().unwrap_or_default();
    let mailto = resolve_setting(args.email, "OPENALEX_EMAIL", creds.openalex_mailto);
    let limiter = match rate_limit::get_limiter("openalex") {
        Ok(limiter) => limiter,
        Err(err) => {
            output::print_json(&output::error_document("openalex", &query_echo, &err));
            return output::exit(&err);
        }
    };
    let openalex = OpenAlex::new(mailto, limiter, backoff_from(config, 5));
    let client = reqwest::Client::new();
    let timeout = request_timeout(config);

    // Direct single-work lookup short-circuits the search path
    if let Some(id) = args.doi.or(args.id) {
        return match openalex.get_work(&id, &client, timeout).await {
            Ok(work) => {
                output::print_json(&output::success_document("openalex", &query_echo, vec![work]));
                ExitCode::SUCCESS
            }
            Err(err) => {
                output::print_json(&output::error_document("openalex", &query_echo, &err));
                output::exit(&err)
            }
        };
    }

    let filter = WorkFilter {
        year: args.year,
        cites: args.cites,
        oa_only: args.oa_only,
        min_citations: args.min_citations,
        work_type: args.work_type,
    };
    match openalex
        .search(args.query.as_deref(), &filter, args.limit, &client, timeout)
        .await
    {
        Ok(outcome) => print_search_outcome("openalex", &query_echo, outcome),
        Err(err) => {
            output::print_json(&output::error_document("openalex", &query_echo, &err));
            output::exit(&err)
        }
    }
}

async fn run_search_core(args: SearchCoreArgs, config: &ConfigFile) -> ExitCode {
    let query_echo = json!(
        args.query
            .clone()
            .or_else(|| args.doi.clone())
            .or_else(|| args.title.as_ref().map(|t| format!("title:{t}")))
            .unwrap_or_default()
    );

    if args.query.is_none() && args.doi.is_none() && args.title.is_none() {
        let err = Error::Config("must provide a query, --doi, or --title".into());
        output::print_json(&output::error_document("core", &query_echo, &err));
        return output::exit(&err);
    }

    let creds = config.credentials.clone().unwrap_or_default();
    let api_key = resolve_setting(args.api_key, "CORE_API_KEY", creds.core_api_key);
    let limiter = match rate_limit::get_limiter("core") {
        Ok(limiter) => limiter,
        Err(err) => {
            output::print_json(&output::error_document("core", &query_echo, &err));
            return output::exit(&err);
        }
    };
    let core = Core::new(api_key, limiter, backoff_from(config, 5));
    let client = reqwest::Client::new();
    let timeout = request_timeout(config);

    let (core_query, year, limit) = if let Some(ref doi) = args.doi {
        (format!("doi:\"{}\"", litref_core::doi::normalize_doi(doi)), None, 1)
    } else if let Some(ref title) = args.title {
        let mut parts = vec![format!("title:\"{title}\"")];
        if let Some(ref author) = args.author {
            parts.push(format!("authors:\"{author}\""));
        }
        // Ranges don't apply to a title lookup; single years do
        let year = args.year.filter(|y| !y.contains('-'));
        (parts.join(" AND "), year, 10)
    } else {
        let mut query = args.query.clone().unwrap_or_default();
        if let Some(ref author) = args.author {
            query = format!("{query} AND authors:\"{author}\"");
        }
        (query, args.year.clone(), args.limit)
    };

    match core
        .search(&core_query, year.as_deref(), limit, &client, timeout)
        .await
    {
        Ok(outcome) if args.doi.is_some() && outcome.results.is_empty() => {
            let err = Error::NotFound(format!(
                "no paper found with DOI: {}",
                args.doi.as_deref().unwrap_or_default()
            ));
            output::print_json(&output::error_document("core", &query_echo, &err));
            output::exit(&err)
        }
        Ok(outcome) => print_search_outcome("core", &query_echo, outcome),
        Err(err) => {
            output::print_json(&output::error_document("core", &query_echo, &err));
            output::exit(&err)
        }
    }
}

fn print_search_outcome(
    source: &str,
    query_echo: &Value,
    outcome: litref_core::search::SearchOutcome,
) -> ExitCode {
    if outcome.results.is_empty() && !outcome.is_partial() {
        let err = Error::NotFound("no papers found matching query".into());
        output::print_json(&output::error_document(source, query_echo, &err));
        return output::exit(&err);
    }

    if outcome.is_partial() {
        let warning = format!(
            "completed with {} error(s); found {} papers",
            outcome.errors.len(),
            outcome.results.len()
        );
        let errors = outcome
            .errors
            .iter()
            .map(|failure| serde_json::to_value(failure).unwrap_or_else(|_| json!({})))
            .collect();
        output::print_json(&output::partial_document(
            source,
            query_echo,
            outcome.results,
            errors,
            warning,
        ));
    } else {
        output::print_json(&output::success_document(source, query_echo, outcome.results));
    }
    ExitCode::SUCCESS
}

fn run_limits(action: LimitsAction) -> ExitCode {
    match action {
        LimitsAction::List => {
            let active = rate_limit::list_active();
            if active.is_empty() {
                println!("No active rate limiters");
            } else {
                println!("Active rate limiters:");
                for name in active {
                    println!("  - {name}");
                }
            }
            ExitCode::SUCCESS
        }
        LimitsAction::Clear => match rate_limit::clear_all() {
            Ok(count) => {
                println!("Cleared {count} lock file(s)");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("failed to clear limiter state: {err}");
                ExitCode::from(3)
            }
        },
        LimitsAction::Reset { api } => match rate_limit::get_limiter(&api) {
            Ok(limiter) => match limiter.reset() {
                Ok(()) => {
                    println!("Reset rate limiter state for {api}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("failed to reset {api}: {err}");
                    ExitCode::from(3)
                }
            },
            Err(err) => {
                eprintln!("{err}");
                ExitCode::from(2)
            }
        },
    }
}
