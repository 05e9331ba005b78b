//! Search binary entry point.
//!
//! This binary provides a command-line interface for searching the event
//! catalog. It supports both single-query and interactive REPL modes, with
//! table or JSON output.
//!
//! # Examples
//!
//! Single query across titles, authors and events:
//! ```bash
//! search --query "learning"
//! ```
//!
//! Event search with JSON output:
//! ```bash
//! search --db-path catalog.db --query "SBES" --mode evento --format json
//! ```
//!
//! Interactive mode:
//! ```bash
//! search --interactive
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use event_catalog::{
    query::{
        browse::{AuthorPage, CatalogBrowser, EventPage},
        EnrichedArticle, FederatedSearchEngine, SearchMode, SearchRequest, SearchResponse,
    },
    storage::{sqlite::SqliteStore, CatalogStore, Collection, Filter},
    DEFAULT_DB_FILE,
};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Output format for search results
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-friendly table
    Table,
    /// Machine-readable JSON, in the search response shape
    Json,
}

/// Search binary CLI for querying the event catalog
#[derive(Parser, Debug)]
#[command(
    name = "search",
    version,
    about = "Search articles in the event catalog",
    long_about = "Query the event catalog by article title, author name, or event. Supports both \
                  single-query and interactive modes with flexible output formatting.

EXAMPLES:
  Single query (all modes):
    search --query \"learning\"

  Articles of an event, as JSON:
    search --query \"SBES\" --mode evento --format json

  Interactive mode:
    search --db-path catalog.db --interactive"
)]
struct Args {
    /// Database file path (defaults to the platform data directory)
    #[arg(long, value_name = "PATH", env = "CATALOG_DB")]
    db_path: Option<PathBuf>,

    /// Search query (required for single-query mode, omitted in interactive mode)
    #[arg(long, value_name = "TEXT", conflicts_with = "interactive")]
    query: Option<String>,

    /// Search mode: title, author, event or all (titulo, autor, evento, tudo also accepted)
    #[arg(long, value_name = "MODE", default_value = "all")]
    mode: String,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    format: OutputFormat,

    /// Enable interactive REPL mode
    #[arg(long, short = 'i')]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, default_value = "warn", value_name = "LEVEL", env = "CATALOG_LOG")]
    log_level: String,
}

/// Setup logging with the specified level
fn setup_logging(log_level: &str) {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();
}

/// Resolve the database path, falling back to the platform data directory
fn resolve_db_path(arg: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = arg {
        return Ok(path);
    }
    let data_dir = dirs::data_dir().context("No data directory on this platform; pass --db-path")?;
    Ok(data_dir.join("event-catalog").join(DEFAULT_DB_FILE))
}

/// Execute a search request and return the response
async fn execute_search(
    engine: &FederatedSearchEngine<Arc<SqliteStore>>,
    query_text: &str,
    mode: &str,
) -> Result<SearchResponse> {
    debug!("Executing search for query: {} (mode: {})", query_text, mode);

    let request = SearchRequest {
        q: Some(query_text.to_string()),
        tipo: Some(mode.to_string()),
    };

    engine
        .handle(&request)
        .await
        .with_context(|| format!("Failed to execute search for query: '{}'", query_text))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        text.to_string()
    }
}

fn author_names(result: &EnrichedArticle) -> String {
    result
        .article
        .authors
        .iter()
        .map(|a| a.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Format results as a pretty table
fn format_results_table(results: &[EnrichedArticle]) -> String {
    if results.is_empty() {
        return "No results found.".to_string();
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    table.set_header(vec![
        Cell::new("#").add_attribute(Attribute::Bold),
        Cell::new("Title").add_attribute(Attribute::Bold),
        Cell::new("Authors").add_attribute(Attribute::Bold),
        Cell::new("Event").add_attribute(Attribute::Bold),
        Cell::new("Year").add_attribute(Attribute::Bold),
    ]);

    for (idx, result) in results.iter().enumerate() {
        // Dangling references show up as a dimmed placeholder
        let event_cell = match &result.event_acronym {
            Some(acronym) => Cell::new(acronym).fg(Color::Cyan),
            None => Cell::new("?").fg(Color::DarkGrey),
        };
        let year_cell = match result.edition_year {
            Some(year) => Cell::new(year),
            None => Cell::new("?").fg(Color::DarkGrey),
        };

        table.add_row(vec![
            Cell::new(idx + 1),
            Cell::new(truncate(&result.article.title, 60)),
            Cell::new(truncate(&author_names(result), 40)),
            event_cell,
            year_cell,
        ]);
    }

    table.to_string()
}

/// Format a response as JSON
fn format_response_json(response: &SearchResponse) -> Result<String> {
    serde_json::to_string_pretty(response).with_context(|| "Failed to serialize results to JSON")
}

fn print_response(response: &SearchResponse, format: OutputFormat, elapsed_secs: f64) -> Result<()> {
    match format {
        OutputFormat::Table => {
            println!("{}", format_results_table(&response.results));
            println!(
                "\nFound {} results for '{}' (mode: {}) in {:.2}s",
                response.total, response.query, response.mode, elapsed_secs
            );
        }
        OutputFormat::Json => println!("{}", format_response_json(response)?),
    }
    Ok(())
}

/// Display detailed view of a single result
fn display_result_detail(result: &EnrichedArticle, rank: usize) {
    let article = &result.article;
    println!("\n{}", "═".repeat(80));
    println!("#{}", rank);
    println!("Title: {}", article.title);
    println!(
        "Authors: {}",
        article
            .authors
            .iter()
            .map(|a| if a.email.is_empty() {
                a.name.clone()
            } else {
                format!("{} <{}>", a.name, a.email)
            })
            .collect::<Vec<_>>()
            .join(", ")
    );
    match (&result.event_name, &result.event_acronym) {
        (Some(name), Some(acronym)) => println!("Event: {} ({})", name, acronym),
        _ => println!("Event: unknown"),
    }
    if let Some(year) = result.edition_year {
        println!("Year: {}", year);
    }
    if !article.keywords.is_empty() {
        println!("Keywords: {}", article.keywords.join(", "));
    }
    if !article.pdf_ref.is_empty() {
        println!("PDF: {}", article.pdf_ref);
    }
    if !article.abstract_text.is_empty() {
        println!("\nAbstract:\n{}", article.abstract_text);
    }
    println!("{}", "═".repeat(80));
}

fn display_event_page(page: &EventPage) {
    println!("\n{} ({})", page.event.name, page.event.acronym);
    if !page.event.description.is_empty() {
        println!("{}", page.event.description);
    }
    if page.editions.is_empty() {
        println!("  No editions.");
    }
    for edition in &page.editions {
        if edition.location.is_empty() {
            println!("  {}", edition.year);
        } else {
            println!("  {} - {}", edition.year, edition.location);
        }
    }
}

fn display_author_page(page: &AuthorPage) {
    println!("\nArticles by '{}': {}", page.name, page.total);
    for group in &page.years {
        println!("  {}", group.year);
        for article in &group.articles {
            println!("    - {}", article.title);
        }
    }
}

fn print_help() {
    println!("Commands:");
    println!("  <query>             - Search articles");
    println!("  /mode MODE          - Set search mode (title, author, event, all)");
    println!("  /format table       - Use table output format");
    println!("  /format json        - Use JSON output format");
    println!("  /detail N           - Show full details for result N");
    println!("  /event ACRONYM [Y]  - Show an event's editions, or one edition's articles");
    println!("  /author NAME        - Show an author's articles by year");
    println!("  /help               - Show this help");
    println!("  Ctrl+D or Ctrl+C    - Exit");
}

/// Run interactive REPL mode
async fn run_interactive(
    engine: FederatedSearchEngine<Arc<SqliteStore>>,
    browser: CatalogBrowser<Arc<SqliteStore>>,
    mut mode: String,
    mut format: OutputFormat,
) -> Result<()> {
    println!("Interactive Catalog Search");
    print_help();
    println!();

    let mut rl = DefaultEditor::new().with_context(|| "Failed to create readline editor")?;

    let mut last_results: Vec<EnrichedArticle> = Vec::new();

    loop {
        let readline = rl.readline("Search> ");
        match readline {
            Ok(line) => {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line).ok(); // Ignore errors from adding to history

                if let Some(command) = line.strip_prefix('/') {
                    let (name, rest) = command.split_once(char::is_whitespace).unwrap_or((command, ""));
                    let rest = rest.trim();
                    match name {
                        "help" => print_help(),
                        "mode" => {
                            if rest.is_empty() {
                                eprintln!("Usage: /mode MODE");
                                continue;
                            }
                            mode = rest.to_string();
                            println!("Set search mode to {} ({})", mode, SearchMode::parse(&mode));
                        }
                        "format" => match rest {
                            "table" => {
                                format = OutputFormat::Table;
                                println!("Set output format to table");
                            }
                            "json" => {
                                format = OutputFormat::Json;
                                println!("Set output format to JSON");
                            }
                            _ => eprintln!("Usage: /format [table|json]"),
                        },
                        "detail" => match rest.parse::<usize>() {
                            Ok(rank) if rank > 0 && rank <= last_results.len() => {
                                display_result_detail(&last_results[rank - 1], rank);
                            }
                            Ok(rank) if rank > last_results.len() => {
                                eprintln!(
                                    "Result {} out of range (last search had {} results)",
                                    rank,
                                    last_results.len()
                                );
                            }
                            _ => eprintln!("Usage: /detail N"),
                        },
                        "event" => {
                            let mut parts = rest.split_whitespace();
                            let Some(acronym) = parts.next() else {
                                eprintln!("Usage: /event ACRONYM [YEAR]");
                                continue;
                            };
                            match parts.next().map(str::parse::<i32>) {
                                None => match browser.event_page(acronym).await {
                                    Ok(Some(page)) => display_event_page(&page),
                                    Ok(None) => println!("No event with acronym '{}'", acronym),
                                    Err(e) => eprintln!("Lookup failed: {}", e),
                                },
                                Some(Ok(year)) => match browser.edition_page(acronym, year).await {
                                    Ok(Some(page)) => {
                                        println!(
                                            "\n{} {} - {} articles",
                                            page.event.acronym,
                                            page.edition.year,
                                            page.articles.len()
                                        );
                                        for article in &page.articles {
                                            println!("  - {}", article.title);
                                        }
                                    }
                                    Ok(None) => println!("No {} edition of '{}'", year, acronym),
                                    Err(e) => eprintln!("Lookup failed: {}", e),
                                },
                                Some(Err(_)) => eprintln!("Invalid year: must be an integer"),
                            }
                        }
                        "author" => {
                            if rest.is_empty() {
                                eprintln!("Usage: /author NAME");
                                continue;
                            }
                            match browser.author_page(rest).await {
                                Ok(page) => display_author_page(&page),
                                Err(e) => eprintln!("Lookup failed: {}", e),
                            }
                        }
                        _ => eprintln!("Unknown command: /{}. Type /help for available commands.", name),
                    }
                } else {
                    let start = Instant::now();
                    match execute_search(&engine, line, &mode).await {
                        Ok(response) => {
                            let elapsed = start.elapsed().as_secs_f64();
                            if let Err(e) = print_response(&response, format, elapsed) {
                                eprintln!("Error formatting results: {}", e);
                            }
                            last_results = response.results;
                        }
                        Err(e) => eprintln!("Search failed: {:#}", e),
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("Goodbye!");
                break;
            }
            Err(err) => {
                error!("Error reading input: {}", err);
                break;
            }
        }
    }

    Ok(())
}

/// Run single-query mode
async fn run_single_query(
    engine: FederatedSearchEngine<Arc<SqliteStore>>,
    query: &str,
    mode: &str,
    format: OutputFormat,
) -> Result<()> {
    let start = Instant::now();
    let response = execute_search(&engine, query, mode).await?;
    print_response(&response, format, start.elapsed().as_secs_f64())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    setup_logging(&args.log_level);

    // Validate arguments
    let query = match (&args.query, args.interactive) {
        (Some(query), false) => Some(query.clone()),
        (None, true) => None,
        _ => anyhow::bail!(
            "Either --query or --interactive must be specified.\n\
             Use --help for usage information."
        ),
    };

    // Check database exists
    let db_path = resolve_db_path(args.db_path.clone())?;
    if !db_path.exists() {
        anyhow::bail!(
            "Database file not found: {}\n\
             Please run the ingestion binary first to create the database.",
            db_path.display()
        );
    }

    info!("Loading database from: {}", db_path.display());

    let store = Arc::new(
        SqliteStore::open(&db_path).with_context(|| format!("Failed to open catalog {}", db_path.display()))?,
    );

    // Validate database has articles
    let article_count = store
        .count(Collection::Articles, &Filter::All)
        .await
        .with_context(|| "Failed to count articles in database")?;

    if article_count == 0 {
        anyhow::bail!(
            "Catalog is empty (0 articles found).\n\
             Please run the ingestion binary to add articles first."
        );
    }

    info!("Catalog contains {} articles", article_count);

    let engine = FederatedSearchEngine::new(Arc::clone(&store));

    match query {
        Some(query) => run_single_query(engine, &query, &args.mode, args.format).await?,
        None => {
            let browser = CatalogBrowser::new(store);
            run_interactive(engine, browser, args.mode.clone(), args.format).await?
        }
    }

    Ok(())
}
