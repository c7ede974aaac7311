use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use searchlink::config::Config;
use searchlink::engine::create_engine;
use searchlink::records::{load_json_lines, InMemoryRecordStore, JsonRecord};
use searchlink::search::{Distance, Filter, GeoPoint, Near, SearchOptions, SearchService, SortOrder};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "searchlink-cli")]
#[command(about = "Manage and query search indices for record classes", long_about = None)]
struct Cli {
    /// Configuration file (defaults to $SEARCHLINK_CONFIG or config/searchlink.toml)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ClassArg {
    /// Record class, as declared under [classes.<name>]
    #[arg(short = 'k', long = "class")]
    name: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the index of a class from a JSON lines file and swap it in
    Reindex {
        #[command(flatten)]
        class: ClassArg,

        /// One JSON record per line
        #[arg(short, long)]
        records: PathBuf,
    },

    /// Delete every index behind the class alias
    Delete {
        #[command(flatten)]
        class: ClassArg,
    },

    /// Check whether the class index exists
    Exists {
        #[command(flatten)]
        class: ClassArg,
    },

    /// Make recent writes searchable
    Refresh {
        #[command(flatten)]
        class: ClassArg,
    },

    /// Search a class
    Search {
        #[command(flatten)]
        class: ClassArg,

        /// Search term; empty matches everything
        #[arg(default_value = "")]
        term: String,

        /// Reindex from this file first (useful with the memory backend)
        #[arg(long)]
        records: Option<PathBuf>,

        /// Fields to match, with optional boosts (name^10)
        #[arg(short, long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Treat the term as a prefix
        #[arg(long)]
        autocomplete: bool,

        /// Allowed edit distance per term
        #[arg(long)]
        misspellings: Option<u8>,

        /// Personalize results for this actor
        #[arg(long)]
        actor: Option<String>,

        /// Origin as "lat,lon"
        #[arg(long)]
        near: Option<String>,

        /// Radius around --near, e.g. 10km or 5mi
        #[arg(long)]
        within: Option<Distance>,

        /// Nearest first (requires --near)
        #[arg(long)]
        sort_by_distance: bool,

        /// Filters: field=value or field!=value
        #[arg(short, long = "where")]
        filters: Vec<String>,

        /// Ordering: field or field:desc
        #[arg(short, long)]
        order: Vec<String>,

        /// Restrict to one kind of a type hierarchy
        #[arg(long)]
        kind: Option<String>,

        #[arg(long)]
        page: Option<usize>,

        #[arg(long)]
        per_page: Option<usize>,

        /// Disable the "did you mean" fallback
        #[arg(long)]
        no_suggest: bool,
    },

    /// Index or overwrite one record (JSON) through the alias
    IndexRecord {
        #[command(flatten)]
        class: ClassArg,

        #[arg(value_name = "RECORD_JSON")]
        record: String,
    },

    /// Remove one record from the index
    RemoveRecord {
        #[command(flatten)]
        class: ClassArg,

        #[arg(value_name = "RECORD_ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match cli.config {
        Some(ref path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config);

    let engine = create_engine(&config.engine)?;
    let service = |class: &ClassArg| -> anyhow::Result<SearchService> {
        let record_class = config.record_class(&class.name)?;
        Ok(SearchService::new(engine.clone(), record_class, &config)?)
    };

    match cli.command {
        Commands::Reindex { class, records } => {
            let service = service(&class)?;
            let report = service.reindex(&load_store(&records)?).await?;
            print_json(&serde_json::to_value(&report)?)?;
        }

        Commands::Delete { class } => {
            let deleted = service(&class)?.delete_index().await?;
            print_json(&json!({ "deleted": deleted }))?;
        }

        Commands::Exists { class } => {
            let exists = service(&class)?.index_exists().await?;
            print_json(&json!({ "exists": exists }))?;
        }

        Commands::Refresh { class } => {
            service(&class)?.refresh().await?;
            print_json(&json!({ "refreshed": true }))?;
        }

        Commands::Search {
            class,
            term,
            records,
            fields,
            autocomplete,
            misspellings,
            actor,
            near,
            within,
            sort_by_distance,
            filters,
            order,
            kind,
            page,
            per_page,
            no_suggest,
        } => {
            let service = service(&class)?;
            if let Some(path) = records {
                service.reindex(&load_store(&path)?).await?;
            }

            let mut options = SearchOptions::new();
            if !fields.is_empty() {
                options = options.with_fields(fields);
            }
            if autocomplete {
                options = options.with_autocomplete();
            }
            if let Some(edits) = misspellings {
                options = options.with_misspellings(edits);
            }
            if let Some(actor) = actor {
                options = options.with_actor(actor);
            }
            if let Some(near) = near {
                options = options.with_near(Near {
                    point: parse_point(&near)?,
                    within,
                    field: None,
                });
            } else if within.is_some() {
                bail!("--within requires --near");
            }
            if sort_by_distance {
                options = options.sort_by_distance();
            }
            for filter in &filters {
                options = options.with_filter(parse_filter(filter)?);
            }
            for spec in &order {
                let (field, order) = parse_order(spec)?;
                options = options.order_by(field, order);
            }
            if let Some(kind) = kind {
                options = options.with_kind(kind);
            }
            if page.is_some() || per_page.is_some() {
                options = options.with_page(page.unwrap_or(1), per_page.unwrap_or(config.query.per_page));
            }
            if no_suggest {
                options = options.without_suggest();
            }

            let response = service.search(&term, &options).await?;
            print_json(&serde_json::to_value(&response)?)?;
        }

        Commands::IndexRecord { class, record } => {
            let record: JsonRecord = serde_json::from_str(&record).context("Invalid record JSON")?;
            let service = service(&class)?;
            service.index_record(&record).await?;
            print_json(&json!({ "indexed": record.id }))?;
        }

        Commands::RemoveRecord { class, id } => {
            let removed = service(&class)?.remove_record(&id).await?;
            print_json(&json!({ "id": id, "removed": removed }))?;
        }
    }

    Ok(())
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("searchlink={},searchlink_cli={}", level, level).into()
    });

    // Logs go to stderr; stdout carries the command output
    let registry = tracing_subscriber::registry().with(filter);
    if config.observability.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_store(path: &PathBuf) -> anyhow::Result<InMemoryRecordStore<JsonRecord>> {
    let records = load_json_lines(path)?;
    tracing::info!(path = %path.display(), records = records.len(), "Loaded records");
    Ok(InMemoryRecordStore::from_records(records))
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_point(spec: &str) -> anyhow::Result<GeoPoint> {
    let (lat, lon) = spec
        .split_once(',')
        .ok_or_else(|| anyhow!("expected \"lat,lon\", got {:?}", spec))?;
    Ok(GeoPoint::new(lat.trim().parse()?, lon.trim().parse()?))
}

/// `field=value` / `field!=value`; values that parse as JSON keep their type
fn parse_filter(spec: &str) -> anyhow::Result<Filter> {
    let value = |raw: &str| serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    if let Some((field, raw)) = spec.split_once("!=") {
        return Ok(Filter::not_eq(field.trim(), value(raw.trim())));
    }
    match spec.split_once('=') {
        Some((field, raw)) => Ok(Filter::eq(field.trim(), value(raw.trim()))),
        None => bail!("expected field=value or field!=value, got {:?}", spec),
    }
}

fn parse_order(spec: &str) -> anyhow::Result<(String, SortOrder)> {
    match spec.split_once(':') {
        Some((field, order)) => Ok((
            field.to_string(),
            order.parse().map_err(|_| anyhow!("unknown sort order {:?}", order))?,
        )),
        None => Ok((spec.to_string(), SortOrder::Asc)),
    }
}
