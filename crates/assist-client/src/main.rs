//! Assist command line client.

use std::path::PathBuf;
use std::sync::Arc;

use assist_cache::{EventBus, InvalidationListener, register_cache_metrics};
use assist_client::{ApiClient, CallOptions, ClearDbCache, ClientConfig, ClientError, PathListing, SearchQuery};
use assist_core::SourceType;
use serde_json::Value;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "usage: assist <command> [args]

commands:
  ls <hdfs|adls|s3> <path> [filter]
  databases <engine>
  tables <engine> <database>
  columns <engine> <database> <table> [field...]
  top-tables <engine> <database>
  search <query>
  clear <source> [database] [table]
  clear-all";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::var("ASSIST_CONFIG").ok().map(PathBuf::from);
    let config = ClientConfig::load(config_path.as_deref())?;

    tracing::info!("Starting Assist client v{}", env!("CARGO_PKG_VERSION"));
    register_cache_metrics();

    let bus = EventBus::new();
    let client = ApiClient::from_config(&config, bus.clone())?;
    let _subscription =
        InvalidationListener::new(Arc::clone(client.cache()), config.identity(), bus).start();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let output = run(&client, &args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    let metrics = client.cache().metrics();
    tracing::debug!(
        hits = metrics.hits(),
        misses = metrics.misses(),
        hit_rate = metrics.hit_rate(),
        "Cache statistics"
    );

    Ok(())
}

async fn run(client: &ApiClient, args: &[String]) -> Result<Value, ClientError> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let call = CallOptions::default();

    let value = match args.as_slice() {
        ["ls", source, path, rest @ ..] => {
            let mut listing = PathListing::from_path(path);
            if let Some(filter) = rest.first() {
                listing = listing.filter(*filter);
            }
            let op = match *source {
                "hdfs" => client.fetch_hdfs_path(listing, call),
                "adls" => client.fetch_adls_path(listing, call),
                "s3" => client.fetch_s3_path(listing, call),
                other => return Err(ClientError::usage(format!("unknown file system '{other}'"))),
            };
            Value::clone(&*op.await?)
        },
        ["databases", engine] => client.load_databases(SourceType::engine(*engine), call).await?.into(),
        ["tables", engine, database] => {
            Value::clone(&*client.fetch_tables(SourceType::engine(*engine), database, call).await?)
        },
        ["columns", engine, database, table, fields @ ..] => {
            let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
            let op = client.fetch_fields(SourceType::engine(*engine), database, table, &fields, call);
            Value::clone(&*op.await?)
        },
        ["top-tables", engine, database] => Value::clone(
            &*client
                .fetch_nav_opt_top_tables(SourceType::engine(*engine), database, call)
                .await?,
        ),
        ["search", query @ ..] if !query.is_empty() => {
            client.search_entities(SearchQuery::new(query.join(" ")), call).await?
        },
        ["clear", source, rest @ ..] => {
            let request = match rest {
                [] => ClearDbCache::all(),
                [database] => ClearDbCache::database(*database),
                [database, table, ..] => ClearDbCache::database(*database).table(*table),
            };
            let result = client.clear_db_cache(SourceType::from(*source), &request);
            serde_json::json!({ "cleared": result.count, "patterns": result.patterns })
        },
        ["clear-all"] => {
            let result = client.clear_all();
            serde_json::json!({ "cleared": result.count })
        },
        _ => return Err(ClientError::usage(USAGE)),
    };

    Ok(value)
}
