//! Vitrine operator CLI.
//!
//! Usage:
//!   vitrine health
//!   vitrine query catalog --search mantel --filter available=1 --sort quantity_desc --page 2

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use vitrine_engine::config::Config;
use vitrine_engine::db;
use vitrine_engine::query::{FilterSpec, FilterValue, QueryService, Resource, SearchMode};
use vitrine_engine::resources::{
    CatalogProduct, Category, EventKind, Image, Product, Quote, Section, Wizard,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the database answers.
    Health,

    /// Run a listing query and print the result page as JSON.
    Query {
        /// Resource name: catalog_product, product, category, section, wizard,
        /// quote, image, event_kind.
        resource: String,

        /// Free-text search term.
        #[arg(long, default_value = "")]
        search: String,

        /// Search mode: fulltext, exact or fuzzy.
        #[arg(long, default_value = "fulltext")]
        mode: String,

        /// Filter as key=value; repeat a key to build a list.
        #[arg(long = "filter", value_name = "KEY=VALUE")]
        filters: Vec<String>,

        /// Identities to report first (media assets only).
        #[arg(long = "pin")]
        pinned: Vec<Uuid>,

        /// Sort token.
        #[arg(long, default_value = "")]
        sort: String,

        #[arg(long)]
        page: Option<i64>,

        #[arg(long)]
        limit: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = Config::from_env().context("failed to load configuration")?;
    let pool = db::create_pool(&config).await?;

    match args.command {
        Command::Health => {
            if !db::check_health(&pool).await {
                bail!("database is not reachable");
            }
            info!("database healthy");
            println!("ok");
        }
        Command::Query {
            resource,
            search,
            mode,
            filters,
            pinned,
            sort,
            page,
            limit,
        } => {
            let spec = FilterSpec {
                search,
                search_mode: SearchMode::parse(&mode),
                filters: parse_filters(&filters)?,
                pinned,
                sort,
                page,
                limit,
            };
            let service = QueryService::new(pool, config);
            let json = match resource.as_str() {
                "catalog_product" | "catalog" => run::<CatalogProduct>(&service, &spec).await?,
                "product" => run::<Product>(&service, &spec).await?,
                "category" => run::<Category>(&service, &spec).await?,
                "section" => run::<Section>(&service, &spec).await?,
                "wizard" => run::<Wizard>(&service, &spec).await?,
                "quote" => run::<Quote>(&service, &spec).await?,
                "image" => run::<Image>(&service, &spec).await?,
                "event_kind" => run::<EventKind>(&service, &spec).await?,
                other => bail!("unknown resource '{other}'"),
            };
            println!("{json}");
        }
    }

    Ok(())
}

async fn run<R: Resource>(service: &QueryService, spec: &FilterSpec) -> Result<String> {
    let page = service
        .query::<R>(spec)
        .await
        .with_context(|| format!("{} query failed", R::descriptor().name))?;
    to_json(&page)
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize result page")
}

/// Parse `key=value` pairs. Repeated keys accumulate into a list.
fn parse_filters(raw: &[String]) -> Result<BTreeMap<String, FilterValue>> {
    let mut filters: BTreeMap<String, FilterValue> = BTreeMap::new();
    for pair in raw {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("filter '{pair}' is not key=value");
        };
        let key = key.trim().to_string();
        let value = FilterValue::from_query_param(value);
        let merged = match filters.remove(&key) {
            None => value,
            Some(existing) => {
                let mut items = existing.as_list();
                items.extend(value.as_list());
                FilterValue::List(items)
            }
        };
        filters.insert(key, merged);
    }
    Ok(filters)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn filters_parse_and_accumulate() {
        let raw = vec![
            "available=1".to_string(),
            "categories=a".to_string(),
            "categories=b,c".to_string(),
        ];
        let filters = parse_filters(&raw).unwrap();
        assert_eq!(filters["available"], FilterValue::Integer(1));
        assert_eq!(
            filters["categories"],
            FilterValue::List(vec!["a".into(), "b".into(), "c".into()])
        );
    }

    #[test]
    fn filter_without_equals_is_rejected() {
        assert!(parse_filters(&["available".to_string()]).is_err());
    }

    #[test]
    fn cli_parses_query() {
        let args = Args::try_parse_from([
            "vitrine", "query", "section", "--mode", "fuzzy", "--filter", "has_image=1", "--limit",
            "5",
        ])
        .unwrap();
        let Command::Query { resource, limit, filters, .. } = args.command else {
            panic!("expected query command");
        };
        assert_eq!(resource, "section");
        assert_eq!(limit, Some(5));
        assert_eq!(filters, vec!["has_image=1"]);
    }
}
