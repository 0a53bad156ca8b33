use std::path::Path;

use anyhow::Context;
use canopy_catalog::{
    CachingResourceService, CatalogConfig, FixedResourceSource, LeafStream, PersistenceLayer,
    ResourceSource,
};
use canopy_store::BackingStore;
use canopy_types::{LeafResource, ResourceId};
use colored::Colorize;
use futures::TryStreamExt;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CatalogConfig::load(path)?,
        None => CatalogConfig::default(),
    };
    let format = cli.format;
    match cli.command {
        Command::Ingest(args) => cmd_ingest(&config, args, format).await,
        Command::Add(args) => cmd_add(&config, args).await,
        Command::Get(args) => cmd_get(&config, args, format).await,
        Command::Status(args) => cmd_status(&config, args).await,
        Command::Delete(args) => cmd_delete(&config, args).await,
        Command::Config => cmd_config(&config),
    }
}

fn open_layer(config: &CatalogConfig) -> anyhow::Result<PersistenceLayer<dyn BackingStore>> {
    Ok(PersistenceLayer::new(config.backend.open()?))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

async fn upstream_for(
    source: &FixedResourceSource,
    query: &QueryArgs,
) -> anyhow::Result<LeafStream<'static>> {
    let stream = match query.by {
        QueryAxis::Id => source.resources_by_id(&ResourceId::new(&query.key)?).await?,
        QueryAxis::Type => source.resources_by_type(&query.key).await?,
        QueryAxis::Format => source.resources_by_serialised_format(&query.key).await?,
    };
    Ok(stream)
}

async fn cmd_ingest(
    config: &CatalogConfig,
    args: IngestArgs,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let source = FixedResourceSource::new(read_json(&args.from)?);
    let layer = open_layer(config)?;
    let upstream = upstream_for(&source, &args.query).await?;
    let key = &args.query.key;
    let through = match args.query.by {
        QueryAxis::Id => layer.with_persistence_by_id(ResourceId::new(key)?, upstream),
        QueryAxis::Type => layer.with_persistence_by_type(key, upstream),
        QueryAxis::Format => layer.with_persistence_by_serialised_format(key, upstream),
    };
    let leaves: Vec<LeafResource> = through.try_collect().await?;

    match format {
        OutputFormat::Json => print_leaves(&leaves, format)?,
        OutputFormat::Text => println!(
            "{} Ingested {} leaves for {} {}",
            "✓".green().bold(),
            leaves.len().to_string().bold(),
            args.query.by.scope(),
            key.yellow()
        ),
    }
    Ok(())
}

async fn cmd_add(config: &CatalogConfig, args: AddArgs) -> anyhow::Result<()> {
    let leaf: LeafResource = read_json(&args.file)?;
    let layer = open_layer(config)?;
    layer.add_resource(&leaf).await?;
    println!("{} Added {}", "✓".green().bold(), leaf.id.to_string().yellow());
    Ok(())
}

async fn cmd_get(config: &CatalogConfig, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let layer = open_layer(config)?;
    let key = &args.query.key;

    let leaves = match &args.upstream {
        Some(path) => {
            let source = FixedResourceSource::new(read_json(path)?);
            let service = CachingResourceService::new(layer, source).with_retry(config.retry.clone());
            let stream = match args.query.by {
                QueryAxis::Id => service.resources_by_id(&ResourceId::new(key)?).await?,
                QueryAxis::Type => service.resources_by_type(key).await?,
                QueryAxis::Format => service.resources_by_serialised_format(key).await?,
            };
            Some(stream.try_collect::<Vec<_>>().await?)
        }
        None => {
            let cached = match args.query.by {
                QueryAxis::Id => layer.get_resources_by_id(&ResourceId::new(key)?).await?,
                QueryAxis::Type => layer.get_resources_by_type(key).await?,
                QueryAxis::Format => layer.get_resources_by_serialised_format(key).await?,
            };
            match cached {
                Some(stream) => Some(stream.try_collect::<Vec<_>>().await?),
                None => None,
            }
        }
    };

    match leaves {
        Some(leaves) => print_leaves(&leaves, format)?,
        None => match format {
            OutputFormat::Json => println!("null"),
            OutputFormat::Text => println!("{} {}", key.yellow(), "unknown".dimmed()),
        },
    }
    Ok(())
}

async fn cmd_status(config: &CatalogConfig, args: QueryArgs) -> anyhow::Result<()> {
    let layer = open_layer(config)?;
    let scope = args.by.scope();
    let complete = layer.ledger().is_complete(scope, &args.key).await?;
    let state = if complete {
        "complete".green().bold()
    } else {
        "incomplete".red()
    };
    println!("{} {}: {}", scope, args.key.yellow(), state);
    Ok(())
}

async fn cmd_delete(config: &CatalogConfig, args: DeleteArgs) -> anyhow::Result<()> {
    let layer = open_layer(config)?;
    let id = ResourceId::new(&args.id)?;
    if layer.delete_resource(&id).await? {
        println!("{} Deleted {}", "✓".green().bold(), id.to_string().yellow());
    } else {
        println!("{} not found", id.to_string().yellow());
    }
    Ok(())
}

fn cmd_config(config: &CatalogConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_leaves(leaves: &[LeafResource], format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(leaves)?),
        OutputFormat::Text => {
            for leaf in leaves {
                println!(
                    "{}  {} {}  {}",
                    leaf.id.to_string().yellow(),
                    leaf.resource_type.cyan(),
                    leaf.serialised_format.blue(),
                    leaf.connection_detail.dimmed()
                );
            }
            println!("{} leaves", leaves.len().to_string().bold());
        }
    }
    Ok(())
}
