use std::path::PathBuf;

use canopy_types::Scope;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "canopy",
    about = "Canopy: completeness-aware resource catalog",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Catalog configuration file (TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Which question a query answers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum QueryAxis {
    /// Every leaf at or below a resource id
    Id,
    /// Every leaf of a resource type
    Type,
    /// Every leaf in a serialised format
    Format,
}

impl QueryAxis {
    pub fn scope(&self) -> Scope {
        match self {
            Self::Id => Scope::Resource,
            Self::Type => Scope::Type,
            Self::Format => Scope::Format,
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Write an upstream listing through to the catalog
    Ingest(IngestArgs),
    /// Record one newly discovered leaf
    Add(AddArgs),
    /// Query the catalog, consulting an upstream listing on a miss
    Get(GetArgs),
    /// Show whether the catalog is authoritative for a query
    Status(QueryArgs),
    /// Remove a resource and everything below it
    Delete(DeleteArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct QueryArgs {
    #[arg(long, value_enum, default_value = "id")]
    pub by: QueryAxis,
    pub key: String,
}

#[derive(Args)]
pub struct IngestArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// JSON array of leaves with their ancestry
    #[arg(long)]
    pub from: PathBuf,
}

#[derive(Args)]
pub struct AddArgs {
    /// JSON file holding a single leaf
    pub file: PathBuf,
}

#[derive(Args)]
pub struct GetArgs {
    #[command(flatten)]
    pub query: QueryArgs,
    /// Upstream listing to fall back to when the catalog misses
    #[arg(long)]
    pub upstream: Option<PathBuf>,
}

#[derive(Args)]
pub struct DeleteArgs {
    pub id: String,
}
