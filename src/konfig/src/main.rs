mod driver;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use konfig_config::{load_config, load_file};
use konfig_memory::Memory;
use konfig_reconcile::Provider;

use crate::driver::{Driver, ResourceFile};

#[derive(Parser, Debug)]
#[command(version, about = "Konfig: declarative reconciliation for the gateway admin API")]
struct Args {
    /// Path to config file (yaml/json/toml)
    #[arg(short, long, default_value = "./konfig.yaml")]
    config: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the declared entity
    Create(ResourceArgs),
    /// Refresh the tracked snapshot from the remote
    Read(ResourceArgs),
    /// Push the declared fields to the tracked entity
    Update(ResourceArgs),
    /// Delete the tracked entity
    Delete(ResourceArgs),
    /// Show drift between declared fields and the tracked snapshot
    Plan(ResourceArgs),
    /// Adopt an existing remote entity
    Import {
        #[command(flatten)]
        resource: ResourceArgs,
        /// Identifier, or `<parent>/<child>` for consumer-scoped kinds
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List tracked resources
    List,
}

#[derive(clap::Args, Debug)]
struct ResourceArgs {
    /// Resource file (yaml/json/toml)
    #[arg(short, long)]
    resource: String,
}

fn resource(args: &ResourceArgs) -> Result<ResourceFile> {
    load_file(&args.resource).with_context(|| format!("load resource {}", args.resource))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args.config)?;
    let _guard = konfig_tracing::init(
        &config.tracing.service_name,
        config.tracing.otlp_endpoint(),
        &config.tracing.logging_mode,
    )?;

    let memory = Memory::open(&config.memory.engine, &config.memory.path)?;
    let provider = Provider::new(&config.admin.client_config()).context("build admin client")?;
    let driver = Driver::new(provider, memory);

    let output = match &args.command {
        Command::Create(r) => driver.create(&resource(r)?).await?,
        Command::Read(r) => driver.read(&resource(r)?).await?,
        Command::Update(r) => driver.update(&resource(r)?).await?,
        Command::Delete(r) => driver.delete(&resource(r)?).await?,
        Command::Plan(r) => driver.plan(&resource(r)?)?,
        Command::Import { resource: r, key } => driver.import(&resource(r)?, key.as_deref()).await?,
        Command::List => driver.list()?,
    };
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
