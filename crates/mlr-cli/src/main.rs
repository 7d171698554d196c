//! mlr compile CLI.
//!
//! Compiles one query of a model into SQL by talking to a compiler
//! service, either an already-running one (`--address`) or one spawned
//! locally (`--spawn`). Table schemas the compiler asks for are served
//! from a JSON file captured ahead of time (`--schemas`); without one,
//! any schema request fails the compile.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mlr_client::{
    CompileSession, ModelSource, QuerySpec, SchemaProvider, SchemaResponse, ServiceConfig,
    StructDef,
};

#[derive(Parser, Debug)]
#[command(name = "mlr")]
#[command(about = "Compile an mlr model query into SQL via the compiler service")]
#[command(version)]
struct Args {
    /// Model source file
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Inline query text to compile
    #[arg(short, long, conflicts_with = "name")]
    query: Option<String>,

    /// Named query defined in the model
    #[arg(short, long)]
    name: Option<String>,

    /// Address of a running compiler service
    #[arg(
        long,
        default_value = "http://127.0.0.1:14310",
        conflicts_with = "spawn"
    )]
    address: String,

    /// Spawn the compiler service locally (command followed by its args)
    #[arg(long, num_args = 1.., value_name = "COMMAND")]
    spawn: Option<Vec<String>>,

    /// JSON file with pre-fetched table schemas ({"schemas": {...}})
    #[arg(long, value_name = "FILE")]
    schemas: Option<PathBuf>,

    /// Seconds to wait for the service to become ready
    #[arg(long, default_value_t = 10)]
    timeout: u64,
}

/// Serves table schemas from a JSON file captured ahead of time.
struct FileSchemaProvider {
    schemas: BTreeMap<String, StructDef>,
}

impl FileSchemaProvider {
    fn load(path: &PathBuf) -> anyhow::Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading schema file {}", path.display()))?;
        let response: SchemaResponse = serde_json::from_str(&text)
            .with_context(|| format!("parsing schema file {}", path.display()))?;
        Ok(Self {
            schemas: response.schemas,
        })
    }

    fn empty() -> Self {
        Self {
            schemas: BTreeMap::new(),
        }
    }
}

impl SchemaProvider for FileSchemaProvider {
    type Error = String;

    async fn fetch_schemas(
        &self,
        tables: &[String],
    ) -> Result<BTreeMap<String, StructDef>, String> {
        let mut out = BTreeMap::new();
        for table in tables {
            match self.schemas.get(table) {
                Some(def) => {
                    out.insert(table.clone(), def.clone());
                }
                None => return Err(format!("no schema data for table {table}")),
            }
        }
        Ok(out)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let query = match (args.query, args.name) {
        (Some(text), _) => QuerySpec::Inline(text),
        (None, Some(name)) => QuerySpec::Named(name),
        (None, None) => anyhow::bail!("provide --query or --name"),
    };

    let timeout = Duration::from_secs(args.timeout);
    let service = match args.spawn {
        Some(command) => {
            let mut parts = command.into_iter();
            let program = parts.next().context("--spawn needs a command")?;
            ServiceConfig::spawn(program, parts.collect()).with_timeout(timeout)
        }
        None => ServiceConfig::external(args.address).with_timeout(timeout),
    };

    let provider = match &args.schemas {
        Some(path) => FileSchemaProvider::load(path)?,
        None => FileSchemaProvider::empty(),
    };

    let model = ModelSource::new(&args.model)?;
    tracing::debug!(model = %args.model.display(), "starting compile");
    let session = CompileSession::new(model, service, &provider);

    match session.get_sql(&query).await {
        Ok(sql) => println!("{sql}"),
        Err(err) => {
            eprintln!("compile failed: {err}");
            process::exit(1);
        }
    }

    Ok(())
}
