use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use docdb_bench::bench::{self, RunPlan};
use docdb_bench::config::BenchConfig;
use docdb_bench::document::Template;
use docdb_bench::logging;
use docdb_bench::output::OutputWriter;
use docdb_bench::store::StoreBuilder;
use docdb_bench::store::config::parse_connect_kv;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "docdb-bench")]
#[command(about = "Concurrent insert load generator for document stores")]
struct Cli {
    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML configuration file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert documents and report throughput until every worker stops
    Run(Overrides),
    /// Print the effective configuration as YAML and exit
    Config(Overrides),
}

#[derive(Args)]
struct Overrides {
    /// Number of concurrent insert workers
    #[arg(long)]
    workers: Option<usize>,

    /// Total documents to insert across all workers
    #[arg(long)]
    documents: Option<u64>,

    /// Documents per insert request
    #[arg(long)]
    batch_size: Option<u64>,

    /// Field that receives a fresh UUID in every document
    #[arg(long)]
    partition_key: Option<String>,

    /// JSON file with the sample document
    #[arg(long)]
    template: Option<PathBuf>,

    /// Store engine (mongo/mock)
    #[arg(long)]
    engine: Option<String>,

    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    collection: Option<String>,

    #[arg(long)]
    username: Option<String>,

    /// Prefer DOCDB_BENCH_PASSWORD over passing this on the command line
    #[arg(long)]
    password: Option<String>,

    /// Shard the collection on a hashed partition key during setup
    #[arg(long)]
    partitioned: bool,

    /// Skip dropping and recreating the collection
    #[arg(long)]
    pre_provisioned: bool,

    /// Disable TLS to the store
    #[arg(long)]
    no_tls: bool,

    /// Monitor sampling interval (ms)
    #[arg(long)]
    tick_ms: Option<u64>,

    /// Optional CSV output file path (stdout if omitted)
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Extra backend parameters as key=value
    #[arg(long = "connect")]
    connect: Vec<String>,
}

impl Overrides {
    fn apply(self, cfg: &mut BenchConfig) {
        if let Some(v) = self.workers {
            cfg.workers = v;
        }
        if let Some(v) = self.documents {
            cfg.documents = v;
        }
        if let Some(v) = self.batch_size {
            cfg.batch_size = v;
        }
        if let Some(v) = self.partition_key {
            cfg.partition_key = v;
        }
        if self.template.is_some() {
            cfg.template = self.template;
        }
        if let Some(v) = self.engine {
            cfg.store.engine = v;
        }
        if let Some(v) = self.endpoint {
            cfg.store.endpoint = v;
        }
        if let Some(v) = self.port {
            cfg.store.port = v;
        }
        if let Some(v) = self.database {
            cfg.store.database = v;
        }
        if let Some(v) = self.collection {
            cfg.store.collection = v;
        }
        if self.username.is_some() {
            cfg.store.username = self.username;
        }
        if self.password.is_some() {
            cfg.store.password = self.password;
        }
        cfg.store.partitioned |= self.partitioned;
        cfg.store.pre_provisioned |= self.pre_provisioned;
        if self.no_tls {
            cfg.store.tls = false;
        }
        if let Some(v) = self.tick_ms {
            cfg.monitor.tick_ms = v;
        }
        if self.csv.is_some() {
            cfg.monitor.csv = self.csv;
        }
        cfg.store.params.extend(parse_connect_kv(&self.connect).params);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    logging::init(&cli.log_level)?;

    let (overrides, print_only) = match cli.command {
        Commands::Run(o) => (o, false),
        Commands::Config(o) => (o, true),
    };
    let mut cfg = match &cli.config {
        Some(path) => BenchConfig::load(path)?,
        None => BenchConfig::default(),
    };
    overrides.apply(&mut cfg);
    cfg.apply_env();
    cfg.validate()?;

    if print_only {
        print!("{}", serde_yaml::to_string(&cfg)?);
        return Ok(());
    }

    for line in cfg.banner() {
        println!("{line}");
    }
    println!();
    println!("docdb-bench starting...");

    let store = StoreBuilder::connect(cfg.engine()?, cfg.connect_options())
        .await
        .context("connect to store")?;
    store.prepare().await.context("prepare collection")?;

    let template = match &cfg.template {
        Some(path) => {
            println!("Loading sample document {}", path.display());
            Template::load(path)?
        }
        None => Template::sample(),
    };

    let mut out = match &cfg.monitor.csv {
        Some(path) => OutputWriter::new_csv(path).await?,
        None => OutputWriter::new_stdout(),
    };

    println!("Starting inserts with {} workers", cfg.workers);
    let summary = bench::run(&RunPlan::from(&cfg), store.clone(), template, &mut out).await?;

    if !summary.all_completed() {
        tracing::warn!(
            failed = summary.failed_workers(),
            inserted = summary.inserted,
            requested = summary.requested,
            "some workers stopped before finishing their share"
        );
    }
    store.shutdown().await.context("store shutdown")?;
    Ok(())
}
