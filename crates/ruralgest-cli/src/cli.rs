use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ruralgest_core::Collection;

#[derive(Parser)]
#[command(name = "ruralgest")]
#[command(about = "Offline-first farm inventory from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Backend base URL (overrides RURALGEST_BACKEND_URL)
    #[arg(long, global = true, value_name = "URL")]
    pub backend_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one sync round now
    Sync {
        /// Output the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Keep syncing in the background until Ctrl-C
    Watch {
        /// Assume the backend is unreachable until the first probe succeeds
        #[arg(long)]
        offline: bool,
        /// Seconds between reachability probes
        #[arg(long, value_name = "SECS", default_value = "15")]
        probe_every: u64,
    },
    /// Show sync state of the local store
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or edit the pending mutation queue
    Pending {
        #[command(subcommand)]
        command: PendingCommands,
    },
    /// Inspect locally cached records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },
    /// Manage products
    Product {
        #[command(subcommand)]
        command: ProductCommands,
    },
    /// Record stock purchases
    Purchase {
        #[command(subcommand)]
        command: PurchaseCommands,
    },
    /// Record stock consumption
    Consumption {
        #[command(subcommand)]
        command: ConsumptionCommands,
    },
    /// List products below their minimum stock
    LowStock {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum PendingCommands {
    /// List queued mutations in replay order
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Queue a raw mutation
    Add {
        /// Action identifier, e.g. create_purchase
        action: String,
        /// Request path or absolute URL
        endpoint: String,
        /// JSON request body
        #[arg(default_value = "{}")]
        body: String,
    },
    /// Drop every queued mutation
    Clear,
    /// List mutations whose replay failed
    Dead {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move failed mutations back into the queue
    Requeue,
}

#[derive(Subcommand)]
pub enum RecordsCommands {
    /// List records of a collection
    List {
        /// produtos, compras, consumo, transacoes or mensagens
        collection: Collection,
        /// Number of records to show
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one record
    Get {
        collection: Collection,
        /// Record id
        key: String,
    },
    /// Delete one record from the local cache
    Remove {
        collection: Collection,
        /// Record id
        key: String,
    },
    /// Delete every record of a collection from the local cache
    Clear { collection: Collection },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Create a product
    Add {
        /// Product name
        nome: String,
        #[arg(long)]
        categoria: Option<String>,
        /// Unit of measure (default kg)
        #[arg(long)]
        unidade: Option<String>,
        /// Minimum stock before the product is flagged
        #[arg(long, default_value = "0")]
        estoque_minimo: f64,
    },
}

#[derive(Subcommand)]
pub enum PurchaseCommands {
    /// Record a purchase
    Add {
        produto_id: String,
        quantidade: f64,
        preco_unitario: f64,
        #[arg(long)]
        fornecedor: Option<String>,
        /// Invoice reference
        #[arg(long)]
        nota_fiscal: Option<String>,
        #[arg(long)]
        observacoes: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum ConsumptionCommands {
    /// Record consumption
    Add {
        produto_id: String,
        quantidade: f64,
        /// Activity type (default abastecimento)
        #[arg(long)]
        tipo_atividade: Option<String>,
        #[arg(long)]
        descricao: Option<String>,
    },
}
