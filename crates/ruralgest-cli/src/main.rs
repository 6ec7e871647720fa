//! RuralGest CLI - offline-first farm inventory from the terminal
//!
//! Writes land in the local store first and are replayed against the backend
//! by `ruralgest sync` or the background loop of `ruralgest watch`.

mod cli;
mod commands;
mod error;

use std::time::Duration;

use clap::Parser;
use ruralgest_core::services::{NewConsumption, NewProduct, NewPurchase};
use tracing_subscriber::EnvFilter;

use crate::cli::{
    Cli, Commands, ConsumptionCommands, PendingCommands, ProductCommands, PurchaseCommands,
    RecordsCommands,
};
use crate::commands::common::CliContext;
use crate::commands::completions::run_completions;
use crate::commands::inventory::{
    run_consumption_add, run_low_stock, run_product_add, run_purchase_add,
};
use crate::commands::pending::{
    run_pending_add, run_pending_clear, run_pending_dead, run_pending_list, run_pending_requeue,
};
use crate::commands::records::{
    run_records_clear, run_records_get, run_records_list, run_records_remove,
};
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::commands::watch::run_watch;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ruralgest=info,ruralgest_core=info")),
        )
        .init();

    let cli = Cli::parse();
    let context = CliContext::new(cli.db_path, cli.backend_url);

    match cli.command {
        Commands::Sync { json } => run_sync(&context, json).await?,
        Commands::Watch {
            offline,
            probe_every,
        } => run_watch(&context, offline, Duration::from_secs(probe_every)).await?,
        Commands::Status { json } => run_status(&context, json).await?,
        Commands::Pending { command } => match command {
            PendingCommands::List { json } => run_pending_list(&context, json).await?,
            PendingCommands::Add {
                action,
                endpoint,
                body,
            } => run_pending_add(&context, &action, &endpoint, &body).await?,
            PendingCommands::Clear => run_pending_clear(&context).await?,
            PendingCommands::Dead { json } => run_pending_dead(&context, json).await?,
            PendingCommands::Requeue => run_pending_requeue(&context).await?,
        },
        Commands::Records { command } => match command {
            RecordsCommands::List {
                collection,
                limit,
                json,
            } => run_records_list(&context, collection, limit, json).await?,
            RecordsCommands::Get { collection, key } => {
                run_records_get(&context, collection, &key).await?;
            }
            RecordsCommands::Remove { collection, key } => {
                run_records_remove(&context, collection, &key).await?;
            }
            RecordsCommands::Clear { collection } => {
                run_records_clear(&context, collection).await?;
            }
        },
        Commands::Product {
            command:
                ProductCommands::Add {
                    nome,
                    categoria,
                    unidade,
                    estoque_minimo,
                },
        } => {
            let input = NewProduct {
                nome,
                categoria,
                unidade,
                estoque_minimo,
            };
            run_product_add(&context, input).await?;
        }
        Commands::Purchase {
            command:
                PurchaseCommands::Add {
                    produto_id,
                    quantidade,
                    preco_unitario,
                    fornecedor,
                    nota_fiscal,
                    observacoes,
                },
        } => {
            let input = NewPurchase {
                produto_id,
                quantidade,
                preco_unitario,
                fornecedor,
                nota_fiscal,
                observacoes,
            };
            run_purchase_add(&context, input).await?;
        }
        Commands::Consumption {
            command:
                ConsumptionCommands::Add {
                    produto_id,
                    quantidade,
                    tipo_atividade,
                    descricao,
                },
        } => {
            let input = NewConsumption {
                produto_id,
                quantidade,
                tipo_atividade,
                descricao,
            };
            run_consumption_add(&context, input).await?;
        }
        Commands::LowStock { json } => run_low_stock(&context, json).await?,
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
