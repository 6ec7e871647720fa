use ruralgest_core::services::{NewConsumption, NewProduct, NewPurchase};
use ruralgest_core::InventoryService;

use crate::commands::common::{format_low_stock_lines, format_quantity, CliContext};
use crate::error::CliError;

pub async fn run_product_add(context: &CliContext, input: NewProduct) -> Result<(), CliError> {
    let product = InventoryService::new(context.store())
        .record_product(input)
        .await?;
    println!(
        "Created product {} ({}, {}); queued for sync",
        product.id, product.nome, product.unidade
    );
    Ok(())
}

pub async fn run_purchase_add(context: &CliContext, input: NewPurchase) -> Result<(), CliError> {
    let purchase = InventoryService::new(context.store())
        .record_purchase(input)
        .await?;
    println!(
        "Recorded purchase {} of {} x {} = {}; queued for sync",
        purchase.id,
        format_quantity(purchase.quantidade),
        purchase
            .produto_nome
            .as_deref()
            .unwrap_or(purchase.produto_id.as_str()),
        format_quantity(purchase.preco_total)
    );
    Ok(())
}

pub async fn run_consumption_add(
    context: &CliContext,
    input: NewConsumption,
) -> Result<(), CliError> {
    let consumption = InventoryService::new(context.store())
        .record_consumption(input)
        .await?;
    println!(
        "Recorded consumption {} of {} x {} ({}); queued for sync",
        consumption.id,
        format_quantity(consumption.quantidade),
        consumption
            .produto_nome
            .as_deref()
            .unwrap_or(consumption.produto_id.as_str()),
        consumption.tipo_atividade
    );
    Ok(())
}

pub async fn run_low_stock(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let products = InventoryService::new(context.store()).low_stock().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&products)?);
        return Ok(());
    }

    if products.is_empty() {
        println!("All products are at or above their minimum stock.");
        return Ok(());
    }
    for line in format_low_stock_lines(&products) {
        println!("{line}");
    }
    Ok(())
}
