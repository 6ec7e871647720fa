use ruralgest_core::{Collection, RecordKey};

use crate::commands::common::CliContext;
use crate::error::CliError;

pub async fn run_records_list(
    context: &CliContext,
    collection: Collection,
    limit: Option<usize>,
    as_json: bool,
) -> Result<(), CliError> {
    let mut records = context.store().get_all(collection).await?;
    if let Some(limit) = limit {
        records.truncate(limit);
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("No {collection} records.");
        return Ok(());
    }
    for record in &records {
        println!("{}", serde_json::to_string(record)?);
    }
    Ok(())
}

pub async fn run_records_get(
    context: &CliContext,
    collection: Collection,
    key: &str,
) -> Result<(), CliError> {
    let record = context
        .store()
        .get_by_key(collection, &RecordKey::from(key.trim()))
        .await?
        .ok_or_else(|| not_found(collection, key))?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn run_records_remove(
    context: &CliContext,
    collection: Collection,
    key: &str,
) -> Result<(), CliError> {
    if !context
        .store()
        .remove(collection, &RecordKey::from(key.trim()))
        .await?
    {
        return Err(not_found(collection, key));
    }
    println!("Removed {collection} record {}", key.trim());
    Ok(())
}

pub async fn run_records_clear(context: &CliContext, collection: Collection) -> Result<(), CliError> {
    let removed = context.store().clear(collection).await?;
    println!("Removed {removed} {collection} record(s)");
    Ok(())
}

fn not_found(collection: Collection, key: &str) -> CliError {
    CliError::RecordNotFound {
        collection: collection.to_string(),
        key: key.trim().to_string(),
    }
}
