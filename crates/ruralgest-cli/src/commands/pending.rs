use chrono::Utc;
use ruralgest_core::MutationPayload;

use crate::commands::common::{
    format_dead_letter_lines, format_pending_lines, parse_json_body, CliContext, PendingItem,
};
use crate::error::CliError;

pub async fn run_pending_list(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let entries = context.store().list_pending().await?;

    if as_json {
        let items = entries.iter().map(PendingItem::from).collect::<Vec<_>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No pending mutations.");
        return Ok(());
    }
    for line in format_pending_lines(&entries, Utc::now()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_pending_add(
    context: &CliContext,
    action: &str,
    endpoint: &str,
    body: &str,
) -> Result<(), CliError> {
    let payload = MutationPayload::new(endpoint.trim(), parse_json_body(body)?);
    let entry = context.store().enqueue_pending(action, &payload).await?;
    println!("Queued #{} {} -> {}", entry.id, entry.action, entry.payload.endpoint);
    Ok(())
}

pub async fn run_pending_clear(context: &CliContext) -> Result<(), CliError> {
    let removed = context.store().clear_pending().await?;
    println!("Removed {removed} pending mutation(s)");
    Ok(())
}

pub async fn run_pending_dead(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let entries = context.store().list_dead_letters().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No failed mutations.");
        return Ok(());
    }
    for line in format_dead_letter_lines(&entries, Utc::now()) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_pending_requeue(context: &CliContext) -> Result<(), CliError> {
    let moved = context.store().requeue_dead_letters().await?;
    println!("Requeued {moved} mutation(s)");
    Ok(())
}
