use chrono::Utc;

use crate::commands::common::{format_status_lines, load_status, CliContext};
use crate::error::CliError;

pub async fn run_status(context: &CliContext, as_json: bool) -> Result<(), CliError> {
    let settings = context.settings()?;
    let status = load_status(&context.store(), &context.db_path, settings.backend_url).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status, Utc::now()) {
            println!("{line}");
        }
    }
    Ok(())
}
