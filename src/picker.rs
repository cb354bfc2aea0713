use anyhow::{Context, Result};
use dialoguer::FuzzySelect;
use dialoguer::theme::ColorfulTheme;

use crate::model::Resource;

fn describe<R: Resource>(record: &R) -> String {
    let listener = record.listener().map(|l| l.to_string()).unwrap_or_default();
    let endpoint = record.endpoint().map(|e| e.to_string()).unwrap_or_default();
    format!(
        "#{} {} -> {} ({} clients)",
        record.id(),
        listener,
        endpoint,
        record.clients_count()
    )
}

/// Fuzzy-pick one of `records` and return its id.
pub fn pick_record<R: Resource>(prompt: &str, records: &[R]) -> Result<u64> {
    if records.is_empty() {
        anyhow::bail!("no stoppable {}s", R::NOUN);
    }
    let items: Vec<String> = records.iter().map(describe).collect();

    let idx = FuzzySelect::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&items)
        .interact()
        .context("selection cancelled")?;
    Ok(records[idx].id())
}
