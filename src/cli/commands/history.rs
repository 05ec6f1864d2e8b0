use crate::config::Config;
use crate::db::Store;

pub async fn cmd_history(config: &Config, limit: u64) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;
    let records = store.recent(limit).await?;

    if records.is_empty() {
        println!("No download history.");
        return Ok(());
    }

    println!("Recent Downloads (last {}):", records.len());
    println!("{:-<70}", "");

    for record in records {
        let state = if record.queued { "queued" } else { "fetched" };
        println!("• {}", record.name);
        println!("  {} | {}", record.size, state);
    }

    Ok(())
}
