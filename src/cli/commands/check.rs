use crate::config::Config;
use crate::db::Store;

pub async fn cmd_check(config: &Config, name: &str) -> anyhow::Result<()> {
    let store = Store::new(&config.general.database_path).await?;

    match store.get(name).await? {
        Some(record) => {
            let state = if record.queued { "queued" } else { "fetched, not queued" };
            println!("Already processed: {} ({state})", record.name);
            println!("  Size: {}", record.size);
            println!("  URL:  {}", record.url);
        }
        None => println!("Not processed yet: {name}"),
    }

    Ok(())
}
