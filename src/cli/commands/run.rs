use crate::config::Config;
use crate::context::Context;
use crate::models::ListStatus;

pub async fn cmd_run(config: Config, status: Option<ListStatus>, dry_run: bool) -> anyhow::Result<()> {
    let status = status.unwrap_or(config.anilist.default_status);
    let context = Context::new(config).await?;

    let summary = context.reconcile_service(dry_run).run(status).await?;

    println!("Reconciled {} {status} entries:", summary.entries);
    println!("{:-<50}", "");
    println!("  Processed:  {}", summary.processed);
    println!("  Skipped:    {}", summary.skipped);
    println!("  Errors:     {}", summary.errors);
    println!("  Candidates: {} ({} admitted)", summary.candidates, summary.admitted);
    println!("  Fetched:    {}", summary.fetched);
    println!("  Queued:     {}", summary.queued);
    println!("  Duplicates: {}", summary.duplicates);
    println!("  Failed:     {}", summary.failed);

    Ok(())
}
