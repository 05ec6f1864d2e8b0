use crate::config::Config;
use std::path::Path;

pub fn cmd_init(path: &Path) -> anyhow::Result<()> {
    if Config::create_default_if_missing(path)? {
        println!("Wrote default config to {}", path.display());
        println!("Set anilist.username before the first run.");
    } else {
        println!("Config already exists at {}", path.display());
    }
    Ok(())
}
