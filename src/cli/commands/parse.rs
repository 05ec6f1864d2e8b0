use crate::parser::parse_release;

pub fn cmd_parse(name: &str) {
    match parse_release(name) {
        Ok(info) => {
            println!("Accepted: {name}");
            println!("{:-<50}", "");
            println!("  Title:      {}", info.anime_title);
            println!("  Episode:    {}", info.episode_number);
            if let Some(season) = info.season_number {
                println!("  Season:     {season}");
            }
            println!("  Group:      {}", info.release_group.as_deref().unwrap_or("Unknown"));
            println!("  Resolution: {}", info.resolution.as_deref().unwrap_or("Unknown"));
        }
        Err(reason) => println!("Rejected: {name} ({reason})"),
    }
}
