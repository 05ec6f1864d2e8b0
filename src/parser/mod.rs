pub mod filename;

pub use filename::{ParseRejected, clean_title, normalize_title, parse_filename, parse_release};
