mod check;
mod history;
mod init;
mod parse;
mod run;

pub use check::cmd_check;
pub use history::cmd_history;
pub use init::cmd_init;
pub use parse::cmd_parse;
pub use run::cmd_run;
