mod config;
mod shell;
mod terminal;
mod utils;

use crate::shell::Shell;
use anyhow::Result;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    dotenv::dotenv().ok();

    let status = {
        let mut shell = Shell::new()?;
        shell.run()?
    };

    std::process::exit(status);
}
