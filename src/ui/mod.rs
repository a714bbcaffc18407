// Wed Jan 15 2026 - Alex

pub mod args;
pub mod display;
pub mod handler;
pub mod table;

pub use args::{Args, RebindSpec};
pub use display::DisplayRenderer;
pub use handler::CommandHandler;
pub use table::TableBuilder;

use clap::Parser;

pub fn parse_args() -> Args {
    Args::parse()
}

pub fn run() -> anyhow::Result<()> {
    let args = parse_args();
    CommandHandler::new().execute(args)
}
