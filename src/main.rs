mod buffer;
mod classifier;
mod cli;
mod config;
mod database;
mod error;
mod landmarks;
mod logging;
mod pipeline;
mod reducer;
mod report;
mod sample;
mod trigger;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
