use clap::Parser;
use resequencer::{
    config::{set_logger, ConfigArgs},
    harness,
};

fn main() -> anyhow::Result<()> {
    let args = ConfigArgs::parse();
    set_logger(args.log_level);
    let config = args.build()?;

    let report = harness::run(&config)?;
    println!(
        "delivered {} items in order ({} produced, {} overwritten) in {:.2?}",
        report.delivered.len(),
        report.produced,
        report.stats.overwritten,
        report.elapsed
    );
    Ok(())
}
