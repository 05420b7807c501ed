use std::{error::Error, path::Path};

use clap::Parser;
use koboload::{config::JobConfig, db::prod_db::ProdDb};
use log::info;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod
    #[arg(short, long, default_value = "prod")]
    env: String,
}

/// Run this job whenever a fresh batch of survey responses should be
/// mirrored into Postgres.  The destination table is dropped and rebuilt,
/// so the table always matches the latest export.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())).unwrap();

    let config = JobConfig::from_env()?;
    let archive = ProdDb::ai_ethics_survey();

    let body = archive.download_export(&config.kobo)?;
    let export = archive.read_export(&body)?;

    let mut client = config.pg.connect()?;
    let mut tx = client.transaction()?;
    archive.setup(&mut tx)?;
    let count = archive.insert_records(&mut tx, &export.records)?;
    tx.commit()?;

    info!(
        "done; {} rows loaded, {} rows skipped, {} timestamps nulled",
        count, export.stats.skipped_rows, export.stats.null_timestamps
    );

    Ok(())
}
