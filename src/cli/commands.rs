//! CLI command implementations.

use std::path::Path;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::driver::Driver;
use crate::error::DbResult;
use crate::observability::Logger;

use super::args::Command;

/// Dispatch a parsed CLI command
pub fn run_command(command: Command) -> DbResult<()> {
    match command {
        Command::Serve { config } => serve(&config),
        Command::Demo { config } => demo(&config),
    }
}

fn load_config(path: &Path) -> DbResult<Config> {
    let config = if path.exists() {
        Config::load_from(path)?
    } else {
        Config::from_env()
    };
    config.validate()?;
    Ok(config)
}

/// Open the database and keep serving until ctrl-c
fn serve(config_path: &Path) -> DbResult<()> {
    let config = load_config(config_path)?;
    let driver = Driver::open(config)?;

    let signals = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| crate::error::DbError::io("building signal runtime", e))?;
    signals.block_on(async {
        let _ = tokio::signal::ctrl_c().await;
    });

    Logger::info("DB_SHUTDOWN", &[]);
    driver.shutdown();
    Ok(())
}

#[derive(Debug, Serialize, Deserialize)]
struct DemoObject {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Number")]
    number: f64,
}

/// Write two documents and query one back, timing the round trip
fn demo(config_path: &Path) -> DbResult<()> {
    let config = load_config(config_path)?;
    let driver = Driver::open(config)?;
    let started = Instant::now();

    let test = driver.collection("Test");
    test.add(&DemoObject {
        name: "test1".to_string(),
        number: 1.0,
    })?;
    test.add(&DemoObject {
        name: "test2".to_string(),
        number: 2.0,
    })?;

    let matches = test.where_field("Name", "==", "test1").documents()?;
    for doc in &matches {
        let object: DemoObject = doc.data_to()?;
        println!("{} -> {} ({})", doc.id, object.name, object.number);
    }

    println!("{} match(es) in {:?}", matches.len(), started.elapsed());
    driver.shutdown();
    Ok(())
}
