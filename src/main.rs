use rusqlite::Connection;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use pollbook::catalog::{Catalog, CatalogLoader, RejectedEntry};
use pollbook::persist::Persistor;
use pollbook::schema::TableDefinition;
use pollbook::settings::Settings;
use pollbook::{PollbookError, Result};

// pollbook [config-file] [--describe]
fn main() {
    let mut describe = false;
    let mut config_file = String::from("pollbook");
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--describe" => describe = true,
            other => config_file = other.to_string(),
        }
    }
    let settings = match Settings::load(&config_file) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run(&settings, describe) {
        error!(error = %e, "pollbook failed");
        std::process::exit(1);
    }
}

fn run(settings: &Settings, describe: bool) -> Result<()> {
    let catalog = match &settings.catalog {
        Some(path) => Catalog::from_json_file(path)?,
        None => Catalog::seed()?,
    };
    info!(surveys = catalog.len(), rejected = catalog.rejected().len(), "catalog loaded");
    if describe {
        for rejected in catalog.rejected() {
            let RejectedEntry { entry, title, error } = rejected;
            println!("-- entry {entry} '{title}' rejected: {error}");
        }
        for (catalog_index, survey) in catalog.iter() {
            let definition = TableDefinition::new(catalog_index, survey);
            match definition.and_then(|d| d.create_statement()) {
                Ok(statement) => println!("-- {}\n{statement};", survey.title()),
                Err(e) => println!("-- {}: {e}", survey.title()),
            }
        }
        return Ok(());
    }
    let connection = if settings.in_memory() {
        Connection::open_in_memory()?
    } else {
        Connection::open(&settings.database)?
    };
    info!(database = %settings.database, "database opened");
    let mut persistor = Persistor::new(&connection)?;
    let report = CatalogLoader::new(&mut persistor).install(&catalog)?;
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| PollbookError::Invariant(e.to_string()))?;
    println!("{json}");
    Ok(())
}
