use std::sync::Arc;

use chrono::NaiveDate;
use tracing::info;
use tracing_subscriber::EnvFilter;

use requery::resolve::MemoryDataset;
use requery::server::{EngineContext, router};
use requery::store::{PersistenceMode, QueryRecordStore};

/// Settings come from an optional `requery.toml` next to the binary plus
/// `REQUERY_*` environment overrides.
fn settings() -> (PersistenceMode, String) {
    let defaults = (PersistenceMode::InMemory, "127.0.0.1:8080".to_string());
    let Ok(settings) = config::Config::builder()
        .add_source(config::File::with_name("requery").required(false))
        .add_source(config::Environment::with_prefix("REQUERY"))
        .build()
    else {
        return defaults;
    };
    let mode = match settings.get_string("database") {
        Ok(path) if !path.is_empty() => PersistenceMode::File(path),
        _ => PersistenceMode::InMemory,
    };
    let listen = settings.get_string("listen").unwrap_or(defaults.1);
    (mode, listen)
}

fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// A small corpus to serve when no real backing data is wired up.
fn demo_dataset() -> MemoryDataset {
    let mut data = MemoryDataset::new();
    let alice = data.add_user("alice");
    let bob = data.add_user("bob");
    let meadow = data.add_location("Albion meadow", alice);
    let forest = data.add_location("Gualala forest", bob);
    let campestris = data.add_name("Agaricus campestris", alice);
    let comatus = data.add_name("Coprinus comatus", alice);
    let first = data.add_observation(
        date(2024, 9, 14),
        alice,
        Some(campestris),
        Some(meadow),
        "fairy ring by the fence",
    );
    let second = data.add_observation(
        date(2024, 10, 2),
        bob,
        Some(comatus),
        Some(forest),
        "shaggy caps after rain",
    );
    for notes in ["cap detail", "gill detail"] {
        let image = data.add_image(alice, notes);
        data.attach_image(first, image);
    }
    let lone = data.add_image(bob, "in the grass");
    data.attach_image(second, lone);
    data.add_comment(bob, first, "nice ring!");
    data
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let (mode, listen) = settings();
    info!(?mode, %listen, "starting requery");
    let store = QueryRecordStore::new(mode)?;
    let context = Arc::new(EngineContext {
        store,
        dataset: demo_dataset(),
    });
    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, router(context)).await?;
    Ok(())
}
