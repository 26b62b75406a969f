use std::time::Instant;

use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use metrics_web::instrumentation::BufferedVitalSource;
use metrics_web::{Telemetry, TelemetryConfig};

const DEFAULT_POKEMON_URL: &str = "https://pokeapi.co/api/v2/pokemon/pikachu";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let started = Instant::now();
    let config = TelemetryConfig::from_env();
    let telemetry = Telemetry::otlp(config)?;

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("metrics_web=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .with(telemetry.warning_layer())
        .init();
    telemetry.install_panic_hook();

    tracing::info!(
        collector = %telemetry.config().collector_url,
        service = %telemetry.config().service_name,
        interval_ms = telemetry.config().export_interval.as_millis() as u64,
        "metrics-web starting..."
    );
    telemetry.start().await?;

    // A headless host has no browser signals; the source stays empty until
    // something reports into it.
    let vitals = BufferedVitalSource::new();
    telemetry.start_web_vitals(&vitals);
    telemetry.app().record_page_load("/pokemon", started.elapsed());

    let pokemon = telemetry.component("pokemon", "PokemonComponent")?;
    let mut span = pokemon.mount();
    pokemon.track_visit();

    let url =
        std::env::var("METRICS_WEB_POKEMON_URL").unwrap_or_else(|_| DEFAULT_POKEMON_URL.into());
    let client = telemetry.http_client()?;
    match client.get_json::<serde_json::Value>(&url).await {
        Ok(body) => {
            let name = body.get("name").and_then(|n| n.as_str()).unwrap_or("?");
            tracing::info!(pokemon = name, "Pokemon loaded");
        }
        Err(e) => tracing::info!(error = %e, "Pokemon lookup failed"),
    }
    span.render_complete();

    tracing::info!("Running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    span.unmount();
    let outcome = telemetry.before_unload().await;
    tracing::info!(outcome = %outcome, "metrics-web stopped");

    Ok(())
}
