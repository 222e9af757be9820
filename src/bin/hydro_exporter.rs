// hydro_exporter - Prometheus metrics exporter for IMGW hydrological station status
//
// Copyright 2024 hydro_exporter contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use clap::Parser;
use hydro_exporter::client::HydroClient;
use hydro_exporter::http::{self, RequestContext};
use hydro_exporter::metrics::StationMetrics;
use hydro_exporter::poll::Poller;
use prometheus::Registry;
use reqwest::{Client, Url};
use std::error::Error;
use std::io;
use std::net::SocketAddr;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{self, SignalKind};
use tracing::Level;

const DEFAULT_LOG_LEVEL: Level = Level::INFO;
const DEFAULT_BIND_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 9782);
const DEFAULT_TIMEOUT_MILLIS: u64 = 5000;
const DEFAULT_API_URL: &str = "https://hydro-back.imgw.pl/station/hydro/status";

#[derive(Debug, Parser)]
#[clap(name = "hydro_exporter", version = clap::crate_version!())]
struct HydroExporterApplication {
    /// IMGW hydrological station IDs to fetch status for, comma separated
    #[clap(long, env = "STATION_ID", value_delimiter = ',', required = true)]
    stations: Vec<String>,

    /// URL of the IMGW station status endpoint
    #[clap(long, default_value_t = DEFAULT_API_URL.into())]
    api_url: String,

    /// Logging verbosity. Allowed values are 'trace', 'debug', 'info', 'warn', and 'error'
    /// (case insensitive)
    #[clap(long, default_value_t = DEFAULT_LOG_LEVEL)]
    log_level: Level,

    /// Timeout for fetching station status from the IMGW API, in milliseconds.
    #[clap(long, default_value_t = DEFAULT_TIMEOUT_MILLIS)]
    timeout_millis: u64,

    /// Address to bind to. By default, hydro_exporter will bind to public address since
    /// the purpose is to expose metrics to an external system (Prometheus or another
    /// agent for ingestion)
    #[clap(long, default_value_t = DEFAULT_BIND_ADDR.into())]
    bind: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let opts = HydroExporterApplication::parse();
    tracing::subscriber::set_global_default(
        tracing_subscriber::FmtSubscriber::builder()
            .with_max_level(opts.log_level)
            .finish(),
    )
    .expect("failed to set tracing subscriber");

    let stations: Vec<String> = opts
        .stations
        .iter()
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect();
    if stations.is_empty() {
        tracing::error!("no station IDs provided, set STATION_ID or pass --stations");
        process::exit(1);
    }

    let endpoint = Url::parse(&opts.api_url).unwrap_or_else(|e| {
        tracing::error!(message = "invalid API URL", url = %opts.api_url, error = %e);
        process::exit(1)
    });

    let timeout = Duration::from_millis(opts.timeout_millis);
    let http_client = Client::builder().timeout(timeout).build().unwrap_or_else(|e| {
        tracing::error!(message = "unable to initialize HTTP client", error = %e);
        process::exit(1)
    });

    let registry = Registry::new();
    let metrics = StationMetrics::new(&registry);
    let client = HydroClient::new(http_client, endpoint);
    let poller = Arc::new(Poller::new(client, stations, metrics));

    // Fetch once before the server comes up so the very first scrape
    // already sees station data instead of an empty registry.
    tracing::info!(message = "performing startup fetch", api_url = %opts.api_url);
    poller.fetch_cycle().await;

    let poll_task = tokio::spawn({
        let poller = Arc::clone(&poller);
        async move {
            tracing::info!("station status polling started");
            poller.run().await;
        }
    });

    let context = Arc::new(RequestContext::new(registry.clone()));
    let server = axum::Server::try_bind(&opts.bind)
        .unwrap_or_else(|e| {
            tracing::error!(message = "error binding to address", address = %opts.bind, error = %e);
            process::exit(1)
        })
        .serve(http::app(context).into_make_service())
        .with_graceful_shutdown(async {
            // Wait for either SIGTERM or SIGINT to shutdown
            tokio::select! {
                _ = sigterm() => {}
                _ = sigint() => {}
            }
        });

    tracing::info!(message = "server started", address = %opts.bind, api_url = %opts.api_url);
    server.await?;

    // The polling loop never exits on its own; cancel it and wait for the
    // cancellation to land so an in-flight cycle is not silently abandoned.
    poll_task.abort();
    let _ = poll_task.await;

    tracing::info!("server shutdown");
    Ok(())
}

/// Return after the first SIGTERM signal received by this process
async fn sigterm() -> io::Result<()> {
    unix::signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

/// Return after the first SIGINT signal received by this process
async fn sigint() -> io::Result<()> {
    unix::signal(SignalKind::interrupt())?.recv().await;
    Ok(())
}
