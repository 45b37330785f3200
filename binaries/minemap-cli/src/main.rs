//! minemap CLI
//!
//! ```bash
//! minemap serve                         # PostGIS-backed server on 0.0.0.0:5000
//! minemap serve --memory --port 8080    # in-memory store, no database
//! minemap list --lat 43.71 --lng -79.37 --radius 5000 --power-source Hydro
//! minemap add --title "Site A" --description "..." --rate 0.05 --lat 43.71 --lng -79.37
//! minemap add --title "Site B" --description "..." --rate 0.07 --address "Toronto"
//! minemap geocode "Niagara Falls"
//! minemap watch                         # power=Solar / region=nyc / max-rate=0.08 on stdin
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use minemap_config::Config;
use minemap_core::{
    Listing, ListingQuery, ListingRecord, NewListing, COOLING_TYPES, POWER_SOURCES,
};
use minemap_postgis::{ListingStore, MemoryListingStore, PgListingStore};
use minemap_sync::{
    FilterState, HttpListingsApi, ListingsApi, NominatimClient, Phase, Region, SyncSnapshot,
};
use minemap_web::AppState;

#[derive(Parser)]
#[command(name = "minemap")]
#[command(about = "Geospatial mining-site listings: server, queries and live sync")]
#[command(version)]
struct Cli {
    /// Config file (default: <config_dir>/minemap/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        /// Keep listings in memory instead of PostGIS
        #[arg(long)]
        memory: bool,

        #[arg(long)]
        host: Option<String>,

        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Query listings from a running server
    List {
        #[arg(long, allow_hyphen_values = true)]
        lat: Option<String>,

        #[arg(long, allow_hyphen_values = true)]
        lng: Option<String>,

        /// Meters
        #[arg(long)]
        radius: Option<String>,

        #[arg(long, default_value = "all")]
        power_source: String,

        #[arg(long, default_value = "all")]
        cooling_type: String,

        /// $/kWh upper bound
        #[arg(long)]
        max_rate: Option<String>,

        /// Print raw records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a listing
    Add {
        #[arg(long)]
        title: String,

        #[arg(long)]
        description: String,

        /// $/kWh
        #[arg(long)]
        rate: f64,

        #[arg(long, allow_hyphen_values = true, requires = "lng", conflicts_with = "address")]
        lat: Option<f64>,

        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lng: Option<f64>,

        /// Resolve the location through the geocoder
        #[arg(long, required_unless_present = "lat")]
        address: Option<String>,

        #[arg(long)]
        power_source: Option<String>,

        #[arg(long)]
        cooling_type: Option<String>,
    },

    /// Look up an address
    Geocode {
        text: String,
    },

    /// Follow filter changes from stdin and print each synced result
    Watch,
}

fn init_tracing(config: &Config, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log.filter));

    if json || config.log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    init_tracing(&config, cli.log_json);

    match cli.command {
        Commands::Serve { memory, host, port } => cmd_serve(config, memory, host, port).await,
        Commands::List {
            lat,
            lng,
            radius,
            power_source,
            cooling_type,
            max_rate,
            json,
        } => {
            let query = ListingQuery {
                lat,
                lng,
                radius,
                power_source: Some(power_source),
                cooling_type: Some(cooling_type),
                max_rate,
            };
            cmd_list(&config, &query, json).await
        }
        Commands::Add {
            title,
            description,
            rate,
            lat,
            lng,
            address,
            power_source,
            cooling_type,
        } => {
            let (lng, lat) = match (lng, lat, address) {
                (Some(lng), Some(lat), _) => (lng, lat),
                (_, _, Some(address)) => {
                    let geocoder = geocoder(&config)?;
                    let Some((candidate, coordinate)) = geocoder.locate(&address).await? else {
                        bail!("no geocoding match for {address:?}");
                    };
                    println!("  Located: {}", candidate.display_name);
                    (coordinate.longitude, coordinate.latitude)
                }
                _ => bail!("either --lat/--lng or --address is required"),
            };
            let mut draft = NewListing::new(title, description, rate, lng, lat);
            draft.power_source = power_source;
            draft.cooling_type = cooling_type;
            cmd_add(&config, &draft).await
        }
        Commands::Geocode { text } => cmd_geocode(&config, &text).await,
        Commands::Watch => cmd_watch(&config).await,
    }
}

async fn cmd_serve(
    mut config: Config,
    memory: bool,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    let store: Arc<dyn ListingStore> = if memory {
        Arc::new(MemoryListingStore::new())
    } else {
        let store = PgListingStore::connect(&config.database.url, config.database.max_connections)
            .await
            .context("connecting to the listings database")?;
        if config.database.init_schema {
            store.ensure_schema().await?;
        }
        Arc::new(store)
    };

    let state = Arc::new(AppState::new(store));
    minemap_web::serve(state, &config.server.bind_addr()).await?;
    Ok(())
}

async fn cmd_list(config: &Config, query: &ListingQuery, json: bool) -> Result<()> {
    let api = HttpListingsApi::new(&config.client.api_url)?;
    let records = api.fetch(query).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let listings = decode_all(records);
    println!("\n  {} LISTING(S)", listings.len());
    println!("  ============");
    for listing in &listings {
        print_listing(listing);
    }
    Ok(())
}

async fn cmd_add(config: &Config, draft: &NewListing) -> Result<()> {
    let api = HttpListingsApi::new(&config.client.api_url)?;
    let record = api.create(draft).await?;
    let listing = Listing::try_from(record)?;
    println!("\n  Created listing #{}", listing.id);
    print_listing(&listing);
    Ok(())
}

async fn cmd_geocode(config: &Config, text: &str) -> Result<()> {
    let candidates = geocoder(config)?.search(text).await?;
    if candidates.is_empty() {
        println!("  No matches for {text:?}");
    }
    for candidate in candidates {
        println!("  [{}] {}", candidate.place_id, candidate.display_name);
        match candidate.coordinate() {
            Ok(c) => println!("      lat {}  lng {}", c.latitude, c.longitude),
            Err(e) => println!("      unusable coordinate: {e}"),
        }
    }
    Ok(())
}

async fn cmd_watch(config: &Config) -> Result<()> {
    let api = Arc::new(HttpListingsApi::new(&config.client.api_url)?);
    let handle = minemap_sync::spawn(api, Duration::from_millis(config.client.debounce_ms));

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let snapshot = updates.borrow_and_update().clone();
            print_snapshot(&snapshot);
        }
    });

    println!("  Filters: region=all|nyc|<lat>,<lng>,<radius>");
    println!("           power={}|all", POWER_SOURCES.join("|"));
    println!("           cooling={}|all", COOLING_TYPES.join("|"));
    println!("           max-rate=<$/kWh>|none   (Ctrl-D to quit)");

    let mut filters = FilterState::default();
    handle.set_filters(filters.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match apply_filter_line(&mut filters, &line) {
            Ok(()) => handle.set_filters(filters.clone())?,
            Err(e) => eprintln!("  {e}"),
        }
    }

    handle.shutdown().await;
    printer.abort();
    Ok(())
}

/// `key=value` edit of the current filters
fn apply_filter_line(filters: &mut FilterState, line: &str) -> Result<()> {
    let Some((key, value)) = line.split_once('=') else {
        bail!("expected key=value, got {line:?}");
    };
    let value = value.trim();

    match key.trim() {
        "power" | "power-source" => filters.power_source = value.to_string(),
        "cooling" | "cooling-type" => filters.cooling_type = value.to_string(),
        "max-rate" | "maxRate" => {
            filters.max_rate = match value {
                "" | "none" => None,
                v => Some(v.parse().with_context(|| format!("bad rate {v:?}"))?),
            }
        }
        "region" => {
            filters.region = match value {
                "all" => Region::All,
                "nyc" => Region::new_york(),
                custom => {
                    let parts: Vec<f64> = custom
                        .split(',')
                        .map(|p| p.trim().parse::<f64>())
                        .collect::<std::result::Result<_, _>>()
                        .with_context(|| format!("bad region {custom:?}"))?;
                    let [latitude, longitude, radius_meters] = parts[..] else {
                        bail!("region needs <lat>,<lng>,<radius>");
                    };
                    Region::Around {
                        latitude,
                        longitude,
                        radius_meters,
                    }
                }
            }
        }
        other => bail!("unknown filter {other:?}"),
    }
    Ok(())
}

fn geocoder(config: &Config) -> Result<NominatimClient> {
    Ok(NominatimClient::new(
        &config.client.geocoder_url,
        &config.client.user_agent,
    )?)
}

fn decode_all(records: Vec<ListingRecord>) -> Vec<Listing> {
    records
        .into_iter()
        .filter_map(|record| {
            let id = record.id;
            Listing::try_from(record)
                .inspect_err(|e| tracing::warn!(id, error = %e, "skipping listing"))
                .ok()
        })
        .collect()
}

fn print_listing(listing: &Listing) {
    println!(
        "  #{:<4} {}  [{} / {}]  ${}/kWh  @ {}",
        listing.id,
        listing.title,
        listing.power_source,
        listing.cooling_type,
        listing.electricity_rate,
        listing.location
    );
    if !listing.description.is_empty() {
        println!("        {}", listing.description);
    }
}

fn print_snapshot(snapshot: &SyncSnapshot) {
    match snapshot.phase {
        Phase::PendingFetch { .. } => {
            println!("  [{}] waiting for input to settle", snapshot.phase.name())
        }
        Phase::Fetching { generation } => {
            println!("  [{}] request #{generation}", snapshot.phase.name())
        }
        Phase::Idle => {
            if let Some(error) = &snapshot.last_error {
                println!("  ! {error} (showing previous results)");
            }
            println!("\n  {} LISTING(S)", snapshot.listings.len());
            for listing in &snapshot.listings {
                print_listing(listing);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_lines() {
        let mut filters = FilterState::default();

        apply_filter_line(&mut filters, "power=Solar").unwrap();
        apply_filter_line(&mut filters, " cooling = Air ").unwrap();
        apply_filter_line(&mut filters, "max-rate=0.08").unwrap();
        assert_eq!(filters.power_source, "Solar");
        assert_eq!(filters.cooling_type, "Air");
        assert_eq!(filters.max_rate, Some(0.08));

        apply_filter_line(&mut filters, "region=nyc").unwrap();
        assert_eq!(filters.region, Region::new_york());

        apply_filter_line(&mut filters, "region=43.71,-79.37,2500").unwrap();
        assert_eq!(
            filters.region,
            Region::Around {
                latitude: 43.71,
                longitude: -79.37,
                radius_meters: 2500.0
            }
        );

        apply_filter_line(&mut filters, "max-rate=none").unwrap();
        assert_eq!(filters.max_rate, None);
    }

    #[test]
    fn test_bad_filter_lines() {
        let mut filters = FilterState::default();
        assert!(apply_filter_line(&mut filters, "power").is_err());
        assert!(apply_filter_line(&mut filters, "colour=red").is_err());
        assert!(apply_filter_line(&mut filters, "region=1,2").is_err());
        assert!(apply_filter_line(&mut filters, "max-rate=cheap").is_err());
        assert_eq!(filters, FilterState::default());
    }
}
