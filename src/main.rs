use async_trait::async_trait;
use clap::{Args, Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use wayfinder::config::Config;
use wayfinder::location::session::describe;
use wayfinder::location::{
    AcquireError, FixedSensor, IpSensor, ManualInput, ManualInputSource, PositionSensor, ProviderReconciler,
    ResolvedLocation, Session,
};
use wayfinder::range::{Candidate, DistanceRange};

/// Wayfinder: where am I, and what is near me?
///
/// Detects the current location, reverse geocodes it against several
/// providers and keeps the most trustworthy answer. Venue candidates can then
/// be filtered to a distance window around that location.
///
/// Examples:
///   wayfinder resolve
///   wayfinder resolve --lat 26.8467 --lng 80.9462 --accuracy 25 --topk 3
///   wayfinder resolve --city Lucknow --country IN
///   wayfinder filter --candidates venues.json --range 5-10
///   wayfinder serve --port 3000
#[derive(Parser)]
#[command(name = "wayfinder", version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr (overridden by RUST_LOG).
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Config file. Defaults to ~/.wayfinder/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve and print the current location.
    Resolve {
        #[command(flatten)]
        location: LocationArgs,

        /// Debug: show the top-K provider answers with scores.
        #[arg(long)]
        topk: Option<usize>,
    },
    /// Filter venue candidates by distance from the current location.
    Filter {
        #[command(flatten)]
        location: LocationArgs,

        /// JSON file holding an array of candidates (`-` for stdin).
        #[arg(long)]
        candidates: PathBuf,

        /// Distance window in km, e.g. "5-10".
        #[arg(long, short = 'r', default_value = "0-10")]
        range: DistanceRange,
    },
    /// Serve the HTTP API.
    Serve {
        #[command(flatten)]
        location: LocationArgs,

        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(long, short = 'p', default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Args)]
struct LocationArgs {
    /// Device latitude (-90 to 90). Without it the position comes from IP geolocation.
    #[arg(long, allow_hyphen_values = true, requires = "lng")]
    lat: Option<f64>,

    /// Device longitude (-180 to 180).
    #[arg(long, allow_hyphen_values = true, requires = "lat")]
    lng: Option<f64>,

    /// Reported accuracy radius of --lat/--lng in meters.
    #[arg(long)]
    accuracy: Option<f64>,

    /// Skip detection and use this city as a manual location.
    #[arg(long)]
    city: Option<String>,

    /// Country for --city (ISO code or name).
    #[arg(long)]
    country: Option<String>,

    /// Offline mode: no geocoding providers, no IP lookup.
    #[arg(long)]
    offline: bool,

    /// Ask for a location on stdin if detection fails.
    #[arg(long, short = 'i')]
    interactive: bool,
}

impl LocationArgs {
    fn manual_input(&self) -> Option<ManualInput> {
        self.city.as_ref().map(|city| ManualInput {
            city: Some(city.clone()),
            country: self.country.clone(),
            ..ManualInput::default()
        })
    }
}

/// Prompts on the terminal when automatic detection fails.
struct StdinPrompt;

#[async_trait]
impl ManualInputSource for StdinPrompt {
    async fn request_manual_input(&self, reason: &AcquireError) -> Option<ManualInput> {
        let reason = reason.to_string();
        tokio::task::spawn_blocking(move || {
            eprintln!("  Could not detect your location: {}", reason);
            eprint!("  Enter a city (empty to skip): ");
            io::stderr().flush().ok()?;
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line).ok()?;
            let city = line.trim();
            (!city.is_empty()).then(|| ManualInput::city(city))
        })
        .await
        .ok()
        .flatten()
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path).unwrap_or_else(|e| fail(e)),
        None => Config::load(),
    };

    match cli.command {
        Command::Resolve { location, topk } => {
            let session = build_session(&config, &location);
            let resolved = resolve(&session, &location).await.unwrap_or_else(|e| fail(e));
            print_banner(&resolved);

            if let Some(k) = topk {
                print_topk(&session, &resolved, k);
            }

            println!("{}", to_json(&*resolved));
        }
        Command::Filter { location, candidates, range } => {
            let candidates = read_candidates(&candidates).unwrap_or_else(|e| fail(e));
            let session = build_session(&config, &location);
            match resolve(&session, &location).await {
                Ok(resolved) => print_banner(&resolved),
                // Still list the candidates, just without distances.
                Err(e) => eprintln!("  Warning: {}", e),
            }

            let listing = session.candidates_near(&candidates, range);
            eprintln!("  {}", describe(&listing));
            println!("{}", to_json(&listing));
        }
        Command::Serve { location, host, port } => {
            let session = build_session(&config, &location);
            if let Some(input) = location.manual_input() {
                session.override_location(&input).await.unwrap_or_else(|e| fail(e));
            }
            if let Err(e) = wayfinder::server::start(&host, port, session).await {
                fail(format!("Server error on {}:{}: {}", host, port, e));
            }
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "wayfinder=debug" } else { "wayfinder=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn build_session(config: &Config, args: &LocationArgs) -> Session {
    let sensor: Arc<dyn PositionSensor> = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Arc::new(FixedSensor::new(lat, lng, args.accuracy)),
        _ if args.offline && args.city.is_none() => fail("Offline mode needs --lat/--lng or --city"),
        _ => Arc::new(IpSensor::new(config.user_agent.clone())),
    };

    let providers = if args.offline { Vec::new() } else { config.build_providers() };
    let reconciler = ProviderReconciler::new(providers, config.provider_timeout());

    let mut session = Session::new(sensor, reconciler)
        .with_acquire_options(config.acquisition.options())
        .with_fallback(config.fallback.clone());
    if args.interactive {
        session = session.with_manual_input(Arc::new(StdinPrompt));
    }
    session
}

async fn resolve(session: &Session, args: &LocationArgs) -> Result<Arc<ResolvedLocation>, String> {
    match args.manual_input() {
        Some(input) => session.override_location(&input).await.map_err(|e| e.to_string()),
        None => session.resolve_location().await.map_err(|e| e.to_string()),
    }
}

fn print_banner(resolved: &ResolvedLocation) {
    eprintln!("  {}", resolved.display_line());
    if resolved.is_degraded() && !resolved.is_manually_set {
        eprintln!("  \u{26A0}\u{FE0F}  No geocoding provider answered; showing coordinates only");
    }
}

fn print_topk(session: &Session, resolved: &ResolvedLocation, k: usize) {
    if resolved.is_manually_set {
        eprintln!("  (manual location, no provider answers to rank)");
        return;
    }
    let ranked = session.provider_answers();
    eprintln!("  Top {} provider answer(s):", k.min(ranked.len()));
    for (i, s) in ranked.iter().take(k).enumerate() {
        let issues = if s.issues.is_empty() { String::new() } else { format!("  {:?}", s.issues) };
        eprintln!(
            "  {}. [{:>3}] {:<10} {}{}",
            i + 1,
            s.confidence,
            s.address.source,
            s.address.label(),
            issues
        );
    }
}

fn read_candidates(path: &Path) -> Result<Vec<Candidate>, String> {
    let data = if path.as_os_str() == "-" {
        io::read_to_string(io::stdin()).map_err(|e| format!("Cannot read stdin: {}", e))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Cannot read {}: {}", path.display(), e))?
    };
    serde_json::from_str(&data).map_err(|e| format!("Invalid candidates in {}: {}", path.display(), e))
}

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| fail(format!("Cannot encode output: {}", e)))
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}
