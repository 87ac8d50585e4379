//! MockPlug - CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use mockplug::{MockPlugConfig, MockRegistry, MockTransport, PlugRequest, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

const EXAMPLE_CONFIG: &str = r#"# Names excluded from request fingerprints
ignore:
  query_params: [authtoken, dream.out.format]
  headers: [X-Deki-Token]

settings:
  log_matches: true
  log_unmatched: true
  case_insensitive_headers: true
  unmatched: fail

mocks:
  - request:
      verb: GET
      uri: http://api.example.com/pages?id=5&view=full
      headers:
        X-Auth: tok1
    response:
      status: 200
      headers:
        Content-Type: application/json
      body:
        type: json
        content:
          title: Home
"#;

#[derive(Parser, Debug)]
#[command(
    name = "mockplug",
    about = "Deterministic HTTP request mocking registry - inspect fingerprints and probe mocks",
    version
)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mockplug.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,

    /// List the fingerprint of every configured mock
    #[arg(long)]
    fingerprints: bool,

    /// Look up a request (VERB URI) against the configured mocks
    #[arg(long, num_args = 2, value_names = ["VERB", "URI"])]
    probe: Option<Vec<String>>,

    /// Request header for --probe, as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    headers: Vec<String>,
}

fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header {:?} is not NAME:VALUE", raw))?;
    Ok((name.trim().to_string(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if args.print_config {
        println!("{}", EXAMPLE_CONFIG);
        return Ok(());
    }

    // Load configuration
    let config = if args.config.exists() {
        info!(path = ?args.config, "Loading configuration");
        MockPlugConfig::from_file(&args.config)?
    } else if args.validate || args.fingerprints || args.probe.is_some() {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        info!("Using default configuration (no mocks)");
        MockPlugConfig::default()
    };

    if args.validate {
        println!(
            "Configuration is valid ({} mocks defined)",
            config.mocks.len()
        );
        return Ok(());
    }

    let registry = Arc::new(MockRegistry::from_config(&config)?);

    if args.fingerprints {
        for mock in &config.mocks {
            let fingerprint =
                registry.fingerprint(&mock.request.verb, &mock.request.uri, &mock.request.headers)?;
            println!("{}  {} {}", fingerprint, mock.request.verb, mock.request.uri);
        }
        return Ok(());
    }

    if let Some(probe) = args.probe {
        let [verb, uri] = <[String; 2]>::try_from(probe)
            .map_err(|_| anyhow::anyhow!("--probe takes VERB and URI"))?;
        let mut request = PlugRequest::new(verb, uri);
        for raw in &args.headers {
            let (name, value) = parse_header(raw)?;
            request = request.with_header(name, value);
        }

        let transport = MockTransport::new(Arc::clone(&registry));
        let response = transport.invoke(&request).await?;
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    let stats = registry.stats();
    println!(
        "{} mocks registered; use --fingerprints or --probe to inspect them",
        stats.mocks_registered
    );

    Ok(())
}
