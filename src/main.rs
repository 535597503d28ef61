use anyhow::Context;
use clap::{Arg, ArgMatches, Command};
use docverify::api::{create_router, AppState};
use docverify::audit::{DecisionAuditRecorder, DEFAULT_PAGE_SIZE};
use docverify::extraction::upscaler::HttpUpscaler;
use docverify::extraction::vlm_client::VlmClient;
use docverify::extraction::{ExtractionOrchestrator, MediaType};
use docverify::lifecycle::RequestLifecycleManager;
use docverify::statistics::print_report;
use docverify::validation::{messages, DocumentKind, ValidationEngine};
use docverify::{Config, SqliteStore};
use log::LevelFilter;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let matches = Command::new("docverify")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Identity document verification pipeline with an officer decision audit trail")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/etc/docverify.yaml"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .value_name("FILE")
                .help("Generate a default configuration file")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("test-config")
                .long("test-config")
                .help("Validate the configuration and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stats")
                .long("stats")
                .help("Show verification and decision statistics")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("audit-logs")
                .long("audit-logs")
                .help("Print the most recent audit log entries")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verify-image")
                .long("verify-image")
                .value_name("FILE")
                .help("Run the verification pipeline on an image file and print the report")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("hint")
                .long("hint")
                .value_name("TYPE")
                .help("Document type hint for --verify-image")
                .requires("verify-image")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("upscale")
                .long("upscale")
                .help("Enhance the image 4x before --verify-image")
                .requires("verify-image")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("validate-id")
                .long("validate-id")
                .value_names(["TYPE", "NUMBER"])
                .num_args(2)
                .help("Check an identifier against the rules for a document type")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("purge-older-than")
                .long("purge-older-than")
                .value_name("DAYS")
                .help("Delete finished requests older than DAYS; audit entries are kept")
                .value_parser(clap::value_parser!(u32))
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("remove-officer")
                .long("remove-officer")
                .value_name("ID")
                .help("Delete an officer profile; their audit entries are kept")
                .action(clap::ArgAction::Set),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    if let Some(generate_path) = matches.get_one::<String>("generate-config") {
        generate_default_config(generate_path);
        return;
    }

    let config_path = matches
        .get_one::<String>("config")
        .map(String::as_str)
        .unwrap_or("/etc/docverify.yaml");
    let config_found = std::path::Path::new(config_path).exists();

    let config = match load_config(config_path, config_found) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            process::exit(1);
        }
    };

    // Initialize logger: --verbose wins over the configured level
    let log_level = if matches.get_flag("verbose") {
        LevelFilter::Debug
    } else {
        config
            .logging
            .as_ref()
            .and_then(|logging| logging.level.parse().ok())
            .unwrap_or(LevelFilter::Info)
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    if !config_found {
        log::warn!("Configuration file '{config_path}' not found, using default configuration");
    }

    if let Err(e) = run(&matches, config).await {
        eprintln!("❌ {e:#}");
        process::exit(1);
    }
}

async fn run(matches: &ArgMatches, config: Config) -> anyhow::Result<()> {
    if matches.get_flag("test-config") {
        return test_config(&config);
    }

    if let Some(mut values) = matches.get_many::<String>("validate-id") {
        let (Some(kind), Some(number)) = (values.next(), values.next()) else {
            anyhow::bail!("--validate-id needs TYPE and NUMBER");
        };
        return validate_id(kind, number);
    }

    if matches.get_flag("stats") {
        let store = open_store(&config)?;
        print_report(&store.statistics()?);
        return Ok(());
    }

    if matches.get_flag("audit-logs") {
        let store = Arc::new(open_store(&config)?);
        let page = DecisionAuditRecorder::new(store).list(1, DEFAULT_PAGE_SIZE)?;
        println!("📋 Audit log ({} entries total, newest first)", page.total);
        println!("═══════════════════════════════════════");
        for log in &page.logs {
            println!(
                "{}  {:<7} {:<8} by {:<12} {:>8} ms  {}{}",
                log.created_at.format("%Y-%m-%d %H:%M:%S"),
                log.officer_decision,
                log.document_type.as_deref().unwrap_or("-"),
                log.officer_id.as_deref().unwrap_or("(removed)"),
                log.latency_ms,
                if log.was_overridden { "OVERRIDE: " } else { "" },
                log.override_reason.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    if let Some(days) = matches.get_one::<u32>("purge-older-than") {
        let store = open_store(&config)?;
        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(*days));
        let removed = store.purge_requests_before(cutoff)?;
        println!("✅ Purged {removed} finished request(s) created before {cutoff}");
        return Ok(());
    }

    if let Some(officer_id) = matches.get_one::<String>("remove-officer") {
        let store = open_store(&config)?;
        if store.remove_officer(officer_id)? {
            println!("✅ Removed officer {officer_id}");
        } else {
            println!("Officer {officer_id} not found");
        }
        return Ok(());
    }

    if let Some(image_path) = matches.get_one::<String>("verify-image") {
        return verify_image(
            &config,
            image_path,
            matches.get_one::<String>("hint").map(String::as_str),
            matches.get_flag("upscale"),
        )
        .await;
    }

    serve(config).await
}

fn load_config(path: &str, found: bool) -> anyhow::Result<Config> {
    if found {
        Config::from_file(path)
    } else {
        let mut config = Config::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

fn generate_default_config(path: &str) {
    let config = Config::default();
    match config.to_file(path) {
        Ok(()) => {
            println!("Default configuration written to: {path}");
            println!("Please edit the configuration file to suit your needs.");
        }
        Err(e) => {
            eprintln!("Error writing configuration file: {e}");
            process::exit(1);
        }
    }
}

fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.storage.database_path).with_context(|| {
        format!(
            "Failed to open database: {}",
            config.storage.database_path
        )
    })
}

fn test_config(config: &Config) -> anyhow::Result<()> {
    println!("🔍 Testing configuration...");
    println!();
    println!("Bind address: {}", config.server.bind_address);
    println!("Database: {}", config.storage.database_path);
    println!(
        "Extraction: {} ({}), {} attempt(s), window {}",
        config.extraction.endpoint,
        config.extraction.model,
        config.extraction.max_attempts,
        config.extraction.max_in_flight
    );
    println!(
        "Upscale: {}, window {}",
        config.upscale.endpoint, config.upscale.max_in_flight
    );
    println!(
        "Thresholds: approve {:.2}, low {:.2}, very low {:.2}",
        config.thresholds.approve_confidence,
        config.thresholds.low_confidence,
        config.thresholds.very_low_confidence
    );
    println!("Officers: {}", config.officers.len());
    if config.extraction.api_key.is_none() {
        println!("⚠️  No extraction API key set (see DOCVERIFY_VLM_API_KEY)");
    }
    println!();

    config.validate()?;
    println!("✅ Configuration is valid");
    Ok(())
}

fn validate_id(kind: &str, number: &str) -> anyhow::Result<()> {
    let Some(kind) = DocumentKind::parse(kind) else {
        anyhow::bail!("unsupported document type: {kind}");
    };
    let issues = ValidationEngine::new().validate_identifier(kind, number);
    if issues.is_empty() {
        println!("✅ {} number {} is valid", kind.as_str(), number);
    } else {
        println!("❌ {} number {} is invalid:", kind.as_str(), number);
        for message in messages(&issues) {
            println!("   - {message}");
        }
    }
    Ok(())
}

fn media_type_for(path: &str) -> &'static str {
    let lower = path.to_lowercase();
    if lower.ends_with(".png") {
        "image/png"
    } else if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else {
        "application/octet-stream"
    }
}

async fn verify_image(
    config: &Config,
    image_path: &str,
    hint: Option<&str>,
    upscale: bool,
) -> anyhow::Result<()> {
    let mut image = std::fs::read(image_path)
        .with_context(|| format!("Failed to read image: {image_path}"))?;
    let mime = media_type_for(image_path);

    let store = Arc::new(open_store(config)?);
    let orchestrator = Arc::new(ExtractionOrchestrator::new(
        Arc::new(VlmClient::from_config(&config.extraction)?),
        Arc::new(HttpUpscaler::from_config(&config.upscale)?),
        config,
    ));

    if upscale {
        let media_type = MediaType::parse(mime)?;
        image = orchestrator.upscale(&image, media_type).await?;
        println!("🔎 Upscaled image to {} bytes", image.len());
    }

    let lifecycle = RequestLifecycleManager::new(store, orchestrator, config);
    let report = lifecycle.process(&image, mime, hint).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn serve(config: Config) -> anyhow::Result<()> {
    config.validate().context("Invalid configuration")?;

    let store = Arc::new(open_store(&config)?);
    let state = AppState::build(
        &config,
        store,
        Arc::new(VlmClient::from_config(&config.extraction)?),
        Arc::new(HttpUpscaler::from_config(&config.upscale)?),
    )?;
    let app = create_router(state, config.server.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    log::info!("🚀 docverify listening on http://{}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Shutdown signal received, draining in-flight requests");
            }
        })
        .await?;
    Ok(())
}
