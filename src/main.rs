mod cli;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};

use fv_av::{DurationProbe, FfprobeTimingProbe, ToolRegistry};
use fv_core::config::Config;
use fv_core::Container;
use fv_media::{FdRegistry, PathResolver};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "filmvault=trace,fv_server=trace,fv_media=trace,fv_av=trace,fv_db=debug,fv_core=debug,tower_http=debug".to_string()
        } else {
            "filmvault=info,fv_server=info,fv_media=info,fv_av=info,fv_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Probe { file, json } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(probe_file(&file, json, cli.config.as_deref()))
        }
        Commands::Resolve { base_dir, name } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(resolve_file(&base_dir, &name, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("filmvault {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!("Starting filmvault");
    fv_server::start(config, config_path.map(Path::to_path_buf)).await?;
    Ok(())
}

async fn probe_file(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    if !file.exists() {
        anyhow::bail!("File does not exist: {:?}", file);
    }

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let ffprobe = tools.require("ffprobe")?.path.clone();
    let probe = FfprobeTimingProbe::new(
        ffprobe,
        Duration::from_secs(config.streaming.probe_timeout_secs),
    );
    let timing = probe.probe(file).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timing)?);
    } else {
        let secs = timing.duration_secs as u64;
        println!("File: {}", file.display());
        println!(
            "Duration: {:02}:{:02}:{:02} ({:.3}s)",
            secs / 3600,
            (secs / 60) % 60,
            secs % 60,
            timing.duration_secs
        );
        println!(
            "Video codec: {}",
            timing.video_codec.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn resolve_file(base_dir: &Path, name: &str, config_path: Option<&Path>) -> Result<()> {
    let config = Config::load_or_default(config_path);
    let registry = FdRegistry::new();
    let resolver = PathResolver::new(Arc::clone(&registry), config.streaming.strict_mime);

    let asset = resolver
        .resolve(name, base_dir, &Container::ALL)
        .await
        .with_context(|| format!("resolving {name:?} in {}", base_dir.display()))?;

    println!("Path: {}", asset.canonical_path.display());
    println!("Container: {}", asset.container);
    println!(
        "Detected MIME: {}",
        asset.detected_mime.as_deref().unwrap_or("(undetected)")
    );
    println!("Size: {} bytes", asset.size());
    println!("Engine: {:?}", asset.container.dispatch());
    Ok(())
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools);
    let mut all_ok = true;

    for tool in tools.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
        Ok(())
    } else {
        anyhow::bail!("Some required tools are missing; transcoding will not work")
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("reading {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!(
        "  Catalog: {:?} at {}",
        config.catalog.source,
        config.catalog.path.display()
    );
    println!(
        "  Sibling dir: {}",
        config.streaming.sibling_dir.display()
    );
    println!("  Strict MIME: {}", config.streaming.strict_mime);

    let warnings = config.validate();
    for warning in &warnings {
        println!("  ! {warning}");
    }
    Ok(())
}
