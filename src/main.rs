mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};

use soundpress_av::{FfmpegTranscoder, ToolRegistry};
use soundpress_core::config::Config;
use soundpress_server::{build_router, AppContext};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG if set, otherwise pick defaults based on the
    // verbose flag.
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "soundpress=trace,soundpress_server=trace,soundpress_av=trace,tower_http=debug"
                .to_string()
        } else {
            "soundpress=debug,soundpress_server=debug,soundpress_av=debug,tower_http=info"
                .to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("soundpress {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn serve(host: String, port: u16, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = Config::load_or_default(config_path)?;

    // CLI overrides config file.
    config.server.host = host;
    config.server.port = port;

    for warning in config.validate() {
        tracing::warn!("config: {warning}");
    }

    tokio::fs::create_dir_all(&config.jobs.upload_dir).await?;

    let tools = Arc::new(ToolRegistry::discover(&config.tools));
    if !tools.is_available("ffmpeg") {
        tracing::warn!("ffmpeg not found; jobs will fail until it is installed");
    }

    let config = Arc::new(config);
    let transcoder = Arc::new(FfmpegTranscoder::new(Arc::clone(&tools)));
    let ctx = AppContext::new(Arc::clone(&config), transcoder, tools);

    let reclaim_handle = ctx.store.spawn_reclaim_task(
        config.jobs.reclaim_interval(),
        config.jobs.retention(),
        ctx.shutdown.clone(),
    );

    let app = build_router(ctx.clone());

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("soundpress listening on {addr}");

    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        })
        .await?;

    ctx.shutdown.cancel();
    let _ = reclaim_handle.await;
    tracing::info!("soundpress stopped");

    Ok(())
}

fn check_tools(config_path: Option<&std::path::Path>) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    let registry = ToolRegistry::discover(&config.tools);

    println!("Checking external tools...\n");

    let mut all_ok = true;
    for tool in registry.check_all() {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);
        if let Some(ref version) = tool.version {
            print!(" ({version})");
        }
        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }
        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. Install ffmpeg to enable compression.");
    }

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {p:?}");
            Config::load(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Max upload: {} MB", config.server.max_upload_mb);
    println!("  Upload dir: {}", config.jobs.upload_dir.display());
    println!("  Max concurrent jobs: {}", config.jobs.max_concurrent);
    println!("  Retention: {}s", config.jobs.retention_secs);

    let warnings = config.validate();
    if warnings.is_empty() {
        println!("  No warnings");
    } else {
        for warning in warnings {
            println!("  Warning: {warning}");
        }
    }

    Ok(())
}
