//! Agent session server — end-to-end stepwire-web binary.
//!
//! Serves the WebSocket endpoint and monitoring routes backed by the demo
//! agent loop, so clients can be developed without model credentials.
//!
//! # Usage
//!
//! ```bash
//! cargo run -p stepwire-web
//! cargo run -p stepwire-web -- --port 8080 --debug
//! PORT=8080 cargo run -p stepwire-web -- --input-timeout-secs 0
//! ```
//!
//! Then connect a WebSocket client (e.g. `wscat -c ws://localhost:5000/ws`)
//! and send:
//! ```json
//! {"type": "run_agent", "instruction": "Draft release notes", "max_steps": 6, "auto_continue": 1}
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use stepwire::prelude::*;
use stepwire_web::{DemoLoopFactory, WebEmitter, server};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Agent session server.
#[derive(Parser)]
#[command(about = "WebSocket server for step-driven agent sessions")]
struct Args {
    /// Host to bind.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind.
    #[arg(long, env = "PORT", default_value_t = stepwire_web::DEFAULT_PORT)]
    port: u16,

    /// Verbose logging and per-event log lines.
    #[arg(long)]
    debug: bool,

    /// Root directory for per-session output directories.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Seconds a run may wait for user input before it is stopped (0 = forever).
    #[arg(long, default_value_t = 300)]
    input_timeout_secs: u64,

    /// Upper bound on a single run's wall-clock time, in seconds.
    #[arg(long)]
    max_run_secs: Option<u64>,

    /// Milliseconds the demo loop sleeps before each step.
    #[arg(long, default_value_t = 500)]
    step_delay_ms: u64,

    /// Serve a static client bundle from this directory.
    #[arg(long)]
    static_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), String> {
    let args = Args::parse();

    // 1. Logging.
    let default_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // 2. Load the agent core.
    let mut factory = DemoLoopFactory::new();
    if args.step_delay_ms > 0 {
        factory = factory.with_step_delay(Duration::from_millis(args.step_delay_ms));
    }
    let core = CoreLoader::new(factory)
        .with_api_provider("demo")
        .with_default_model("demo-loop")
        .with_tools(["write_file"])
        .load()
        .map_err(|e| e.to_string())?;

    // 3. Compose emitters: WebSocket routing + optional event logging.
    let web = Arc::new(WebEmitter::new());
    let emitter = CompositeEmitter::new()
        .with(Arc::clone(&web))
        .with_if(args.debug, LoggingEmitter);

    // 4. Session registry.
    let input_timeout = (args.input_timeout_secs > 0)
        .then(|| Duration::from_secs(args.input_timeout_secs));
    let mut limits = SessionLimits::default().with_input_timeout(input_timeout);
    if let Some(secs) = args.max_run_secs {
        limits = limits.with_max_run_duration(Some(Duration::from_secs(secs)));
    }
    let config = RegistryConfig::default()
        .with_output_root(args.output_dir)
        .with_limits(limits);
    let registry = Arc::new(SessionRegistry::new(core, Arc::new(emitter), config));

    // 5. Serve until Ctrl-C, then stop every session.
    let bind_addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .map_err(|e| format!("Invalid bind address: {e}"))?;
    let router = server::build_router(registry.clone(), web, args.static_dir, true);
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutting down");
    };
    server::serve_until(router, bind_addr, shutdown, |addr| {
        println!("WebSocket: ws://{addr}/ws");
        println!("Health:    http://{addr}/health");
    })
    .await
    .map_err(|e| e.to_string())?;

    registry.shutdown().await;
    Ok(())
}
