//! Warden Gateway Binary
//!
//! Standalone trust sidecar for a single wrapped agent.
//!
//! # Usage
//! ```bash
//! warden-gateway [--port 18620] [--host 127.0.0.1] [--upstream http://127.0.0.1:9000] [--verbose]
//! ```

use clap::Parser;
use warden_gateway::{Gateway, GatewayConfig};

/// Warden Gateway - Admission Control for Autonomous Agents
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Address of the wrapped agent
    #[arg(short, long)]
    upstream: Option<String>,

    /// Identity of the wrapped agent
    #[arg(long)]
    agent_id: Option<String>,

    /// Directory for per-trace audit segments
    #[arg(long)]
    trace_dir: Option<String>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Pick up WARDEN_* variables from a local .env, if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_target(false)
            .init();
    }

    // Environment first, command-line flags on top
    let mut config = GatewayConfig::from_env()?;
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    if let Some(host) = args.host {
        config = config.with_host(host);
    }
    if let Some(upstream) = args.upstream {
        config = config.with_upstream(upstream);
    }
    if let Some(agent_id) = args.agent_id {
        config = config.with_agent_id(agent_id);
    }
    if let Some(trace_dir) = args.trace_dir {
        config = config.with_trace_dir(trace_dir);
    }

    print_banner(&config);

    let gateway = Gateway::new(config)?;
    gateway.start().await?;

    Ok(())
}

fn print_banner(config: &GatewayConfig) {
    println!();
    println!("╔═══════════════════════════════════════════════════════════════╗");
    println!("║                                                               ║");
    println!("║              WARDEN GATEWAY — TRUST SIDECAR                   ║");
    println!("║                                                               ║");
    println!("║        Admission Control for Autonomous Agents                ║");
    println!("║                                                               ║");
    println!("╚═══════════════════════════════════════════════════════════════╝");
    println!();
    println!("🛡  Proxy");
    println!("   └─ http://{}:{} → {}", config.host, config.port, config.upstream_url);
    println!();
    println!("🔗 HTTP Endpoints");
    println!("   ├─ GET  /.well-known/agent-manifest — Capability manifest");
    println!("   ├─ GET  /health                     — Health check");
    println!("   ├─ POST /proxy                      — Mediated agent call");
    println!("   ├─ GET  /trace/:id                  — Audit trail for a trace");
    println!("   └─ GET  /quarantine/:id             — Override session lookup");
    println!();
    println!("─────────────────────────────────────────────────────────────────");
    println!("Press Ctrl+C to stop the gateway");
    println!();
}
