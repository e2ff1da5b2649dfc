//! Skinspect Proxy - item inspection service.
//!
//! ## Quick Start
//!
//! ```bash
//! # Two gateway logins, on-disk store
//! SKINSPECT_SESSIONS="bot1=http://10.0.0.5:3000,bot2=http://10.0.0.6:3000" \
//!     skinspect-proxy --port 8000 --database skinspect.db
//!
//! curl "http://localhost:8000/?url=steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20S76561198084749846A698323590D7935523998312483177"
//! ```

use clap::Parser;
use skinspect_proxy::{run_server, QueueConfig, ServiceConfig};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "skinspect-proxy")]
#[command(version)]
#[command(about = "Skinspect - item inspection service", long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "SKINSPECT_PORT")]
    port: Option<u16>,

    /// SQLite database file, or :memory:
    #[arg(short, long, env = "SKINSPECT_DATABASE")]
    database: Option<String>,

    /// Comma-separated gateway logins (name=url or url)
    #[arg(short, long, env = "SKINSPECT_SESSIONS")]
    sessions: Option<String>,

    /// Buffer upserts and write them once per second
    #[arg(long)]
    bulk_inserts: bool,

    /// Don't print the startup banner
    #[arg(long)]
    no_banner: bool,
}

impl Cli {
    fn into_config(self) -> ServiceConfig {
        let mut config = ServiceConfig::from_env();
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(database) = self.database {
            config.database = database;
        }
        if let Some(sessions) = self.sessions {
            let token = std::env::var("SKINSPECT_SESSION_TOKEN").ok().filter(|t| !t.is_empty());
            config.sessions = skinspect_proxy::session::SessionConfig::parse_list(&sessions, token);
        }
        config.bulk_inserts |= self.bulk_inserts;
        config.print_banner = !self.no_banner;
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("skinspect_proxy=info,tower_http=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let cli = Cli::parse();
    run_server(cli.into_config(), QueueConfig::from_env()).await
}
