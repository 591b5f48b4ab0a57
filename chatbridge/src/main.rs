use chatbridge::{run, Settings};
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Chat assistant control bridge daemon", long_about = None)]
struct Cli {
    #[arg(
        long,
        default_value = "127.0.0.1:17719",
        help = "Listen address for the HTTP and websocket endpoints"
    )]
    listen: SocketAddr,

    #[arg(
        long,
        default_value_t = 2000,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "How long an input read waits for the UI to answer, in milliseconds"
    )]
    read_timeout_ms: u64,

    #[arg(
        long,
        help = "OTLP endpoint for bridge metrics (e.g., http://localhost:4318)"
    )]
    otlp_endpoint: Option<String>,

    #[arg(
        long,
        help = "Leave the bridge unbound until a UI attaches over /v1/ui"
    )]
    no_headless_ui: bool,
}

impl Cli {
    fn into_settings(self) -> Settings {
        Settings {
            listen: self.listen,
            read_timeout_ms: self.read_timeout_ms,
            otlp_endpoint: self.otlp_endpoint,
            headless_ui: !self.no_headless_ui,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    run(cli.into_settings()).await
}
