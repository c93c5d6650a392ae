use anyhow::Result;
use axum::Router;
use clap::Parser;
use server::{build_app, load_config, load_engine};
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// TOML search config; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Artifact directory, overriding the config's data_path
    #[arg(long)]
    data: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8000)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;
    if let Some(data) = args.data {
        config.data_path = data;
    }
    let engine = tokio::task::spawn_blocking(move || load_engine(config)).await??;
    let app: Router = build_app(engine);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
