//! Runs the local OAuth 2.0 proxy on `0.0.0.0:<port>`.

// std
use std::{
	net::{IpAddr, Ipv4Addr, SocketAddr},
	sync::Arc,
	time::Duration,
};
// crates.io
use clap::Parser;
use color_eyre::Result;
use tokio::{net::TcpListener, signal};
use tracing_subscriber::EnvFilter;
// self
use oauth2_local_proxy::{
	config::{DEFAULT_PORT, ProxyConfig},
	proxy::LocalProxy,
	server,
	system::HostSystem,
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
	/// Address to listen on.
	#[arg(
		long,
		env = "OAUTH2_LOCAL_PROXY_HOST",
		default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED)
	)]
	host: IpAddr,
	/// Port to listen on; also the destination of port forwarding.
	#[arg(short, long, env = "OAUTH2_LOCAL_PROXY_PORT", default_value_t = DEFAULT_PORT)]
	port: u16,
	/// Seconds each token request waits for its browser flow.
	#[arg(long, env = "OAUTH2_LOCAL_PROXY_AUTHORIZE_FLOW_TIMEOUT", default_value_t = 60)]
	authorize_flow_timeout: u64,
	/// Seconds an opened browser flow stays live waiting for its callback.
	#[arg(long, env = "OAUTH2_LOCAL_PROXY_FLOW_TTL", default_value_t = 300)]
	flow_ttl: u64,
	/// Map callback hostnames to loopback and forward callback ports before opening the browser.
	#[arg(long, env = "OAUTH2_LOCAL_PROXY_AUTOCONFIGURE_SYSTEM")]
	autoconfigure_system: bool,
	/// HMAC key for state fingerprints; a random key is generated when omitted.
	#[arg(long, env = "OAUTH2_LOCAL_PROXY_FINGERPRINT_SECRET", hide_env_values = true)]
	fingerprint_secret: Option<String>,
	/// Seconds of remaining lifetime below which a cached token is refreshed.
	#[arg(long, env = "OAUTH2_LOCAL_PROXY_TOKEN_EXPIRY_BUFFER", default_value_t = 10)]
	token_expiry_buffer: u64,
}
impl Cli {
	fn config(&self) -> ProxyConfig {
		let config = ProxyConfig::default()
			.with_port(self.port)
			.with_authorize_flow_timeout(Duration::from_secs(self.authorize_flow_timeout))
			.with_flow_ttl(Duration::from_secs(self.flow_ttl))
			.with_autoconfigure_system(self.autoconfigure_system)
			.with_token_expiry_buffer(Duration::from_secs(self.token_expiry_buffer));

		match &self.fingerprint_secret {
			Some(secret) => config.with_fingerprint_secret(secret.as_str()),
			None => config,
		}
	}
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	init_tracing();

	let cli = Cli::parse();
	let system = HostSystem::detect();

	tracing::info!(platform = system.platform().as_str(), "Detected host platform.");

	let proxy = LocalProxy::builder(cli.config()).system(Arc::new(system)).build()?;
	let addr = SocketAddr::new(cli.host, cli.port);
	let listener = TcpListener::bind(addr).await?;

	tracing::info!(addr = %addr, "Starting oauth2-local-proxy.");

	server::serve(listener, proxy.clone(), shutdown_signal()).await?;
	proxy.shutdown().await;

	tracing::info!("Proxy stopped.");

	Ok(())
}

fn init_tracing() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	let _ = tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init();
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = signal::ctrl_c().await {
			tracing::warn!(error = %e, "Failed to install Ctrl+C handler.");
		}
	};
	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			},
			Err(e) => {
				tracing::warn!(error = %e, "Failed to install SIGTERM handler.");
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => tracing::info!("Received Ctrl+C, shutting down."),
		_ = terminate => tracing::info!("Received SIGTERM, shutting down."),
	}
}
