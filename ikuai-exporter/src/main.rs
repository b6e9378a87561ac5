use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use axum::{Router, routing::get};
use clap::{Parser, Subcommand};
use confique::Config;
use ikuai_client::{Client, ConnectOptions};
use tokio::{net::TcpListener, signal, sync::Mutex};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, trace};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{collector::RouterApi, exposition::Exposition, metric::Registry};

mod collector;
mod exposition;
mod metric;
mod route;

/// Upper bound on a `/metrics` request.
const SCRAPE_TIMEOUT: Duration = Duration::from_secs(60);

/// HTTP exchanges one cycle can make in the worst case: three queries, each
/// preceded by a fresh login once the previous one dropped the session.
const EXCHANGES_PER_CYCLE: u32 = 6;

#[derive(Debug, Parser)]
#[command(name = "ikuai-exporter")]
struct Cli {
    #[arg(short, long, value_name = "FILE", help = "Path to config file")]
    config_path: Option<String>,
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve metrics over HTTP
    Serve,

    /// Run a single collection cycle and print the exposition to stdout
    Collect,
}

#[derive(Config, Debug)]
struct Conf {
    /// Port to listen on
    #[config(default = 9090, env = "LISTEN_PORT")]
    port: u16,

    /// Bind address
    #[config(default = "0.0.0.0", env = "LISTEN_ADDRESS")]
    address: IpAddr,

    #[config(nested)]
    ikuai: IKuaiConf,
}

#[derive(Config)]
struct IKuaiConf {
    /// Base URL of the router's web interface
    #[config(default = "http://10.0.1.253", env = "IK_URL")]
    url: String,

    #[config(default = "test", env = "IK_USER")]
    username: String,

    #[config(default = "test123", env = "IK_PWD")]
    password: String,

    /// Accept self-signed certificates on `https` URLs
    #[config(default = true, env = "SKIP_TLS_VERIFY")]
    skip_tls_verify: bool,

    #[config(default = false, env = "IK_PREFER_IPV6")]
    prefer_ipv6: bool,

    /// Seconds to wait for one exchange with the router
    #[config(default = 5, env = "IK_TIMEOUT")]
    timeout: u64,
}

impl fmt::Debug for IKuaiConf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IKuaiConf")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("skip_tls_verify", &self.skip_tls_verify)
            .field("prefer_ipv6", &self.prefer_ipv6)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl IKuaiConf {
    /// Every exchange of a cycle timing out must still fit in the scrape timeout.
    fn request_timeout(&self) -> anyhow::Result<Duration> {
        let timeout = Duration::from_secs(self.timeout);
        anyhow::ensure!(
            !timeout.is_zero()
                && timeout
                    .checked_mul(EXCHANGES_PER_CYCLE)
                    .is_some_and(|cycle| cycle < SCRAPE_TIMEOUT),
            "ikuai.timeout must be between 1 and {} seconds",
            (SCRAPE_TIMEOUT / EXCHANGES_PER_CYCLE).as_secs() - 1
        );

        Ok(timeout)
    }

    fn client(&self) -> anyhow::Result<Client> {
        Ok(Client::new(
            self.url.as_str(),
            self.username.as_str(),
            self.password.as_str(),
            ConnectOptions {
                accept_invalid_certs: self.skip_tls_verify,
                prefer_ipv6: self.prefer_ipv6,
                timeout: self.request_timeout()?,
            },
        ))
    }
}

fn config(path: &str) -> anyhow::Result<Conf> {
    Conf::builder()
        .env()
        .file(path)
        .load()
        .map_err(|e| e.into())
}

#[derive(Debug)]
pub(crate) struct AppState<R> {
    pub router: Arc<R>,
    pub registry: Arc<Registry>,
    /// Held for the duration of a collection cycle.
    pub cycle: Arc<Mutex<()>>,
}

impl<R> AppState<R> {
    fn new(router: R) -> Self {
        Self {
            router: Arc::new(router),
            registry: Arc::new(Registry::new(collector::histogram::app_flow_buckets())),
            cycle: Arc::new(Mutex::new(())),
        }
    }
}

// derive(Clone) would require `R: Clone`
impl<R> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            router: self.router.clone(),
            registry: self.registry.clone(),
            cycle: self.cycle.clone(),
        }
    }
}

fn app<R>(state: AppState<R>) -> Router
where
    R: RouterApi + Send + Sync + 'static,
{
    Router::new()
        .route("/health", get(route::health))
        .route("/metrics", get(route::metrics::<R>))
        .layer((
            TraceLayer::new_for_http(),
            // Prevent requests to hang forever
            TimeoutLayer::new(SCRAPE_TIMEOUT),
        ))
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    trace!("using command line arguments {:?}", cli);

    let config = config(&cli.config_path.unwrap_or("config.toml".to_owned()))?;
    trace!("using config {:?}", config);

    let state = AppState::new(config.ikuai.client()?);

    match cli.commands {
        Commands::Serve => {
            let addr = SocketAddr::from((config.address, config.port));
            info!("listening on {addr}, exporting {}", state.router.base_url());
            let listener = TcpListener::bind(addr).await?;

            axum::serve(listener, app(state))
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::Collect => {
            let samples = collector::scrape(state.router.as_ref(), &state.registry).await;
            let Exposition(text) = Exposition::encode(&state.registry, &samples);
            print!("{text}");
        }
    }

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                #[cfg(debug_assertions)]
                let default_log_level = format!(
                    "{}=debug,ikuai_client=debug,tower_http=debug,axum=trace",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                #[cfg(not(debug_assertions))]
                let default_log_level = format!(
                    "{}=info,ikuai_client=info,tower_http=info,axum=info",
                    env!("CARGO_CRATE_NAME")
                )
                .into();

                default_log_level
            }),
        )
        .with(tracing_subscriber::fmt::layer().without_time().with_writer(std::io::stderr))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
