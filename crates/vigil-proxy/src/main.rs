use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use vigil_proxy::config::ProxySettings;
use vigil_proxy::{metrics, Locator, Relay, VigilConfig, Watcher};

#[derive(Parser)]
#[command(name = "vigil-proxy", about = "failover-aware proxy for a witness-managed primary")]
struct Args {
    /// path to TOML configuration file
    #[arg(short = 'c', long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// print default configuration as TOML and exit
    #[arg(long)]
    config_template: bool,

    /// address to accept clients on. an empty host binds all interfaces
    #[arg(long, env = "VIGIL_LISTEN")]
    listen: Option<String>,

    /// comma-separated witness addresses, tried in order
    #[arg(long, env = "VIGIL_SENTINEL")]
    sentinel: Option<String>,

    /// name of the group whose primary to follow
    #[arg(long, env = "VIGIL_MASTER")]
    master: Option<String>,

    /// witness password. sent as AUTH before every query
    #[arg(long, env = "VIGIL_PASSWORD")]
    password: Option<String>,

    /// path to a file containing the witness password (alternative to
    /// --password). the file contents are trimmed of trailing whitespace.
    #[arg(long, env = "VIGIL_PASSWORD_FILE")]
    password_file: Option<PathBuf>,

    /// dial timeout in milliseconds for witnesses and primaries
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// steady-state polling interval in milliseconds
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// log raw witness traffic
    #[arg(long)]
    debug: bool,

    /// port for prometheus metrics and /health (0 = disabled)
    #[arg(long)]
    metrics_port: Option<u16>,
}

/// Applies CLI overrides to a `VigilConfig`, keeping the resolution
/// order: defaults → TOML file → env vars → CLI flags.
fn apply_args(cfg: &mut VigilConfig, args: &Args) {
    if let Some(ref listen) = args.listen {
        cfg.listen = listen.clone();
    }
    if let Some(ref sentinel) = args.sentinel {
        cfg.sentinel = sentinel.clone();
    }
    if let Some(ref master) = args.master {
        cfg.master = master.clone();
    }
    if let Some(ref pass) = args.password {
        cfg.password = pass.clone();
    }
    if let Some(v) = args.timeout_ms {
        cfg.timeout_ms = v;
    }
    if let Some(v) = args.poll_interval_ms {
        cfg.poll_interval_ms = v;
    }
    if args.debug {
        cfg.debug = true;
    }
    if let Some(port) = args.metrics_port {
        cfg.metrics_port = port;
    }
}

/// Prints `msg` to stderr and exits with code 1.
fn exit_err(msg: impl std::fmt::Display) -> ! {
    eprintln!("{msg}");
    std::process::exit(1);
}

/// Reads `--password-file` into the config. Exits on error.
fn resolve_password(cfg: &mut VigilConfig, args: &Args) {
    let Some(ref path) = args.password_file else {
        return;
    };
    if !cfg.password.is_empty() {
        exit_err("error: --password and --password-file are mutually exclusive");
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => {
            let password = contents.trim_end().to_string();
            if password.is_empty() {
                exit_err(format!("error: --password-file is empty: {}", path.display()));
            }
            cfg.password = password;
        }
        Err(e) => exit_err(format!(
            "error: failed to read --password-file '{}': {e}",
            path.display()
        )),
    }
}

fn init_logging(debug: bool) {
    let default = if debug {
        "vigil_proxy=debug"
    } else {
        "vigil_proxy=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .init();
}

/// Resolves when the process is asked to stop.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // --config-template: dump defaults and exit
    if args.config_template {
        match VigilConfig::default().to_toml() {
            Ok(toml) => {
                println!("{toml}");
                std::process::exit(0);
            }
            Err(e) => exit_err(format!("failed to generate config template: {e}")),
        }
    }

    let mut cfg = match &args.config {
        Some(path) => VigilConfig::from_file(path).unwrap_or_else(|e| exit_err(e)),
        None => VigilConfig::default(),
    };
    apply_args(&mut cfg, &args);
    resolve_password(&mut cfg, &args);

    let settings: ProxySettings = cfg
        .resolve()
        .unwrap_or_else(|e| exit_err(format!("error: {e}")));

    init_logging(settings.debug);

    let locator = Locator::new(
        settings.witnesses.clone(),
        settings.group.clone(),
        settings.credential.clone(),
        settings.dial_timeout,
    )
    .with_debug(settings.debug);

    let (watcher, view) = Watcher::new(
        locator,
        settings.poll_interval,
        settings.cold_start_backoff(),
    );

    let relay = Relay::bind(settings.listen, view.clone(), settings.dial_timeout)
        .await
        .unwrap_or_else(|e| exit_err(format!("failed to bind {}: {e}", settings.listen)));

    if let Some(metrics_addr) = settings.metrics {
        let handle = metrics::install_recorder()
            .unwrap_or_else(|e| exit_err(format!("failed to install metrics recorder: {e}")));
        metrics::spawn_http_server(metrics_addr, handle, view.clone());
    }

    let witnesses: Vec<String> = settings.witnesses.iter().map(ToString::to_string).collect();
    info!(
        listen = %settings.listen,
        group = %settings.group,
        witnesses = ?witnesses,
        auth = settings.credential.is_some(),
        "vigil proxy starting"
    );

    tokio::spawn(watcher.run());

    tokio::select! {
        _ = relay.run() => {}
        _ = shutdown_signal() => {
            info!("shutdown signal received, exiting");
        }
    }
}
