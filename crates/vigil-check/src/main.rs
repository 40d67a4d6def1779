//! vigil-check: container health check for a vigil proxy.
//!
//! Connects through the proxy, sends ROLE, and exits 0 when the node on
//! the other side is a primary or a connected replica. Any other role
//! exits 127. Connection, auth, and protocol failures exit 1.

mod connection;
mod role;

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;

/// Health check for the node behind a vigil proxy.
#[derive(Parser)]
#[command(name = "vigil-check", version, about)]
struct Args {
    /// Proxy address (host:port).
    #[arg(long, env = "LISTEN", default_value = "localhost:9999")]
    addr: String,

    /// Password for AUTH.
    #[arg(long, env = "PASSWORD")]
    password: Option<String>,

    /// Overall timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("{}", format!("failed to create runtime: {e}").red());
            return ExitCode::FAILURE;
        }
    };

    // an empty PASSWORD means no AUTH
    let password = args.password.as_deref().filter(|p| !p.is_empty());
    let timeout = Duration::from_millis(args.timeout_ms);

    match rt.block_on(role::check(&args.addr, password, timeout)) {
        Ok(status) => {
            if let role::RoleStatus::Unhealthy(ref reason) = status {
                eprintln!("{}", format!("unhealthy: {reason}").yellow());
            }
            status.exit_code()
        }
        Err(e) => {
            eprintln!("{}", format!("{}: {e}", args.addr).red());
            ExitCode::FAILURE
        }
    }
}
