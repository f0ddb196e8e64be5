use flockcheck_server::{server, storage};
mod cli;

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();
    if let Some(cmd) = args.command {
        match cmd {
            cli::Command::HashPassword { password, cost } => match bcrypt::hash(password, cost) {
                Ok(hash) => println!("{hash}"),
                Err(e) => {
                    eprintln!("Hash error: {e}");
                    std::process::exit(2);
                }
            },
            cli::Command::CheckConfig { path } => match server::AppConfig::load_from_path(&path) {
                Ok(cfg) => println!(
                    "{}: ok ({} users, {} devices, {} groups, {} schedules)",
                    path.display(),
                    cfg.users.len(),
                    cfg.devices.len(),
                    cfg.directory.groups.len(),
                    cfg.directory.schedules.len()
                ),
                Err(e) => {
                    eprintln!("{}: {e}", path.display());
                    std::process::exit(2);
                }
            },
        }
        return;
    }
    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = match server::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load config");
            std::process::exit(2);
        }
    };

    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data/app.db".into());
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match storage::Store::connect_sqlite(&db_path).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "Failed to connect DB");
            std::process::exit(3);
        }
    };

    // Families, rooms, schedules and pickup lists are administered in the config
    if let Err(e) = store.seed_from_config(&config.directory).await {
        tracing::error!(error=%e, "Failed to seed DB");
        std::process::exit(4);
    }

    // env PORT overrides config.listen_port
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .or(config.listen_port)
        .unwrap_or(5252);

    tracing::info!(timezone = %config.timezone, "check-in engine ready");
    let state = server::AppState::new(config, store);
    let shutdown_token = state.shutdown_token();
    let audit_worker = state.take_audit_worker();
    let shutdown_token_for_server = shutdown_token.clone();

    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error=%e, %addr, "Failed to bind listener");
            std::process::exit(5);
        }
    };

    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_token_for_server.cancelled_owned())
            .await
    });

    shutdown_signal().await;
    tracing::info!("shutdown: initiating graceful stop");
    shutdown_token.cancel();
    match tokio::time::timeout(std::time::Duration::from_secs(3), &mut server_task).await {
        Ok(join_res) => match join_res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "server error"),
            Err(e) => tracing::error!(error=%e, "server task join error"),
        },
        Err(_) => {
            tracing::warn!("shutdown: forcing server abort due to timeout");
            server_task.abort();
        }
    }

    // The router owned the last audit senders; wait for queued entries to land
    if let Some(worker) = audit_worker {
        match tokio::time::timeout(std::time::Duration::from_secs(3), worker).await {
            Ok(Ok(())) => tracing::info!("shutdown: audit trail flushed"),
            Ok(Err(e)) => tracing::error!(error=%e, "audit worker join error"),
            Err(_) => tracing::warn!("shutdown: audit trail still busy, giving up"),
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (mut sigint, mut sigterm) =
            match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
                (Ok(i), Ok(t)) => (i, t),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(error=%e, "shutdown: cannot install signal handlers");
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
