use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tracing::info;

use folio_core::config::{AuthMode, Config};
use folio_duckdb::DuckDbBackend;
use folio_server::{auth::jwt::encode_jwt, state::AppState};

/// `folio health` — liveness probe for Docker HEALTHCHECK.
///
/// Calls `GET http://localhost:$FOLIO_PORT/health`.
/// Exits 0 if the server responds with HTTP 200, exits 1 otherwise.
fn run_health_check() -> ! {
    let port = std::env::var("FOLIO_PORT").unwrap_or_else(|_| "3000".to_string());
    let url = format!("http://localhost:{}/health", port);
    match ureq::get(&url).call() {
        Ok(resp) if resp.status() == 200 => std::process::exit(0),
        _ => std::process::exit(1),
    }
}

fn open_database(cfg: &Config) -> Result<DuckDbBackend> {
    std::fs::create_dir_all(&cfg.data_dir)?;
    let db_path = format!("{}/folio.db", cfg.data_dir);
    DuckDbBackend::open(&db_path, &cfg.duckdb_memory_limit)
}

/// Resolve the token secret: `FOLIO_JWT_SECRET` wins, otherwise the one
/// persisted in `settings` (generated on first start).
async fn resolve_jwt_secret(cfg: &mut Config, db: &DuckDbBackend) -> Result<()> {
    if cfg.jwt_secret.is_none() {
        cfg.jwt_secret = Some(db.ensure_jwt_secret().await?);
    }
    Ok(())
}

/// `folio token [days]` — mint a dashboard token and print it to stdout.
async fn run_token_command(mut cfg: Config, days: Option<&str>) -> Result<()> {
    let days: u32 = days.unwrap_or("30").parse()?;
    let db = open_database(&cfg)?;
    resolve_jwt_secret(&mut cfg, &db).await?;
    let secret = cfg.jwt_secret.unwrap_or_default();
    let (token, expires_at) = encode_jwt(&secret, "admin", days)?;
    println!("{token}");
    eprintln!("expires at {expires_at}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.get(1).map(|s| s.as_str()) == Some("health") {
        run_health_check();
    }

    // Structured JSON logging. Level controlled via RUST_LOG.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("folio=info".parse()?),
        )
        .json()
        .init();

    let mut cfg = Config::from_env().map_err(|e| anyhow::anyhow!(e))?;

    if args.get(1).map(|s| s.as_str()) == Some("token") {
        return run_token_command(cfg, args.get(2).map(|s| s.as_str())).await;
    }

    let db = open_database(&cfg)?;

    match cfg.auth_mode {
        AuthMode::Token => {
            resolve_jwt_secret(&mut cfg, &db).await?;
            info!("Dashboard auth enabled; mint a token with `folio token`");
        }
        AuthMode::None => {
            info!("Auth disabled (FOLIO_AUTH=none) — report routes open");
        }
    }

    let state = Arc::new(AppState::new(db, cfg.clone()));

    // Realtime snapshot pusher.
    tokio::spawn(
        Arc::clone(&state.realtime).run_snapshot_loop(Arc::clone(&state.store), cfg.timezone),
    );

    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            state.run_rate_limit_sweep_loop().await;
        });
    }

    let addr = format!("0.0.0.0:{}", cfg.port);
    let app = folio_server::app::build_app(Arc::clone(&state));

    info!(port = cfg.port, timezone = %cfg.timezone, "Folio analytics listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        tokio::signal::ctrl_c().await.ok();
    })
    .await?;

    info!("Shut down cleanly");
    Ok(())
}
