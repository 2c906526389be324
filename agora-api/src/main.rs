use agora_api::{
    bootstrap::{SeedError, SeedOutcome, seed_admin},
    server::{self, ServerState, token::TokenIssuer, upload::UploadDir},
};
use agora_common::{
    model::IdSource,
    snowflake::{ProcessId, WorkerId},
};
use agora_db::{DbError, client::DbClient};
use serde::Deserialize;
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    sync::Arc,
};
use thiserror::Error;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Error connecting to the database: {0}")]
    Database(#[from] DbError),
    #[error("Error seeding the admin user: {0}")]
    Seed(#[from] SeedError),
    #[error("Error preparing the upload directory: {0}")]
    UploadDir(std::io::Error),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

// Holds secrets, so no Debug.
#[derive(Clone, Deserialize)]
struct Env {
    database_uri: String,
    #[serde(default = "default_database_name")]
    database_name: String,
    jwt_secret: String,
    #[serde(default = "default_server_address")]
    server_address: IpAddr,
    #[serde(default = "default_server_port")]
    server_port: u16,
    #[serde(default = "default_upload_dir")]
    upload_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    max_upload_bytes: usize,
    #[serde(default = "default_admin_username")]
    admin_username: String,
    admin_password: Option<String>,
    #[serde(default)]
    worker_id: WorkerId,
    #[serde(default)]
    process_id: ProcessId,
}

fn default_database_name() -> String {
    "agora".to_owned()
}

fn default_server_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_server_port() -> u16 {
    4000
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_admin_username() -> String {
    "admin".to_owned()
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "agora_api=debug,agora_db=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Could not listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Could not listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db = DbClient::connect(
        &env.database_uri,
        &env.database_name,
        IdSource::new(env.worker_id, env.process_id),
    )
    .await?;

    let admin_password = env.admin_password.unwrap_or_else(|| {
        warn!("ADMIN_PASSWORD is not set, seeding the admin with the default password");
        DEFAULT_ADMIN_PASSWORD.to_owned()
    });
    match seed_admin(&db, &env.admin_username, &admin_password).await? {
        SeedOutcome::Created(id) => info!(%id, "Seeded admin user"),
        SeedOutcome::Existing(id) => debug!(%id, "Admin user was already present"),
    }

    let uploads = UploadDir::create(
        env.upload_dir,
        IdSource::new(env.worker_id, env.process_id),
    )
    .await
    .map_err(InitError::UploadDir)?;

    let state = ServerState {
        store: Arc::new(db),
        tokens: Arc::new(TokenIssuer::new(env.jwt_secret.as_bytes())),
        uploads: Arc::new(uploads),
    };
    let app = server::app(state, env.max_upload_bytes);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
