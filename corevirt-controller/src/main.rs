use std::path::PathBuf;
use std::sync::Arc;

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use corevirt_controller::audit::AuditLogger;
use corevirt_controller::ipam::IpAllocator;
use corevirt_controller::rbac::{AuthRegistry, Role};
use corevirt_controller::registry::AgentRegistry;
use corevirt_controller::rest::create_router;
use corevirt_controller::services::{NetworkService, NodeService, SnapshotService, TaskService, VmService, VolumeService};
use corevirt_controller::store::{MetadataStore, SqliteStore, StoreError};
use corevirt_controller::{reconcile, AppState};

#[derive(Parser)]
#[command(name = "corevirt-controller")]
#[command(about = "corevirt control plane: metadata store, REST API, and agent orchestration")]
struct Args {
    /// Listen address for the REST API and agent/frontend WebSocket endpoints.
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Path to the sqlite database file. Runs in-memory when omitted.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Shared-secret token agents must present at `node.register`.
    #[arg(long, env = "COREVIRT_AGENT_SECRET")]
    agent_secret: String,

    /// Username to seed as the initial admin account on first boot.
    #[arg(long, default_value = "admin")]
    admin_username: String,

    /// Password for the seeded admin account; ignored if the user already exists.
    #[arg(long, env = "COREVIRT_ADMIN_PASSWORD")]
    admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("corevirt_controller=info".parse()?))
        .init();

    let args = Args::parse();

    let store: Arc<dyn MetadataStore> = match &args.data_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            SqliteStore::open(&dir.join("corevirt.db"))?
        }
        None => {
            warn!("no --data-dir given, running with an in-memory (non-durable) store");
            SqliteStore::open_in_memory()?
        }
    };

    seed_admin_user(&store, &args.admin_username, args.admin_password.as_deref()).await?;

    let agents = AgentRegistry::new();
    let ipam = Arc::new(IpAllocator::new(store.clone()));
    let auth = AuthRegistry::new(args.agent_secret.clone());
    let audit = Arc::new(AuditLogger::new(store.clone()));
    let (frontend_tx, _) = tokio::sync::broadcast::channel(256);

    let vms = VmService::new(store.clone(), agents.clone(), ipam.clone(), audit.clone());
    let volumes = VolumeService::new(store.clone(), agents.clone(), audit.clone());
    let snapshots = SnapshotService::new(store.clone(), agents.clone(), audit.clone());
    let networks = NetworkService::new(store.clone(), audit.clone());
    let nodes = NodeService::new(store.clone(), agents.clone(), audit.clone());
    let tasks = TaskService::new(store.clone());

    let app_state = Arc::new(AppState {
        store: store.clone(),
        agents: agents.clone(),
        ipam,
        auth,
        audit,
        frontend_tx,
        agent_register_token: args.agent_secret,
        vms,
        volumes,
        snapshots,
        networks,
        nodes,
        tasks,
    });

    tokio::spawn(reconcile::run_forever(store, agents));

    let router = create_router(app_state);
    let listener = tokio::net::TcpListener::bind(&args.listen).await?;
    info!("REST API and agent/frontend WebSocket endpoints listening on {}", args.listen);

    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = ctrl_c => info!("received SIGINT"),
                _ = sigterm.recv() => info!("received SIGTERM"),
            }
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}

/// Creates the first admin account if the username doesn't already
/// exist. Subsequent boots with the same `--admin-username` are a
/// no-op even if `--admin-password` is still set, so operators can
/// leave it in their unit file without re-hashing on every restart.
async fn seed_admin_user(store: &Arc<dyn MetadataStore>, username: &str, password: Option<&str>) -> Result<(), StoreError> {
    match store.get_user_by_username(username).await {
        Ok(_) => return Ok(()),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }
    let Some(password) = password else {
        warn!(username, "no admin user exists and --admin-password was not provided; login will be unavailable until one is created");
        return Ok(());
    };

    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| StoreError::Internal(format!("failed to hash admin password: {e}")))?
        .to_string();

    store
        .apply(corevirt_controller::command::Command::CreateUser {
            request_id: uuid::Uuid::new_v4().to_string(),
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            username: username.to_string(),
            password_hash,
            role: format!("{:?}", Role::Admin).to_lowercase(),
        })
        .await?;
    info!(username, "seeded initial admin user");
    Ok(())
}
