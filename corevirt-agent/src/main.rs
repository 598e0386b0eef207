//! corevirt-agent: per-node daemon that registers with the controller,
//! heartbeats, and reconciles desired state against local drivers.

use std::sync::Arc;

use clap::Parser;
use corevirt_proto::entities::NodeResources;
use tracing_subscriber::EnvFilter;

use corevirt_agent::drivers::{StubHypervisorDriver, StubNetworkDriver, StubStorageDriver};
use corevirt_agent::{AgentTransport, Handlers};

/// corevirt Node Agent
#[derive(Parser, Debug)]
#[command(name = "corevirt-agent")]
#[command(about = "Per-node agent: connects to the controller and reconciles desired state")]
struct Args {
    /// Controller WebSocket endpoint, e.g. ws://10.0.0.1:8080/ws/agent.
    #[arg(long, env = "COREVIRT_CONTROLLER_URL")]
    controller_url: String,

    /// This node's id. Generated on first run and should then be pinned
    /// (e.g. via a unit file override) so restarts re-register the same node.
    #[arg(long, env = "COREVIRT_NODE_ID")]
    node_id: Option<uuid::Uuid>,

    /// Shared-secret agent registration token (spec §4.6).
    #[arg(long, env = "COREVIRT_AGENT_SECRET")]
    agent_secret: String,

    /// Hypervisor type reported at registration.
    #[arg(long, default_value = "kvm")]
    hypervisor_type: String,

    /// Hypervisor version reported at registration.
    #[arg(long, default_value = "unknown")]
    hypervisor_version: String,

    #[arg(long, default_value_t = 0)]
    cpu_cores: u32,
    #[arg(long, default_value_t = 0)]
    cpu_threads: u32,
    #[arg(long, default_value_t = 0)]
    memory_total_bytes: u64,
    #[arg(long, default_value_t = 0)]
    disk_total_bytes: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("corevirt_agent=info".parse()?))
        .init();

    let args = Args::parse();
    let node_id = args.node_id.unwrap_or_else(uuid::Uuid::new_v4);

    let hostname = hostname::get().map(|h| h.to_string_lossy().into_owned()).unwrap_or_else(|_| "unknown".to_string());
    let resources = NodeResources {
        hostname,
        ip_address: "0.0.0.0".to_string(),
        hypervisor_type: args.hypervisor_type,
        hypervisor_version: args.hypervisor_version,
        cpu_cores: args.cpu_cores,
        cpu_threads: args.cpu_threads,
        memory_total_bytes: args.memory_total_bytes,
        disk_total_bytes: args.disk_total_bytes,
        metadata: serde_json::json!({}),
    };

    let handlers = Arc::new(Handlers::new(Arc::new(StubHypervisorDriver), Arc::new(StubStorageDriver), Arc::new(StubNetworkDriver)));
    let transport = AgentTransport::new(args.controller_url, node_id, args.agent_secret, resources, handlers);

    tracing::info!(node_id = %node_id, "starting corevirt-agent");
    transport.run_forever().await;
    Ok(())
}
