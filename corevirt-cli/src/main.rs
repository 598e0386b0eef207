//! corevirt: thin CLI shell over the control-plane REST API. No business
//! logic lives here — every subcommand is a direct HTTP call, and the
//! server enforces every invariant and permission check.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use tabled::{Table, Tabled};

#[derive(Parser)]
#[command(name = "corevirt")]
#[command(about = "CLI for the corevirt control plane", long_about = None)]
struct Cli {
    /// Controller REST API base address.
    #[arg(short, long, default_value = "http://127.0.0.1:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and cache the bearer token for subsequent commands.
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// Hypervisor node operations.
    Node {
        #[command(subcommand)]
        action: ListGet,
    },
    /// VM lifecycle operations.
    Vm {
        #[command(subcommand)]
        action: VmAction,
    },
    /// Storage pool operations.
    Pool {
        #[command(subcommand)]
        action: ListGet,
    },
    /// Volume operations.
    Volume {
        #[command(subcommand)]
        action: ListGet,
    },
    /// Network operations.
    Network {
        #[command(subcommand)]
        action: ListGet,
    },
    /// Async task status.
    Task {
        #[command(subcommand)]
        action: ListGet,
    },
}

#[derive(Subcommand)]
enum ListGet {
    List,
    Get { id: String },
}

#[derive(Subcommand)]
enum VmAction {
    List,
    Get { id: String },
    Start { id: String },
    Stop { id: String, #[arg(long)] force: bool },
    Restart { id: String },
    Delete { id: String },
}

#[derive(Tabled)]
struct Row {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
}

#[derive(Deserialize)]
struct LoginResponse {
    auth: AuthToken,
}

#[derive(Deserialize)]
struct AuthToken {
    token: String,
}

fn token_path() -> anyhow::Result<std::path::PathBuf> {
    let dir = dirs::config_dir().ok_or_else(|| anyhow::anyhow!("no config directory for this platform"))?.join("corevirt");
    std::fs::create_dir_all(&dir)?;
    Ok(dir.join("token"))
}

fn load_token() -> anyhow::Result<String> {
    Ok(std::fs::read_to_string(token_path()?)?.trim().to_string())
}

async fn request(client: &reqwest::Client, server: &str, method: reqwest::Method, path: &str) -> anyhow::Result<serde_json::Value> {
    let token = load_token().unwrap_or_default();
    let resp = client.request(method, format!("{server}{path}")).bearer_auth(token).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("request failed: {}", resp.text().await.unwrap_or_default());
    }
    Ok(resp.json().await?)
}

async fn post(client: &reqwest::Client, server: &str, path: &str, body: serde_json::Value) -> anyhow::Result<serde_json::Value> {
    let token = load_token().unwrap_or_default();
    let resp = client.post(format!("{server}{path}")).bearer_auth(token).json(&body).send().await?;
    if !resp.status().is_success() {
        anyhow::bail!("request failed: {}", resp.text().await.unwrap_or_default());
    }
    Ok(resp.json().await?)
}

fn print_page(page: &serde_json::Value) {
    let Some(items) = page.get("items").and_then(|v| v.as_array()) else {
        println!("{}", serde_json::to_string_pretty(page).unwrap_or_default());
        return;
    };
    let rows: Vec<Row> = items
        .iter()
        .map(|item| Row {
            id: item.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            name: item.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            status: item.get("status").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Login { username, password } => {
            let body = serde_json::json!({ "username": username, "password": password });
            let resp: LoginResponse = serde_json::from_value(post(&client, &cli.server, "/api/auth/login", body).await?)?;
            std::fs::write(token_path()?, resp.auth.token)?;
            println!("logged in as {username}");
        }
        Commands::Node { action } => run_list_get(&client, &cli.server, "/api/nodes", action).await?,
        Commands::Pool { action } => run_list_get(&client, &cli.server, "/api/storage/pools", action).await?,
        Commands::Volume { action } => run_list_get(&client, &cli.server, "/api/storage/volumes", action).await?,
        Commands::Network { action } => run_list_get(&client, &cli.server, "/api/networks", action).await?,
        Commands::Task { action } => run_list_get(&client, &cli.server, "/api/tasks", action).await?,
        Commands::Vm { action } => match action {
            VmAction::List => {
                let page = request(&client, &cli.server, reqwest::Method::GET, "/api/vms").await?;
                print_page(&page);
            }
            VmAction::Get { id } => {
                let vm = request(&client, &cli.server, reqwest::Method::GET, &format!("/api/vms/{id}")).await?;
                println!("{}", serde_json::to_string_pretty(&vm)?);
            }
            VmAction::Start { id } => {
                let task = post(&client, &cli.server, &format!("/api/vms/{id}/start"), serde_json::json!({})).await?;
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            VmAction::Stop { id, force } => {
                let task = post(&client, &cli.server, &format!("/api/vms/{id}/stop"), serde_json::json!({ "force": force })).await?;
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            VmAction::Restart { id } => {
                let task = post(&client, &cli.server, &format!("/api/vms/{id}/restart"), serde_json::json!({})).await?;
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
            VmAction::Delete { id } => {
                request(&client, &cli.server, reqwest::Method::DELETE, &format!("/api/vms/{id}")).await.ok();
                println!("deleted {id}");
            }
        },
    }

    Ok(())
}

async fn run_list_get(client: &reqwest::Client, server: &str, base_path: &str, action: ListGet) -> anyhow::Result<()> {
    match action {
        ListGet::List => {
            let page = request(client, server, reqwest::Method::GET, base_path).await?;
            print_page(&page);
        }
        ListGet::Get { id } => {
            let item = request(client, server, reqwest::Method::GET, &format!("{base_path}/{id}")).await?;
            println!("{}", serde_json::to_string_pretty(&item)?);
        }
    }
    Ok(())
}
