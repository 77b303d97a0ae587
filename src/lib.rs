pub mod agent;
pub mod models;
pub mod server;
pub mod config;
pub mod llm;
pub mod speech;
pub mod session;
pub mod cli;

use agent::DecisionAgent;
use cli::Args;
use log::info;
use server::Server;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Speech Provider: {}", args.speech_provider);
    info!(
        "Prompts Path: {}",
        args.prompts_path.as_deref().unwrap_or("<compiled-in defaults>")
    );
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Debug: {}", args.debug);
    info!("-------------------------");

    let agent_args = args.clone();
    let agent = Arc::new(RwLock::new(DecisionAgent::new(agent_args).await?));
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, args.clone());
    server.run().await?;

    Ok(())
}
