pub mod api;

use crate::agent::DecisionAgent;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Server {
    addr: String,
    agent: Arc<RwLock<DecisionAgent>>,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<RwLock<DecisionAgent>>, args: Args) -> Self {
        Self {
            addr,
            agent,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(&self.addr, self.agent.clone(), self.args.clone()).await
    }
}
