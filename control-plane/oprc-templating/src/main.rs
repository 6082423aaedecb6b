use envconfig::Envconfig;
use kube::Client;
use oprc_templating::{config::TemplatingConfig, init_tracing, runtime};
use tracing::info;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cfg = TemplatingConfig::init_from_env()?;
    init_tracing(cfg.log_level());
    info!(?cfg, "Starting templating controller");

    let client = Client::try_default().await?;
    runtime::run(client, cfg).await
}
