pub mod apply;
pub mod config;
pub mod controller;
pub mod deleter;
pub mod finalizer;
pub mod patch;
pub mod policy;
pub mod resource;
pub mod runtime;
pub mod stack;
pub mod store;
pub mod templating;

use tracing_subscriber::{
    EnvFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn init_tracing(default_env: &str) {
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .from_env_lossy()
        .add_directive(
            default_env
                .parse()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        );

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
