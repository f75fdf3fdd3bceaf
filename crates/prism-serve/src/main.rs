mod codec;
mod config;
mod error;
mod routes;
mod store;

use std::sync::Arc;

use prism_cache::Processor;

use crate::config::Args;
use crate::routes::AppState;
use crate::store::ImageStore;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    let store = Arc::new(ImageStore::default());
    let processor = Arc::new(Processor::new(store.clone(), args.cache_config()));
    let app = routes::router(AppState { store, processor }, args.max_upload_bytes());

    let addr = format!("{}:{}", args.host, args.port);
    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: http://{addr}");
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
