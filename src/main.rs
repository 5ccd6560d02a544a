use kornia_vlm::paligemma::PaligemmaConfig;
use kornia_vqa::{
    InfernumEngine, PaligemmaVqa,
    config::{PORT_ENV, ServerArgs, ServerConfig},
    server,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args: ServerArgs = argh::from_env();

    let env_port = std::env::var(PORT_ENV).ok();
    let config = ServerConfig::from_args(args, env_port.as_deref())?;

    // the server does not start until the weights are loaded
    log::info!("📦 Loading PaliGemma weights, this may take a while");
    let model = PaligemmaVqa::new(
        PaligemmaConfig {
            seed: config.seed,
            ..Default::default()
        },
        config.sample_len,
    )?;
    let engine = Arc::new(InfernumEngine::new(model));

    let app = server::router(engine, config.max_upload_bytes);

    let addr = config.addr();

    log::info!("🚀 Starting the server");
    log::info!("🔥 Listening on: {}", addr);
    log::info!("🔧 Press Ctrl+C to stop the server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
