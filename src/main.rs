mod config;
mod error;
mod handler;
mod http;
mod logger;
mod script;
mod server;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::load()?;
    logger::init(&cfg)?;
    logger::print_banner();
    script::mark_process_start();

    // Build the Tokio runtime, sizing worker threads from configuration
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
        tracing::info!("[CONFIG] Using {workers} worker threads");
    } else {
        tracing::info!("[CONFIG] Using default worker threads (CPU cores)");
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(server::run(&cfg))?;

    tracing::info!("Server stopped");
    Ok(())
}
