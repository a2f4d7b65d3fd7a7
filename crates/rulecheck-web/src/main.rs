use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use rulecheck_core::{Checker, Config, PdfBackend, RuleEvaluator};
use rulecheck_pdf_mupdf::MupdfBackend;

mod app;
mod error;
mod handlers;
mod state;
mod template;
mod upload;

use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    let llm = config.build_llm_backend()?;
    if !llm.has_api_key() {
        tracing::warn!("OPENAI_API_KEY is not set; every rule will fail with a model request error");
    }

    // The extraction backend is bound once here and shared by every request.
    let pdf: Arc<dyn PdfBackend> = Arc::new(MupdfBackend::new());
    let evaluator = Arc::new(RuleEvaluator::new(
        Arc::new(llm),
        config.evaluator_settings(),
    ));
    let checker = Checker::new(pdf, evaluator, config.checker_settings());

    tracing::info!(
        model = %config.model,
        base_url = %config.base_url,
        max_concurrent = config.max_concurrent_evaluations,
        "rule checker ready"
    );

    let state = Arc::new(AppState {
        checker: Arc::new(checker),
    });
    let app = app::build_router(state, config.max_upload_mb * 1024 * 1024);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
