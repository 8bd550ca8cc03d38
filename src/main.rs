use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use llm_stream_observatory::config::Cli;
use llm_stream_observatory::render::TerminalRenderer;
use llm_stream_observatory::repl::Repl;
use llm_stream_observatory::{server, AppState, HttpBackend, MetricsMonitor, StreamingMetricsConsumer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so streamed text on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,llm_stream_observatory=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let params = cli.generation_params();
    params.validate().context("invalid generation parameters")?;

    println!();
    println!("╔══════════════════════════════════════════════════╗");
    println!("║   🔬  LLM STREAM OBSERVATORY                     ║");
    println!("╚══════════════════════════════════════════════════╝");
    println!();

    // ── 1. Reach the backend ─────────────────────────────────────
    println!("🔌 Backend at {}...", cli.backend_url);
    let http = HttpBackend::new(&cli.backend_url);
    match http.model_status().await {
        Ok(status) if status.loaded => {
            println!("   ✓ model loaded: {}", status.model_name);
        }
        Ok(status) if status.loading => println!("   … model is still loading"),
        Ok(_) => println!("   ⚠ no model loaded yet; generation will fail until one is"),
        Err(err) => {
            tracing::warn!(error = %err, "model status check failed");
            println!("   ⚠ {}", err.user_message());
        }
    }

    // ── 2. Conversation session ──────────────────────────────────
    let session = match cli.session.clone() {
        Some(id) => Some(id),
        None => match http.start_conversation().await {
            Ok(id) => Some(id),
            Err(err) => {
                tracing::warn!(error = %err, "could not start a conversation; the backend will assign one");
                None
            }
        },
    };
    if let Some(id) = &session {
        println!("💬 Session {id}");
    }

    // ── 3. Shared metrics + consumer ─────────────────────────────
    let monitor = Arc::new(MetricsMonitor::new());
    let consumer = StreamingMetricsConsumer::new(
        Arc::new(http.clone()),
        Arc::clone(&monitor),
        Box::new(TerminalRenderer::stdout()),
    )
    .with_params(params)
    .with_render_interval(cli.render_interval());

    // ── 4. Optional dashboard ────────────────────────────────────
    if let Some(addr) = cli.dashboard {
        let state = Arc::new(AppState {
            metrics: Arc::clone(&monitor),
        });
        println!("📈 Metrics JSON    → http://{addr}/api/metrics");
        println!("📈 Metrics SSE     → http://{addr}/api/metrics/stream");
        tokio::spawn(async move {
            if let Err(err) = server::serve(addr, state).await {
                tracing::error!(error = %err, "dashboard server exited");
            }
        });
    }

    println!();
    println!("Type a prompt, or /help for commands.");

    // ── 5. Interactive loop ──────────────────────────────────────
    let mut repl = Repl::new(http, consumer, session, !cli.no_metrics);
    repl.run().await.context("terminal I/O failed")?;

    Ok(())
}
