use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;

use crate::backend::HttpBackend;
use crate::metrics::{HistoryEntry, LiveMetrics, MetricsSummary, TurnStatus};
use crate::stream::StreamingMetricsConsumer;

// ─── Commands ────────────────────────────────────────────────────

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Prompt(String),
    Clear,
    Metrics,
    Reset,
    Session,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        let Some(cmd) = line.strip_prefix('/') else {
            return Self::Prompt(line.to_owned());
        };
        match cmd.split_whitespace().next().unwrap_or_default() {
            "clear" => Self::Clear,
            "metrics" => Self::Metrics,
            "reset" => Self::Reset,
            "session" => Self::Session,
            "help" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => Self::Unknown(other.to_owned()),
        }
    }
}

const HELP: &str = "\
  <text>     send a prompt
  /clear     clear the conversation on the backend
  /metrics   show live metrics and turn history
  /reset     clear all collected metrics
  /session   print the current session id
  /quit      exit
  Ctrl-C cancels a running turn, or exits when idle";

// ─── REPL ────────────────────────────────────────────────────────

/// Interactive loop: each prompt line becomes one streamed turn.
pub struct Repl {
    http: HttpBackend,
    consumer: StreamingMetricsConsumer,
    session: Option<String>,
    show_metrics: bool,
}

impl Repl {
    pub fn new(
        http: HttpBackend,
        consumer: StreamingMetricsConsumer,
        session: Option<String>,
        show_metrics: bool,
    ) -> Self {
        Self {
            http,
            consumer,
            session,
            show_metrics,
        }
    }

    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        loop {
            print!("\n> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = tokio::signal::ctrl_c() => None,
            };
            let Some(line) = line else {
                println!();
                return Ok(());
            };

            match Command::parse(&line) {
                Command::Prompt(prompt) => self.run_turn(&prompt).await,
                Command::Clear => self.clear_conversation().await,
                Command::Metrics => self.print_metrics(),
                Command::Reset => {
                    self.consumer.monitor().clear();
                    println!("📊 metrics cleared");
                }
                Command::Session => {
                    println!("{}", self.session.as_deref().unwrap_or("(none)"));
                }
                Command::Help => println!("{HELP}"),
                Command::Quit => return Ok(()),
                Command::Empty => {}
                Command::Unknown(cmd) => println!("unknown command /{cmd}, try /help"),
            }
        }
    }

    async fn run_turn(&mut self, prompt: &str) {
        let turn = self.consumer.begin_turn(prompt, self.session.as_deref());

        // Ctrl-C during a turn cancels only the turn
        let cancel = turn.cancel_handle();
        let watcher = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });

        let outcome = turn.finish().await;
        watcher.abort();
        println!();

        match outcome {
            Ok(report) => {
                if report.cancelled {
                    println!("⏹  cancelled");
                }
                if let Some(session) = report.adopted_session {
                    tracing::info!(%session, "backend assigned a new session id");
                    self.session = Some(session);
                }
                if self.show_metrics {
                    println!("{}", format_summary(&report.summary));
                }
            }
            Err(err) => eprintln!("❌ {}", err.user_message()),
        }
    }

    async fn clear_conversation(&mut self) {
        let Some(session) = self.session.as_deref() else {
            println!("no conversation to clear");
            return;
        };
        match self.http.clear_conversation(session).await {
            Ok(()) => println!("🧹 conversation cleared"),
            Err(err) => eprintln!("❌ {}", err.user_message()),
        }
    }

    fn print_metrics(&self) {
        let monitor = self.consumer.monitor();
        println!("{}", format_live(&monitor.live(Instant::now())));
        println!("{}", format_history(&monitor.history()));
    }
}

// ─── Formatting ──────────────────────────────────────────────────

fn ms_or_dash(ms: Option<f64>) -> String {
    ms.map(|v| format!("{v:.1} ms")).unwrap_or_else(|| "- ms".into())
}

/// One-line summary printed after each turn.
pub fn format_summary(summary: &MetricsSummary) -> String {
    format!(
        "📊 TTFT {}  ITL {} (p95 {:.1} ms)  TPS {}  E2E {:.1} ms  tokens {}",
        ms_or_dash(summary.ttft_ms),
        ms_or_dash(summary.avg_itl_ms),
        summary.itl_us.p95 as f64 / 1000.0,
        summary.instantaneous_tps,
        summary.e2e_ms,
        summary.total_tokens,
    )
}

pub fn format_live(live: &LiveMetrics) -> String {
    let state = if live.streaming { "streaming" } else { "idle" };
    format!(
        "{state}: TTFT {}  ITL {}  TPS {} ({:?})  tokens {}  elapsed {:.0} ms  RPS {:.2}",
        ms_or_dash(live.ttft_ms),
        ms_or_dash(live.avg_itl_ms),
        live.tokens_per_sec,
        live.tps_level,
        live.tokens_generated,
        live.elapsed_ms,
        live.requests_per_sec,
    )
}

pub fn format_history(history: &[HistoryEntry]) -> String {
    if history.is_empty() {
        return "no finished turns yet".into();
    }
    let mut out = format!(
        "{:<10} {:>10} {:>9} {:>7} {:>10}",
        "status", "ttft", "tok/s", "tokens", "e2e"
    );
    for entry in history {
        let status = match entry.status {
            TurnStatus::Completed => "ok",
            TurnStatus::Cancelled => "cancelled",
            TurnStatus::Failed => "failed",
        };
        out.push_str(&format!(
            "\n{:<10} {:>10} {:>9.1} {:>7} {:>7.1} ms",
            status,
            ms_or_dash(entry.ttft_ms),
            entry.tokens_per_sec,
            entry.token_count,
            entry.e2e_ms,
        ));
    }
    out
}
