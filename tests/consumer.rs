mod common;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::broadcast;
use tokio::time::Instant;

use common::{RecordingRenderer, Script, ScriptedBackend, SharedBuffer};
use llm_stream_observatory::metrics::{MetricsMonitor, TurnStatus};
use llm_stream_observatory::render::TerminalRenderer;
use llm_stream_observatory::stream::Increment;
use llm_stream_observatory::{StreamingMetricsConsumer, TurnError, TurnEvent};

struct Harness {
    backend: Arc<ScriptedBackend>,
    monitor: Arc<MetricsMonitor>,
    renderer: RecordingRenderer,
    consumer: StreamingMetricsConsumer,
}

fn harness(scripts: impl IntoIterator<Item = Script>) -> Harness {
    let backend = ScriptedBackend::new(scripts);
    let monitor = Arc::new(MetricsMonitor::new());
    let renderer = RecordingRenderer::default();
    let consumer = StreamingMetricsConsumer::new(
        backend.clone(),
        Arc::clone(&monitor),
        Box::new(renderer.clone()),
    );
    Harness {
        backend,
        monitor,
        renderer,
        consumer,
    }
}

fn texts(increments: &[Increment]) -> Vec<&str> {
    increments.iter().map(|i| i.text.as_str()).collect()
}

fn drain(rx: &mut broadcast::Receiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

async fn collect_increments(chunks: &[&[u8]]) -> Vec<String> {
    let scripted = Script::Chunks(
        chunks
            .iter()
            .map(|c| (Duration::ZERO, c.to_vec()))
            .collect(),
    );
    let mut h = harness([scripted]);
    let mut turn = h.consumer.begin_turn("q", None);
    let increments: Vec<Increment> = turn.increments().collect().await;
    turn.finish().await.expect("turn should complete");
    increments.into_iter().map(|i| i.text).collect()
}

// ─── Scenarios ───────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn hello_stream_yields_two_increments() {
    let mut h = harness([Script::body(&[
        "{\"text\":\"Hel\"}\n{\"text\":\"lo\"}\n{\"finished\":true}\n",
    ])]);
    let mut events = h.consumer.subscribe();

    let mut turn = h.consumer.begin_turn("say hello", Some("s1"));
    let mut increments = Vec::new();
    while let Some(increment) = turn.next_increment().await {
        increments.push(increment);
    }
    let report = turn.finish().await.expect("turn should complete");

    assert_eq!(texts(&increments), vec!["Hel", "lo"]);
    assert!(increments[0].first && !increments[1].first);
    assert_eq!(report.response, "Hello");
    assert_eq!(report.summary.total_tokens, 2);
    assert_eq!(report.summary.itl_us.count, 1);
    assert!(!report.cancelled);
    assert_eq!(report.adopted_session, None);

    let events = drain(&mut events);
    assert!(matches!(events.first(), Some(TurnEvent::Started { prompt, .. }) if prompt == "say hello"));
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, TurnEvent::FirstToken { .. }))
            .count(),
        1
    );
    let running: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            TurnEvent::Increment { running_total, .. } => Some(*running_total),
            _ => None,
        })
        .collect();
    assert_eq!(running, vec![1, 2]);
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Completed { total_tokens: 2, error: None, cancelled: false, .. })
    ));

    // Terminal record always forces a final render
    assert_eq!(h.renderer.renders.lock().last().map(String::as_str), Some("Hello"));

    let history = h.monitor.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TurnStatus::Completed);
    assert_eq!(history[0].token_count, 2);
}

#[tokio::test(start_paused = true)]
async fn record_split_mid_chunk_matches_unsplit_stream() {
    let split = collect_increments(&[b"{\"te", b"xt\":\"ok\"}\n{\"finished\":true}\n"]).await;
    let whole = collect_increments(&[b"{\"text\":\"ok\"}\n{\"finished\":true}\n"]).await;
    assert_eq!(split, vec!["ok"]);
    assert_eq!(split, whole);
}

#[tokio::test(start_paused = true)]
async fn increments_do_not_depend_on_chunk_boundaries() {
    let body = "{\"text\":\"Grüß\"}\n{\"text\":\"\"}\n{\"text\":\" 世界\"}\ngarbage\n{\"text\":\"!\"}\n{\"finished\":true}\n"
        .as_bytes();
    let reference = collect_increments(&[body]).await;
    assert_eq!(reference, vec!["Grüß", " 世界", "!"]);

    for i in 0..=body.len() {
        let got = collect_increments(&[&body[..i], &body[i..]]).await;
        assert_eq!(got, reference, "split at byte {i}");
    }
    // Byte-at-a-time delivery
    let singles: Vec<&[u8]> = body.chunks(1).collect();
    assert_eq!(collect_increments(&singles).await, reference);
}

#[tokio::test(start_paused = true)]
async fn malformed_line_is_discarded_silently() {
    let mut h = harness([Script::body(&[
        "not json\n{\"text\":\"ok\"}\n{\"finished\":true}\n",
    ])]);
    let mut events = h.consumer.subscribe();

    let report = h
        .consumer
        .begin_turn("q", None)
        .finish()
        .await
        .expect("malformed lines must not fail the turn");
    assert_eq!(report.response, "ok");
    assert_eq!(report.summary.total_tokens, 1);

    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(TurnEvent::Completed { error: None, .. })));
}

#[tokio::test(start_paused = true)]
async fn non_success_status_fails_without_increments() {
    let mut h = harness([Script::Rejected(503)]);
    let mut events = h.consumer.subscribe();

    let mut turn = h.consumer.begin_turn("q", None);
    assert_eq!(turn.next_increment().await, None);
    let err = turn.finish().await.expect_err("status must surface");
    assert!(matches!(err, TurnError::Status { status: 503, .. }));

    let events = drain(&mut events);
    assert!(!events.iter().any(|e| matches!(e, TurnEvent::Increment { .. })));
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Completed { total_tokens: 0, error: Some(_), cancelled: false, .. })
    ));

    // Finalize-always: the failed turn is kept, tagged as failed
    let history = h.monitor.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, TurnStatus::Failed);
    assert_eq!(history[0].ttft_ms, None);
    assert!(h.renderer.renders.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn backend_error_record_fails_the_turn() {
    let mut h = harness([Script::body(&[
        "{\"text\":\"par\"}\n{\"error\":\"generation interrupted\",\"finished\":true}\n",
    ])]);

    let mut turn = h.consumer.begin_turn("q", None);
    let increments: Vec<Increment> = turn.increments().collect().await;
    assert_eq!(texts(&increments), vec!["par"]);

    match turn.finish().await {
        Err(TurnError::Backend(message)) => assert_eq!(message, "generation interrupted"),
        other => panic!("expected backend error, got {other:?}"),
    }
    assert_eq!(h.monitor.history()[0].status, TurnStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn mid_stream_failure_keeps_rendered_text() {
    let mut h = harness([Script::BreaksAfter(
        vec![b"{\"text\":\"a\"}\n{\"text\":\"b\"}\n".to_vec()],
        "connection reset".into(),
    )]);

    let err = h
        .consumer
        .begin_turn("q", None)
        .finish()
        .await
        .expect_err("transport failure must surface");
    assert_eq!(err.user_message(), "connection reset");

    // The unrendered "ab" is flushed before finalizing
    assert_eq!(h.renderer.renders.lock().last().map(String::as_str), Some("ab"));
    assert_eq!(h.monitor.history()[0].token_count, 2);
}

#[tokio::test(start_paused = true)]
async fn records_after_finish_are_ignored() {
    let mut h = harness([Script::body(&[
        "{\"text\":\"a\"}\n{\"finished\":true}\n{\"text\":\"zzz\"}\n",
    ])]);
    let report = h.consumer.begin_turn("q", None).finish().await.unwrap();
    assert_eq!(report.response, "a");
    assert_eq!(report.summary.total_tokens, 1);
}

#[tokio::test(start_paused = true)]
async fn body_ending_without_finish_record_completes() {
    let mut h = harness([Script::body(&["{\"text\":\"a\"}\n{\"text\":\"b\"}"])]);
    let report = h.consumer.begin_turn("q", None).finish().await.unwrap();
    assert_eq!(report.response, "ab");
    assert_eq!(report.summary.status, TurnStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn terminal_shows_every_turn_even_when_answers_repeat() {
    let answers = ["OK", "OK", "OK, done"];
    let scripts = answers.map(|answer| {
        let body = format!("{{\"text\":\"{answer}\"}}\n{{\"finished\":true}}\n");
        Script::body(&[body.as_str()])
    });
    let screen = SharedBuffer::default();
    let mut consumer = StreamingMetricsConsumer::new(
        ScriptedBackend::new(scripts),
        Arc::new(MetricsMonitor::new()),
        Box::new(TerminalRenderer::new(screen.clone())),
    );

    for answer in answers {
        let report = consumer.begin_turn("q", None).finish().await.unwrap();
        assert_eq!(report.response, answer);
    }

    let printed = screen.contents();
    assert_eq!(printed.matches("OK").count(), 3);
    assert_eq!(printed, "OKOKOK, done");
}

// ─── Metrics ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn timing_metrics_follow_arrival_times() {
    let mut h = harness([Script::timed(&[
        (250, "{\"text\":\"a\"}\n"),
        (40, "{\"text\":\"b\"}\n"),
        (60, "{\"text\":\"c\"}\n"),
        (10, "{\"finished\":true}\n"),
    ])]);
    let monitor = Arc::clone(&h.monitor);

    let mut turn = h.consumer.begin_turn("q", None);
    while let Some(increment) = turn.next_increment().await {
        let live = monitor.live(Instant::now());
        assert_eq!(live.tokens_generated, increment.index);
        assert!(live.streaming);
    }
    let summary = turn.finish().await.unwrap().summary;

    let ttft = summary.ttft_ms.unwrap();
    assert!((250.0..252.0).contains(&ttft), "ttft {ttft}");
    let itl = summary.avg_itl_ms.unwrap();
    assert!((49.0..52.0).contains(&itl), "itl {itl}");
    assert_eq!(summary.itl_us.count, 2);
    assert_eq!(summary.instantaneous_tps, 3);
    assert!((360.0..364.0).contains(&summary.e2e_ms), "e2e {}", summary.e2e_ms);
}

#[tokio::test(start_paused = true)]
async fn renders_are_throttled_to_the_interval() {
    let mut h = harness([Script::timed(&[
        (0, "{\"text\":\"a\"}\n"),
        (30, "{\"text\":\"b\"}\n"),
        (30, "{\"text\":\"c\"}\n"),
        (140, "{\"text\":\"d\"}\n"),
        (10, "{\"finished\":true}\n"),
    ])]);

    let report = h.consumer.begin_turn("q", None).finish().await.unwrap();
    assert_eq!(report.response, "abcd");
    assert_eq!(*h.renderer.renders.lock(), vec!["a", "abcd", "abcd"]);
}

#[tokio::test(start_paused = true)]
async fn history_keeps_the_last_ten_turns() {
    let scripts = (0..11).map(|i| {
        let tokens: String = (0..=i).map(|_| "{\"text\":\"x\"}\n").collect();
        Script::body(&[tokens.as_str(), "{\"finished\":true}\n"])
    });
    let mut h = harness(scripts.collect::<Vec<_>>());

    for _ in 0..11 {
        h.consumer.begin_turn("q", None).finish().await.unwrap();
    }

    let history = h.monitor.history();
    assert_eq!(history.len(), 10);
    // First turn produced one token; it is gone from every series
    let counts: Vec<u64> = history.iter().map(|e| e.token_count).collect();
    assert_eq!(counts, (2..=11).collect::<Vec<u64>>());
}

// ─── Cancellation ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn cancel_handle_stops_a_stalled_stream() {
    let mut h = harness([Script::Stall]);
    let mut events = h.consumer.subscribe();

    let mut turn = h.consumer.begin_turn("q", None);
    let cancel = turn.cancel_handle();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
    });

    assert_eq!(turn.next_increment().await, None);
    let report = turn.finish().await.expect("cancellation is not an error");
    assert!(report.cancelled);
    assert_eq!(report.summary.status, TurnStatus::Cancelled);

    let events = drain(&mut events);
    assert!(matches!(
        events.last(),
        Some(TurnEvent::Completed { error: None, cancelled: true, .. })
    ));
    assert_eq!(h.monitor.history()[0].status, TurnStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn dropping_a_turn_finalizes_it_as_cancelled() {
    let mut h = harness([Script::Stall]);
    {
        let mut turn = h.consumer.begin_turn("q", None);
        turn.cancel();
        assert!(turn.is_finished());
    }
    {
        let _turn = h.consumer.begin_turn("again", None);
    }

    let history = h.monitor.history();
    assert_eq!(history.len(), 2);
    assert!(history.iter().all(|e| e.status == TurnStatus::Cancelled));
    assert!(!h.monitor.is_streaming());
}

// ─── Request / session ───────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn request_carries_prompt_session_and_stream_flag() {
    let mut h = harness([Script::body(&["{\"finished\":true}\n"])]);
    h.consumer.begin_turn("hello", Some("s1")).finish().await.unwrap();

    let requests = h.backend.requests.lock();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].prompt, "hello");
    assert_eq!(requests[0].session_id.as_deref(), Some("s1"));
    assert!(requests[0].stream);
    assert_eq!(requests[0].params.max_tokens, 2048);
}

#[tokio::test(start_paused = true)]
async fn new_session_id_is_reported_for_adoption() {
    let mut h = harness([
        Script::body(&["{\"text\":\"a\"}\n{\"finished\":true,\"session_id\":\"srv-2\"}\n"]),
        Script::body(&["{\"text\":\"a\"}\n{\"finished\":true,\"session_id\":\"srv-2\"}\n"]),
    ]);

    let report = h.consumer.begin_turn("q", Some("s1")).finish().await.unwrap();
    assert_eq!(report.adopted_session.as_deref(), Some("srv-2"));

    let report = h.consumer.begin_turn("q", Some("srv-2")).finish().await.unwrap();
    assert_eq!(report.adopted_session, None);
}
