//! Integration tests for the lobby engine, driven through the registry
//! and relay handles like a real server would.
//!
//! Time is virtual (`start_paused = true`): countdown and supervisor
//! deadlines fire exactly when the clock is advanced past them, never
//! earlier. Commands are fire-and-forget, so tests `settle()` (yield
//! until the actor has drained its stream) before inspecting events.

use std::sync::Arc;
use std::time::Duration;

use quizforge_lobby::{
    ExamSpec, LobbyConfig, LobbyError, LobbyRegistry, PointSpec, QuestionSpec, StaticSource,
};
use quizforge_protocol::{
    ClientCommand, ExamId, PhaseId, PlayerId, PointId, PointStatus, QuestionId, RoomEvent,
    RoomId,
};
use tokio::sync::mpsc;
use tokio::time;

// =========================================================================
// Fixtures
// =========================================================================

fn pid(id: u64) -> PlayerId {
    PlayerId(id)
}

fn test_config() -> LobbyConfig {
    LobbyConfig {
        max_players: 4,
        question_time: Duration::from_secs(30),
        exam_question_time: Duration::from_secs(20),
        reconnect_wait: Duration::from_secs(10),
        exam_pass_threshold: 1.0,
        correct_reward: 10,
        exam_reward: 50,
        idle_timeout: Duration::from_secs(60),
    }
}

fn question(id: u64, prompt: &str) -> QuestionSpec {
    QuestionSpec {
        id: QuestionId(id),
        topic: "history".into(),
        prompt: prompt.into(),
        hint: None,
    }
}

/// Two phase-0 points, one phase-1 point, and a 5-question phase-0 exam.
fn test_source() -> StaticSource {
    let exam_questions: Vec<QuestionSpec> =
        (1..=5).map(|i| question(200 + i, &format!("exam q{i}"))).collect();
    let exam_answers: Vec<String> = (1..=5).map(|i| format!("e{i}")).collect();

    StaticSource::new()
        .with_point(
            PointSpec { id: PointId(1), topic_id: 10, phase: PhaseId(0) },
            question(101, "q one"),
            "a1",
        )
        .with_point(
            PointSpec { id: PointId(2), topic_id: 20, phase: PhaseId(0) },
            question(102, "q two"),
            "a2",
        )
        .with_point(
            PointSpec { id: PointId(3), topic_id: 30, phase: PhaseId(1) },
            question(103, "q three"),
            "a3",
        )
        .with_exam(
            ExamSpec { id: ExamId(1), phase: PhaseId(0), questions: exam_questions },
            exam_answers,
        )
}

fn registry() -> LobbyRegistry {
    let source = Arc::new(test_source());
    LobbyRegistry::new(test_config(), source.clone(), source)
}

type EventRx = mpsc::UnboundedReceiver<RoomEvent>;

/// Joins a player and returns their event stream.
async fn join(reg: &mut LobbyRegistry, room: u64, player: u64, name: &str) -> EventRx {
    let (tx, rx) = mpsc::unbounded_channel();
    reg.join(pid(player), RoomId(room), name.into(), tx)
        .await
        .expect("join should succeed");
    rx
}

/// Lets the room actor drain its command stream.
async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Pulls everything currently queued for one socket.
fn drain(rx: &mut EventRx) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Walks player A through completing both phase-0 points so the exam
/// becomes openable. Returns with A holding the turn again.
async fn clear_phase_zero(reg: &mut LobbyRegistry, a: u64, b: u64) {
    // A answers point 1, turn passes to B; B answers point 2, turn
    // returns to A.
    reg.command(pid(a), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    reg.command(pid(a), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;
    reg.command(pid(b), ClientCommand::OpenPoint { point_id: PointId(2) })
        .await
        .unwrap();
    settle().await;
    reg.command(pid(b), ClientCommand::Answer { point_id: PointId(2), answer: "a2".into() })
        .await
        .unwrap();
    settle().await;
}

// =========================================================================
// Membership and registry
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_join_creates_room_lazily() {
    let mut reg = registry();
    assert_eq!(reg.room_count(), 0);

    let _rx = join(&mut reg, 7, 1, "Ada").await;

    assert_eq!(reg.room_count(), 1);
    assert_eq!(reg.room_of(&pid(1)), Some(RoomId(7)));
}

#[tokio::test(start_paused = true)]
async fn test_join_second_room_rejected() {
    let mut reg = registry();
    let _rx = join(&mut reg, 7, 1, "Ada").await;

    let (tx, _rx2) = mpsc::unbounded_channel();
    let result = reg.join(pid(1), RoomId(8), "Ada".into(), tx).await;

    assert!(matches!(result, Err(LobbyError::AlreadyInRoom(p, r)) if p == pid(1) && r == RoomId(7)));
}

#[tokio::test(start_paused = true)]
async fn test_first_joiner_gets_turn_and_init_scores() {
    let mut reg = registry();
    let mut rx = join(&mut reg, 7, 1, "Ada").await;

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(1)
    )));
    assert!(events.iter().any(|e| matches!(e, RoomEvent::InitScores { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_last_leave_evicts_room() {
    let mut reg = registry();
    let _rx = join(&mut reg, 7, 1, "Ada").await;

    reg.leave(pid(1)).await.unwrap();

    assert_eq!(reg.room_count(), 0, "empty room with no activity is evicted");
    assert_eq!(reg.room_of(&pid(1)), None);
}

#[tokio::test(start_paused = true)]
async fn test_evict_idle_sweeps_abandoned_rooms() {
    let mut reg = registry();
    let _rx = join(&mut reg, 7, 1, "Ada").await;

    // Socket drops, nobody comes back.
    reg.dropped(pid(1)).await.unwrap();
    settle().await;

    time::advance(Duration::from_secs(120)).await;
    settle().await;

    let evicted = reg.evict_idle().await;
    assert_eq!(evicted, vec![RoomId(7)]);
    assert_eq!(reg.room_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_evict_idle_spares_live_rooms() {
    let mut reg = registry();
    let _rx = join(&mut reg, 7, 1, "Ada").await;

    time::advance(Duration::from_secs(120)).await;
    settle().await;

    assert!(reg.evict_idle().await.is_empty(), "connected players keep a room alive");
}

// =========================================================================
// Single open activity (§8.1)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_at_most_one_open_activity() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // Same player tries to open the other point while the first is live.
    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(2) })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(
        events.iter().any(|e| matches!(e, RoomEvent::Rejected { .. })),
        "second open must be rejected, got {events:?}"
    );
    assert!(
        !events.iter().any(|e| matches!(e, RoomEvent::OpenModal { .. })),
        "no second modal may open"
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_active_player_cannot_open() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // B does not hold the turn.
    reg.command(pid(2), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|e| matches!(e, RoomEvent::Rejected { .. })));
    assert!(drain(&mut rx_a).is_empty(), "rejection is not broadcast");
}

// =========================================================================
// Correct answer flow (§8.7)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_correct_answer_completes_point_scores_and_passes_turn() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::UpdatePointStatus { point_id, status }
            if *point_id == PointId(1) && *status == PointStatus::Completed
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Scores { player_id, user_score: 10, session_score: 10 }
            if *player_id == pid(1)
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(2)
    )));

    // B saw the same ordered broadcasts.
    let b_events = drain(&mut rx_b);
    assert!(b_events.iter().any(|e| matches!(e, RoomEvent::Scores { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_wrong_answer_keeps_question_open_until_timeout() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "wrong".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::IncorrectCountUpdate { incorrect_answers: 1 }
    )));
    assert!(
        !events.iter().any(|e| matches!(e, RoomEvent::Users { .. })),
        "turn must not pass on a wrong answer"
    );
    assert!(
        !events.iter().any(|e| matches!(
            e,
            RoomEvent::ActivePointChanged { active_point_id: None }
        )),
        "the countdown, not the answer, ends a question"
    );

    // The countdown ends the question and only then passes the turn.
    time::advance(Duration::from_secs(30)).await;
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ActivePointChanged { active_point_id: None }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(2)
    )));
}

// =========================================================================
// Idempotence (§8.5)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_second_submission_rejected_loudly() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "nope".into() })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(
        events.iter().any(|e| matches!(e, RoomEvent::Rejected { .. })),
        "resubmission within the same activity instance is rejected"
    );
    assert!(
        !events.iter().any(|e| matches!(e, RoomEvent::Scores { .. })),
        "no score mutation from the second submission"
    );
}

#[tokio::test(start_paused = true)]
async fn test_double_correct_answer_scores_exactly_once() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // Client bug: the same answer sent twice back-to-back.
    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    let score_events = events
        .iter()
        .filter(|e| matches!(e, RoomEvent::Scores { .. }))
        .count();
    assert_eq!(score_events, 1, "exactly one score mutation");
}

// =========================================================================
// Timeout-vs-answer race (§8.4)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_wins_over_late_answer_regardless_of_order() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // The clock runs out. The alarm's timeout command and the answer
    // are now both in the stream; the answer happens to be enqueued
    // first, but the authoritative countdown already expired, so the
    // answer is stale and the timeout resolves the activity.
    time::advance(Duration::from_secs(30)).await;
    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(
        !events.iter().any(|e| matches!(e, RoomEvent::Scores { .. })),
        "a late correct answer must not score"
    );
    assert!(
        !events.iter().any(|e| matches!(
            e,
            RoomEvent::UpdatePointStatus { status: PointStatus::Completed, .. }
        )),
        "the point must not complete after the deadline"
    );
    assert!(
        events.iter().any(|e| matches!(
            e,
            RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(2)
        )),
        "the timeout passes the turn exactly once"
    );
}

// =========================================================================
// Countdown observability (§8.3)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_restore_reports_non_increasing_remaining() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    time::advance(Duration::from_secs(10)).await;
    reg.command(pid(1), ClientCommand::CheckActiveQuestion { point_id: Some(PointId(1)) })
        .await
        .unwrap();
    settle().await;
    let first = remaining_from_restore(&drain(&mut rx_a));

    time::advance(Duration::from_secs(5)).await;
    reg.command(pid(1), ClientCommand::CheckActiveQuestion { point_id: Some(PointId(1)) })
        .await
        .unwrap();
    settle().await;
    let second = remaining_from_restore(&drain(&mut rx_a));

    assert_eq!(first, 20_000);
    assert_eq!(second, 15_000);
    assert!(second <= first, "remaining must be non-increasing");
}

fn remaining_from_restore(events: &[RoomEvent]) -> u64 {
    events
        .iter()
        .find_map(|e| match e {
            RoomEvent::QuestionRestore { time_left, .. } => Some(*time_left),
            _ => None,
        })
        .expect("expected a questionRestore event")
}

#[tokio::test(start_paused = true)]
async fn test_premature_client_timeout_gets_timer_reset() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // Client clock drifted: it thinks time is up 12 seconds early.
    time::advance(Duration::from_secs(18)).await;
    reg.command(pid(1), ClientCommand::Timeout { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::TimerReset { time_left: 12_000 }
    )));
    assert!(
        !events.iter().any(|e| matches!(
            e,
            RoomEvent::ActivePointChanged { active_point_id: None }
        )),
        "a premature hint must not close the question"
    );
}

// =========================================================================
// Wrong point / wrong exam self-correction (§7)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wrong_point_answered_with_active_id() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    // B's client is showing a stale board and asks about point 2.
    reg.command(pid(2), ClientCommand::CheckActiveQuestion { point_id: Some(PointId(2)) })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::WrongPoint { requested_id, active_id }
            if *requested_id == PointId(2) && *active_id == PointId(1)
    )));
    assert!(drain(&mut rx_a).is_empty(), "self-correction is targeted");
}

// =========================================================================
// Reconnection supervisor (§8.8, §8.9)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_active_player_disconnect_past_window_resolves_as_timeout() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_b);

    reg.dropped(pid(1)).await.unwrap();
    settle().await;

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ReconnectWaiting { active_player_name, time_left: 10_000 }
            if active_player_name == "Ada"
    )));

    // The wait elapses before the player returns.
    time::advance(Duration::from_secs(10)).await;
    settle().await;

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ReconnectTimeout { player_id } if *player_id == pid(1)
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ActivePointChanged { active_point_id: None }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(2)
    )));
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_inside_window_cancels_wait_and_resumes() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_b);

    reg.dropped(pid(1)).await.unwrap();
    settle().await;
    drain(&mut rx_b);

    // Back 2 seconds before the window closes.
    time::advance(Duration::from_secs(8)).await;
    let (tx, mut rx_a2) = mpsc::unbounded_channel();
    reg.resumed(pid(1), tx).await.unwrap();
    settle().await;

    let events = drain(&mut rx_b);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ReconnectCanceled { active_player_name } if active_player_name == "Ada"
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(1)
    )), "no turn change on a reconnect in time");

    // The rejoining socket alone gets the activity back with the exact
    // remaining time (30s budget minus 8s elapsed).
    let restore = drain(&mut rx_a2);
    assert!(restore.iter().any(|e| matches!(
        e,
        RoomEvent::QuestionRestore { point_id, time_left: 22_000, .. }
            if *point_id == PointId(1)
    )));

    // And the window truly was cancelled: nothing fires later.
    time::advance(Duration::from_secs(30)).await;
    settle().await;
    let late = drain(&mut rx_b);
    assert!(
        !late.iter().any(|e| matches!(e, RoomEvent::ReconnectTimeout { .. })),
        "cancelled supervisor must not fire"
    );
}

#[tokio::test(start_paused = true)]
async fn test_non_active_disconnect_never_starts_a_wait() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    reg.dropped(pid(2)).await.unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(
        !events.iter().any(|e| matches!(e, RoomEvent::ReconnectWaiting { .. })),
        "only the active player's disconnect is supervised"
    );
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(1)
    )));
}

// =========================================================================
// Turn rotation (§8.2)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_turn_rotation_skips_disconnected_players() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let _rx_b = join(&mut reg, 7, 2, "Grace").await;
    let _rx_c = join(&mut reg, 7, 3, "Joan").await;
    drain(&mut rx_a);

    // B drops while it is not their turn.
    reg.dropped(pid(2)).await.unwrap();
    settle().await;
    drain(&mut rx_a);

    // A completes a question; the turn must skip B and land on C.
    reg.command(pid(1), ClientCommand::OpenPoint { point_id: PointId(1) })
        .await
        .unwrap();
    settle().await;
    reg.command(pid(1), ClientCommand::Answer { point_id: PointId(1), answer: "a1".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Users { active_player_id: Some(p), .. } if *p == pid(3)
    )));
}

// =========================================================================
// Exams (§8.6, §8.10)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_exam_locked_until_phase_cleared() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenExam { exam_id: ExamId(1) })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(e, RoomEvent::Rejected { .. })));
    assert!(!events.iter().any(|e| matches!(e, RoomEvent::ExamStart { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_exam_failure_resets_entire_phase_with_counts() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    clear_phase_zero(&mut reg, 1, 2).await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenExam { exam_id: ExamId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // Two correct answers, then a wrong one on question 3.
    for answer in ["e1", "e2"] {
        reg.command(
            pid(1),
            ClientCommand::ExamAnswer { exam_id: ExamId(1), answer: answer.into() },
        )
        .await
        .unwrap();
        settle().await;
        drain(&mut rx_a);
    }
    reg.command(pid(1), ClientCommand::ExamAnswer { exam_id: ExamId(1), answer: "bad".into() })
        .await
        .unwrap();
    settle().await;

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ExamComplete {
            passed: false,
            correct_answers: 2,
            total_questions: 5,
            ..
        }
    )), "failure reports the counts at the failing question: {events:?}");

    // Every phase-0 point is available again — never a subset.
    let reset: Vec<PointId> = events
        .iter()
        .filter_map(|e| match e {
            RoomEvent::UpdatePointStatus { point_id, status: PointStatus::Available } => {
                Some(*point_id)
            }
            _ => None,
        })
        .collect();
    assert!(reset.contains(&PointId(1)));
    assert!(reset.contains(&PointId(2)));
}

#[tokio::test(start_paused = true)]
async fn test_exam_pass_unlocks_next_phase_and_rewards() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    clear_phase_zero(&mut reg, 1, 2).await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenExam { exam_id: ExamId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    for i in 1..=5 {
        reg.command(
            pid(1),
            ClientCommand::ExamAnswer { exam_id: ExamId(1), answer: format!("e{i}") },
        )
        .await
        .unwrap();
        settle().await;
        if i < 5 {
            let events = drain(&mut rx_a);
            assert!(events.iter().any(|e| matches!(
                e,
                RoomEvent::ExamNext { index, .. } if *index == i
            )), "question {i} should advance: {events:?}");
        }
    }

    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ExamComplete { passed: true, correct_answers: 5, total_questions: 5, .. }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::Scores { player_id, .. } if *player_id == pid(1)
    )), "exam reward granted");
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::UpdatePointStatus { point_id, status: PointStatus::Available }
            if *point_id == PointId(3)
    )), "next phase unlocks");
}

#[tokio::test(start_paused = true)]
async fn test_exam_timeout_counts_question_incorrect() {
    let mut reg = registry();
    let mut rx_a = join(&mut reg, 7, 1, "Ada").await;
    let mut rx_b = join(&mut reg, 7, 2, "Grace").await;
    drain(&mut rx_a);
    drain(&mut rx_b);

    clear_phase_zero(&mut reg, 1, 2).await;
    drain(&mut rx_a);

    reg.command(pid(1), ClientCommand::OpenExam { exam_id: ExamId(1) })
        .await
        .unwrap();
    settle().await;
    drain(&mut rx_a);

    // Nobody answers the first exam question.
    time::advance(Duration::from_secs(20)).await;
    settle().await;

    // Threshold 1.0: the timed-out question makes passing unreachable.
    let events = drain(&mut rx_a);
    assert!(events.iter().any(|e| matches!(
        e,
        RoomEvent::ExamComplete { passed: false, correct_answers: 0, total_questions: 5, .. }
    )), "exam timeout resolves the question as incorrect: {events:?}");
}
