//! Demo Quizforge server: a static two-phase trivia board.
//!
//! Run with `cargo run -p trivia-night`, then point quiz clients at
//! ws://127.0.0.1:8080. Any numeric token authenticates (development
//! only).

use std::sync::Arc;

use quizforge::QuizforgeServerBuilder;
use quizforge_lobby::{ExamSpec, LobbyConfig, PointSpec, QuestionSpec, StaticSource};
use quizforge_protocol::{ExamId, PhaseId, PlayerId, PointId, QuestionId};
use quizforge_session::{Authenticator, SessionError};

// ---------------------------------------------------------------------------
// Content
// ---------------------------------------------------------------------------

fn question(id: u64, topic: &str, prompt: &str, hint: &str) -> QuestionSpec {
    QuestionSpec {
        id: QuestionId(id),
        topic: topic.into(),
        prompt: prompt.into(),
        hint: Some(hint.into()),
    }
}

/// Two phases of history/science points with a phase-0 exam.
fn build_source() -> StaticSource {
    StaticSource::new()
        .with_point(
            PointSpec { id: PointId(1), topic_id: 1, phase: PhaseId(0) },
            question(
                101,
                "history",
                "In which year did the French Revolution begin?",
                "Late 18th century",
            ),
            "1789",
        )
        .with_point(
            PointSpec { id: PointId(2), topic_id: 2, phase: PhaseId(0) },
            question(
                102,
                "science",
                "What is the chemical symbol for gold?",
                "From the Latin aurum",
            ),
            "Au",
        )
        .with_point(
            PointSpec { id: PointId(3), topic_id: 3, phase: PhaseId(1) },
            question(
                103,
                "geography",
                "Which river is the longest in Europe?",
                "It flows into the Caspian Sea",
            ),
            "Volga",
        )
        .with_exam(
            ExamSpec {
                id: ExamId(1),
                phase: PhaseId(0),
                questions: vec![
                    question(201, "history", "Who crossed the Rubicon in 49 BC?", "Alea iacta est"),
                    question(202, "science", "How many planets orbit the Sun?", "Pluto retired"),
                    question(203, "history", "Which empire built Machu Picchu?", "Andean"),
                ],
            },
            vec!["Caesar".into(), "8".into(), "Inca".into()],
        )
}

// ---------------------------------------------------------------------------
// Server bootstrap
// ---------------------------------------------------------------------------

/// Accepts any numeric token as the player id. Development only.
struct TokenAuth;

impl Authenticator for TokenAuth {
    async fn authenticate(&self, token: &str) -> Result<PlayerId, SessionError> {
        let id: u64 = token
            .parse()
            .map_err(|_| SessionError::AuthFailed("token must be a number".into()))?;
        Ok(PlayerId(id))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let source = Arc::new(build_source());

    let server = QuizforgeServerBuilder::new()
        .bind("127.0.0.1:8080")
        .lobby_config(LobbyConfig::default())
        .build(TokenAuth, source.clone(), source)
        .await?;

    tracing::info!(addr = %server.local_addr()?, "trivia-night lobby up");
    server.run().await?;
    Ok(())
}
