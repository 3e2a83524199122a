//! Seams to the quiz platform's content and evaluation services.
//!
//! The engine does not own question content or correctness rules — the
//! surrounding platform's CRUD services do. Two traits mark the seam:
//!
//! - [`QuestionSource`] — supplies the board layout, the question bound
//!   to a Point, and the exam bound to a phase.
//! - [`AnswerChecker`] — evaluates an answer and returns a boolean.
//!
//! [`StaticSource`] implements both from in-memory tables; demos and
//! tests use it in place of the real services.

use std::collections::HashMap;

use quizforge_protocol::{ExamId, ExamQuestionView, PhaseId, PointId, QuestionId, QuestionView};

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// A question as the engine sees it. The expected answer never leaves
/// the checker; this struct is what can safely reach the wire.
#[derive(Debug, Clone)]
pub struct QuestionSpec {
    pub id: QuestionId,
    pub topic: String,
    pub prompt: String,
    pub hint: Option<String>,
}

impl QuestionSpec {
    /// The client-visible view for `openModal` / `questionRestore`.
    pub fn view(&self) -> QuestionView {
        QuestionView {
            question_id: self.id,
            topic: self.topic.clone(),
            prompt: self.prompt.clone(),
            hint: self.hint.clone(),
        }
    }

    /// The client-visible view for `examStart` / `examRestore`.
    pub fn exam_view(&self) -> ExamQuestionView {
        ExamQuestionView {
            question_id: self.id,
            prompt: self.prompt.clone(),
            hint: self.hint.clone(),
        }
    }
}

/// A phase exam: an ordered list of questions taken in one sitting.
#[derive(Debug, Clone)]
pub struct ExamSpec {
    pub id: ExamId,
    pub phase: PhaseId,
    pub questions: Vec<QuestionSpec>,
}

/// One board node as supplied by the content service.
#[derive(Debug, Clone)]
pub struct PointSpec {
    pub id: PointId,
    pub topic_id: u64,
    pub phase: PhaseId,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Supplies board layout and activity content for new rooms.
pub trait QuestionSource: Send + Sync + 'static {
    /// The board every new room in this deployment starts from.
    fn board(&self) -> Vec<PointSpec>;

    /// The question bound to a Point, if the Point exists.
    fn question_for_point(&self, point: PointId) -> Option<QuestionSpec>;

    /// The exam closing out a phase, if the phase has one.
    fn exam_for_phase(&self, phase: PhaseId) -> Option<ExamSpec>;
}

/// Evaluates answers. The engine hands over the question id and the raw
/// answer text and receives a verdict; how the verdict is produced
/// (string match, fuzzy match, a remote service) is not its concern.
pub trait AnswerChecker: Send + Sync + 'static {
    fn check(&self, question: QuestionId, answer: &str) -> bool;
}

// ---------------------------------------------------------------------------
// StaticSource — in-memory implementation for demos and tests
// ---------------------------------------------------------------------------

/// An in-memory [`QuestionSource`] + [`AnswerChecker`].
///
/// Answers compare case-insensitively after trimming.
#[derive(Debug, Default)]
pub struct StaticSource {
    points: Vec<PointSpec>,
    questions: HashMap<PointId, QuestionSpec>,
    exams: HashMap<PhaseId, ExamSpec>,
    answers: HashMap<QuestionId, String>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a Point with its question and expected answer.
    pub fn with_point(
        mut self,
        point: PointSpec,
        question: QuestionSpec,
        answer: impl Into<String>,
    ) -> Self {
        self.answers.insert(question.id, answer.into());
        self.questions.insert(point.id, question);
        self.points.push(point);
        self
    }

    /// Adds a phase exam with expected answers per question.
    pub fn with_exam(mut self, exam: ExamSpec, answers: Vec<String>) -> Self {
        for (question, answer) in exam.questions.iter().zip(answers) {
            self.answers.insert(question.id, answer);
        }
        self.exams.insert(exam.phase, exam);
        self
    }
}

impl QuestionSource for StaticSource {
    fn board(&self) -> Vec<PointSpec> {
        self.points.clone()
    }

    fn question_for_point(&self, point: PointId) -> Option<QuestionSpec> {
        self.questions.get(&point).cloned()
    }

    fn exam_for_phase(&self, phase: PhaseId) -> Option<ExamSpec> {
        self.exams.get(&phase).cloned()
    }
}

impl AnswerChecker for StaticSource {
    fn check(&self, question: QuestionId, answer: &str) -> bool {
        self.answers
            .get(&question)
            .is_some_and(|expected| expected.trim().eq_ignore_ascii_case(answer.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> StaticSource {
        StaticSource::new().with_point(
            PointSpec { id: PointId(1), topic_id: 10, phase: PhaseId(0) },
            QuestionSpec {
                id: QuestionId(100),
                topic: "history".into(),
                prompt: "When did the French Revolution begin?".into(),
                hint: None,
            },
            "1789",
        )
    }

    #[test]
    fn test_question_for_point_returns_bound_question() {
        let s = source();
        let q = s.question_for_point(PointId(1)).unwrap();
        assert_eq!(q.id, QuestionId(100));
    }

    #[test]
    fn test_question_for_unknown_point_returns_none() {
        assert!(source().question_for_point(PointId(99)).is_none());
    }

    #[test]
    fn test_check_is_trimmed_and_case_insensitive() {
        let s = source();
        assert!(s.check(QuestionId(100), "1789"));
        assert!(s.check(QuestionId(100), "  1789  "));
        assert!(!s.check(QuestionId(100), "1790"));
    }

    #[test]
    fn test_check_unknown_question_is_incorrect() {
        assert!(!source().check(QuestionId(999), "anything"));
    }

    #[test]
    fn test_view_never_contains_answer() {
        let s = source();
        let view = s.question_for_point(PointId(1)).unwrap().view();
        let dump = format!("{view:?}");
        assert!(!dump.contains("1789"), "answer text leaked into the view");
    }
}
