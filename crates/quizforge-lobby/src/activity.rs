//! The Activity State Machine.
//!
//! At most one activity — a Point question or a phase exam — is open
//! per session, and it is the lock on its Point. Lifecycles:
//!
//! ```text
//! Question:  Idle → Open → Closed (→ Idle)
//! Exam:      Idle → Open(q0) → Open(q1) … → Passed | Failed → Closed
//! ```
//!
//! Every open, exam advance, and close bumps the slot's [`Generation`].
//! Timeout commands carry the generation they were armed with; a
//! mismatch means the activity they belong to is already resolved and
//! the command is discarded. Answers are checked against the
//! authoritative countdown instead: an answer processed after the
//! deadline is stale even if it was dequeued before the timeout
//! command, so the timeout always wins the race regardless of arrival
//! order.
//!
//! A wrong answer does **not** close a Question — the countdown does.
//! The asymmetry (correct ends the question immediately, wrong waits
//! for the clock) is the product's rule, preserved here.

use std::fmt;

use quizforge_protocol::{ExamId, PlayerId, PointId, PointStatus, RoomEvent};
use quizforge_timer::Countdown;

use crate::sources::{AnswerChecker, ExamSpec, QuestionSource, QuestionSpec};
use crate::state::{LobbyState, Outcome, SupervisorDirective, TimerDirective};
use crate::turns;
use crate::LobbyError;

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Monotonically increasing tag for activity instances. Stale commands
/// (a timeout for an activity that already closed, an answer for an
/// exam question that already advanced) are discarded by comparing
/// generations, never by comparing arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Activities
// ---------------------------------------------------------------------------

/// An open Point question.
#[derive(Debug)]
pub struct QuestionActivity {
    pub point_id: PointId,
    pub question: QuestionSpec,
    pub countdown: Countdown,
    /// Who already submitted (and was wrong). One submission per
    /// activity instance; a second is rejected, not silently ignored.
    pub attempted_by: Option<PlayerId>,
}

/// An open phase exam, taken one question at a time.
#[derive(Debug)]
pub struct ExamActivity {
    pub spec: ExamSpec,
    pub index: usize,
    pub correct_count: u32,
    /// Restarted for every question.
    pub countdown: Countdown,
}

impl ExamActivity {
    pub fn total(&self) -> u32 {
        self.spec.questions.len() as u32
    }

    pub fn current_question(&self) -> Option<&QuestionSpec> {
        self.spec.questions.get(self.index)
    }
}

/// The single in-flight activity of a session.
#[derive(Debug)]
pub enum Activity {
    Question(QuestionActivity),
    Exam(ExamActivity),
}

// ---------------------------------------------------------------------------
// ActivitySlot
// ---------------------------------------------------------------------------

/// Holder for the session's current activity plus its generation.
#[derive(Debug)]
pub struct ActivitySlot {
    generation: Generation,
    current: Option<Activity>,
}

impl ActivitySlot {
    pub fn new() -> Self {
        Self { generation: Generation(0), current: None }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn current(&self) -> Option<&Activity> {
        self.current.as_ref()
    }

    /// The Point the open activity is bound to, if it is a question.
    pub fn active_point(&self) -> Option<PointId> {
        match &self.current {
            Some(Activity::Question(q)) => Some(q.point_id),
            _ => None,
        }
    }

    pub fn question(&self) -> Option<&QuestionActivity> {
        match &self.current {
            Some(Activity::Question(q)) => Some(q),
            _ => None,
        }
    }

    pub fn question_mut(&mut self) -> Option<&mut QuestionActivity> {
        match &mut self.current {
            Some(Activity::Question(q)) => Some(q),
            _ => None,
        }
    }

    pub fn exam(&self) -> Option<&ExamActivity> {
        match &self.current {
            Some(Activity::Exam(e)) => Some(e),
            _ => None,
        }
    }

    pub fn exam_mut(&mut self) -> Option<&mut ExamActivity> {
        match &mut self.current {
            Some(Activity::Exam(e)) => Some(e),
            _ => None,
        }
    }

    /// The open activity's countdown, whichever kind it is.
    pub fn countdown(&self) -> Option<&Countdown> {
        match &self.current {
            Some(Activity::Question(q)) => Some(&q.countdown),
            Some(Activity::Exam(e)) => Some(&e.countdown),
            None => None,
        }
    }

    /// Binds a new activity and bumps the generation.
    pub(crate) fn open(&mut self, activity: Activity) {
        self.bump();
        self.current = Some(activity);
    }

    /// Unbinds the current activity and bumps the generation, so any
    /// command armed for the old instance is stale from here on.
    pub(crate) fn close(&mut self) -> Option<Activity> {
        self.bump();
        self.current.take()
    }

    pub(crate) fn bump(&mut self) {
        self.generation.0 += 1;
    }
}

impl Default for ActivitySlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `correct` out of `total` meets the configured threshold.
/// The epsilon absorbs float noise in `threshold * total`.
fn meets_threshold(correct: u32, total: u32, threshold: f64) -> bool {
    if total == 0 {
        return true;
    }
    correct as f64 >= threshold * total as f64 - 1e-9
}

// ---------------------------------------------------------------------------
// State machine operations
// ---------------------------------------------------------------------------

impl LobbyState {
    /// Opens the question bound to an available Point.
    pub fn open_question(
        &mut self,
        player: PlayerId,
        point_id: PointId,
        source: &dyn QuestionSource,
    ) -> Result<Outcome, LobbyError> {
        turns::ensure_turn(self.active_player, player)?;
        if self.slot.is_open() {
            return Err(LobbyError::ActivityAlreadyOpen);
        }

        let point = self
            .board
            .point(point_id)
            .ok_or(LobbyError::UnknownPoint(point_id))?;
        if point.status != PointStatus::Available {
            return Err(LobbyError::PointNotAvailable(point_id));
        }
        let question = source
            .question_for_point(point_id)
            .ok_or(LobbyError::UnknownPoint(point_id))?;

        let countdown = Countdown::start(self.config.question_time);
        let deadline = countdown.deadline();
        let time_left = countdown.remaining_millis();
        let view = question.view();

        self.slot.open(Activity::Question(QuestionActivity {
            point_id,
            question,
            countdown,
            attempted_by: None,
        }));

        tracing::info!(
            room_id = %self.room_id,
            %player,
            %point_id,
            "question opened"
        );

        let mut out = Outcome::new();
        out.broadcast(RoomEvent::ActivePointChanged { active_point_id: Some(point_id) });
        out.broadcast(RoomEvent::OpenModal { point_id, question: view, time_left });
        out.timer = TimerDirective::Arm { deadline, generation: self.slot.generation() };
        Ok(out)
    }

    /// Starts the current phase's exam.
    pub fn open_exam(
        &mut self,
        player: PlayerId,
        exam_id: ExamId,
        source: &dyn QuestionSource,
    ) -> Result<Outcome, LobbyError> {
        turns::ensure_turn(self.active_player, player)?;
        if self.slot.is_open() {
            return Err(LobbyError::ActivityAlreadyOpen);
        }

        let exam = source
            .exam_for_phase(self.board.current_phase())
            .ok_or(LobbyError::ExamNotReady(exam_id))?;
        if exam.id != exam_id {
            return Err(LobbyError::WrongExam { requested: exam_id, active: exam.id });
        }
        if !self.board.phase_cleared() {
            return Err(LobbyError::ExamNotReady(exam_id));
        }

        let countdown = Countdown::start(self.config.exam_question_time);
        let deadline = countdown.deadline();
        let time_left = countdown.remaining_millis();
        let questions = exam.questions.iter().map(|q| q.exam_view()).collect();

        self.slot.open(Activity::Exam(ExamActivity {
            spec: exam,
            index: 0,
            correct_count: 0,
            countdown,
        }));

        tracing::info!(room_id = %self.room_id, %player, %exam_id, "exam started");

        let mut out = Outcome::new();
        out.broadcast(RoomEvent::ExamStart {
            exam_id,
            questions,
            index: 0,
            time_left,
        });
        out.timer = TimerDirective::Arm { deadline, generation: self.slot.generation() };
        Ok(out)
    }

    /// Answers the open Point question.
    pub fn submit_answer(
        &mut self,
        player: PlayerId,
        point_id: PointId,
        answer: &str,
        checker: &dyn AnswerChecker,
    ) -> Result<Outcome, LobbyError> {
        turns::ensure_turn(self.active_player, player)?;

        let (question_id, active_point, expired, attempted) = match self.slot.question() {
            // No open question: either nothing is open (a late answer
            // racing the close) or an exam holds the slot.
            None if self.slot.is_open() => return Err(LobbyError::ActivityAlreadyOpen),
            None => return Err(LobbyError::StaleGeneration),
            Some(q) => (
                q.question.id,
                q.point_id,
                q.countdown.is_expired(),
                q.attempted_by.is_some(),
            ),
        };

        if active_point != point_id {
            return Err(LobbyError::WrongPoint { requested: point_id, active: active_point });
        }
        if expired {
            // The countdown already ran out; the timeout command is in
            // the stream. Generation rule: the timeout wins.
            return Err(LobbyError::StaleGeneration);
        }
        if attempted {
            return Err(LobbyError::AlreadySubmitted);
        }

        let mut out = Outcome::new();
        if checker.check(question_id, answer) {
            self.slot.close();
            if let Some((id, status)) = self.board.complete(point_id) {
                out.broadcast(RoomEvent::UpdatePointStatus { point_id: id, status });
            }
            let (user_score, session_score) =
                self.scores.award(player, self.config.correct_reward);
            out.broadcast(RoomEvent::Scores { player_id: player, user_score, session_score });
            out.broadcast(RoomEvent::ActivePointChanged { active_point_id: None });
            out.timer = TimerDirective::Cancel;
            self.pass_turn(&mut out);
            tracing::info!(room_id = %self.room_id, %player, %point_id, "correct answer");
        } else {
            if let Some(q) = self.slot.question_mut() {
                q.attempted_by = Some(player);
            }
            self.scores.incorrect_answers += 1;
            out.broadcast(RoomEvent::IncorrectCountUpdate {
                incorrect_answers: self.scores.incorrect_answers,
            });
            // The question stays open until its countdown ends; the
            // turn passes at that timeout, not now.
            tracing::info!(room_id = %self.room_id, %player, %point_id, "incorrect answer");
        }
        Ok(out)
    }

    /// Answers the current exam question.
    pub fn submit_exam_answer(
        &mut self,
        player: PlayerId,
        exam_id: ExamId,
        answer: &str,
        checker: &dyn AnswerChecker,
    ) -> Result<Outcome, LobbyError> {
        turns::ensure_turn(self.active_player, player)?;

        let (active_exam, question_id, expired) = match self.slot.exam() {
            None if self.slot.is_open() => return Err(LobbyError::ActivityAlreadyOpen),
            None => return Err(LobbyError::StaleGeneration),
            Some(e) => {
                let question = e.current_question().ok_or(LobbyError::StaleGeneration)?;
                (e.spec.id, question.id, e.countdown.is_expired())
            }
        };

        if active_exam != exam_id {
            return Err(LobbyError::WrongExam { requested: exam_id, active: active_exam });
        }
        if expired {
            // Each exam question bumps the generation when it opens, so
            // an answer that outlived its question's clock is stale.
            return Err(LobbyError::StaleGeneration);
        }

        let mut out = Outcome::new();
        let correct = checker.check(question_id, answer);
        if !correct {
            self.scores.incorrect_answers += 1;
            out.broadcast(RoomEvent::IncorrectCountUpdate {
                incorrect_answers: self.scores.incorrect_answers,
            });
        }
        self.advance_exam(correct, &mut out);
        Ok(out)
    }

    /// The Timer Service's authoritative timeout, serialized into the
    /// command stream.
    pub fn activity_timeout(&mut self, generation: Generation) -> Result<Outcome, LobbyError> {
        if !self.slot.is_open() || generation != self.slot.generation() {
            return Err(LobbyError::StaleGeneration);
        }

        tracing::info!(room_id = %self.room_id, %generation, "activity timed out");

        let mut out = Outcome::new();
        if self.slot.question().is_some() {
            self.close_question_on_timeout(&mut out);
            self.pass_turn(&mut out);
        } else {
            // An unanswered exam question counts as incorrect.
            self.advance_exam(false, &mut out);
        }
        Ok(out)
    }

    /// The Reconnection Supervisor's wait elapsed: resolve the absent
    /// player's activity as a timeout and move the turn past them.
    ///
    /// Staleness of the wake-up itself is the relay's job (it compares
    /// the fired alarm against the one it armed); here only the pending
    /// state matters. The slot generation may legitimately have moved —
    /// an exam advancing on its own per-question clock bumps it without
    /// ending the wait.
    pub fn supervisor_timeout(&mut self, player: PlayerId) -> Result<Outcome, LobbyError> {
        if self.reconnect_pending != Some(player) {
            return Err(LobbyError::StaleGeneration);
        }
        self.reconnect_pending = None;

        tracing::info!(room_id = %self.room_id, %player, "reconnection window elapsed");

        let mut out = Outcome::new();
        out.broadcast(RoomEvent::ReconnectTimeout { player_id: player });
        if self.slot.is_open() {
            self.close_activity_as_timeout(&mut out);
        }
        self.pass_turn(&mut out);
        Ok(out)
    }

    /// A client's own countdown hit zero. A hint only: if the
    /// authoritative clock agrees, this resolves exactly like the Timer
    /// Service's command; if not, the sender alone gets the true
    /// remaining time to resynchronize.
    pub fn client_timeout_hint(
        &mut self,
        player: PlayerId,
        point_id: PointId,
    ) -> Result<Outcome, LobbyError> {
        let (active_point, expired, remaining) = match self.slot.question() {
            None => return Err(LobbyError::StaleGeneration),
            Some(q) => (q.point_id, q.countdown.is_expired(), q.countdown.remaining_millis()),
        };
        if active_point != point_id {
            return Err(LobbyError::WrongPoint { requested: point_id, active: active_point });
        }

        if expired {
            self.activity_timeout(self.slot.generation())
        } else {
            let mut out = Outcome::new();
            out.to(player, RoomEvent::TimerReset { time_left: remaining });
            Ok(out)
        }
    }

    /// Re-sync request for the open question (reconnection flow).
    pub fn check_active_question(
        &mut self,
        player: PlayerId,
        point_id: Option<PointId>,
    ) -> Result<Outcome, LobbyError> {
        let mut out = Outcome::new();
        match self.slot.question() {
            Some(question) => {
                if let Some(requested) = point_id {
                    if requested != question.point_id {
                        return Err(LobbyError::WrongPoint {
                            requested,
                            active: question.point_id,
                        });
                    }
                }
                out.to(
                    player,
                    RoomEvent::QuestionRestore {
                        point_id: question.point_id,
                        question: question.question.view(),
                        time_left: question.countdown.remaining_millis(),
                    },
                );
            }
            None => {
                // Nothing to restore; clear any stale modal the client
                // may still be showing.
                out.to(player, RoomEvent::ActivePointChanged {
                    active_point_id: self.slot.active_point(),
                });
            }
        }
        Ok(out)
    }

    /// Re-sync request for the open exam (reconnection flow).
    pub fn check_active_exam(
        &mut self,
        player: PlayerId,
        exam_id: Option<ExamId>,
    ) -> Result<Outcome, LobbyError> {
        let mut out = Outcome::new();
        if let Some(exam) = self.slot.exam() {
            if let Some(requested) = exam_id {
                if requested != exam.spec.id {
                    return Err(LobbyError::WrongExam { requested, active: exam.spec.id });
                }
            }
            out.to(
                player,
                RoomEvent::ExamRestore {
                    exam_id: exam.spec.id,
                    questions: exam.spec.questions.iter().map(|q| q.exam_view()).collect(),
                    index: exam.index,
                    correct_count: exam.correct_count,
                    time_left: exam.countdown.remaining_millis(),
                },
            );
        }
        Ok(out)
    }

    // -----------------------------------------------------------------
    // Internal resolution helpers
    // -----------------------------------------------------------------

    /// Closes the open question with no completion: the Point stays
    /// available for a later turn.
    fn close_question_on_timeout(&mut self, out: &mut Outcome) {
        self.slot.close();
        out.broadcast(RoomEvent::TimerReset { time_left: 0 });
        out.broadcast(RoomEvent::ActivePointChanged { active_point_id: None });
        out.timer = TimerDirective::Cancel;
        self.cancel_moot_wait(out);
    }

    /// Timeout-equivalent resolution of whatever is open, used when the
    /// holder is gone for good (supervisor expiry, explicit leave).
    /// Questions close without completion; exams fail with their
    /// current counts.
    pub(crate) fn close_activity_as_timeout(&mut self, out: &mut Outcome) {
        if self.slot.question().is_some() {
            self.close_question_on_timeout(out);
        } else if self.slot.exam().is_some() {
            self.complete_exam(false, out);
        }
    }

    /// Resolves the current exam question and either advances to the
    /// next one, or completes the exam when it is finished — or when no
    /// remaining answer could reach the pass threshold.
    fn advance_exam(&mut self, correct: bool, out: &mut Outcome) {
        let threshold = self.config.exam_pass_threshold;
        let (finished, doomed, passed) = {
            let Some(exam) = self.slot.exam_mut() else { return };
            if correct {
                exam.correct_count += 1;
            }
            exam.index += 1;

            let total = exam.total();
            let answered = exam.index as u32;
            let reachable = exam.correct_count + (total - answered);
            (
                answered >= total,
                !meets_threshold(reachable, total, threshold),
                meets_threshold(exam.correct_count, total, threshold),
            )
        };

        if finished {
            self.complete_exam(passed, out);
            self.pass_turn(out);
        } else if doomed {
            // No remaining answer can reach the threshold — fail now
            // instead of walking through unwinnable questions.
            self.complete_exam(false, out);
            self.pass_turn(out);
        } else {
            let Some(exam) = self.slot.exam_mut() else { return };
            exam.countdown.restart();
            let time_left = exam.countdown.remaining_millis();
            let deadline = exam.countdown.deadline();
            let exam_id = exam.spec.id;
            let index = exam.index;
            // New question, new resolving window: bump so answers for
            // the previous question are stale.
            self.slot.bump();

            out.broadcast(RoomEvent::ExamNext { exam_id, index, time_left });
            out.broadcast(RoomEvent::ExamTimerReset { time_left });
            out.timer = TimerDirective::Arm {
                deadline,
                generation: self.slot.generation(),
            };
        }
    }

    /// Closes the exam either way and applies the board consequence:
    /// pass advances the phase, failure resets **every** Point of the
    /// current phase back to available.
    fn complete_exam(&mut self, passed: bool, out: &mut Outcome) {
        let Some(Activity::Exam(exam)) = self.slot.close() else {
            return;
        };

        out.broadcast(RoomEvent::ExamComplete {
            exam_id: exam.spec.id,
            passed,
            correct_answers: exam.correct_count,
            total_questions: exam.total(),
        });

        if passed {
            if let Some(player) = self.active_player {
                let (user_score, session_score) =
                    self.scores.award(player, self.config.exam_reward);
                out.broadcast(RoomEvent::Scores {
                    player_id: player,
                    user_score,
                    session_score,
                });
            }
            if let Some(changed) = self.board.advance_phase() {
                for (point_id, status) in changed {
                    out.broadcast(RoomEvent::UpdatePointStatus { point_id, status });
                }
            }
            tracing::info!(
                room_id = %self.room_id,
                exam_id = %exam.spec.id,
                correct = exam.correct_count,
                "exam passed"
            );
        } else {
            for (point_id, status) in self.board.reset_phase(self.board.current_phase()) {
                out.broadcast(RoomEvent::UpdatePointStatus { point_id, status });
            }
            tracing::info!(
                room_id = %self.room_id,
                exam_id = %exam.spec.id,
                correct = exam.correct_count,
                total = exam.total(),
                "exam failed, phase reset"
            );
        }
        out.timer = TimerDirective::Cancel;
        self.cancel_moot_wait(out);
    }

    /// The activity a pending reconnection wait was guarding just
    /// resolved on its own clock — the wait has nothing left to force.
    fn cancel_moot_wait(&mut self, out: &mut Outcome) {
        if self.reconnect_pending.take().is_some() {
            out.supervisor = SupervisorDirective::Cancel;
        }
    }
}
