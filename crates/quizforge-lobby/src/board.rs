//! The shared game board: topic Points grouped into phases.
//!
//! Point status only moves forward (`Locked → Available → Completed`).
//! The single exception is an exam failure, which resets every Point of
//! the failed phase back to `Available`. There is no "contested" status
//! — a Point is contested exactly while the session's current activity
//! is bound to it, and that binding is the lock.

use quizforge_protocol::{PhaseId, PointId, PointStatus};

use crate::sources::PointSpec;

/// One node on the board.
#[derive(Debug, Clone)]
pub struct Point {
    pub id: PointId,
    pub topic_id: u64,
    pub phase: PhaseId,
    pub status: PointStatus,
}

/// The per-session board. Mutated only by the activity state machine on
/// successful completion (and by exam resolution).
#[derive(Debug, Clone)]
pub struct Board {
    points: Vec<Point>,
    current_phase: PhaseId,
}

impl Board {
    /// Builds a board from the content service's layout. Points of the
    /// lowest phase start `Available`; everything later is `Locked`.
    pub fn new(specs: Vec<PointSpec>) -> Self {
        let first_phase = specs
            .iter()
            .map(|s| s.phase)
            .min()
            .unwrap_or(PhaseId(0));

        let points = specs
            .into_iter()
            .map(|s| Point {
                id: s.id,
                topic_id: s.topic_id,
                phase: s.phase,
                status: if s.phase == first_phase {
                    PointStatus::Available
                } else {
                    PointStatus::Locked
                },
            })
            .collect();

        Self { points, current_phase: first_phase }
    }

    /// All points, in layout order.
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Looks up a point by id.
    pub fn point(&self, id: PointId) -> Option<&Point> {
        self.points.iter().find(|p| p.id == id)
    }

    /// The phase the session is currently playing.
    pub fn current_phase(&self) -> PhaseId {
        self.current_phase
    }

    /// Whether every Point of the current phase is completed — the
    /// precondition for opening the phase exam.
    pub fn phase_cleared(&self) -> bool {
        self.points
            .iter()
            .filter(|p| p.phase == self.current_phase)
            .all(|p| p.status == PointStatus::Completed)
    }

    /// Marks a point completed. Callers have already checked it was
    /// `Available` when the activity opened.
    ///
    /// Returns the new `(id, status)` pair for broadcasting.
    pub fn complete(&mut self, id: PointId) -> Option<(PointId, PointStatus)> {
        let point = self.points.iter_mut().find(|p| p.id == id)?;
        point.status = PointStatus::Completed;
        Some((id, PointStatus::Completed))
    }

    /// Resets **every** Point of the given phase to `Available` — the
    /// exam-failure penalty. Returns all changed pairs for broadcasting.
    pub fn reset_phase(&mut self, phase: PhaseId) -> Vec<(PointId, PointStatus)> {
        let mut changed = Vec::new();
        for point in self.points.iter_mut().filter(|p| p.phase == phase) {
            if point.status != PointStatus::Available {
                point.status = PointStatus::Available;
                changed.push((point.id, PointStatus::Available));
            }
        }
        changed
    }

    /// Advances to the next phase after a passed exam, unlocking its
    /// Points. Returns the changed pairs, or `None` when there is no
    /// later phase (the board is finished).
    pub fn advance_phase(&mut self) -> Option<Vec<(PointId, PointStatus)>> {
        let next = self
            .points
            .iter()
            .map(|p| p.phase)
            .filter(|p| *p > self.current_phase)
            .min()?;

        self.current_phase = next;
        let mut changed = Vec::new();
        for point in self.points.iter_mut().filter(|p| p.phase == next) {
            point.status = PointStatus::Available;
            changed.push((point.id, PointStatus::Available));
        }
        Some(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: u64, phase: u32) -> PointSpec {
        PointSpec {
            id: PointId(id),
            topic_id: id * 10,
            phase: PhaseId(phase),
        }
    }

    fn two_phase_board() -> Board {
        Board::new(vec![spec(1, 0), spec(2, 0), spec(3, 1), spec(4, 1)])
    }

    #[test]
    fn test_new_board_unlocks_only_first_phase() {
        let board = two_phase_board();
        assert_eq!(board.point(PointId(1)).unwrap().status, PointStatus::Available);
        assert_eq!(board.point(PointId(2)).unwrap().status, PointStatus::Available);
        assert_eq!(board.point(PointId(3)).unwrap().status, PointStatus::Locked);
        assert_eq!(board.point(PointId(4)).unwrap().status, PointStatus::Locked);
        assert_eq!(board.current_phase(), PhaseId(0));
    }

    #[test]
    fn test_complete_marks_point_completed() {
        let mut board = two_phase_board();
        let changed = board.complete(PointId(1)).unwrap();
        assert_eq!(changed, (PointId(1), PointStatus::Completed));
        assert_eq!(board.point(PointId(1)).unwrap().status, PointStatus::Completed);
    }

    #[test]
    fn test_complete_unknown_point_returns_none() {
        let mut board = two_phase_board();
        assert!(board.complete(PointId(99)).is_none());
    }

    #[test]
    fn test_phase_cleared_requires_every_point() {
        let mut board = two_phase_board();
        assert!(!board.phase_cleared());

        board.complete(PointId(1));
        assert!(!board.phase_cleared(), "one of two completed is not cleared");

        board.complete(PointId(2));
        assert!(board.phase_cleared());
    }

    #[test]
    fn test_reset_phase_resets_all_points_never_a_subset() {
        let mut board = two_phase_board();
        board.complete(PointId(1));
        board.complete(PointId(2));

        let changed = board.reset_phase(PhaseId(0));

        assert_eq!(changed.len(), 2);
        for point in board.points().iter().filter(|p| p.phase == PhaseId(0)) {
            assert_eq!(point.status, PointStatus::Available);
        }
    }

    #[test]
    fn test_reset_phase_leaves_other_phases_alone() {
        let mut board = two_phase_board();
        board.complete(PointId(1));
        board.reset_phase(PhaseId(0));
        assert_eq!(board.point(PointId(3)).unwrap().status, PointStatus::Locked);
    }

    #[test]
    fn test_advance_phase_unlocks_next_phase() {
        let mut board = two_phase_board();
        board.complete(PointId(1));
        board.complete(PointId(2));

        let changed = board.advance_phase().unwrap();

        assert_eq!(board.current_phase(), PhaseId(1));
        assert_eq!(changed.len(), 2);
        assert_eq!(board.point(PointId(3)).unwrap().status, PointStatus::Available);
        assert_eq!(board.point(PointId(4)).unwrap().status, PointStatus::Available);
    }

    #[test]
    fn test_advance_past_last_phase_returns_none() {
        let mut board = two_phase_board();
        board.advance_phase().unwrap();
        assert!(board.advance_phase().is_none(), "no phase after the last");
    }

    #[test]
    fn test_empty_board_is_harmless() {
        let board = Board::new(vec![]);
        assert!(board.points().is_empty());
        assert!(board.phase_cleared(), "vacuously cleared");
    }
}
