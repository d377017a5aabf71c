//! Bounded action history and loop detection

use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::debug;

use crate::broker::VisionAction;

/// One executed vision action
#[derive(Debug, Clone, PartialEq)]
pub struct ActionHistoryEntry {
    pub action: VisionAction,
    pub coordinates: Option<(i32, i32)>,
    pub timestamp: DateTime<Utc>,
}

/// Ring buffer of recent vision actions, with repeat-click detection
#[derive(Debug)]
pub struct ActionHistory {
    entries: VecDeque<ActionHistoryEntry>,
    capacity: usize,
    /// Consecutive same-spot proposals that count as a loop
    loop_threshold: usize,
    /// Two clicks within this distance count as the same spot
    distance_px: i32,
}

impl ActionHistory {
    pub fn new(capacity: usize, loop_threshold: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            loop_threshold: loop_threshold.max(2),
            distance_px: 5,
        }
    }

    pub fn push(&mut self, action: VisionAction, coordinates: Option<(i32, i32)>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ActionHistoryEntry {
            action,
            coordinates,
            timestamp: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Would executing `(action, coordinates)` complete a loop?
    ///
    /// True when the last `threshold - 1` recorded entries plus the proposal
    /// share the action name and sit pairwise within `distance_px`.
    pub fn would_loop(&self, action: VisionAction, coordinates: Option<(i32, i32)>) -> bool {
        let needed = self.loop_threshold - 1;
        if self.entries.len() < needed {
            return false;
        }

        let mut window: Vec<(VisionAction, Option<(i32, i32)>)> = self
            .entries
            .iter()
            .rev()
            .take(needed)
            .map(|e| (e.action, e.coordinates))
            .collect();
        window.push((action, coordinates));

        if !window.iter().all(|(a, _)| *a == action) {
            return false;
        }

        let points: Vec<(i32, i32)> = match window.iter().map(|(_, c)| *c).collect::<Option<Vec<_>>>() {
            Some(points) => points,
            // Coordinate-less repetition (e.g. repeated typing) is not a
            // spatial loop
            None => return false,
        };

        let looping = points.iter().all(|a| {
            points
                .iter()
                .all(|b| (a.0 - b.0).abs() <= self.distance_px && (a.1 - b.1).abs() <= self.distance_px)
        });
        if looping {
            debug!(?action, ?coordinates, "loop detected");
        }
        looping
    }

    /// Compact rendering for the vision prompt
    pub fn summary(&self) -> String {
        if self.entries.is_empty() {
            return "none".to_string();
        }
        self.entries
            .iter()
            .map(|e| match e.coordinates {
                Some((x, y)) => format!("{} at ({}, {})", e.action, x, y),
                None => e.action.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bound() {
        let mut history = ActionHistory::new(3, 3);
        for i in 0..5 {
            history.push(VisionAction::Click, Some((i, i)));
        }
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_three_same_spot_clicks_loop() {
        let mut history = ActionHistory::new(10, 3);
        history.push(VisionAction::Click, Some((100, 100)));
        history.push(VisionAction::Click, Some((102, 98)));
        assert!(history.would_loop(VisionAction::Click, Some((101, 101))));
    }

    #[test]
    fn test_distant_clicks_do_not_loop() {
        let mut history = ActionHistory::new(10, 3);
        history.push(VisionAction::Click, Some((100, 100)));
        history.push(VisionAction::Click, Some((100, 100)));
        assert!(!history.would_loop(VisionAction::Click, Some((400, 400))));
    }

    #[test]
    fn test_mixed_actions_do_not_loop() {
        let mut history = ActionHistory::new(10, 3);
        history.push(VisionAction::Click, Some((100, 100)));
        history.push(VisionAction::DoubleClick, Some((100, 100)));
        assert!(!history.would_loop(VisionAction::Click, Some((100, 100))));
    }

    #[test]
    fn test_too_short_history_does_not_loop() {
        let mut history = ActionHistory::new(10, 3);
        history.push(VisionAction::Click, Some((100, 100)));
        assert!(!history.would_loop(VisionAction::Click, Some((100, 100))));
    }

    #[test]
    fn test_typing_repetition_is_not_spatial_loop() {
        let mut history = ActionHistory::new(10, 3);
        history.push(VisionAction::Type, None);
        history.push(VisionAction::Type, None);
        assert!(!history.would_loop(VisionAction::Type, None));
    }

    #[test]
    fn test_summary_format() {
        let mut history = ActionHistory::new(10, 3);
        assert_eq!(history.summary(), "none");
        history.push(VisionAction::Click, Some((10, 20)));
        history.push(VisionAction::Type, None);
        assert_eq!(history.summary(), "click at (10, 20); type");
    }
}
