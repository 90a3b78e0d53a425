//! Turn selection for Rollplay sessions.
//!
//! A session has no stored "current turn". Instead, [`TurnTracker`] keeps
//! only the id of the character that moved last and derives the holder
//! from whatever set of characters is active right now:
//!
//! ```text
//! active = {3, 7, 12}, last_moved = 7   →  holder = 12
//! active = {3, 7, 12}, last_moved = 12  →  holder = 3   (wraparound)
//! active = {3, 7, 12}, last_moved = none  →  holder = 3
//! active = {},         any              →  nobody
//! ```
//!
//! Recomputing on every query means removing a character mid-turn can never
//! leave a stale holder behind.
//!
//! # How it fits in the stack
//!
//! ```text
//! Session Layer (above)  ← owns one tracker per live session, serialises calls
//!     ↕
//! Turn Layer (this crate)  ← pure function of (active set, last_moved)
//! ```

use std::collections::BTreeSet;
use std::ops::Bound;

use rollplay_protocol::CharacterId;

/// A move was attempted by a character that does not hold the turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TurnError {
    #[error("character {attempted} cannot move now, it is {holder}'s turn")]
    Violation {
        attempted: CharacterId,
        holder: CharacterId,
    },

    /// Nobody holds the turn because no character is active.
    #[error("character {0} cannot move, no character holds the turn")]
    NoHolder(CharacterId),
}

/// Round-robin turn order over character ids.
///
/// Ids are ordered numerically; the holder is the smallest active id
/// strictly greater than the last mover, wrapping to the smallest active id
/// when there is none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TurnTracker {
    last_moved: Option<CharacterId>,
}

impl TurnTracker {
    /// Creates a tracker, usually from a persisted marker.
    pub fn new(last_moved: Option<CharacterId>) -> Self {
        Self { last_moved }
    }

    /// The character that moved last, if any.
    pub fn last_moved(&self) -> Option<CharacterId> {
        self.last_moved
    }

    /// Returns the character allowed to move next.
    ///
    /// ```rust
    /// use std::collections::BTreeSet;
    /// use rollplay_protocol::CharacterId;
    /// use rollplay_turn::TurnTracker;
    ///
    /// let active = BTreeSet::from([CharacterId(3), CharacterId(7)]);
    /// let tracker = TurnTracker::new(Some(CharacterId(7)));
    /// assert_eq!(tracker.current_turn(&active), Some(CharacterId(3)));
    /// ```
    pub fn current_turn(&self, active: &BTreeSet<CharacterId>) -> Option<CharacterId> {
        let first = active.first().copied();
        match self.last_moved {
            Some(last) => active
                .range((Bound::Excluded(last), Bound::Unbounded))
                .next()
                .copied()
                .or(first),
            None => first,
        }
    }

    /// Records that `id` moved.
    ///
    /// # Errors
    /// Returns [`TurnError`] if `id` is not [`current_turn`](Self::current_turn);
    /// the tracker is left untouched.
    pub fn record_move(
        &mut self,
        id: CharacterId,
        active: &BTreeSet<CharacterId>,
    ) -> Result<(), TurnError> {
        match self.current_turn(active) {
            Some(holder) if holder == id => {
                self.last_moved = Some(id);
                tracing::trace!(%id, "turn recorded");
                Ok(())
            }
            Some(holder) => Err(TurnError::Violation {
                attempted: id,
                holder,
            }),
            None => Err(TurnError::NoHolder(id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u64]) -> BTreeSet<CharacterId> {
        ids.iter().copied().map(CharacterId).collect()
    }

    fn holder(last: Option<u64>, ids: &[u64]) -> Option<u64> {
        TurnTracker::new(last.map(CharacterId))
            .current_turn(&set(ids))
            .map(|c| c.0)
    }

    #[test]
    fn test_current_turn_next_greater_id() {
        assert_eq!(holder(Some(3), &[3, 7]), Some(7));
    }

    #[test]
    fn test_current_turn_wraps_to_smallest() {
        assert_eq!(holder(Some(7), &[3, 7]), Some(3));
    }

    #[test]
    fn test_current_turn_empty_set_is_none() {
        assert_eq!(holder(Some(7), &[]), None);
        assert_eq!(holder(None, &[]), None);
    }

    #[test]
    fn test_current_turn_unset_marker_picks_smallest() {
        assert_eq!(holder(None, &[9, 4, 12]), Some(4));
    }

    #[test]
    fn test_current_turn_marker_absent_from_set() {
        // Last mover left: the next id above it takes over.
        assert_eq!(holder(Some(1), &[2, 3]), Some(2));
        assert_eq!(holder(Some(5), &[3, 7, 9]), Some(7));
        assert_eq!(holder(Some(10), &[3, 7, 9]), Some(3));
    }

    #[test]
    fn test_current_turn_adding_larger_id_keeps_holder() {
        // 3 holds (last = 1); adding 5 does not change that.
        assert_eq!(holder(Some(1), &[3]), Some(3));
        assert_eq!(holder(Some(1), &[3, 5]), Some(3));
    }

    #[test]
    fn test_current_turn_adding_id_between_marker_and_holder_takes_over() {
        assert_eq!(holder(Some(1), &[3]), Some(3));
        assert_eq!(holder(Some(1), &[2, 3]), Some(2));
    }

    #[test]
    fn test_current_turn_is_idempotent() {
        let tracker = TurnTracker::new(Some(CharacterId(4)));
        let active = set(&[1, 4, 6, 8]);
        let first = tracker.current_turn(&active);
        for _ in 0..5 {
            assert_eq!(tracker.current_turn(&active), first);
        }
        assert_eq!(first, Some(CharacterId(6)));
    }

    #[test]
    fn test_current_turn_always_member_of_set() {
        let sets: [&[u64]; 4] = [&[1], &[2, 9], &[5, 6, 7], &[10, 20, 30, 40]];
        for ids in sets {
            let active = set(ids);
            for last in [None, Some(0), Some(5), Some(9), Some(100)] {
                let turn = TurnTracker::new(last.map(CharacterId)).current_turn(&active);
                assert!(active.contains(&turn.unwrap()));
            }
        }
    }

    #[test]
    fn test_record_move_advances_round_robin() {
        let active = set(&[2, 5, 8]);
        let mut tracker = TurnTracker::default();
        let mut order = Vec::new();
        for _ in 0..6 {
            let turn = tracker.current_turn(&active).unwrap();
            tracker.record_move(turn, &active).unwrap();
            order.push(turn.0);
        }
        assert_eq!(order, vec![2, 5, 8, 2, 5, 8]);
    }

    #[test]
    fn test_record_move_out_of_turn_fails_without_mutation() {
        let active = set(&[3, 7]);
        let mut tracker = TurnTracker::new(Some(CharacterId(3)));

        let err = tracker.record_move(CharacterId(3), &active).unwrap_err();

        assert_eq!(
            err,
            TurnError::Violation {
                attempted: CharacterId(3),
                holder: CharacterId(7),
            }
        );
        assert_eq!(tracker.last_moved(), Some(CharacterId(3)));
    }

    #[test]
    fn test_record_move_with_no_active_characters_fails() {
        let mut tracker = TurnTracker::default();
        let err = tracker.record_move(CharacterId(1), &set(&[])).unwrap_err();
        assert_eq!(err, TurnError::NoHolder(CharacterId(1)));
        assert_eq!(tracker.last_moved(), None);
    }
}
