//! Confirmation gate: the single place confirmation-depth arithmetic lives.
//!
//! A block is final once `required_confirmations` later blocks exist. Block heights are `u64`;
//! "no final block yet" is `None`, which orders below every `Some(_)`.

use crate::cursor::ScanCursor;
use std::ops::RangeInclusive;

/// Highest block safe to scan up to (inclusive): `latest - required`, or `None` when the
/// chain is shorter than the confirmation depth.
pub fn confirmed_ceiling(latest_source_block: u64, required_confirmations: u64) -> Option<u64> {
    latest_source_block.checked_sub(required_confirmations)
}

/// Block range still to scan given the cursor and the confirmed ceiling. `None` when the chain
/// has not produced enough new final blocks since the last scan.
pub fn next_range(cursor: &ScanCursor, ceiling: Option<u64>) -> Option<RangeInclusive<u64>> {
    let to = ceiling?;
    if ceiling <= cursor.last_scanned_block {
        return None;
    }
    Some(cursor.next_block()..=to)
}

/// Confirmation-depth policy. Constant for the lifetime of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub required_confirmations: u64,
}

impl ConfirmationPolicy {
    pub fn new(required_confirmations: u64) -> Self {
        Self {
            required_confirmations,
        }
    }

    pub fn confirmed_ceiling(&self, latest_source_block: u64) -> Option<u64> {
        confirmed_ceiling(latest_source_block, self.required_confirmations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_subtracts_depth() {
        assert_eq!(confirmed_ceiling(100, 6), Some(94));
        assert_eq!(confirmed_ceiling(100, 0), Some(100));
        assert_eq!(confirmed_ceiling(6, 6), Some(0));
        assert_eq!(confirmed_ceiling(5, 6), None);
    }

    #[test]
    fn policy_ceiling_leaves_depth_blocks_above() {
        let policy = ConfirmationPolicy::new(6);
        let ceiling = policy.confirmed_ceiling(100).unwrap();
        assert_eq!(100 - ceiling, policy.required_confirmations);
        assert_eq!(policy.confirmed_ceiling(5), None);
    }

    #[test]
    fn range_from_cursor_to_ceiling() {
        let cursor = ScanCursor::new(Some(89));
        assert_eq!(next_range(&cursor, Some(94)), Some(90..=94));
        assert_eq!(next_range(&ScanCursor::default(), Some(0)), Some(0..=0));
        assert_eq!(next_range(&ScanCursor::before(10), Some(10)), Some(10..=10));
    }

    #[test]
    fn empty_range_when_chain_not_ahead() {
        let cursor = ScanCursor::new(Some(94));
        assert_eq!(next_range(&cursor, Some(94)), None);
        assert_eq!(next_range(&cursor, Some(90)), None);
        assert_eq!(next_range(&cursor, None), None);
        assert_eq!(next_range(&ScanCursor::default(), None), None);
        assert_eq!(next_range(&ScanCursor::new(Some(u64::MAX)), Some(u64::MAX)), None);
    }
}
