//! Property tests for the transfer entry lifecycle
//!
//! Arbitrary interleavings of engine and user operations must never move an
//! entry backwards within an attempt, and terminal entries only change
//! through a retry.

use dcnnt::{FileStatus, TransferEntry, TransferResult};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Begin,
    Succeed,
    Fail,
    Cancel,
    Retry,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Begin),
        Just(Op::Succeed),
        Just(Op::Fail),
        Just(Op::Cancel),
        Just(Op::Retry),
    ]
}

fn apply(entry: &TransferEntry, op: &Op) {
    match op {
        Op::Begin => {
            let _ = entry.begin();
        }
        Op::Succeed => {
            entry.finish(&TransferResult::success("OK"));
        }
        Op::Fail => {
            entry.finish(&TransferResult::failure("Refused"));
        }
        Op::Cancel => {
            entry.cancel();
        }
        Op::Retry => {
            entry.reset_for_retry();
        }
    }
}

proptest! {
    #[test]
    fn status_never_moves_backwards_within_an_attempt(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        let entry = TransferEntry::new("1", "file.bin", 1);

        for op in &ops {
            let before = entry.status();
            let attempt = entry.attempt();
            apply(&entry, op);
            let after = entry.status();

            if entry.attempt() == attempt {
                prop_assert!(
                    after.rank() >= before.rank(),
                    "{:?} -> {:?} on {:?}",
                    before,
                    after,
                    op
                );
            } else {
                // Only a retry of a failed entry starts a new attempt
                prop_assert!(matches!(op, Op::Retry));
                prop_assert_eq!(before, FileStatus::Failed);
                prop_assert_eq!(after, FileStatus::Wait);
                prop_assert_eq!(entry.attempt(), attempt + 1);
            }
        }
    }

    #[test]
    fn terminal_states_only_change_through_retry(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        let entry = TransferEntry::new("1", "file.bin", 1);

        for op in &ops {
            let before = entry.status();
            apply(&entry, op);
            let after = entry.status();

            if before.is_terminal() && after != before {
                prop_assert!(matches!(op, Op::Retry));
                prop_assert_eq!(before, FileStatus::Failed);
            }
        }
    }

    #[test]
    fn cancelled_entries_carry_a_message(
        ops in prop::collection::vec(op_strategy(), 0..40)
    ) {
        let entry = TransferEntry::new("1", "file.bin", 1);

        for op in &ops {
            apply(&entry, op);
            if entry.status() == FileStatus::Cancel {
                let message = entry.message();
                prop_assert_eq!(message.as_deref(), Some("Cancelled"));
            }
        }
    }
}
