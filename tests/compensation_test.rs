/*!
 * Compensation Stack Tests
 * Reverse-order unwinding under arbitrary failure patterns
 */

use pod_sandbox::core::guard::{CompensationStack, StackState};
use proptest::prelude::*;
use std::cell::RefCell;

const STEPS: [&str; 8] = [
    "release pod name",
    "release infra container name",
    "remove sandbox storage",
    "unmount shm",
    "delete container id from index",
    "remove sandbox",
    "remove managed namespaces",
    "stop infra container",
];

proptest! {
    #[test]
    fn prop_unwind_reverses_and_survives_failures(
        failing in proptest::collection::vec(any::<bool>(), 0..=STEPS.len()),
    ) {
        let ran = RefCell::new(Vec::new());
        let mut stack = CompensationStack::new();

        for (idx, fails) in failing.iter().copied().enumerate() {
            let ran = &ran;
            stack.push(STEPS[idx], move || {
                ran.borrow_mut().push(idx);
                if fails {
                    anyhow::bail!("step {} failed", idx);
                }
                Ok(())
            });
        }
        prop_assert_eq!(stack.len(), failing.len());

        let report = stack.unwind();

        let expected: Vec<usize> = (0..failing.len()).rev().collect();
        prop_assert_eq!(&*ran.borrow(), &expected);
        prop_assert_eq!(report.attempted.len(), failing.len());

        let failed_steps: Vec<&str> = report.failures.iter().map(|f| f.step).collect();
        let expected_failed: Vec<&str> = (0..failing.len())
            .rev()
            .filter(|&idx| failing[idx])
            .map(|idx| STEPS[idx])
            .collect();
        prop_assert_eq!(failed_steps, expected_failed);
        prop_assert_eq!(report.is_clean(), !failing.contains(&true));
    }
}

#[test]
fn test_commit_keeps_resources() {
    let ran = RefCell::new(0);
    let mut stack = CompensationStack::new();
    stack.push("release pod name", || {
        *ran.borrow_mut() += 1;
        Ok(())
    });
    assert_eq!(stack.state(), StackState::Active);

    stack.commit();
    assert_eq!(*ran.borrow(), 0);
}

#[test]
fn test_dropped_stack_unwinds() {
    let ran = RefCell::new(Vec::new());
    {
        let mut stack = CompensationStack::new();
        stack.push("first", || {
            ran.borrow_mut().push("first");
            Ok(())
        });
        stack.push("second", || {
            ran.borrow_mut().push("second");
            Ok(())
        });
    }
    assert_eq!(*ran.borrow(), vec!["second", "first"]);
}
