//! Property tests for the control state tracker
//!
//! Whatever order raw input arrives in, each control's forwarded events must
//! alternate `Start -> (Delta | Change)* -> End`.

use hog_core::{ControlEvent, ControlId};
use hog_relay::{ControlTracker, Input, TrackerConfig};
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Apply(ControlId, Input),
    Wait(u64),
}

fn control() -> impl Strategy<Value = ControlId> {
    prop_oneof![
        Just(ControlId::Button("go".to_string())),
        Just(ControlId::Button("pig".to_string())),
        (1u32..=2).prop_map(ControlId::Encoder),
        (1u32..=2).prop_map(ControlId::Fader),
    ]
}

fn input() -> impl Strategy<Value = Input> {
    prop_oneof![
        Just(Input::Start),
        Just(Input::End),
        (-1.0f64..1.0).prop_map(Input::Delta),
        (-300.0f64..300.0).prop_map(Input::Wheel),
        (-300.0f64..300.0).prop_map(Input::Drag),
        (-3.0f64..3.0).prop_map(Input::Hold),
        (-0.5f64..1.5).prop_map(Input::Value),
    ]
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (control(), input()).prop_map(|(id, input)| Op::Apply(id, input)),
        1 => (0u64..400).prop_map(Op::Wait),
    ]
}

/// Run the ops on a paused clock and return every forwarded event
fn run(ops: Vec<Op>) -> Vec<ControlEvent> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async move {
        let (mut tracker, mut ticks) = ControlTracker::new(TrackerConfig::default());
        let mut events = Vec::new();

        for op in ops {
            match op {
                Op::Apply(id, input) => {
                    // Inputs that don't fit the control kind are rejected
                    if let Ok(forwarded) = tracker.apply(id, input) {
                        events.extend(forwarded);
                    }
                }
                Op::Wait(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    while let Ok(tick) = ticks.try_recv() {
                        events.extend(tracker.on_tick(tick));
                    }
                }
            }
        }

        events.extend(tracker.release_all());
        assert_eq!(tracker.active_count(), 0);
        assert_eq!(tracker.pending_timers(), 0);
        events
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn phases_alternate_per_control(ops in prop::collection::vec(op(), 0..60)) {
        let events = run(ops);
        let mut active: HashMap<ControlId, bool> = HashMap::new();

        for event in &events {
            let id = event.id();
            let is_active = active.get(&id).copied().unwrap_or(false);

            if event.is_start() {
                prop_assert!(!is_active, "start while active: {:?}", event);
                active.insert(id, true);
            } else if event.is_end() {
                prop_assert!(is_active, "end while inactive: {:?}", event);
                active.insert(id, false);
            } else {
                prop_assert!(is_active, "motion while inactive: {:?}", event);
            }
        }

        prop_assert!(active.values().all(|a| !a));
    }

    #[test]
    fn button_events_never_carry_motion(ops in prop::collection::vec(op(), 0..60)) {
        for event in run(ops) {
            if let ControlEvent::Button { .. } = event {
                prop_assert!(event.is_start() || event.is_end());
            }
        }
    }
}
