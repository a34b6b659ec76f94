use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};

use nix::errno::Errno;
use tgckpt::{
    error::Error,
    sched::ParkWake,
    sim::SimBehavior,
    sys_checkpoint_process,
    types::{
        checkpoint_state::CheckpointState,
        process_id::Pid,
        run_state::{RunState, StateMask},
    },
    CheckpointOptionsBuilder, RendezvousOutcome,
};

use crate::common::{default_options, run, tid, Harness, HookedScheduler, PID};

#[test]
fn unknown_process() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());

    assert!(matches!(
        checkpointer.checkpoint_process(Pid(4242)),
        Err(Error::NoSuchProcess(Pid(4242)))
    ));
    assert_eq!(
        sys_checkpoint_process(&checkpointer, 4242),
        -(Errno::ESRCH as i64)
    );
    assert_eq!(checkpointer.stats().attempts(), 0);
}

#[test]
fn running_threads_are_kicked() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(3);

    assert_eq!(sys_checkpoint_process(&checkpointer, PID.0), 0);

    let probes = harness.sched.probes();
    assert_eq!(
        probes.wakes,
        vec![
            (tid(0), StateMask::ALL, false),
            (tid(1), StateMask::ALL, false),
            (tid(2), StateMask::ALL, false),
        ]
    );
    assert_eq!(probes.reschedules, vec![tid(0), tid(1), tid(2)]);

    let process = harness.table.find_process(PID).unwrap();
    for t in process.threads().iter() {
        assert!(t.need_checkpoint());
        assert_eq!(t.checkpoint_state(), CheckpointState::CheckpointRequested);
    }

    // The rendezvous is lazy, nothing has arrived yet
    assert_eq!(process.arrivals(), 0);
    assert!(harness.sink.is_empty());
}

#[test]
fn sleeping_threads_are_woken() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(3);

    harness
        .sched
        .set_current_state(tid(1), RunState::Interruptible);
    harness.sched.set_current_state(tid(2), RunState::Stopped);

    checkpointer.checkpoint_process(PID).unwrap();

    let probes = harness.sched.probes();
    assert_eq!(
        probes.wakes,
        vec![
            (tid(0), StateMask::ALL, false),
            (tid(1), StateMask::ALL, true),
            (tid(2), StateMask::ALL, true),
        ]
    );
    assert_eq!(probes.reschedules, vec![tid(0)]);
    assert_eq!(harness.sched.run_state(tid(1)), Some(RunState::Running));
    assert_eq!(harness.sched.run_state(tid(2)), Some(RunState::Running));
}

#[test]
fn overlapping_trigger_is_rejected() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(2);

    checkpointer.checkpoint_process(PID).unwrap();

    assert!(matches!(
        checkpointer.checkpoint_process(PID),
        Err(Error::AttemptInProgress(PID))
    ));
    assert_eq!(
        sys_checkpoint_process(&checkpointer, PID.0),
        -(Errno::EBUSY as i64)
    );
    assert_eq!(checkpointer.stats().attempts(), 1);

    // Finish the first attempt, a new one is accepted afterwards
    std::thread::scope(|s| {
        let member = s.spawn(|| checkpointer.handle_kernel_entry(tid(1)).unwrap());
        assert_eq!(
            checkpointer.handle_kernel_entry(tid(0)).unwrap(),
            Some(RendezvousOutcome::Captured)
        );
        member.join().unwrap();
    });

    harness.assert_quiesced();
    assert_eq!(sys_checkpoint_process(&checkpointer, PID.0), 0);
}

#[test]
fn membership_frozen_during_attempt() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(2);

    checkpointer.checkpoint_process(PID).unwrap();

    assert!(matches!(
        harness.table.spawn_thread(PID, tid(5)),
        Err(Error::MembershipFrozen(PID))
    ));
    assert!(matches!(
        harness.table.exit_thread(tid(1)),
        Err(Error::MembershipFrozen(PID))
    ));
    assert!(matches!(
        harness.table.remove_process(PID),
        Err(Error::MembershipFrozen(PID))
    ));

    std::thread::scope(|s| {
        let member = s.spawn(|| checkpointer.handle_kernel_entry(tid(1)).unwrap());
        checkpointer.handle_kernel_entry(tid(0)).unwrap();
        member.join().unwrap();
    });

    // Unfrozen once everyone departed
    harness.table.spawn_thread(PID, tid(5)).unwrap();
    harness.table.exit_thread(tid(1)).unwrap();
    assert_eq!(harness.table.find_process(PID).unwrap().nr_threads(), 2);
}

#[test]
fn sleepers_join_the_barrier() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(vec![
        SimBehavior::Busy,
        SimBehavior::Sleeper,
        SimBehavior::Sleeper,
        SimBehavior::Busy,
    ]);

    let report = run(&harness, &checkpointer, &group);

    assert_eq!(report.outcomes_of(tid(1)), [RendezvousOutcome::Released]);
    assert_eq!(report.outcomes_of(tid(2)), [RendezvousOutcome::Released]);
    assert_eq!(harness.sink.len(), 1);

    // Sleepers were woken by the dispatcher, the others kicked
    let probes = &report.sched_probes;
    assert!(probes.wakes.contains(&(tid(1), StateMask::ALL, true)));
    assert!(probes.wakes.contains(&(tid(2), StateMask::ALL, true)));
    assert!(probes.reschedules.contains(&tid(0)));
    assert!(probes.reschedules.contains(&tid(3)));
    assert!(!probes.reschedules.contains(&tid(1)));

    harness.assert_quiesced();
}

#[test]
fn timeout_waits_for_dispatch_to_finish() {
    let harness = Harness::new();
    harness.idle_group(3);

    let stalled = AtomicBool::new(false);
    let resume = AtomicBool::new(false);

    // Holds the dispatcher inside its wake of thread 1, after the leader
    // was already marked
    let sched = HookedScheduler::new(&harness.sched, |t, mask, woken| {
        if t == tid(1) && mask == StateMask::ALL {
            stalled.store(true, Ordering::SeqCst);
            while !resume.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        woken
    });

    let checkpointer = harness.checkpointer_with(
        &sched,
        CheckpointOptionsBuilder::test_default()
            .barrier_timeout(Duration::from_millis(10))
            .build()
            .unwrap(),
    );

    std::thread::scope(|s| {
        let dispatcher = s.spawn(|| checkpointer.checkpoint_process(PID));

        while !stalled.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }

        let leader = s.spawn(|| checkpointer.handle_kernel_entry(tid(0)).unwrap());

        // Well past the barrier timeout, the abort still waits for marking
        std::thread::sleep(Duration::from_millis(100));
        let finished_early = leader.is_finished();

        resume.store(true, Ordering::SeqCst);
        dispatcher.join().unwrap().unwrap();
        assert!(!finished_early);

        assert_eq!(
            leader.join().unwrap(),
            Some(RendezvousOutcome::TimedOut {
                stalled: vec![tid(1), tid(2)]
            })
        );
    });

    // Every request was withdrawn, nothing is left to park
    assert_eq!(checkpointer.handle_kernel_entry(tid(1)).unwrap(), None);
    assert_eq!(checkpointer.handle_kernel_entry(tid(2)).unwrap(), None);
    assert_eq!(harness.sched.run_state(tid(1)), Some(RunState::Running));
    assert_eq!(harness.sched.run_state(tid(2)), Some(RunState::Running));

    harness.assert_quiesced();
}
