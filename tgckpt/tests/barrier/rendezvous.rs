use std::collections::BTreeMap;

use tgckpt::{
    sched::ParkWake,
    sim::SimBehavior,
    types::{
        run_state::{RunState, StateMask},
        snapshot::{
            CaptureStep, OpenFile, OpenFilesFragment, Registers, SignalDisposition,
            SignalFragment,
        },
    },
    RendezvousOutcome,
};

use crate::common::{busy, default_options, run, tid, Harness, PID};

#[test]
fn leader_only_group() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(busy(1));

    let report = run(&harness, &checkpointer, &group);

    assert_eq!(report.outcomes_of(tid(0)), [RendezvousOutcome::Captured]);
    assert_eq!(report.nr_errors(), 0);

    let snapshots = harness.sink.snapshots();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].nr_tasks, 1);
    assert_eq!(snapshots[0].tasks[0].tid, tid(0));

    // Nobody else to wake
    assert_eq!(report.sched_probes.scoped_wakes(StateMask::CHECKPOINTING), 0);

    harness.assert_quiesced();
}

#[test]
fn three_thread_group() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(busy(3));

    let report = run(&harness, &checkpointer, &group);

    assert_eq!(report.outcomes_of(tid(0)), [RendezvousOutcome::Captured]);
    assert_eq!(report.outcomes_of(tid(1)), [RendezvousOutcome::Released]);
    assert_eq!(report.outcomes_of(tid(2)), [RendezvousOutcome::Released]);

    let snapshots = harness.sink.snapshots();
    assert_eq!(snapshots.len(), 1);

    let snapshot = &snapshots[0];
    assert_eq!(snapshot.pid, PID);
    assert_eq!(snapshot.nr_tasks, 3);
    assert_eq!(snapshot.files.files.len(), 3);
    assert_eq!(
        snapshot.tasks.iter().map(|t| t.tid).collect::<Vec<_>>(),
        vec![tid(0), tid(1), tid(2)]
    );

    let probes = harness.producer.probes();
    assert_eq!(probes.saves_of(CaptureStep::OpenFiles), 1);
    assert_eq!(probes.saves_of(CaptureStep::Signals), 1);
    assert!(probes.reverts.is_empty());

    // Captured by the leader only
    assert_eq!(probes.capturing_threads, vec![Some(format!("tid-{}", tid(0)))]);

    assert_eq!(checkpointer.stats().attempts(), 1);
    assert_eq!(checkpointer.stats().captures(), 1);

    harness.assert_quiesced();
}

#[test]
fn leader_arrives_last() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(vec![
        SimBehavior::Sleeper,
        SimBehavior::Busy,
        SimBehavior::Busy,
    ]);

    let report = run(&harness, &checkpointer, &group);

    assert_eq!(report.outcomes_of(tid(0)), [RendezvousOutcome::Captured]);
    assert_eq!(
        report.count(|o| *o == RendezvousOutcome::Released),
        2
    );
    assert_eq!(harness.sink.len(), 1);

    harness.assert_quiesced();
}

#[test]
fn large_group_captures_once() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());

    let mut behaviors = busy(16);
    behaviors[3] = SimBehavior::Sleeper;
    behaviors[11] = SimBehavior::Sleeper;
    let group = harness.group(behaviors);

    let report = run(&harness, &checkpointer, &group);

    assert_eq!(report.count(|o| *o == RendezvousOutcome::Captured), 1);
    assert_eq!(report.count(|o| *o == RendezvousOutcome::Released), 15);
    assert_eq!(harness.sink.len(), 1);
    assert_eq!(harness.sink.snapshots()[0].nr_tasks, 16);

    let probes = &report.sched_probes;

    // Every member is released out of Checkpointing, and only out of it
    let releases = probes
        .wakes
        .iter()
        .filter(|(_, mask, _)| *mask == StateMask::CHECKPOINTING)
        .collect::<Vec<_>>();
    assert_eq!(releases.len(), 15);
    assert!(releases.iter().all(|(_, _, woken)| *woken));
    assert_eq!(probes.abort_all_calls, 0);

    assert_eq!(probes.preempt_disables, 1);
    assert_eq!(probes.preempt_enables, 1);
    assert_eq!(harness.sched.preempt_count(tid(0)), Some(0));

    harness.assert_quiesced();
}

#[test]
fn consecutive_attempts() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(busy(4));

    run(&harness, &checkpointer, &group);
    harness.assert_quiesced();

    harness.sched.reset_probes();

    let report = run(&harness, &checkpointer, &group);
    harness.assert_quiesced();

    // Counters were cleared, only the second attempt is recorded
    assert_eq!(report.sched_probes.preempt_disables, 1);
    assert_eq!(report.sched_probes.scoped_wakes(StateMask::CHECKPOINTING), 3);

    assert_eq!(harness.sink.len(), 2);
    assert_eq!(checkpointer.stats().attempts(), 2);
    assert_eq!(checkpointer.stats().captures(), 2);
}

#[test]
fn run_state_restored_after_release() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(2);

    // Both threads are running, so the dispatcher only kicks them
    checkpointer.checkpoint_process(PID).unwrap();

    std::thread::scope(|s| {
        let member = s.spawn(|| {
            harness
                .sched
                .set_current_state(tid(1), RunState::Uninterruptible);
            checkpointer.handle_kernel_entry(tid(1)).unwrap()
        });

        let leader = s.spawn(|| checkpointer.handle_kernel_entry(tid(0)).unwrap());

        assert_eq!(leader.join().unwrap(), Some(RendezvousOutcome::Captured));
        assert_eq!(member.join().unwrap(), Some(RendezvousOutcome::Released));
    });

    assert_eq!(
        harness.sched.run_state(tid(1)),
        Some(RunState::Uninterruptible)
    );
    assert_eq!(harness.sched.run_state(tid(0)), Some(RunState::Running));
    assert_eq!(harness.sink.len(), 1);

    harness.assert_quiesced();
}

#[test]
fn kernel_entry_without_pending_checkpoint() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    harness.idle_group(2);

    assert_eq!(checkpointer.handle_kernel_entry(tid(0)).unwrap(), None);
    assert_eq!(checkpointer.handle_kernel_entry(tid(1)).unwrap(), None);
    assert!(checkpointer.handle_kernel_entry(tid(7)).is_err());

    assert!(harness.sink.is_empty());
}

#[test]
fn captured_state_reaches_the_sink() {
    let harness = Harness::new();
    let checkpointer = harness.checkpointer(default_options());
    let group = harness.group(busy(2));

    let files = OpenFilesFragment {
        files: vec![OpenFile {
            fd: 3,
            path: "/var/log/app.log".to_owned(),
            flags: 0o2001,
            offset: 4096,
        }],
    };
    let signals = SignalFragment {
        pending: 1 << 9,
        blocked: 1 << 1,
        actions: BTreeMap::from([(
            10,
            SignalDisposition::Handler {
                address: 0x40_1000,
                flags: 0x0400_0000,
                mask: 0,
            },
        )]),
    };
    let registers = Registers {
        ip: 0xdead_beef,
        sp: 0x7ffc_0000,
        tls: 0x7f00_1000,
        ..Default::default()
    };

    harness.producer.set_open_files(PID, files.clone());
    harness.producer.set_signals(PID, signals.clone());
    harness.producer.set_registers(tid(1), registers.clone());

    run(&harness, &checkpointer, &group);

    let snapshots = harness.sink.snapshots();
    assert_eq!(snapshots.len(), 1);

    let snapshot = &snapshots[0];
    assert_eq!(snapshot.files, files);
    assert_eq!(snapshot.signals, signals);
    assert_eq!(snapshot.task(tid(1)).unwrap().context.registers, registers);
    assert_ne!(snapshot.task(tid(0)).unwrap().context.registers, registers);

    harness.assert_quiesced();
}
