//! Integration tests for token-ring termination detection.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mosaic_comm::{CommError, Terminator, TerminatorFactory};

fn spawn_waits(terminators: &[Arc<Terminator>]) -> Vec<thread::JoinHandle<()>> {
    terminators
        .iter()
        .map(|terminator| {
            let terminator = terminator.clone();
            thread::spawn(move || terminator.wait_for_termination().expect("termination"))
        })
        .collect()
}

#[test]
fn single_rank_terminates() {
    let factories = TerminatorFactory::shared_memory(1);
    let terminator = factories[0].create();
    terminator.set_done().unwrap();
    terminator.wait_for_termination().unwrap();
}

#[test]
fn wait_for_termination_returns_only_once() {
    let factories = TerminatorFactory::shared_memory(1);
    let terminator = factories[0].create();
    terminator.set_done().unwrap();
    terminator.wait_for_termination().unwrap();
    assert!(matches!(
        terminator.wait_for_termination(),
        Err(CommError::ProtocolViolation(_))
    ));
}

#[test]
fn quiet_ring_terminates() {
    let factories = TerminatorFactory::shared_memory(4);
    let terminators: Vec<_> = factories.iter().map(TerminatorFactory::create).collect();
    let waits = spawn_waits(&terminators);
    for terminator in &terminators {
        terminator.set_done().unwrap();
    }
    for wait in waits {
        wait.join().unwrap();
    }
}

#[test]
fn balanced_traffic_terminates() {
    let factories = TerminatorFactory::shared_memory(5);
    let terminators: Vec<_> = factories.iter().map(TerminatorFactory::create).collect();

    // Balanced ledger: every sent message is received somewhere.
    terminators[1].message_sent();
    terminators[1].message_sent();
    terminators[3].message_received();
    terminators[3].message_received();
    terminators[2].message_sent();
    terminators[4].message_received();
    terminators[0].message_sent();
    terminators[2].message_received();

    let waits = spawn_waits(&terminators);
    // Stagger the done declarations so probes race real state changes.
    for terminator in &terminators {
        thread::sleep(Duration::from_millis(1));
        terminator.set_done().unwrap();
    }
    for wait in waits {
        wait.join().unwrap();
    }
}

#[test]
fn late_receive_rescinds_done() {
    let factories = TerminatorFactory::shared_memory(2);
    let terminators: Vec<_> = factories.iter().map(TerminatorFactory::create).collect();

    terminators[0].message_sent();
    terminators[0].set_done().unwrap();
    terminators[1].set_done().unwrap();

    let waits = spawn_waits(&terminators);

    // The probe cannot complete while rank 1 still owes a receive; once
    // the message lands and rank 1 re-idles, termination follows.
    thread::sleep(Duration::from_millis(10));
    terminators[1].message_received();
    assert!(terminators[1].is_working());
    terminators[1].set_done().unwrap();

    for wait in waits {
        wait.join().unwrap();
    }
}

#[test]
fn factories_supply_consecutive_phases() {
    let factories = TerminatorFactory::shared_memory(3);
    for _phase in 0..3 {
        let terminators: Vec<_> = factories.iter().map(TerminatorFactory::create).collect();
        let waits = spawn_waits(&terminators);
        for terminator in &terminators {
            terminator.set_done().unwrap();
        }
        for wait in waits {
            wait.join().unwrap();
        }
    }
}
