//! Point-to-point task messaging with a single-active-messenger discipline.
//!
//! One messenger exists per computation phase. Registering and closing a
//! messenger are global barriers across all ranks, so no rank can start a
//! new phase while another still drains the previous one — the invariant
//! that keeps messages of different fixpoint phases from interleaving.
//! Every message carries a kind discriminant from a closed set; a message
//! whose kind does not match the active messenger is a protocol violation
//! detected at dispatch.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Barrier, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use crate::termination::{Terminator, TerminatorFactory};
use crate::CommError;

/// A value that can travel between ranks.
///
/// `Kind` is the discriminant of a closed message union; the active
/// messenger of a phase accepts exactly one kind.
pub trait Message: Send + fmt::Debug + 'static {
    type Kind: Copy + Eq + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Invoked on the delivery thread for every inbound message. May send
/// through the supplied messenger re-entrantly.
pub type MessageCallback<M> =
    Box<dyn FnMut(&dyn Messenger<M>, M) -> Result<(), CommError> + Send>;

/// One phase's sending handle.
pub trait Messenger<M: Message>: Send + Sync {
    /// Queue `message` for `receiver` without blocking. Self-sends must go
    /// through the local job queue instead and are rejected here.
    fn send_task(&self, receiver: u32, message: M) -> Result<(), CommError>;

    /// Declare that this rank will not originate further sends unless a
    /// message arrives first. Receiving implicitly reactivates the
    /// messenger; the owner must re-idle after processing. Must be called
    /// at least once, even with zero traffic, before the phase can close.
    fn set_idle(&self) -> Result<(), CommError>;

    /// Close the phase: a global barrier. Blocks until every rank's
    /// in-flight traffic is drained (termination detection) and every rank
    /// has closed.
    fn close(&self) -> Result<(), CommError>;
}

/// One participant's view of the distributed system.
pub trait Communicator<M: Message>: Send + Sync {
    fn rank(&self) -> u32;

    fn size(&self) -> u32;

    /// Register the phase messenger for `kind`: a global barrier. At most
    /// one messenger may be active per rank; violating that is fatal.
    fn listen_to(
        &self,
        kind: M::Kind,
        on_message: MessageCallback<M>,
    ) -> Result<Arc<dyn Messenger<M>>, CommError>;

    /// Tear down the communication environment. Fails if a messenger is
    /// still open or a delivery-thread failure was recorded.
    fn finalize(&self) -> Result<(), CommError>;
}

enum Envelope<M> {
    Message(M),
    Shutdown,
}

struct ActivePhase<M: Message> {
    kind: M::Kind,
    callback: MessageCallback<M>,
    messenger: Arc<SharedMemoryMessenger<M>>,
}

struct CommState<M: Message> {
    active: Option<ActivePhase<M>>,
    failure: Option<CommError>,
}

struct Shared<M: Message> {
    rank: u32,
    size: u32,
    peers: Vec<Sender<Envelope<M>>>,
    barrier: Arc<Barrier>,
    state: Mutex<CommState<M>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The in-process "cluster": every rank is a delivery thread over an
/// in-memory queue.
///
/// All phases of one rank share a single inbound queue on purpose —
/// synchronization bugs between phases then surface as kind mismatches at
/// dispatch instead of silently corrupting a later phase. Optimized for
/// clarity over throughput, which is all the reference transport needs.
pub struct SharedMemoryCommunicator<M: Message> {
    shared: Arc<Shared<M>>,
    terminators: TerminatorFactory,
    delivery: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Message> SharedMemoryCommunicator<M> {
    /// Create `process_count` connected communicators, one per rank.
    pub fn create_group(process_count: u32) -> Vec<SharedMemoryCommunicator<M>> {
        assert!(process_count > 0, "a group needs at least one rank");
        let (senders, inboxes): (Vec<_>, Vec<_>) =
            (0..process_count).map(|_| channel::<Envelope<M>>()).unzip();
        let barrier = Arc::new(Barrier::new(process_count as usize));
        let terminators = TerminatorFactory::shared_memory(process_count);

        inboxes
            .into_iter()
            .zip(terminators)
            .enumerate()
            .map(|(rank, (inbox, factory))| {
                let shared = Arc::new(Shared {
                    rank: rank as u32,
                    size: process_count,
                    peers: senders.clone(),
                    barrier: barrier.clone(),
                    state: Mutex::new(CommState {
                        active: None,
                        failure: None,
                    }),
                });
                let delivery_shared = shared.clone();
                let delivery = thread::spawn(move || delivery_loop(&delivery_shared, inbox));
                SharedMemoryCommunicator {
                    shared,
                    terminators: factory,
                    delivery: Mutex::new(Some(delivery)),
                }
            })
            .collect()
    }
}

fn delivery_loop<M: Message>(shared: &Shared<M>, inbox: Receiver<Envelope<M>>) {
    for envelope in inbox.iter() {
        let message = match envelope {
            Envelope::Shutdown => break,
            Envelope::Message(message) => message,
        };
        let mut state = lock(&shared.state);
        if let Err(failure) = dispatch(&mut state, message) {
            tracing::debug!(rank = shared.rank, %failure, "delivery stopped");
            state.failure = Some(failure);
            break;
        }
    }
}

fn dispatch<M: Message>(state: &mut CommState<M>, message: M) -> Result<(), CommError> {
    let phase = state.active.as_mut().ok_or_else(|| {
        CommError::ProtocolViolation(format!(
            "received {message:?} but no messenger is listening"
        ))
    })?;
    if message.kind() != phase.kind {
        return Err(CommError::ProtocolViolation(format!(
            "received {message:?} on a messenger for {:?}",
            phase.kind
        )));
    }
    let messenger = phase.messenger.clone();
    messenger.terminator.message_received();
    (phase.callback)(&*messenger, message)
}

impl<M: Message> Communicator<M> for SharedMemoryCommunicator<M> {
    fn rank(&self) -> u32 {
        self.shared.rank
    }

    fn size(&self) -> u32 {
        self.shared.size
    }

    fn listen_to(
        &self,
        kind: M::Kind,
        on_message: MessageCallback<M>,
    ) -> Result<Arc<dyn Messenger<M>>, CommError> {
        // The state lock is held across both barriers, exactly so that
        // messages from ranks that finish registration first queue up
        // until this rank's messenger is in place.
        let mut state = lock(&self.shared.state);
        if let Some(active) = &state.active {
            return Err(CommError::ProtocolViolation(format!(
                "messenger for {:?} is still active; close it first",
                active.kind
            )));
        }
        self.shared.barrier.wait();
        let messenger = Arc::new(SharedMemoryMessenger {
            kind,
            shared: self.shared.clone(),
            terminator: self.terminators.create(),
            closing: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        state.active = Some(ActivePhase {
            kind,
            callback: on_message,
            messenger: messenger.clone(),
        });
        tracing::debug!(rank = self.shared.rank, ?kind, "messenger registered");
        // Second barrier: every rank's messenger exists before any of
        // them is handed to the outside world.
        self.shared.barrier.wait();
        Ok(messenger)
    }

    fn finalize(&self) -> Result<(), CommError> {
        {
            let mut state = lock(&self.shared.state);
            if let Some(active) = &state.active {
                return Err(CommError::ProtocolViolation(format!(
                    "finalizing with an open messenger for {:?}",
                    active.kind
                )));
            }
            if let Some(failure) = state.failure.take() {
                return Err(failure);
            }
        }
        self.shared.peers[self.shared.rank as usize]
            .send(Envelope::Shutdown)
            .map_err(|_| CommError::TransportFailure("own delivery queue is gone".into()))?;
        let handle = lock(&self.delivery).take().ok_or_else(|| {
            CommError::ProtocolViolation("communicator already finalized".into())
        })?;
        handle
            .join()
            .map_err(|_| CommError::ProtocolViolation("delivery thread panicked".into()))
    }
}

/// Sending handle of one shared-memory phase.
pub struct SharedMemoryMessenger<M: Message> {
    kind: M::Kind,
    shared: Arc<Shared<M>>,
    terminator: Arc<Terminator>,
    closing: AtomicBool,
    closed: AtomicBool,
}

impl<M: Message> Messenger<M> for SharedMemoryMessenger<M> {
    fn send_task(&self, receiver: u32, message: M) -> Result<(), CommError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CommError::ProtocolViolation(
                "send on a closed messenger".into(),
            ));
        }
        if message.kind() != self.kind {
            return Err(CommError::ProtocolViolation(format!(
                "sending {message:?} through a messenger for {:?}",
                self.kind
            )));
        }
        if receiver == self.shared.rank {
            return Err(CommError::ProtocolViolation(
                "sending a message to yourself; post it on the local queue instead".into(),
            ));
        }
        let peer = self.shared.peers.get(receiver as usize).ok_or_else(|| {
            CommError::ProtocolViolation(format!("no rank {receiver} in this group"))
        })?;
        self.terminator.message_sent();
        peer.send(Envelope::Message(message))
            .map_err(|_| CommError::TransportFailure(format!("rank {receiver} is gone")))
    }

    fn set_idle(&self) -> Result<(), CommError> {
        self.terminator.set_done()
    }

    fn close(&self) -> Result<(), CommError> {
        if self.closing.swap(true, Ordering::AcqRel) {
            return Err(CommError::ProtocolViolation(
                "messenger already closed".into(),
            ));
        }
        // Drain the phase first: blocks until every rank is idle and all
        // in-flight messages have been delivered.
        self.terminator.wait_for_termination()?;
        let mut state = lock(&self.shared.state);
        self.shared.barrier.wait();
        self.closed.store(true, Ordering::Release);
        state.active = None;
        tracing::debug!(rank = self.shared.rank, kind = ?self.kind, "messenger closed");
        Ok(())
    }
}
