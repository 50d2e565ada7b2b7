//! Distributed termination detection over a ring of partitions.
//!
//! Safra's algorithm: every partition keeps a black/white flag and a net
//! message count. Rank 0 (the master) circulates a probe token around the
//! ring `r -> (r + 1) mod size` whenever it is idle; each idle slave folds
//! its flag and count into the token and whitens itself, a busy slave
//! parks the token until it goes idle. The master declares termination
//! only when a probe completes a round with everyone white and a zero net
//! count — one clean round after the last state change, which closes the
//! classic race where a message is in flight exactly as the token passes.
//!
//! Liveness rests on the transport being reliable, ordered and
//! non-duplicating between ring neighbours. A lost token deadlocks
//! [`Terminator::wait_for_termination`]; that is the documented contract,
//! not a bug to paper over with timeouts.

use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::CommError;

const PROBE_CLEAN: u8 = 0;
const PROBE_TAINTED: u8 = 1;
const TERMINATE: u8 = 2;

/// One instance of the token passed during termination detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// `0` clean probe, `1` tainted probe, `2` terminating.
    pub flag: u8,
    /// Net message count accumulated along the ring so far.
    pub count: i64,
}

/// Token transport between ring neighbours.
///
/// Ranks must be consecutive numbers starting at 0. Sends are
/// asynchronous; receiving blocks.
pub trait TokenMessenger: Send + Sync + 'static {
    fn process_count(&self) -> u32;

    fn my_id(&self) -> u32;

    /// Send a token to `destination` without blocking.
    fn send_token(&self, destination: u32, token: Token) -> Result<(), CommError>;

    /// Block until a token arrives from the ring predecessor.
    fn wait_for_token(&self) -> Result<Token, CommError>;
}

/// In-process token ring over channels, one inbox per rank.
pub struct SharedMemoryTokenRing {
    my_id: u32,
    process_count: u32,
    senders: Vec<Sender<Token>>,
    inbox: Mutex<Receiver<Token>>,
}

impl SharedMemoryTokenRing {
    /// Create one connected token messenger per rank.
    pub fn create(process_count: u32) -> Vec<Arc<SharedMemoryTokenRing>> {
        assert!(process_count > 0, "a ring needs at least one participant");
        let (senders, inboxes): (Vec<_>, Vec<_>) =
            (0..process_count).map(|_| channel::<Token>()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(id, inbox)| {
                Arc::new(SharedMemoryTokenRing {
                    my_id: id as u32,
                    process_count,
                    senders: senders.clone(),
                    inbox: Mutex::new(inbox),
                })
            })
            .collect()
    }
}

impl TokenMessenger for SharedMemoryTokenRing {
    fn process_count(&self) -> u32 {
        self.process_count
    }

    fn my_id(&self) -> u32 {
        self.my_id
    }

    fn send_token(&self, destination: u32, token: Token) -> Result<(), CommError> {
        let sender = self.senders.get(destination as usize).ok_or_else(|| {
            CommError::ProtocolViolation(format!("no rank {destination} in the ring"))
        })?;
        sender.send(token).map_err(|_| {
            CommError::TransportFailure(format!("token ring peer {destination} is gone"))
        })
    }

    fn wait_for_token(&self) -> Result<Token, CommError> {
        let inbox = lock(&self.inbox);
        inbox
            .recv()
            .map_err(|_| CommError::TransportFailure("token ring disconnected".into()))
    }
}

struct TerminatorState {
    /// `PROBE_CLEAN` (white) or `PROBE_TAINTED` (black).
    flag: u8,
    /// Messages sent minus messages received by this partition.
    count: i64,
    working: bool,
    /// Master only: a probe is circulating.
    waiting_for_token: bool,
    /// Slave only: token parked while working.
    pending_token: Option<Token>,
    finished: bool,
}

/// Termination detector for one communication phase.
///
/// Exactly one per phase per partition, created through
/// [`TerminatorFactory::create`] (a cheap local allocation; the global
/// synchronization happens on the token ring, not at creation). A
/// terminator starts in the working state and must see
/// [`Terminator::set_done`] at least once before termination can be
/// declared.
pub struct Terminator {
    messenger: Arc<dyn TokenMessenger>,
    token_destination: u32,
    state: Mutex<TerminatorState>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl Terminator {
    fn new(messenger: Arc<dyn TokenMessenger>) -> Terminator {
        let token_destination = (messenger.my_id() + 1) % messenger.process_count();
        Terminator {
            messenger,
            token_destination,
            state: Mutex::new(TerminatorState {
                flag: PROBE_CLEAN,
                count: 0,
                working: true,
                waiting_for_token: false,
                pending_token: None,
                finished: false,
            }),
        }
    }

    fn is_master(&self) -> bool {
        self.messenger.my_id() == 0
    }

    /// Record one outbound message. Called exactly once per job sent to
    /// another partition.
    pub fn message_sent(&self) {
        let mut state = lock(&self.state);
        state.count += 1;
    }

    /// Record one inbound message. Called exactly once per job received
    /// from another partition; rescinds a previous [`Terminator::set_done`].
    pub fn message_received(&self) {
        let mut state = lock(&self.state);
        state.count -= 1;
        state.flag = PROBE_TAINTED;
        state.working = true;
    }

    /// True until `set_done`, and again after any `message_received`.
    pub fn is_working(&self) -> bool {
        lock(&self.state).working
    }

    /// Declare that this partition currently has no local work. A no-op
    /// when already idle.
    pub fn set_done(&self) -> Result<(), CommError> {
        let mut state = lock(&self.state);
        if !state.working {
            return Ok(());
        }
        state.working = false;
        if self.is_master() {
            if !state.waiting_for_token {
                self.init_probe(&mut state)?;
            }
        } else if let Some(token) = state.pending_token.take() {
            self.forward_probe(&mut state, token)?;
        }
        Ok(())
    }

    /// Master: start a clean probe round. It is fine to probe while other
    /// partitions still work; their flags and counts will reject the round.
    fn init_probe(&self, state: &mut TerminatorState) -> Result<(), CommError> {
        state.flag = PROBE_CLEAN;
        state.waiting_for_token = true;
        tracing::trace!(rank = self.messenger.my_id(), "termination probe started");
        self.messenger.send_token(
            self.token_destination,
            Token {
                flag: PROBE_CLEAN,
                count: 0,
            },
        )
    }

    /// Slave: fold local state into the probe, pass it on, whiten.
    fn forward_probe(&self, state: &mut TerminatorState, token: Token) -> Result<(), CommError> {
        let flag = if state.flag == PROBE_TAINTED || token.flag == PROBE_TAINTED {
            PROBE_TAINTED
        } else {
            PROBE_CLEAN
        };
        self.messenger.send_token(
            self.token_destination,
            Token {
                flag,
                count: token.count + state.count,
            },
        )?;
        state.flag = PROBE_CLEAN;
        Ok(())
    }

    /// Block until the whole ring is quiescent.
    ///
    /// Returns exactly once; calling again is a [`CommError::ProtocolViolation`].
    pub fn wait_for_termination(&self) -> Result<(), CommError> {
        {
            let state = lock(&self.state);
            if state.finished {
                return Err(CommError::ProtocolViolation(
                    "terminator already finished".into(),
                ));
            }
        }
        if self.is_master() {
            self.master_loop()?;
        } else {
            self.slave_loop()?;
        }
        lock(&self.state).finished = true;
        tracing::debug!(rank = self.messenger.my_id(), "termination detected");
        Ok(())
    }

    fn master_loop(&self) -> Result<(), CommError> {
        {
            let mut state = lock(&self.state);
            if !state.working && !state.waiting_for_token {
                self.init_probe(&mut state)?;
            }
        }
        loop {
            let token = self.messenger.wait_for_token()?;
            if token.flag == TERMINATE {
                return Ok(());
            }
            let mut state = lock(&self.state);
            if !state.waiting_for_token {
                return Err(CommError::ProtocolViolation(
                    "master received a probe it was not waiting for".into(),
                ));
            }
            state.waiting_for_token = false;
            if state.flag == PROBE_CLEAN && token.flag == PROBE_CLEAN && token.count + state.count == 0
            {
                // A full clean round: everyone idle, nothing in flight.
                self.messenger.send_token(
                    self.token_destination,
                    Token {
                        flag: TERMINATE,
                        count: 0,
                    },
                )?;
            } else if !state.working {
                self.init_probe(&mut state)?;
            }
            // When the master is working, set_done will start the next round.
        }
    }

    fn slave_loop(&self) -> Result<(), CommError> {
        loop {
            let token = self.messenger.wait_for_token()?;
            if token.flag == TERMINATE {
                // Pass the terminating token on before finishing ourselves.
                return self.messenger.send_token(self.token_destination, token);
            }
            let mut state = lock(&self.state);
            if state.working {
                state.pending_token = Some(token);
            } else {
                self.forward_probe(&mut state, token)?;
            }
        }
    }
}

/// Creates the per-phase [`Terminator`] instances of one rank.
pub struct TerminatorFactory {
    messenger: Arc<dyn TokenMessenger>,
}

impl TerminatorFactory {
    pub fn new(messenger: Arc<dyn TokenMessenger>) -> Self {
        TerminatorFactory { messenger }
    }

    /// One connected factory per rank over an in-process token ring.
    pub fn shared_memory(process_count: u32) -> Vec<TerminatorFactory> {
        SharedMemoryTokenRing::create(process_count)
            .into_iter()
            .map(|ring| TerminatorFactory::new(ring))
            .collect()
    }

    /// A fresh terminator for the next communication phase. Cheap and
    /// barrier-free; all ranks must consume phases in the same order.
    pub fn create(&self) -> Arc<Terminator> {
        Arc::new(Terminator::new(self.messenger.clone()))
    }
}
