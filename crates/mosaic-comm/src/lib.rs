#![doc = include_str!("../README.md")]

//! Messaging and termination detection.

pub mod communicator;
pub mod error;
pub mod termination;

pub use communicator::{
    Communicator, Message, MessageCallback, Messenger, SharedMemoryCommunicator,
};
pub use error::CommError;
pub use termination::{
    SharedMemoryTokenRing, Terminator, TerminatorFactory, Token, TokenMessenger,
};
