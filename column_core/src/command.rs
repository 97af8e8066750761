//! Operator command intake.
//!
//! I/O layers hold a `CommandSender` and push commands at any time; the engine
//! drains the queue at the top of each control cycle.

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::state::Mode;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    Start(Mode),
    Stop,
    Pause,
    Resume,
    Acknowledge,
    ResetAlarm,
    /// `None` clears the override.
    SetPowerOverride(Option<u8>),
    SetFloodPressure(f32),
}

pub type CommandSender = Sender<Command>;

#[derive(Debug)]
pub(crate) struct CommandQueue {
    tx: Sender<Command>,
    rx: Receiver<Command>,
}

impl CommandQueue {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self { tx, rx }
    }

    pub(crate) fn sender(&self) -> CommandSender {
        self.tx.clone()
    }

    /// Everything queued so far, in arrival order.
    pub(crate) fn drain(&self) -> Vec<Command> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(cmd) => out.push(cmd),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        out
    }
}
