//! Input injection channel.
//!
//! Key events are written as one-line commands to a resident helper process
//! (see [`crate::helper`]). Delivery is fire-and-forget: callers never see a
//! failure, the channel logs it and lets the backend re-spawn on the next
//! command.

use crate::error::Result;
use crate::keymap::Token;
use std::fmt;
use tracing::{debug, trace, warn};

/// Operation understood by the helper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    Down,
    Up,
    /// Down in order, a short dwell, then up in reverse. Performed inside the
    /// helper so the engine never sleeps.
    PressRelease,
}

impl Op {
    pub fn as_str(self) -> &'static str {
        match self {
            Op::Down => "down",
            Op::Up => "up",
            Op::PressRelease => "pressRelease",
        }
    }
}

/// One line of the helper protocol: `operation(code[,code...])`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InjectCommand {
    pub op: Op,
    pub tokens: Vec<Token>,
}

impl InjectCommand {
    pub fn new(op: Op, tokens: Vec<Token>) -> Self {
        Self { op, tokens }
    }
}

impl fmt::Display for InjectCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.op.as_str())?;
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{token}")?;
        }
        write!(f, ")")
    }
}

/// Transport that delivers commands to whatever performs the injection.
pub trait InjectionBackend: Send {
    /// Start the transport if it is not running. Must be idempotent.
    fn ensure_started(&mut self) -> Result<()>;

    /// Deliver one command without waiting for any acknowledgement.
    fn send(&mut self, command: &InjectCommand) -> Result<()>;

    /// Forcefully tear the transport down. Must be safe to call repeatedly.
    fn shutdown(&mut self);
}

/// Best-effort key event channel in front of an [`InjectionBackend`].
pub struct InjectionChannel {
    backend: Box<dyn InjectionBackend>,
}

impl InjectionChannel {
    pub fn new(backend: Box<dyn InjectionBackend>) -> Self {
        Self { backend }
    }

    pub fn ensure_started(&mut self) {
        if let Err(e) = self.backend.ensure_started() {
            warn!("injection helper did not start: {}", e);
        }
    }

    /// Press every token, in listed order.
    pub fn key_down(&mut self, tokens: &[Token]) {
        for token in tokens {
            self.dispatch(InjectCommand::new(Op::Down, vec![*token]));
        }
    }

    /// Release every token, last pressed first.
    pub fn key_up(&mut self, tokens: &[Token]) {
        for token in tokens.iter().rev() {
            self.dispatch(InjectCommand::new(Op::Up, vec![*token]));
        }
    }

    pub fn press_and_release(&mut self, tokens: &[Token]) {
        if tokens.is_empty() {
            return;
        }
        self.dispatch(InjectCommand::new(Op::PressRelease, tokens.to_vec()));
    }

    pub fn shutdown(&mut self) {
        self.backend.shutdown();
    }

    fn dispatch(&mut self, command: InjectCommand) {
        trace!(%command, "inject");
        if let Err(first) = self.backend.send(&command) {
            debug!("injection failed ({}), retrying once", first);
            if let Err(e) = self.backend.send(&command) {
                warn!("dropping injection command {}: {}", command, e);
            }
        }
    }
}
