//! HiveAuth pairing state machine using rust-fsm.
//!
//! ## State Diagram
//!
//! ```text
//! ┌──────┐ Register ┌────────────┐ Listen ┌─────────┐ Ack  ┌───────────────┐
//! │ Init │ ───────► │ Registered │ ─────► │ Waiting │ ───► │ Authenticated │
//! └──────┘          └─────┬──────┘        └────┬────┘      └───────────────┘
//!                         │ Timeout            │ Nack      ┌──────────┐
//!                         │                    ├─────────► │ Rejected │
//!                         │                    │ Timeout   └──────────┘
//!                         ▼                    ▼
//!                    ┌─────────┐ ◄─────────────┘
//!                    │ Expired │
//!                    └─────────┘
//! ```
//!
//! Authenticated, Rejected and Expired accept no input.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub pairing_machine(Init)

    Init => {
        Register => Registered
    },
    Registered => {
        Listen => Waiting,
        Timeout => Expired
    },
    Waiting => {
        Ack => Authenticated,
        Nack => Rejected,
        Timeout => Expired
    }
}

pub use pairing_machine::Input as PairingMachineInput;
pub use pairing_machine::State as PairingMachineState;
pub use pairing_machine::StateMachine as PairingMachine;

/// Externally visible status of a pairing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingStatus {
    /// Created, not yet listening for the wallet.
    Pending,
    /// Listening for the wallet's answer.
    Waiting,
    Approved,
    Rejected,
    Expired,
}

impl PairingStatus {
    /// Approved, Rejected and Expired never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PairingStatus::Approved | PairingStatus::Rejected | PairingStatus::Expired
        )
    }
}

impl From<&PairingMachineState> for PairingStatus {
    fn from(state: &PairingMachineState) -> Self {
        match state {
            PairingMachineState::Init | PairingMachineState::Registered => PairingStatus::Pending,
            PairingMachineState::Waiting => PairingStatus::Waiting,
            PairingMachineState::Authenticated => PairingStatus::Approved,
            PairingMachineState::Rejected => PairingStatus::Rejected,
            PairingMachineState::Expired => PairingStatus::Expired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn waiting() -> PairingMachine {
        let mut machine = PairingMachine::new();
        machine.consume(&PairingMachineInput::Register).unwrap();
        machine.consume(&PairingMachineInput::Listen).unwrap();
        machine
    }

    #[test]
    fn test_initial_state_is_init() {
        let machine = PairingMachine::new();
        assert_eq!(*machine.state(), PairingMachineState::Init);
        assert_eq!(PairingStatus::from(machine.state()), PairingStatus::Pending);
    }

    #[test]
    fn test_approval_flow() {
        let mut machine = waiting();
        assert_eq!(PairingStatus::from(machine.state()), PairingStatus::Waiting);

        machine.consume(&PairingMachineInput::Ack).unwrap();
        assert_eq!(*machine.state(), PairingMachineState::Authenticated);
        assert_eq!(PairingStatus::from(machine.state()), PairingStatus::Approved);
    }

    #[test]
    fn test_cannot_listen_before_register() {
        let mut machine = PairingMachine::new();
        assert!(machine.consume(&PairingMachineInput::Listen).is_err());
        assert!(machine.consume(&PairingMachineInput::Ack).is_err());
    }

    #[test]
    fn test_registered_can_expire_without_listening() {
        let mut machine = PairingMachine::new();
        machine.consume(&PairingMachineInput::Register).unwrap();
        machine.consume(&PairingMachineInput::Timeout).unwrap();
        assert_eq!(*machine.state(), PairingMachineState::Expired);
    }

    #[test]
    fn test_terminal_states_ignore_input() {
        let inputs = [
            PairingMachineInput::Register,
            PairingMachineInput::Listen,
            PairingMachineInput::Ack,
            PairingMachineInput::Nack,
            PairingMachineInput::Timeout,
        ];

        let mut rejected = waiting();
        rejected.consume(&PairingMachineInput::Nack).unwrap();

        let mut expired = waiting();
        expired.consume(&PairingMachineInput::Timeout).unwrap();

        let mut approved = waiting();
        approved.consume(&PairingMachineInput::Ack).unwrap();

        for machine in [&mut rejected, &mut expired, &mut approved] {
            let before = machine.state().clone();
            for input in &inputs {
                assert!(machine.consume(input).is_err());
            }
            assert_eq!(*machine.state(), before);
            assert!(PairingStatus::from(machine.state()).is_terminal());
        }
    }
}
