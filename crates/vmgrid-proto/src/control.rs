//! Executor control opcodes.
//!
//! The four lifecycle operations form a closed set; each maps to exactly one
//! opaque byte payload understood by the KVM executor.

use std::fmt;
use std::str::FromStr;

use crate::error::ProtoError;

const STARTUP: &[u8] = b"VMGRID_KVM_TASK_STARTUP";
const SHUTDOWN: &[u8] = b"VMGRID_KVM_TASK_SHUTDOWN";
const SUSPEND: &[u8] = b"VMGRID_KVM_TASK_SUSPEND";
const RESUME: &[u8] = b"VMGRID_KVM_TASK_RESUME";

/// A lifecycle operation sent to a running task's executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlOp {
    Start,
    Stop,
    Suspend,
    Resume,
}

impl ControlOp {
    pub const ALL: [ControlOp; 4] = [
        ControlOp::Start,
        ControlOp::Stop,
        ControlOp::Suspend,
        ControlOp::Resume,
    ];

    /// Payload carried in the MESSAGE call's `data` field.
    pub fn opcode(self) -> &'static [u8] {
        match self {
            ControlOp::Start => STARTUP,
            ControlOp::Stop => SHUTDOWN,
            ControlOp::Suspend => SUSPEND,
            ControlOp::Resume => RESUME,
        }
    }

    /// Reverse lookup of [`ControlOp::opcode`].
    pub fn from_opcode(data: &[u8]) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.opcode() == data)
    }

    pub fn name(self) -> &'static str {
        match self {
            ControlOp::Start => "start",
            ControlOp::Stop => "stop",
            ControlOp::Suspend => "suspend",
            ControlOp::Resume => "resume",
        }
    }
}

impl fmt::Display for ControlOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ControlOp {
    type Err = ProtoError;

    /// Case-insensitive; anything outside the four names is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ProtoError::UnsupportedOperation(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcodes_are_distinct() {
        let codes: std::collections::HashSet<_> =
            ControlOp::ALL.iter().map(|op| op.opcode()).collect();
        assert_eq!(codes.len(), 4);
    }

    #[test]
    fn parse_accepts_any_case() {
        assert_eq!("Start".parse::<ControlOp>().unwrap(), ControlOp::Start);
        assert_eq!("STOP".parse::<ControlOp>().unwrap(), ControlOp::Stop);
        assert_eq!("suspend".parse::<ControlOp>().unwrap(), ControlOp::Suspend);
        assert_eq!(" Resume ".parse::<ControlOp>().unwrap(), ControlOp::Resume);
    }

    #[test]
    fn parse_rejects_unknown_names() {
        let err = "reboot".parse::<ControlOp>().unwrap_err();
        assert!(matches!(err, ProtoError::UnsupportedOperation(ref n) if n == "reboot"));
        assert!("".parse::<ControlOp>().is_err());
        assert!("Stopp".parse::<ControlOp>().is_err());
    }

    #[test]
    fn opcode_reverse_lookup() {
        assert_eq!(
            ControlOp::from_opcode(b"VMGRID_KVM_TASK_SHUTDOWN"),
            Some(ControlOp::Stop)
        );
        assert_eq!(ControlOp::from_opcode(b"garbage"), None);
    }
}
