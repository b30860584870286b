//! Driver error types.

use core::fmt;

/// Hardware handshake the controller failed to acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeStage {
    /// MCR.FRZACK did not set after requesting freeze mode.
    FreezeEntry,
    /// MCR.FRZACK did not clear after leaving freeze mode.
    FreezeExit,
    /// MCR.NOTRDY did not clear after leaving freeze mode.
    NotReady,
}

/// Controller initialization failed. Fatal: no frame can be sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum InitError {
    /// The poll limit was reached before the hardware acknowledged `stage`.
    Timeout {
        /// The handshake that was pending.
        stage: HandshakeStage,
    },
}

/// Transmit request rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TxError {
    /// The TX mailbox still holds a data frame that has not been sent.
    Busy,
}

/// Frame not representable on this driver's fixed mailbox layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// The frame id differs from the configured TX id.
    UnexpectedId,
}

impl fmt::Display for HandshakeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FreezeEntry => f.write_str("freeze entry"),
            Self::FreezeExit => f.write_str("freeze exit"),
            Self::NotReady => f.write_str("module ready"),
        }
    }
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { stage } => write!(f, "timed out waiting for {stage} acknowledge"),
        }
    }
}

impl fmt::Display for TxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Busy => f.write_str("transmit mailbox busy"),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedId => f.write_str("frame id does not match the transmit mailbox id"),
        }
    }
}

impl embedded_can::Error for FrameError {
    fn kind(&self) -> embedded_can::ErrorKind {
        embedded_can::ErrorKind::Other
    }
}
