//! CAN frame message support.
//!
//! The driver only moves standard data frames of up to four bytes, so
//! [`CanFrame`] stores exactly that.

use embedded_can::{Frame, Id, StandardId};

use super::mailbox::PAYLOAD_LEN;

/// A standard data frame with at most four data bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanFrame {
    id: StandardId,
    dlc: u8,
    data: [u8; PAYLOAD_LEN],
}

impl CanFrame {
    /// Creates a frame from a standard id and up to four data bytes.
    ///
    /// Returns `None` if `data` is longer than four bytes.
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(id: StandardId, data: &[u8]) -> Option<Self> {
        if data.len() > PAYLOAD_LEN {
            return None;
        }
        let mut frame = Self {
            id,
            dlc: data.len() as u8,
            data: [0; PAYLOAD_LEN],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    /// Builds a frame from a raw mailbox payload. Bytes past `dlc` must
    /// already be zero; `dlc` is clamped to four.
    pub(crate) fn from_payload(id: StandardId, dlc: u8, data: [u8; PAYLOAD_LEN]) -> Self {
        Self {
            id,
            dlc: dlc.min(PAYLOAD_LEN as u8),
            data,
        }
    }

    /// The standard identifier.
    pub const fn standard_id(&self) -> StandardId {
        self.id
    }

    /// Number of valid payload bytes (0..=4).
    pub const fn len(&self) -> u8 {
        self.dlc
    }

    /// `true` for a frame without data bytes.
    pub const fn is_empty(&self) -> bool {
        self.dlc == 0
    }

    /// All four payload bytes; bytes past [`len`](Self::len) are zero.
    pub const fn payload(&self) -> [u8; PAYLOAD_LEN] {
        self.data
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for CanFrame {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "CanFrame {=u16:#x} {}",
            self.id.as_raw(),
            &self.data[..usize::from(self.dlc)]
        );
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        match id.into() {
            Id::Standard(id) => Self::new(id, data),
            Id::Extended(_) => None,
        }
    }

    /// Remote frames are not supported.
    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        None
    }

    fn is_extended(&self) -> bool {
        false
    }

    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    fn dlc(&self) -> usize {
        usize::from(self.dlc)
    }

    fn data(&self) -> &[u8] {
        &self.data[..usize::from(self.dlc)]
    }
}
