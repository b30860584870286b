//! Message buffer word layout.
//!
//! Each mailbox is four words in the FlexCAN RAM:
//!
//! | word | contents                                                       |
//! |------|----------------------------------------------------------------|
//! | 0    | CODE[27:24], SRR[22], IDE[21], RTR[20], DLC[19:16], TIME[15:0] |
//! | 1    | PRIO[31:29], standard ID[28:18], extended ID[17:0]             |
//! | 2    | data bytes 0..=3, byte 0 in the low bits                       |
//! | 3    | data bytes 4..=7                                               |

use embedded_can::StandardId;

/// Control/status word index.
pub const CS_WORD: usize = 0;
/// Identifier word index.
pub const ID_WORD: usize = 1;
/// First data word index.
pub const DATA_WORD: usize = 2;

const CODE_SHIFT: u32 = 24;
const CODE_MASK: u32 = 0x0F00_0000;
/// Substitute remote request, must be set for transmitted standard frames.
const CS_SRR: u32 = 1 << 22;
const DLC_SHIFT: u32 = 16;
const DLC_MASK: u32 = 0x000F_0000;
const TIMESTAMP_MASK: u32 = 0x0000_FFFF;
const STD_ID_SHIFT: u32 = 18;
const STD_ID_MASK: u32 = 0x7FF;

/// Payload bytes used by this driver.
pub const PAYLOAD_LEN: usize = 4;
/// DLC of a full payload.
pub const PAYLOAD_DLC: u8 = 4;

/// Mailbox CODE field.
///
/// RX codes have bit 3 clear, TX codes have it set. Bit 0 set on an RX code
/// means the hardware is currently moving a frame in or out.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MailboxCode {
    /// MB does not participate in matching.
    RxInactive = 0b0000,
    /// Hardware is updating the mailbox contents.
    RxBusy = 0b0001,
    /// Frame received and not yet read.
    RxFull = 0b0010,
    /// Armed, waiting for a matching frame.
    RxEmpty = 0b0100,
    /// A frame arrived while the previous one was still unread.
    RxOverrun = 0b0110,
    /// Remote request answer pending.
    RxRanswer = 0b1010,
    /// MB does not participate in arbitration.
    TxInactive = 0b1000,
    /// Transmission aborted.
    TxAbort = 0b1001,
    /// Data frame queued for transmission.
    TxData = 0b1100,
    /// Remote answer queued.
    TxTanswer = 0b1110,
}

impl TryFrom<u8> for MailboxCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0b0000 => Ok(Self::RxInactive),
            0b0001 | 0b0011 | 0b0101 | 0b0111 => Ok(Self::RxBusy),
            0b0010 => Ok(Self::RxFull),
            0b0100 => Ok(Self::RxEmpty),
            0b0110 => Ok(Self::RxOverrun),
            0b1010 => Ok(Self::RxRanswer),
            0b1000 => Ok(Self::TxInactive),
            0b1001 => Ok(Self::TxAbort),
            0b1100 => Ok(Self::TxData),
            0b1110 => Ok(Self::TxTanswer),
            other => Err(other),
        }
    }
}

/// Extracts the CODE field of a control/status word.
///
/// Reserved encodings are returned as the raw 4-bit value.
#[allow(clippy::cast_possible_truncation)]
pub fn code(cs: u32) -> Result<MailboxCode, u8> {
    MailboxCode::try_from(((cs & CODE_MASK) >> CODE_SHIFT) as u8)
}

/// Extracts the data length code of a control/status word.
#[allow(clippy::cast_possible_truncation)]
pub const fn dlc(cs: u32) -> u8 {
    ((cs & DLC_MASK) >> DLC_SHIFT) as u8
}

/// Extracts the hardware timestamp of a control/status word.
#[allow(clippy::cast_possible_truncation)]
pub const fn timestamp(cs: u32) -> u16 {
    (cs & TIMESTAMP_MASK) as u16
}

/// Control/status word holding only a code.
pub const fn control_word(code: MailboxCode) -> u32 {
    (code as u32) << CODE_SHIFT
}

/// Control/status word that queues a standard data frame of `dlc` bytes.
///
/// Code and DLC share this word and must be written together.
pub const fn tx_data_control_word(dlc: u8) -> u32 {
    control_word(MailboxCode::TxData) | CS_SRR | (((dlc as u32) << DLC_SHIFT) & DLC_MASK)
}

/// Identifier word for a standard id.
pub fn id_word(id: StandardId) -> u32 {
    u32::from(id.as_raw()) << STD_ID_SHIFT
}

/// Standard id held in an identifier word.
#[allow(clippy::cast_possible_truncation)]
pub fn standard_id(word: u32) -> StandardId {
    let raw = ((word >> STD_ID_SHIFT) & STD_ID_MASK) as u16;
    StandardId::new(raw).unwrap_or(StandardId::ZERO)
}

/// Packs the payload little-endian into one data word.
pub const fn pack_payload(payload: [u8; PAYLOAD_LEN]) -> u32 {
    u32::from_le_bytes(payload)
}

/// Unpacks a data word, keeping the first `len` bytes and zeroing the rest.
pub fn unpack_payload(word: u32, len: usize) -> [u8; PAYLOAD_LEN] {
    let mut payload = word.to_le_bytes();
    payload
        .iter_mut()
        .skip(len)
        .for_each(|byte| *byte = 0);
    payload
}
