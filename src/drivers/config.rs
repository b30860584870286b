//! Controller settings: bit timing, clock source, acceptance filtering,
//! mailbox assignment and handshake limits.

use embedded_can::StandardId;

use super::registers::{CTRL1_CLKSRC, MAILBOX_COUNT};

/// CAN bit timing, in time quanta, as programmed into CTRL1.
///
/// One bit is `1 + prop_seg + phase_seg1 + phase_seg2` quanta, each quantum is
/// `prescaler` cycles of the CAN engine clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BitTiming {
    prescaler: u16,
    prop_seg: u8,
    phase_seg1: u8,
    phase_seg2: u8,
    sync_jump_width: u8,
    triple_sample: bool,
}

impl BitTiming {
    /// 500 kbit/s from the 8 MHz oscillator, 16 quanta per bit. CTRL1 timing
    /// bits `0x00DB_0006`.
    pub const KBPS_500_AT_8MHZ: Self = Self::from_parts(1, 7, 4, 4, 4);

    /// Creates a bit timing, validating every field against the CTRL1 ranges.
    ///
    /// - `prescaler`: 1..=256
    /// - `prop_seg`, `phase_seg1`: 1..=8
    /// - `phase_seg2`: 2..=8
    /// - `sync_jump_width`: 1..=4 and not longer than `phase_seg1`
    pub const fn new(
        prescaler: u16,
        prop_seg: u8,
        phase_seg1: u8,
        phase_seg2: u8,
        sync_jump_width: u8,
    ) -> Option<Self> {
        if prescaler < 1 || prescaler > 256 {
            return None;
        }
        if prop_seg < 1 || prop_seg > 8 || phase_seg1 < 1 || phase_seg1 > 8 {
            return None;
        }
        if phase_seg2 < 2 || phase_seg2 > 8 {
            return None;
        }
        if sync_jump_width < 1 || sync_jump_width > 4 || sync_jump_width > phase_seg1 {
            return None;
        }
        Some(Self::from_parts(
            prescaler,
            prop_seg,
            phase_seg1,
            phase_seg2,
            sync_jump_width,
        ))
    }

    const fn from_parts(
        prescaler: u16,
        prop_seg: u8,
        phase_seg1: u8,
        phase_seg2: u8,
        sync_jump_width: u8,
    ) -> Self {
        Self {
            prescaler,
            prop_seg,
            phase_seg1,
            phase_seg2,
            sync_jump_width,
            triple_sample: false,
        }
    }

    /// Sample each bit three times instead of once (CTRL1.SMP).
    #[must_use]
    pub const fn triple_sampling(mut self, enabled: bool) -> Self {
        self.triple_sample = enabled;
        self
    }

    /// PRESDIV, RJW, PSEG1, PSEG2, SMP and PROPSEG fields of CTRL1.
    pub const fn ctrl1_bits(&self) -> u32 {
        let smp = if self.triple_sample { 1 << 7 } else { 0 };
        ((self.prescaler as u32 - 1) << 24)
            | ((self.sync_jump_width as u32 - 1) << 22)
            | ((self.phase_seg1 as u32 - 1) << 19)
            | ((self.phase_seg2 as u32 - 1) << 16)
            | smp
            | (self.prop_seg as u32 - 1)
    }

    /// Time quanta per bit.
    pub const fn quanta_per_bit(&self) -> u32 {
        1 + self.prop_seg as u32 + self.phase_seg1 as u32 + self.phase_seg2 as u32
    }

    /// Resulting bit rate for a CAN engine clock of `clock_hz`.
    pub const fn bitrate(&self, clock_hz: u32) -> u32 {
        clock_hz / (self.prescaler as u32 * self.quanta_per_bit())
    }
}

impl Default for BitTiming {
    fn default() -> Self {
        Self::KBPS_500_AT_8MHZ
    }
}

/// Common bit rates for the 8 MHz oscillator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Bitrate {
    /// 125 kbit/s
    Kbps125,
    /// 250 kbit/s
    Kbps250,
    /// 500 kbit/s
    Kbps500,
    /// 1 Mbit/s
    Kbps1000,
}

impl Bitrate {
    /// Bit timing for this rate at an 8 MHz CAN engine clock.
    pub const fn timing_8mhz(self) -> BitTiming {
        match self {
            Self::Kbps125 => BitTiming::from_parts(4, 7, 4, 4, 4),
            Self::Kbps250 => BitTiming::from_parts(2, 7, 4, 4, 4),
            Self::Kbps500 => BitTiming::KBPS_500_AT_8MHZ,
            Self::Kbps1000 => BitTiming::from_parts(1, 2, 3, 2, 2),
        }
    }
}

/// CAN engine clock source (CTRL1.CLKSRC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockSource {
    /// Oscillator clock (SOSCDIV2), 8 MHz on the evaluation board.
    #[default]
    Oscillator,
    /// Peripheral (bus) clock.
    PeripheralClock,
}

impl ClockSource {
    /// CLKSRC bit of CTRL1.
    pub const fn ctrl1_bits(self) -> u32 {
        match self {
            Self::Oscillator => 0,
            Self::PeripheralClock => CTRL1_CLKSRC,
        }
    }
}

/// Receive acceptance masking.
///
/// A set mask bit means "this id bit must match the mailbox id", a clear bit
/// means "don't care".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FilterPolicy {
    /// Every mask bit is don't-care: the RX mailbox takes any identifier.
    #[default]
    AcceptAll,
    /// Every identifier bit is compared: the RX mailbox only takes its own id.
    ExactMatch,
}

impl FilterPolicy {
    /// Value for each RXIMR register.
    pub const fn individual_mask(self) -> u32 {
        match self {
            Self::AcceptAll => 0,
            Self::ExactMatch => 0xFFFF_FFFF,
        }
    }

    /// Value for RXMGMASK, covering the 29-bit identifier field.
    pub const fn global_mask(self) -> u32 {
        match self {
            Self::AcceptAll => 0,
            Self::ExactMatch => 0x1FFF_FFFF,
        }
    }
}

const fn std_id(raw: u16) -> StandardId {
    match StandardId::new(raw) {
        Some(id) => id,
        None => panic!("standard id out of range"),
    }
}

/// Which mailboxes transmit and receive, and with which identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxLayout {
    tx_mailbox: u8,
    tx_id: StandardId,
    rx_mailbox: u8,
    rx_id: StandardId,
}

impl MailboxLayout {
    /// Single node: transmit on MB0 with id 0x1, receive id 0x2 on MB4.
    pub const DEFAULT: Self = Self {
        tx_mailbox: 0,
        tx_id: std_id(0x1),
        rx_mailbox: 4,
        rx_id: std_id(0x2),
    };

    /// Master of a two node pair: transmit on MB1 with id 0x1, receive id 0x2
    /// on MB0.
    pub const MASTER: Self = Self {
        tx_mailbox: 1,
        tx_id: std_id(0x1),
        rx_mailbox: 0,
        rx_id: std_id(0x2),
    };

    /// Slave of a two node pair: transmit on MB0 with id 0x2, receive id 0x1
    /// on MB1.
    pub const SLAVE: Self = Self {
        tx_mailbox: 0,
        tx_id: std_id(0x2),
        rx_mailbox: 1,
        rx_id: std_id(0x1),
    };

    /// Creates a layout. Returns `None` if a mailbox index is out of range or
    /// both roles share one mailbox.
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(
        tx_mailbox: u8,
        tx_id: StandardId,
        rx_mailbox: u8,
        rx_id: StandardId,
    ) -> Option<Self> {
        if tx_mailbox as usize >= MAILBOX_COUNT || rx_mailbox as usize >= MAILBOX_COUNT {
            return None;
        }
        if tx_mailbox == rx_mailbox {
            return None;
        }
        Some(Self {
            tx_mailbox,
            tx_id,
            rx_mailbox,
            rx_id,
        })
    }

    /// Same layout with another accepted receive id.
    #[must_use]
    pub const fn with_rx_id(mut self, rx_id: StandardId) -> Self {
        self.rx_id = rx_id;
        self
    }

    /// Same layout with another outgoing id.
    #[must_use]
    pub const fn with_tx_id(mut self, tx_id: StandardId) -> Self {
        self.tx_id = tx_id;
        self
    }

    pub const fn tx_mailbox(&self) -> u8 {
        self.tx_mailbox
    }

    pub const fn tx_id(&self) -> StandardId {
        self.tx_id
    }

    pub const fn rx_mailbox(&self) -> u8 {
        self.rx_mailbox
    }

    pub const fn rx_id(&self) -> StandardId {
        self.rx_id
    }

    /// Highest mailbox index in use, the value MCR.MAXMB must cover.
    pub const fn last_mailbox(&self) -> u8 {
        if self.tx_mailbox > self.rx_mailbox {
            self.tx_mailbox
        } else {
            self.rx_mailbox
        }
    }
}

impl Default for MailboxLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for MailboxLayout {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "TX MB{} id={=u16:#x}, RX MB{} id={=u16:#x}",
            self.tx_mailbox,
            self.tx_id.as_raw(),
            self.rx_mailbox,
            self.rx_id.as_raw()
        );
    }
}

/// Bound on the busy-wait polls of the freeze handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandshakeLimit {
    /// Register reads before giving up.
    pub max_polls: u32,
    /// Delay between two reads, in microseconds.
    pub poll_interval_us: u32,
}

impl HandshakeLimit {
    pub const fn new(max_polls: u32, poll_interval_us: u32) -> Self {
        Self {
            max_polls,
            poll_interval_us,
        }
    }
}

impl Default for HandshakeLimit {
    fn default() -> Self {
        Self::new(100_000, 1)
    }
}

/// Struct for the settings applied by [`FlexcanDriver::init`].
///
/// [`FlexcanDriver::init`]: super::can::FlexcanDriver::init
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlexcanSettings {
    pub(crate) bit_timing: BitTiming,
    pub(crate) clock_source: ClockSource,
    pub(crate) filter: FilterPolicy,
    pub(crate) mailboxes: MailboxLayout,
    pub(crate) handshake: HandshakeLimit,
}

impl FlexcanSettings {
    /// Creates a new `FlexcanSettings` instance with specified settings.
    #[must_use]
    pub const fn new(
        bit_timing: BitTiming,
        clock_source: ClockSource,
        filter: FilterPolicy,
        mailboxes: MailboxLayout,
        handshake: HandshakeLimit,
    ) -> Self {
        Self {
            bit_timing,
            clock_source,
            filter,
            mailboxes,
            handshake,
        }
    }

    #[must_use]
    pub const fn bit_timing(mut self, bit_timing: BitTiming) -> Self {
        self.bit_timing = bit_timing;
        self
    }

    /// Preset bit rate, assuming the 8 MHz oscillator.
    #[must_use]
    pub const fn bitrate(mut self, bitrate: Bitrate) -> Self {
        self.bit_timing = bitrate.timing_8mhz();
        self
    }

    #[must_use]
    pub const fn clock_source(mut self, clock_source: ClockSource) -> Self {
        self.clock_source = clock_source;
        self
    }

    #[must_use]
    pub const fn filter(mut self, filter: FilterPolicy) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub const fn mailboxes(mut self, mailboxes: MailboxLayout) -> Self {
        self.mailboxes = mailboxes;
        self
    }

    /// Accepted receive id, keeping the mailbox indices.
    #[must_use]
    pub const fn rx_id(mut self, rx_id: StandardId) -> Self {
        self.mailboxes = self.mailboxes.with_rx_id(rx_id);
        self
    }

    #[must_use]
    pub const fn handshake(mut self, handshake: HandshakeLimit) -> Self {
        self.handshake = handshake;
        self
    }

    pub const fn layout(&self) -> &MailboxLayout {
        &self.mailboxes
    }

    /// Full CTRL1 value: bit timing plus clock source.
    pub const fn ctrl1(&self) -> u32 {
        self.bit_timing.ctrl1_bits() | self.clock_source.ctrl1_bits()
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FlexcanSettings {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "CTRL1={=u32:#x} {} {} ({})",
            self.ctrl1(),
            self.filter,
            self.mailboxes,
            self.handshake
        );
    }
}
