//! FlexCAN register map and the register access seam.
//!
//! Every driver operation goes through [`RegisterAccess`], so the same driver
//! code runs against the memory-mapped peripheral ([`Flexcan0`]) and against a
//! simulated register block in tests.

use core::sync::atomic::{AtomicBool, Ordering};

/// MCR: module disable.
pub const MCR_MDIS: u32 = 1 << 31;
/// MCR: freeze enable.
pub const MCR_FRZ: u32 = 1 << 30;
/// MCR: halt request.
pub const MCR_HALT: u32 = 1 << 28;
/// MCR: module not ready (disabled, frozen or stopped).
pub const MCR_NOTRDY: u32 = 1 << 27;
/// MCR: freeze mode acknowledge.
pub const MCR_FRZACK: u32 = 1 << 24;
/// MCR: number of the last mailbox taking part in matching and arbitration.
/// Resets to 15.
pub const MCR_MAXMB: u32 = 0x7F;

/// CTRL1: clock source select (0 = oscillator, 1 = peripheral clock).
pub const CTRL1_CLKSRC: u32 = 1 << 13;

/// PCC_FlexCAN0: clock gate control.
pub const PCC_CGC: u32 = 1 << 30;

/// Number of 32-bit words in the message buffer RAM.
pub const RAM_WORDS: usize = 128;
/// Words per message buffer (control/status, id, two data words).
pub const MAILBOX_WORDS: usize = 4;
/// Number of message buffers backed by [`RAM_WORDS`].
pub const MAILBOX_COUNT: usize = RAM_WORDS / MAILBOX_WORDS;

/// A 32-bit register of the CAN0 module (plus its PCC clock gate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// PCC_FlexCAN0 - peripheral clock control, lives outside the CAN block.
    ClockGate,
    /// Module Configuration Register.
    Mcr,
    /// Control 1 Register - bit timing and clock source.
    Ctrl1,
    /// Free Running Timer. Reading it releases the mailbox lock.
    Timer,
    /// Rx Mailboxes Global Mask Register.
    RxMgMask,
    /// Interrupt Flags 1 Register - one flag per mailbox, write 1 to clear.
    Iflag1,
    /// Word `n` of the message buffer RAM.
    Ram(usize),
    /// Rx Individual Mask Register of mailbox `n`.
    Rximr(usize),
}

impl Register {
    /// Byte offset from the CAN0 base address.
    ///
    /// [`Register::ClockGate`] is not part of the CAN block and has no offset.
    pub const fn offset(self) -> Option<usize> {
        match self {
            Self::ClockGate => None,
            Self::Mcr => Some(0x00),
            Self::Ctrl1 => Some(0x04),
            Self::Timer => Some(0x08),
            Self::RxMgMask => Some(0x10),
            Self::Iflag1 => Some(0x30),
            Self::Ram(n) => Some(0x80 + 4 * n),
            Self::Rximr(n) => Some(0x880 + 4 * n),
        }
    }

    /// Word `word` of mailbox `mailbox`.
    pub const fn mailbox_word(mailbox: u8, word: usize) -> Self {
        Self::Ram(mailbox as usize * MAILBOX_WORDS + word)
    }
}

/// Raw 32-bit access to the FlexCAN registers.
///
/// Reads take `&mut self`: some reads have side effects on the hardware
/// (reading [`Register::Timer`] unlocks the last mailbox whose control word
/// was read).
pub trait RegisterAccess {
    /// Read a register.
    fn read(&mut self, reg: Register) -> u32;

    /// Write a register.
    fn write(&mut self, reg: Register, value: u32);

    /// Read-modify-write a register.
    fn modify<F: FnOnce(u32) -> u32>(&mut self, reg: Register, f: F) {
        let value = self.read(reg);
        self.write(reg, f(value));
    }
}

impl<T: RegisterAccess> RegisterAccess for &mut T {
    fn read(&mut self, reg: Register) -> u32 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u32) {
        (**self).write(reg, value);
    }
}

static CAN0_TAKEN: AtomicBool = AtomicBool::new(false);

/// Memory-mapped CAN0 peripheral of the S32K144.
pub struct Flexcan0 {
    _private: (),
}

impl Flexcan0 {
    /// CAN0 base address.
    pub const BASE: usize = 0x4002_4000;
    /// Address of PCC_FlexCAN0 (PCC base 0x4006_5000, index 36).
    pub const PCC_ADDRESS: usize = 0x4006_5090;

    /// Returns the CAN0 handle the first time it is called, `None` afterwards.
    pub fn take() -> Option<Self> {
        if CAN0_TAKEN.swap(true, Ordering::AcqRel) {
            None
        } else {
            Some(Self { _private: () })
        }
    }

    /// Creates a handle without checking whether one already exists.
    ///
    /// # Safety
    ///
    /// Two live handles let two drivers reprogram the same mailboxes.
    pub unsafe fn steal() -> Self {
        CAN0_TAKEN.store(true, Ordering::Release);
        Self { _private: () }
    }

    fn address(reg: Register) -> usize {
        match reg.offset() {
            Some(offset) => Self::BASE + offset,
            None => Self::PCC_ADDRESS,
        }
    }
}

impl RegisterAccess for Flexcan0 {
    fn read(&mut self, reg: Register) -> u32 {
        // SAFETY: `address` only yields CAN0/PCC register addresses and the
        // handle is unique.
        unsafe { core::ptr::read_volatile(Self::address(reg) as *const u32) }
    }

    fn write(&mut self, reg: Register, value: u32) {
        // SAFETY: see `read`.
        unsafe { core::ptr::write_volatile(Self::address(reg) as *mut u32, value) }
    }
}
