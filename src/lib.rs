//! FlexCAN driver for the S32K144 - polled transmit and receive of 4-byte
//! data frames over one TX and one RX mailbox.
//!
//! ## Usage
//!
//! ```ignore
//! let regs = Flexcan0::take().unwrap();
//! let settings = FlexcanSettings::default().mailboxes(MailboxLayout::MASTER);
//! let mut can = FlexcanDriver::init(regs, settings, &mut delay)?;
//!
//! loop {
//!     if let Some(frame) = can.receive() {
//!         can.transmit(frame.payload())?;
//!     }
//! }
//! ```
//!
//! The clock and pin-mux setup for the CAN0 pins is expected to be done
//! before [`FlexcanDriver::init`] is called.
#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
#[macro_use]
mod fmt;

pub mod drivers;

pub use drivers::can::FlexcanDriver;
pub use drivers::config::{
    BitTiming, Bitrate, ClockSource, FilterPolicy, FlexcanSettings, HandshakeLimit, MailboxLayout,
};
pub use drivers::error::{FrameError, HandshakeStage, InitError, TxError};
pub use drivers::mailbox::MailboxCode;
pub use drivers::message::CanFrame;
pub use drivers::registers::{Flexcan0, Register, RegisterAccess};
