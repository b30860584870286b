//! FlexCAN driver - polled transmit and receive over one TX and one RX
//! mailbox.
//!
//! ## Note
//!
//! There is no interrupt or completion path: [`FlexcanDriver::transmit`]
//! posts the frame and returns, [`FlexcanDriver::receive`] is meant to be
//! called from the application's main loop.

use embedded_hal::delay::DelayNs;

use super::config::FlexcanSettings;
use super::error::{FrameError, HandshakeStage, InitError, TxError};
use super::mailbox::{self, MailboxCode, CS_WORD, DATA_WORD, ID_WORD, PAYLOAD_DLC, PAYLOAD_LEN};
use super::message::CanFrame;
use super::registers::{
    Register, RegisterAccess, CTRL1_CLKSRC, MAILBOX_COUNT, MCR_FRZ, MCR_FRZACK, MCR_HALT, MCR_MAXMB, MCR_MDIS,
    MCR_NOTRDY, PCC_CGC, RAM_WORDS,
};

/// The FlexCAN driver struct.
pub struct FlexcanDriver<REGS: RegisterAccess> {
    /// Access to the CAN0 registers and message buffer RAM.
    regs: REGS,
    /// Settings applied by [`init`](Self::init). The mailbox layout stays
    /// fixed for the lifetime of the driver.
    settings: FlexcanSettings,
    /// How many times [`receive`](Self::receive) found the RX mailbox in the
    /// OVERRUN state.
    overruns: u32,
}

impl<REGS: RegisterAccess> FlexcanDriver<REGS> {
    /// Brings the controller out of reset and returns a running driver.
    ///
    /// On return the module is out of freeze mode, ready, and the RX mailbox
    /// is armed. No TX mailbox is armed.
    ///
    /// ## PARAM:
    ///
    /// - regs: the register block, obtained once at startup.
    /// - settings: bit timing, clock source, filter policy and mailbox layout.
    /// - delay: spacing between the handshake polls.
    ///
    /// The peripheral's clock source must already be running.
    ///
    /// # Errors
    ///
    /// [`InitError::Timeout`] if freeze entry, freeze exit or the ready flag is
    /// not acknowledged within `settings`' handshake limit.
    pub fn init<D: DelayNs>(
        regs: REGS,
        settings: FlexcanSettings,
        delay: &mut D,
    ) -> Result<Self, InitError> {
        let mut driver = Self {
            regs,
            settings,
            overruns: 0,
        };
        driver.initialize(delay)?;
        Ok(driver)
    }

    fn initialize<D: DelayNs>(&mut self, delay: &mut D) -> Result<(), InitError> {
        info!("FlexCAN init, CTRL1 = {:#x}", self.settings.ctrl1());

        self.enable_clock()
            .disable_module()
            .select_clock_source()
            .request_freeze();

        // Leaving the disabled state with FRZ and HALT set enters freeze mode.
        self.regs.modify(Register::Mcr, |mcr| mcr & !MCR_MDIS);
        self.wait_for(delay, HandshakeStage::FreezeEntry, |mcr| {
            mcr & MCR_FRZACK != 0
        })?;

        self.setup_bit_timing()
            .clear_message_buffers()
            .setup_filters()
            .setup_mailbox_count()
            .arm_rx_mailbox();

        self.regs.modify(Register::Mcr, |mcr| mcr & !(MCR_FRZ | MCR_HALT));
        self.wait_for(delay, HandshakeStage::FreezeExit, |mcr| {
            mcr & MCR_FRZACK == 0
        })?;
        self.wait_for(delay, HandshakeStage::NotReady, |mcr| {
            mcr & MCR_NOTRDY == 0
        })?;

        info!(
            "FlexCAN running, TX MB{} / RX MB{}",
            self.settings.mailboxes.tx_mailbox(),
            self.settings.mailboxes.rx_mailbox()
        );
        Ok(())
    }

    /// Sets the clock gate in PCC_FlexCAN0.
    fn enable_clock(&mut self) -> &mut Self {
        self.regs.modify(Register::ClockGate, |pcc| pcc | PCC_CGC);
        self
    }

    /// CLKSRC is only writable while the module is disabled.
    fn disable_module(&mut self) -> &mut Self {
        self.regs.modify(Register::Mcr, |mcr| mcr | MCR_MDIS);
        self
    }

    fn select_clock_source(&mut self) -> &mut Self {
        let clksrc = self.settings.clock_source.ctrl1_bits();
        self.regs.modify(Register::Ctrl1, |ctrl1| {
            (ctrl1 & !CTRL1_CLKSRC) | clksrc
        });
        self
    }

    fn request_freeze(&mut self) -> &mut Self {
        self.regs.modify(Register::Mcr, |mcr| mcr | MCR_FRZ | MCR_HALT);
        self
    }

    /// Writes the whole CTRL1 word. Freeze mode only.
    fn setup_bit_timing(&mut self) -> &mut Self {
        self.regs.write(Register::Ctrl1, self.settings.ctrl1());
        self
    }

    /// Zeroes every message buffer word, leaving all mailboxes inactive.
    fn clear_message_buffers(&mut self) -> &mut Self {
        for word in 0..RAM_WORDS {
            self.regs.write(Register::Ram(word), 0);
        }
        self
    }

    /// Programs every individual mask and the global mask. Freeze mode only.
    fn setup_filters(&mut self) -> &mut Self {
        let filter = self.settings.filter;
        for index in 0..MAILBOX_COUNT {
            self.regs
                .write(Register::Rximr(index), filter.individual_mask());
        }
        self.regs.write(Register::RxMgMask, filter.global_mask());
        self
    }

    /// Sets MCR.MAXMB so both mailboxes take part in matching and
    /// arbitration. Freeze mode only.
    fn setup_mailbox_count(&mut self) -> &mut Self {
        let last = u32::from(self.settings.mailboxes.last_mailbox());
        self.regs
            .modify(Register::Mcr, |mcr| (mcr & !MCR_MAXMB) | last);
        self
    }

    /// Writes the accepted id and sets the RX mailbox to EMPTY, ready for the
    /// next matching frame.
    fn arm_rx_mailbox(&mut self) -> &mut Self {
        let layout = self.settings.mailboxes;
        let rx = layout.rx_mailbox();
        self.regs.write(
            Register::mailbox_word(rx, ID_WORD),
            mailbox::id_word(layout.rx_id()),
        );
        self.regs.write(
            Register::mailbox_word(rx, CS_WORD),
            mailbox::control_word(MailboxCode::RxEmpty),
        );
        self
    }

    /// Polls MCR until `done` holds, at most `max_polls` reads.
    fn wait_for<D, F>(
        &mut self,
        delay: &mut D,
        stage: HandshakeStage,
        done: F,
    ) -> Result<(), InitError>
    where
        D: DelayNs,
        F: Fn(u32) -> bool,
    {
        let limit = self.settings.handshake;
        for _ in 0..limit.max_polls {
            if done(self.regs.read(Register::Mcr)) {
                return Ok(());
            }
            delay.delay_us(limit.poll_interval_us);
        }
        error!(
            "FlexCAN: no {} acknowledge after {} polls",
            stage, limit.max_polls
        );
        Err(InitError::Timeout { stage })
    }

    /// Posts a 4-byte data frame on the TX mailbox with the configured TX id.
    ///
    /// Returns as soon as the mailbox is loaded; the frame goes out when the
    /// controller wins arbitration. Calling this again before the previous
    /// frame left overwrites it, use [`try_transmit`](Self::try_transmit) to
    /// check first.
    ///
    /// # Errors
    ///
    /// None at present, the mailbox is loaded unconditionally.
    pub fn transmit(&mut self, payload: [u8; PAYLOAD_LEN]) -> Result<(), TxError> {
        self.load_tx_mailbox(payload, PAYLOAD_DLC);
        Ok(())
    }

    /// Like [`transmit`](Self::transmit), but refuses while the previous data
    /// frame is still queued.
    ///
    /// # Errors
    ///
    /// [`TxError::Busy`] if the TX mailbox code is still TX DATA.
    pub fn try_transmit(&mut self, payload: [u8; PAYLOAD_LEN]) -> Result<(), TxError> {
        if self.tx_busy() {
            return Err(TxError::Busy);
        }
        self.transmit(payload)
    }

    /// `true` once the hardware has flagged the TX mailbox as sent.
    pub fn transmit_complete(&mut self) -> bool {
        let tx = self.settings.mailboxes.tx_mailbox();
        self.regs.read(Register::Iflag1) & (1 << tx) != 0
    }

    fn tx_busy(&mut self) -> bool {
        let tx = self.settings.mailboxes.tx_mailbox();
        let cs = self.regs.read(Register::mailbox_word(tx, CS_WORD));
        mailbox::code(cs) == Ok(MailboxCode::TxData)
    }

    /// Reloads the TX mailbox. The control word is written last: writing the
    /// TX DATA code hands the mailbox to the hardware.
    fn load_tx_mailbox(&mut self, payload: [u8; PAYLOAD_LEN], dlc: u8) {
        let layout = self.settings.mailboxes;
        let tx = layout.tx_mailbox();

        // Clear a stale completion flag before reuse (write 1 to clear).
        self.regs.write(Register::Iflag1, 1 << tx);
        self.regs.write(
            Register::mailbox_word(tx, CS_WORD),
            mailbox::control_word(MailboxCode::TxInactive),
        );
        self.regs.write(
            Register::mailbox_word(tx, ID_WORD),
            mailbox::id_word(layout.tx_id()),
        );
        self.regs.write(
            Register::mailbox_word(tx, DATA_WORD),
            mailbox::pack_payload(payload),
        );
        self.regs.write(
            Register::mailbox_word(tx, CS_WORD),
            mailbox::tx_data_control_word(dlc),
        );
        trace!("FlexCAN TX MB{}: dlc={} data={}", tx, dlc, payload);
    }

    /// Takes the frame out of the RX mailbox if one has arrived.
    ///
    /// Returns `None` when the mailbox is empty, busy, or in OVERRUN (the
    /// latter is counted in [`overruns`](Self::overruns)). Never blocks.
    ///
    /// An overrun mailbox is left as it is and never re-armed: from then on
    /// every call returns `None` until the controller is initialized again.
    ///
    /// When a frame is taken the mailbox is read in this order: control word,
    /// id, data, then the free running timer. The timer read releases the
    /// lock taken by the control word read; a mailbox left locked never
    /// receives again. The mailbox is then re-armed and its flag cleared.
    pub fn receive(&mut self) -> Option<CanFrame> {
        let rx = self.settings.mailboxes.rx_mailbox();
        let cs = self.regs.read(Register::mailbox_word(rx, CS_WORD));

        match mailbox::code(cs) {
            Ok(MailboxCode::RxFull) => {}
            Ok(MailboxCode::RxOverrun) => {
                self.overruns = self.overruns.wrapping_add(1);
                warn!("FlexCAN RX MB{} overrun ({})", rx, self.overruns);
                self.unlock_mailbox();
                return None;
            }
            _ => {
                self.unlock_mailbox();
                return None;
            }
        }

        let dlc = mailbox::dlc(cs).min(PAYLOAD_DLC);
        let id = mailbox::standard_id(self.regs.read(Register::mailbox_word(rx, ID_WORD)));
        let data = mailbox::unpack_payload(
            self.regs.read(Register::mailbox_word(rx, DATA_WORD)),
            usize::from(dlc),
        );

        self.unlock_mailbox();
        self.arm_rx_mailbox();
        self.regs.write(Register::Iflag1, 1 << rx);

        let frame = CanFrame::from_payload(id, dlc, data);
        trace!(
            "FlexCAN RX MB{}: id={} dlc={} ts={}",
            rx,
            id.as_raw(),
            dlc,
            mailbox::timestamp(cs)
        );
        Some(frame)
    }

    /// `true` if the RX mailbox flag is set, i.e. a frame is waiting.
    pub fn rx_pending(&mut self) -> bool {
        let rx = self.settings.mailboxes.rx_mailbox();
        self.regs.read(Register::Iflag1) & (1 << rx) != 0
    }

    /// Reading the free running timer releases the mailbox lock.
    fn unlock_mailbox(&mut self) {
        let _ = self.regs.read(Register::Timer);
    }

    /// Number of OVERRUN observations since init. Wraps on overflow.
    ///
    /// A non-zero value means reception has stopped: the RX mailbox stays in
    /// OVERRUN and every further [`receive`](Self::receive) adds one.
    pub const fn overruns(&self) -> u32 {
        self.overruns
    }

    /// Settings the driver was initialized with.
    pub const fn settings(&self) -> &FlexcanSettings {
        &self.settings
    }

    /// Releases the register block.
    pub fn free(self) -> REGS {
        self.regs
    }
}

impl<REGS: RegisterAccess> embedded_can::nb::Can for FlexcanDriver<REGS> {
    type Frame = CanFrame;
    type Error = FrameError;

    /// Loads the TX mailbox with `frame`, keeping its DLC.
    ///
    /// `WouldBlock` while the previous frame is still queued. Nothing is ever
    /// replaced, so the returned frame is always `None`.
    fn transmit(&mut self, frame: &CanFrame) -> nb::Result<Option<CanFrame>, FrameError> {
        if frame.standard_id() != self.settings.mailboxes.tx_id() {
            return Err(nb::Error::Other(FrameError::UnexpectedId));
        }
        if self.tx_busy() {
            return Err(nb::Error::WouldBlock);
        }
        self.load_tx_mailbox(frame.payload(), frame.len());
        Ok(None)
    }

    /// `WouldBlock` until a frame is available.
    fn receive(&mut self) -> nb::Result<CanFrame, FrameError> {
        FlexcanDriver::receive(self).ok_or(nb::Error::WouldBlock)
    }
}
