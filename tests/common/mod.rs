//! Simulated FlexCAN register block shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use can_flexcan::drivers::mailbox::{self, MailboxCode};
use can_flexcan::drivers::registers::{
    MAILBOX_COUNT, MAILBOX_WORDS, MCR_FRZ, MCR_FRZACK, MCR_HALT, MCR_MAXMB, MCR_MDIS, MCR_NOTRDY,
    PCC_CGC, RAM_WORDS,
};
use can_flexcan::{FlexcanDriver, FlexcanSettings, HandshakeLimit, Register, RegisterAccess};
use embedded_hal::delay::DelayNs;

/// MCR value out of reset.
const MCR_RESET: u32 = 0xD890_000F;
/// Bits of MCR owned by the hardware.
const MCR_READ_ONLY: u32 = MCR_FRZACK | MCR_NOTRDY | (1 << 20);

/// One register access seen by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read(Register, u32),
    Write(Register, u32),
}

/// How the simulated hardware answers a freeze handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Acknowledge on the read following `n` unacknowledged reads.
    After(u32),
    /// Never acknowledge.
    Never,
}

pub struct SimState {
    clock_gate: u32,
    mcr: u32,
    ctrl1: u32,
    timer: u32,
    rxmgmask: u32,
    iflag1: u32,
    ram: [u32; RAM_WORDS],
    rximr: [u32; MAILBOX_COUNT],
    frozen: bool,
    countdown: Option<u32>,
    freeze_entry: Ack,
    freeze_exit: Ack,
    ready_stuck: bool,
    locked: Option<usize>,
    log: Vec<Access>,
    config_violations: Vec<Register>,
    unclocked_accesses: usize,
    sent: Vec<SentFrame>,
}

/// A frame the simulated controller put on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentFrame {
    pub id: u16,
    pub dlc: u8,
    pub data_word: u32,
}

impl SimState {
    fn new() -> Self {
        Self {
            clock_gate: 0,
            mcr: MCR_RESET & !MCR_READ_ONLY,
            ctrl1: 0,
            timer: 0,
            rxmgmask: 0xFFFF_FFFF,
            iflag1: 0,
            ram: [0; RAM_WORDS],
            rximr: [0xFFFF_FFFF; MAILBOX_COUNT],
            frozen: false,
            countdown: None,
            freeze_entry: Ack::After(2),
            freeze_exit: Ack::After(2),
            ready_stuck: false,
            locked: None,
            log: Vec::new(),
            config_violations: Vec::new(),
            unclocked_accesses: 0,
            sent: Vec::new(),
        }
    }

    fn freeze_requested(&self) -> bool {
        self.mcr & MCR_MDIS == 0 && self.mcr & MCR_FRZ != 0 && self.mcr & MCR_HALT != 0
    }

    fn mcr_view(&self) -> u32 {
        let mut mcr = self.mcr;
        if self.frozen {
            mcr |= MCR_FRZACK;
        }
        if self.frozen || self.mcr & MCR_MDIS != 0 || self.ready_stuck {
            mcr |= MCR_NOTRDY;
        }
        mcr
    }

    fn tick_handshake(&mut self) {
        if self.freeze_requested() == self.frozen {
            return;
        }
        match self.countdown {
            Some(0) => self.frozen = self.freeze_requested(),
            Some(n) => self.countdown = Some(n - 1),
            None => {}
        }
    }

    /// Mailboxes above MCR.MAXMB neither match nor transmit.
    fn participates(&self, mb: usize) -> bool {
        mb as u32 <= self.mcr & MCR_MAXMB
    }

    fn code_of(&self, mb: usize) -> Result<MailboxCode, u8> {
        mailbox::code(self.ram[mb * MAILBOX_WORDS])
    }

    fn read(&mut self, reg: Register) -> u32 {
        if reg != Register::ClockGate && self.clock_gate & PCC_CGC == 0 {
            self.unclocked_accesses += 1;
        }
        let value = match reg {
            Register::ClockGate => self.clock_gate,
            Register::Mcr => {
                self.tick_handshake();
                self.mcr_view()
            }
            Register::Ctrl1 => self.ctrl1,
            Register::Timer => {
                self.locked = None;
                let now = self.timer;
                self.timer = self.timer.wrapping_add(1) & 0xFFFF;
                now
            }
            Register::RxMgMask => self.rxmgmask,
            Register::Iflag1 => self.iflag1,
            Register::Ram(n) => {
                if n % MAILBOX_WORDS == 0 {
                    let mb = n / MAILBOX_WORDS;
                    // Reading the control word of an RX mailbox locks it.
                    if matches!(self.code_of(mb), Ok(code) if (code as u8) & 0b1000 == 0) {
                        self.locked = Some(mb);
                    }
                }
                self.ram[n]
            }
            Register::Rximr(n) => self.rximr[n],
        };
        self.log.push(Access::Read(reg, value));
        value
    }

    fn write(&mut self, reg: Register, value: u32) {
        if reg != Register::ClockGate && self.clock_gate & PCC_CGC == 0 {
            self.unclocked_accesses += 1;
        }
        self.log.push(Access::Write(reg, value));
        match reg {
            Register::ClockGate => self.clock_gate = value,
            Register::Mcr => {
                if (value ^ self.mcr) & MCR_MAXMB != 0 && !self.frozen {
                    self.config_violations.push(reg);
                }
                let was_requested = self.freeze_requested();
                self.mcr = value & !MCR_READ_ONLY;
                let requested = self.freeze_requested();
                if requested != was_requested && requested != self.frozen {
                    let ack = if requested {
                        self.freeze_entry
                    } else {
                        self.freeze_exit
                    };
                    self.countdown = match ack {
                        Ack::After(n) => Some(n),
                        Ack::Never => None,
                    };
                }
            }
            Register::Ctrl1 => {
                if !self.frozen && self.mcr & MCR_MDIS == 0 {
                    self.config_violations.push(reg);
                }
                self.ctrl1 = value;
            }
            Register::Timer => self.timer = value & 0xFFFF,
            Register::RxMgMask => {
                if !self.frozen {
                    self.config_violations.push(reg);
                }
                self.rxmgmask = value;
            }
            Register::Iflag1 => self.iflag1 &= !value,
            Register::Ram(n) => self.ram[n] = value,
            Register::Rximr(n) => {
                if !self.frozen {
                    self.config_violations.push(reg);
                }
                self.rximr[n] = value;
            }
        }
    }
}

/// Cloneable handle to one simulated controller. The driver owns one clone,
/// the test keeps another to play the hardware side.
#[derive(Clone)]
pub struct SimFlexcan(Rc<RefCell<SimState>>);

impl RegisterAccess for SimFlexcan {
    fn read(&mut self, reg: Register) -> u32 {
        self.0.borrow_mut().read(reg)
    }

    fn write(&mut self, reg: Register, value: u32) {
        self.0.borrow_mut().write(reg, value);
    }
}

impl SimFlexcan {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(SimState::new())))
    }

    pub fn freeze_entry(self, ack: Ack) -> Self {
        self.0.borrow_mut().freeze_entry = ack;
        self
    }

    pub fn freeze_exit(self, ack: Ack) -> Self {
        self.0.borrow_mut().freeze_exit = ack;
        self
    }

    /// NOTRDY never clears.
    pub fn ready_stuck(self) -> Self {
        self.0.borrow_mut().ready_stuck = true;
        self
    }

    /// MCR as the hardware would report it, without advancing the handshake.
    pub fn mcr(&self) -> u32 {
        self.0.borrow().mcr_view()
    }

    /// MCR.MAXMB, the last mailbox taking part in matching and arbitration.
    pub fn maxmb(&self) -> u32 {
        self.0.borrow().mcr & MCR_MAXMB
    }

    pub fn clock_gate(&self) -> u32 {
        self.0.borrow().clock_gate
    }

    pub fn ctrl1(&self) -> u32 {
        self.0.borrow().ctrl1
    }

    pub fn rxmgmask(&self) -> u32 {
        self.0.borrow().rxmgmask
    }

    pub fn rximr(&self) -> [u32; MAILBOX_COUNT] {
        self.0.borrow().rximr
    }

    pub fn iflag1(&self) -> u32 {
        self.0.borrow().iflag1
    }

    pub fn ram(&self) -> [u32; RAM_WORDS] {
        self.0.borrow().ram
    }

    pub fn mailbox(&self, mb: u8) -> [u32; MAILBOX_WORDS] {
        let state = self.0.borrow();
        let base = usize::from(mb) * MAILBOX_WORDS;
        let mut words = [0; MAILBOX_WORDS];
        words.copy_from_slice(&state.ram[base..base + MAILBOX_WORDS]);
        words
    }

    pub fn code(&self, mb: u8) -> Result<MailboxCode, u8> {
        self.0.borrow().code_of(usize::from(mb))
    }

    pub fn is_locked(&self, mb: u8) -> bool {
        self.0.borrow().locked == Some(usize::from(mb))
    }

    /// Overwrites a RAM word behind the driver's back.
    pub fn poke_ram(&self, word: usize, value: u32) {
        self.0.borrow_mut().ram[word] = value;
    }

    pub fn log(&self) -> Vec<Access> {
        self.0.borrow().log.clone()
    }

    pub fn writes(&self) -> Vec<(Register, u32)> {
        self.log()
            .into_iter()
            .filter_map(|access| match access {
                Access::Write(reg, value) => Some((reg, value)),
                Access::Read(..) => None,
            })
            .collect()
    }

    pub fn clear_log(&self) {
        self.0.borrow_mut().log.clear();
    }

    pub fn config_violations(&self) -> Vec<Register> {
        self.0.borrow().config_violations.clone()
    }

    pub fn unclocked_accesses(&self) -> usize {
        self.0.borrow().unclocked_accesses
    }

    pub fn sent(&self) -> Vec<SentFrame> {
        self.0.borrow().sent.clone()
    }

    /// A standard frame arrives from the bus. Returns `true` if a mailbox
    /// took it.
    pub fn deliver(&self, id: u16, data: &[u8]) -> bool {
        assert!(data.len() <= 4);
        let mut bytes = [0u8; 4];
        bytes[..data.len()].copy_from_slice(data);
        self.deliver_frame(id, data.len() as u8, u32::from_le_bytes(bytes))
    }

    /// Like [`deliver`](Self::deliver) with a raw DLC and first data word.
    pub fn deliver_frame(&self, id: u16, dlc: u8, data_word: u32) -> bool {
        let mut state = self.0.borrow_mut();
        let frame_id = u32::from(id) << 18;
        let mask = state.rxmgmask & 0x1FFF_FFFF;

        let target = (0..MAILBOX_COUNT).find(|&mb| {
            let armed = matches!(
                state.code_of(mb),
                Ok(MailboxCode::RxEmpty | MailboxCode::RxFull | MailboxCode::RxOverrun)
            );
            let mb_id = state.ram[mb * MAILBOX_WORDS + 1];
            armed && state.participates(mb) && (frame_id ^ mb_id) & mask == 0
        });
        let Some(mb) = target else {
            return false;
        };
        if state.locked == Some(mb) {
            return false;
        }

        let next = match state.code_of(mb) {
            Ok(MailboxCode::RxEmpty) => MailboxCode::RxFull,
            _ => MailboxCode::RxOverrun,
        };
        let base = mb * MAILBOX_WORDS;
        state.ram[base] = mailbox::control_word(next)
            | (u32::from(dlc & 0xF) << 16)
            | (state.timer & 0xFFFF);
        state.ram[base + 1] = frame_id;
        state.ram[base + 2] = data_word;
        state.iflag1 |= 1 << mb;
        true
    }

    /// The TX mailbox wins arbitration and its frame leaves.
    pub fn complete_transmission(&self, mb: u8) -> Option<SentFrame> {
        let mut state = self.0.borrow_mut();
        let mb = usize::from(mb);
        if state.code_of(mb) != Ok(MailboxCode::TxData) || !state.participates(mb) {
            return None;
        }
        let base = mb * MAILBOX_WORDS;
        let cs = state.ram[base];
        let frame = SentFrame {
            id: mailbox::standard_id(state.ram[base + 1]).as_raw(),
            dlc: mailbox::dlc(cs),
            data_word: state.ram[base + 2],
        };
        state.ram[base] = (cs & 0x00FF_FFFF) | mailbox::control_word(MailboxCode::TxInactive);
        state.iflag1 |= 1 << mb;
        state.sent.push(frame);
        Some(frame)
    }
}

/// `DelayNs` that only counts.
#[derive(Debug, Default)]
pub struct CountingDelay {
    pub calls: u32,
    pub total_ns: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.calls += 1;
        self.total_ns += u64::from(ns);
    }

    fn delay_us(&mut self, us: u32) {
        self.calls += 1;
        self.total_ns += u64::from(us) * 1_000;
    }
}

/// Settings with a short handshake bound, so timeouts stay cheap.
pub fn test_settings() -> FlexcanSettings {
    FlexcanSettings::default().handshake(HandshakeLimit::new(64, 1))
}

/// A driver initialized against a fresh simulator, plus the test's handle.
pub fn running(settings: FlexcanSettings) -> (FlexcanDriver<SimFlexcan>, SimFlexcan) {
    let sim = SimFlexcan::new();
    let mut delay = CountingDelay::default();
    let driver = FlexcanDriver::init(sim.clone(), settings, &mut delay)
        .expect("simulated controller acknowledges every handshake");
    sim.clear_log();
    (driver, sim)
}
