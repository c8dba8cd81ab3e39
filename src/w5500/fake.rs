//! An emulated W5500 behind the [`ChipBus`] callbacks, for tests.
//!
//! It decodes SPI frames into a register map, executes the socket commands
//! the driver uses, and records the callback sequence.

use std::collections::{HashMap, VecDeque};
use std::vec::Vec;

use super::registers::{common, socket as sreg};
use crate::spi::ChipBus;

/// Buffer size the emulation assumes for every socket.
const SOCKET_BUFFER: u16 = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCall {
    Enter,
    Exit,
    Select,
    Deselect,
}

/// How the emulated peer answers a CONNECT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    Established,
    Timeout,
}

#[derive(Default)]
struct Frame {
    header: Vec<u8>,
    offset: u16,
}

impl Frame {
    fn target(&self) -> (u8, u16, bool) {
        let addr = u16::from_be_bytes([self.header[0], self.header[1]]);
        let control = self.header[2];
        (control >> 3, addr.wrapping_add(self.offset), control & 0x04 != 0)
    }
}

pub struct FakeW5500 {
    mem: HashMap<(u8, u16), u8>,
    calls: Vec<BusCall>,
    frame: Option<Frame>,
    phy_script: VecDeque<u8>,
    resets: usize,
    sent: HashMap<u8, Vec<u8>>,
    connect_outcome: ConnectOutcome,
}

fn socket_of(block: u8) -> u8 {
    block / 4
}

fn is_socket_register(block: u8) -> bool {
    block % 4 == 1
}

fn is_socket_buffer(block: u8) -> bool {
    block % 4 == 2 || block % 4 == 3
}

impl FakeW5500 {
    pub fn new() -> Self {
        let mut fake = Self {
            mem: HashMap::new(),
            calls: Vec::new(),
            frame: None,
            phy_script: VecDeque::new(),
            resets: 0,
            sent: HashMap::new(),
            connect_outcome: ConnectOutcome::Established,
        };
        fake.poke(0, common::VERSIONR, &[common::CHIP_VERSION]);
        fake.poke(0, common::PHYCFGR, &[common::PHY_LNK]);
        fake
    }

    pub fn calls(&self) -> &[BusCall] {
        &self.calls
    }

    pub fn resets(&self) -> usize {
        self.resets
    }

    pub fn sent(&self, sn: u8) -> &[u8] {
        self.sent.get(&sn).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_connect_outcome(&mut self, outcome: ConnectOutcome) {
        self.connect_outcome = outcome;
    }

    /// Values returned by successive PHYCFGR reads before falling back to
    /// the register contents.
    pub fn script_phy(&mut self, values: &[u8]) {
        self.phy_script.extend(values.iter().copied());
    }

    fn key(block: u8, addr: u16) -> (u8, u16) {
        if is_socket_buffer(block) {
            (block, addr % SOCKET_BUFFER)
        } else {
            (block, addr)
        }
    }

    pub fn peek(&self, block: u8, addr: u16, len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| {
                let at = addr.wrapping_add(i as u16);
                self.mem.get(&Self::key(block, at)).copied().unwrap_or(0)
            })
            .collect()
    }

    pub fn poke(&mut self, block: u8, addr: u16, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            self.mem
                .insert(Self::key(block, addr.wrapping_add(i as u16)), *byte);
        }
    }

    fn peek_u16(&self, block: u8, addr: u16) -> u16 {
        let bytes = self.peek(block, addr, 2);
        u16::from_be_bytes([bytes[0], bytes[1]])
    }

    fn poke_u16(&mut self, block: u8, addr: u16, value: u16) {
        self.poke(block, addr, &value.to_be_bytes());
    }

    fn raise(&mut self, sn: u8, flags: u8) {
        let reg = sn * 4 + 1;
        let ir = self.peek(reg, sreg::IR, 1)[0];
        self.poke(reg, sreg::IR, &[ir | flags]);
    }

    fn set_status(&mut self, sn: u8, status: u8) {
        self.poke(sn * 4 + 1, sreg::SR, &[status]);
    }

    /// Delivers bytes from the emulated peer into the socket's RX buffer.
    pub fn inject_rx(&mut self, sn: u8, data: &[u8]) {
        let reg = sn * 4 + 1;
        let wr = self.peek_u16(reg, sreg::RX_WR);
        self.poke(sn * 4 + 3, wr, data);
        let wr = wr.wrapping_add(data.len() as u16);
        self.poke_u16(reg, sreg::RX_WR, wr);
        self.update_rx_size(sn);
        self.raise(sn, sreg::IR_RECV);
    }

    /// The emulated peer sends FIN.
    pub fn close_by_peer(&mut self, sn: u8) {
        self.set_status(sn, sreg::SOCK_CLOSE_WAIT);
        self.raise(sn, sreg::IR_DISCON);
    }

    fn update_rx_size(&mut self, sn: u8) {
        let reg = sn * 4 + 1;
        let size = self
            .peek_u16(reg, sreg::RX_WR)
            .wrapping_sub(self.peek_u16(reg, sreg::RX_RD));
        self.poke_u16(reg, sreg::RX_RSR, size);
    }

    fn execute(&mut self, sn: u8, cmd: u8) {
        let reg = sn * 4 + 1;
        match cmd {
            sreg::CMD_OPEN => {
                if self.peek(reg, sreg::MR, 1)[0] == sreg::MR_TCP {
                    self.set_status(sn, sreg::SOCK_INIT);
                }
                self.poke_u16(reg, sreg::TX_FSR, SOCKET_BUFFER);
                self.update_rx_size(sn);
            }
            sreg::CMD_CONNECT => match self.connect_outcome {
                ConnectOutcome::Established => {
                    self.set_status(sn, sreg::SOCK_ESTABLISHED);
                    self.raise(sn, sreg::IR_CON);
                }
                ConnectOutcome::Timeout => {
                    self.set_status(sn, sreg::SOCK_CLOSED);
                    self.raise(sn, sreg::IR_TIMEOUT);
                }
            },
            sreg::CMD_SEND => {
                let rd = self.peek_u16(reg, sreg::TX_RD);
                let wr = self.peek_u16(reg, sreg::TX_WR);
                let data = self.peek(sn * 4 + 2, rd, usize::from(wr.wrapping_sub(rd)));
                self.sent.entry(sn).or_default().extend_from_slice(&data);
                self.poke_u16(reg, sreg::TX_RD, wr);
                self.poke_u16(reg, sreg::TX_FSR, SOCKET_BUFFER);
                self.raise(sn, sreg::IR_SENDOK);
            }
            sreg::CMD_RECV => self.update_rx_size(sn),
            sreg::CMD_DISCON | sreg::CMD_CLOSE => self.set_status(sn, sreg::SOCK_CLOSED),
            _ => {}
        }
    }

    fn store(&mut self, block: u8, addr: u16, byte: u8) {
        if block == 0 && addr == common::MR && byte & common::MR_RST != 0 {
            self.resets += 1;
            self.poke(block, addr, &[byte & !common::MR_RST]);
        } else if is_socket_register(block) && addr == sreg::CR {
            self.poke(block, addr, &[0]);
            self.execute(socket_of(block), byte);
        } else if is_socket_register(block) && addr == sreg::IR {
            let ir = self.peek(block, addr, 1)[0];
            self.poke(block, addr, &[ir & !byte]);
        } else {
            self.poke(block, addr, &[byte]);
        }
    }

    fn load(&mut self, block: u8, addr: u16) -> u8 {
        if block == 0 && addr == common::PHYCFGR
            && let Some(value) = self.phy_script.pop_front()
        {
            return value;
        }
        self.peek(block, addr, 1)[0]
    }
}

impl ChipBus for FakeW5500 {
    fn enter_critical(&mut self) {
        self.calls.push(BusCall::Enter);
    }

    fn exit_critical(&mut self) {
        self.calls.push(BusCall::Exit);
    }

    fn select(&mut self) {
        self.calls.push(BusCall::Select);
        self.frame = Some(Frame::default());
    }

    fn deselect(&mut self) {
        self.calls.push(BusCall::Deselect);
        self.frame = None;
    }

    fn read_byte(&mut self) -> u8 {
        let Some(frame) = self.frame.as_mut() else {
            panic!("read without chip select");
        };
        assert_eq!(frame.header.len(), 3, "read during address phase");
        let (block, addr, write) = frame.target();
        assert!(!write, "read in a write frame");
        frame.offset += 1;
        self.load(block, addr)
    }

    fn write_byte(&mut self, byte: u8) {
        let Some(frame) = self.frame.as_mut() else {
            panic!("write without chip select");
        };
        if frame.header.len() < 3 {
            frame.header.push(byte);
            return;
        }
        let (block, addr, write) = frame.target();
        assert!(write, "write in a read frame");
        frame.offset += 1;
        self.store(block, addr, byte);
    }
}
