//! W5500 register map.
//!
//! Addresses are offsets inside a block; the block is chosen by the BSB field
//! of the control byte that follows the address in every SPI frame.

/// Block select values.
pub mod block {
    pub const COMMON: u8 = 0x00;

    pub const fn socket(sn: u8) -> u8 {
        sn * 4 + 1
    }

    pub const fn socket_tx(sn: u8) -> u8 {
        sn * 4 + 2
    }

    pub const fn socket_rx(sn: u8) -> u8 {
        sn * 4 + 3
    }
}

/// Builds the control byte: block select, read/write bit, variable-length mode.
pub const fn control(block: u8, write: bool) -> u8 {
    (block << 3) | if write { 0x04 } else { 0x00 }
}

/// Common register block.
pub mod common {
    pub const MR: u16 = 0x0000;
    pub const GAR: u16 = 0x0001;
    pub const SUBR: u16 = 0x0005;
    pub const SHAR: u16 = 0x0009;
    pub const SIPR: u16 = 0x000F;
    pub const PHYCFGR: u16 = 0x002E;
    pub const VERSIONR: u16 = 0x0039;

    /// MR: software reset, self-clearing.
    pub const MR_RST: u8 = 0x80;
    /// PHYCFGR: link up.
    pub const PHY_LNK: u8 = 0x01;
    /// Value of VERSIONR on a W5500.
    pub const CHIP_VERSION: u8 = 0x04;
}

/// Socket register block.
pub mod socket {
    pub const MR: u16 = 0x0000;
    pub const CR: u16 = 0x0001;
    pub const IR: u16 = 0x0002;
    pub const SR: u16 = 0x0003;
    pub const PORT: u16 = 0x0004;
    pub const DIPR: u16 = 0x000C;
    pub const DPORT: u16 = 0x0010;
    pub const RXBUF_SIZE: u16 = 0x001E;
    pub const TXBUF_SIZE: u16 = 0x001F;
    pub const TX_FSR: u16 = 0x0020;
    pub const TX_RD: u16 = 0x0022;
    pub const TX_WR: u16 = 0x0024;
    pub const RX_RSR: u16 = 0x0026;
    pub const RX_RD: u16 = 0x0028;
    pub const RX_WR: u16 = 0x002A;

    pub const MR_TCP: u8 = 0x01;

    pub const CMD_OPEN: u8 = 0x01;
    pub const CMD_CONNECT: u8 = 0x04;
    pub const CMD_DISCON: u8 = 0x08;
    pub const CMD_CLOSE: u8 = 0x10;
    pub const CMD_SEND: u8 = 0x20;
    pub const CMD_RECV: u8 = 0x40;

    pub const IR_CON: u8 = 0x01;
    pub const IR_DISCON: u8 = 0x02;
    pub const IR_RECV: u8 = 0x04;
    pub const IR_TIMEOUT: u8 = 0x08;
    pub const IR_SENDOK: u8 = 0x10;

    pub const SOCK_CLOSED: u8 = 0x00;
    pub const SOCK_INIT: u8 = 0x13;
    pub const SOCK_ESTABLISHED: u8 = 0x17;
    pub const SOCK_CLOSE_WAIT: u8 = 0x1C;
}

/// Number of hardware sockets.
pub const SOCKETS: u8 = 8;
/// Total TX (and, separately, RX) buffer memory in KB.
pub const BUFFER_MEMORY_KB: u16 = 16;
