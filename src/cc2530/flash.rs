use std::thread;
use std::time::Duration;

use crate::firmware::{
	Firmware,
	BLOCK_SIZE,
};
use crate::gpio::Gpio;

use super::{
	command,
	link::DebugLink,
	Error,
	Result,
};

// SRAM layout used during programming: two ping-pong buffers of one
// block each, followed by the DMA descriptor table.
const ADDR_BUF0: u16 = 0x0000;
const ADDR_BUF1: u16 = 0x0400;
const ADDR_DMA_DESC: u16 = 0x0800;

// DMAARM channel bits
pub(super) const CH_DBG_TO_BUF0: u8 = 0x02;
pub(super) const CH_DBG_TO_BUF1: u8 = 0x04;
pub(super) const CH_BUF0_TO_FLASH: u8 = 0x08;
pub(super) const CH_BUF1_TO_FLASH: u8 = 0x10;

// DMA trigger selectors
const TRIG_DBG_BW: u8 = 31;
const TRIG_FLASH: u8 = 18;

// descriptor config bytes
const CFG_INC_DST: u8 = 0x11;
const CFG_INC_SRC: u8 = 0x42;

// XDATA-mapped registers; all of these must be extended (16-bit)
// addresses, SFR space is not reachable through injected MOVX
// instructions.
const DBGDATA: u16 = 0x6260;
pub(super) const FCTL: u16 = 0x6270;
pub(super) const FADDRL: u16 = 0x6271;
pub(super) const FADDRH: u16 = 0x6272;
const FWDATA: u16 = 0x6273;
pub(super) const X_MEMCTR: u16 = 0x70c7;
pub(super) const X_DMA1CFGH: u16 = 0x70d3;
pub(super) const X_DMA1CFGL: u16 = 0x70d4;
pub(super) const X_DMAARM: u16 = 0x70d6;

pub(super) const FCTL_BUSY: u8 = 0x80;
pub(super) const FCTL_WRITE: u8 = 0x06;

// read_status bit
pub(super) const CHIP_ERASE_BUSY: u8 = 0x80;

// one 32 KB flash bank at a time is mapped into the upper half of the
// XDATA address space for readback
const VERIFY_WINDOW_BASE: u16 = 0x8000;
const BANK_SIZE: usize = 32 * 1024;
const BANKS: u8 = 8;

/// The four DMA channel descriptors, written verbatim to
/// `ADDR_DMA_DESC`. The first pair moves burst-write data from the debug
/// interface into the ping-pong buffers, the second pair drains a buffer
/// into the flash write data register.
pub const DMA_DESC: [u8; 32] = [
	// debug interface -> buffer 0
	(DBGDATA >> 8) as u8,
	DBGDATA as u8,
	(ADDR_BUF0 >> 8) as u8,
	ADDR_BUF0 as u8,
	(BLOCK_SIZE >> 8) as u8,
	BLOCK_SIZE as u8,
	TRIG_DBG_BW,
	CFG_INC_DST,
	// debug interface -> buffer 1
	(DBGDATA >> 8) as u8,
	DBGDATA as u8,
	(ADDR_BUF1 >> 8) as u8,
	ADDR_BUF1 as u8,
	(BLOCK_SIZE >> 8) as u8,
	BLOCK_SIZE as u8,
	TRIG_DBG_BW,
	CFG_INC_DST,
	// buffer 0 -> flash controller
	(ADDR_BUF0 >> 8) as u8,
	ADDR_BUF0 as u8,
	(FWDATA >> 8) as u8,
	FWDATA as u8,
	(BLOCK_SIZE >> 8) as u8,
	BLOCK_SIZE as u8,
	TRIG_FLASH,
	CFG_INC_SRC,
	// buffer 1 -> flash controller
	(ADDR_BUF1 >> 8) as u8,
	ADDR_BUF1 as u8,
	(FWDATA >> 8) as u8,
	FWDATA as u8,
	(BLOCK_SIZE >> 8) as u8,
	BLOCK_SIZE as u8,
	TRIG_FLASH,
	CFG_INC_SRC,
];

/// Outcome of a verification pass. Mismatches never abort the pass, they
/// are only counted (and logged); `compared` tells how far the pass got.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct VerifyReport {
	pub compared: usize,
	pub mismatched: usize,
}

impl<G: Gpio> DebugLink<G> {
	/// Issue a full chip erase and poll the status register until the
	/// erase-busy bit clears.
	pub fn erase(&mut self) -> Result<()> {
		self.execute(&command::ERASE, &[])?;
		for _ in 0..self.timeout() {
			let status = self.execute(&command::READ_STATUS, &[])?[0];
			if 0 == status & CHIP_ERASE_BUSY {
				return Ok(());
			}
			thread::sleep(Duration::from_micros(10));
		}
		Err(Error::Timeout("chip erase"))
	}

	/// Poll the flash controller until the running write retires; returns
	/// how many polls that took. Zero means the write had already
	/// finished before the first poll.
	fn wait_flash_idle(&mut self) -> Result<usize> {
		for polls in 0..self.timeout() {
			if 0 == self.read_xdata(FCTL)? & FCTL_BUSY {
				return Ok(polls);
			}
		}
		Err(Error::Timeout("flash write"))
	}

	/// Program the whole image through the double-buffered DMA pipeline.
	///
	/// While the flash controller drains one buffer, the next block is
	/// already being clocked into the other one. A buffer is never
	/// re-armed before the flash write draining its previous contents has
	/// retired; that is the only inter-block ordering constraint.
	///
	/// The returned flag tells whether the overlap was sustained for
	/// every block, i.e. whether flash write latency (and not the
	/// bit-banged link) was the bottleneck throughout. Purely a
	/// diagnostic, not a correctness signal.
	pub fn program_flash(&mut self, firmware: &mut Firmware, progress: bool) -> Result<bool> {
		self.write_xdata_block(ADDR_DMA_DESC, &DMA_DESC)?;

		// point the DMA engine at the descriptors
		self.write_xdata(X_DMA1CFGH, (ADDR_DMA_DESC >> 8) as u8)?;
		self.write_xdata(X_DMA1CFGL, ADDR_DMA_DESC as u8)?;

		// writes start at flash address zero
		self.write_xdata(FADDRH, 0)?;
		self.write_xdata(FADDRL, 0)?;

		let blocks = firmware.blocks();
		let mut max_speed = true;

		for i in 0..blocks {
			if progress {
				println!("{}/{}", i + 1, blocks);
			}

			let (dbg_arm, flash_arm) = if i & 1 == 0 {
				(CH_DBG_TO_BUF0, CH_BUF0_TO_FLASH)
			} else {
				(CH_DBG_TO_BUF1, CH_BUF1_TO_FLASH)
			};

			// fill this block's buffer; the other buffer may still be
			// draining into flash while the bits trickle in
			self.write_xdata(X_DMAARM, dbg_arm)?;
			self.burst_write_block(firmware.next_block())?;

			// the previous block's write must retire before its buffer
			// pair is re-armed
			let polls = self.wait_flash_idle()?;
			if i > 0 && polls == 0 {
				// flash finished before the transfer did, so the link
				// was the bottleneck for this block
				max_speed = false;
			}

			self.write_xdata(X_DMAARM, flash_arm)?;
			self.write_xdata(FCTL, FCTL_WRITE)?;
		}

		// wait for the final block to retire
		self.wait_flash_idle()?;

		Ok(max_speed)
	}

	/// Read the programmed flash back through the debug interface and
	/// compare it against the image.
	///
	/// Flash is read bank by bank: each bank is mapped into the upper
	/// half of the XDATA address space and walked with an
	/// auto-incrementing data pointer. The pass ends once the whole
	/// (padded) image length has been compared.
	pub fn verify_flash(&mut self, firmware: &mut Firmware) -> Result<VerifyReport> {
		let target = firmware.len();
		let mut report = VerifyReport {
			compared: 0,
			mismatched: 0,
		};

		for bank in 0..BANKS {
			if report.compared == target {
				break;
			}
			debug!("reading back bank {}", bank);

			self.write_xdata(X_MEMCTR, bank)?;
			self.set_data_pointer(VERIFY_WINDOW_BASE)?;

			for offset in 0..BANK_SIZE {
				if report.compared == target {
					break;
				}

				let flash = self.read_xdata_next()?;
				let expected = firmware.next_byte();
				if flash != expected {
					warn!(
						"mismatch in bank {} at offset 0x{:04x}: flash 0x{:02x}, image 0x{:02x}",
						bank, offset, flash, expected
					);
					report.mismatched += 1;
				}
				report.compared += 1;
			}
		}

		Ok(report)
	}
}
