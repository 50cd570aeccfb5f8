use crate::gpio::Gpio;

use super::{
	link::DebugLink,
	Result,
};

// Injected instruction opcodes. XDATA is reached through the data
// pointer; everything below leaves its result (or the written value) in
// the accumulator, which is what the debug interface echoes back.
const MOV_DPTR_IMM16: u8 = 0x90;
const MOV_A_IMM8: u8 = 0x74;
const MOVX_AT_DPTR_A: u8 = 0xf0;
const MOVX_A_AT_DPTR: u8 = 0xe0;
const INC_DPTR: u8 = 0xa3;

fn hibyte(addr: u16) -> u8 {
	(addr >> 8) as u8
}

fn lobyte(addr: u16) -> u8 {
	addr as u8
}

impl<G: Gpio> DebugLink<G> {
	/// Load the chip's data pointer.
	pub(super) fn set_data_pointer(&mut self, addr: u16) -> Result<()> {
		self.debug_inst(&[MOV_DPTR_IMM16, hibyte(addr), lobyte(addr)])?;
		Ok(())
	}

	/// Write one byte of XDATA memory.
	pub fn write_xdata(&mut self, addr: u16, value: u8) -> Result<()> {
		self.set_data_pointer(addr)?;
		self.debug_inst(&[MOV_A_IMM8, value])?;
		self.debug_inst(&[MOVX_AT_DPTR_A])?;
		Ok(())
	}

	/// Read one byte of XDATA memory; the injected load's status byte is
	/// the value itself.
	pub fn read_xdata(&mut self, addr: u16) -> Result<u8> {
		self.set_data_pointer(addr)?;
		self.debug_inst(&[MOVX_A_AT_DPTR])
	}

	/// Read the byte at the current data pointer and step to the next
	/// address.
	pub(super) fn read_xdata_next(&mut self) -> Result<u8> {
		let value = self.debug_inst(&[MOVX_A_AT_DPTR])?;
		self.debug_inst(&[INC_DPTR])?;
		Ok(value)
	}

	/// Write a run of bytes to consecutive XDATA addresses. The data
	/// pointer is loaded once and incremented on the chip, so only the
	/// value bytes travel over the link.
	pub fn write_xdata_block(&mut self, addr: u16, data: &[u8]) -> Result<()> {
		self.set_data_pointer(addr)?;
		for value in data {
			self.debug_inst(&[MOV_A_IMM8, *value])?;
			self.debug_inst(&[MOVX_AT_DPTR_A])?;
			self.debug_inst(&[INC_DPTR])?;
		}
		Ok(())
	}
}
