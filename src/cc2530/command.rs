use crate::firmware::BLOCK_SIZE;
use crate::gpio::{
	Direction,
	Gpio,
};

use super::{
	link::DebugLink,
	Error,
	Result,
};

const OP_DBG_INST: u8 = 0x50;
const OP_BURST_WRITE: u8 = 0x80;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Input {
	/// The command takes exactly this many parameter bytes.
	Fixed(usize),
	/// The caller supplies the parameter bytes; the chip learns their
	/// count from the command byte itself (debug_inst) or from a length
	/// header (burst_write).
	Variable,
}

#[derive(Clone, Copy, Debug)]
pub struct Command {
	pub name: &'static str,
	pub opcode: u8,
	pub input: Input,
	pub output: usize,
}

use self::Input::{
	Fixed,
	Variable,
};

pub const ERASE: Command = Command { name: "erase", opcode: 0x10, input: Fixed(0), output: 1 };
pub const WRITE_CONFIG: Command = Command { name: "write_config", opcode: 0x18, input: Fixed(1), output: 1 };
pub const READ_CONFIG: Command = Command { name: "read_config", opcode: 0x20, input: Fixed(0), output: 1 };
pub const GET_PC: Command = Command { name: "get_pc", opcode: 0x28, input: Fixed(0), output: 2 };
pub const READ_STATUS: Command = Command { name: "read_status", opcode: 0x30, input: Fixed(0), output: 1 };
pub const HALT: Command = Command { name: "halt", opcode: 0x40, input: Fixed(0), output: 1 };
pub const RESUME: Command = Command { name: "resume", opcode: 0x48, input: Fixed(0), output: 1 };
pub const DEBUG_INST: Command = Command { name: "debug_inst", opcode: OP_DBG_INST, input: Variable, output: 1 };
pub const STEP_INST: Command = Command { name: "step_inst", opcode: 0x58, input: Fixed(0), output: 1 };
pub const GET_BM: Command = Command { name: "get_bm", opcode: 0x60, input: Fixed(0), output: 1 };
pub const GET_CHIP_ID: Command = Command { name: "get_chip_id", opcode: 0x68, input: Fixed(0), output: 2 };
pub const BURST_WRITE: Command = Command { name: "burst_write", opcode: OP_BURST_WRITE, input: Variable, output: 1 };

static COMMANDS: [Command; 12] = [
	ERASE,
	WRITE_CONFIG,
	READ_CONFIG,
	GET_PC,
	READ_STATUS,
	HALT,
	RESUME,
	DEBUG_INST,
	STEP_INST,
	GET_BM,
	GET_CHIP_ID,
	BURST_WRITE,
];

pub fn commands() -> &'static [Command] {
	&COMMANDS
}

/// Look a command up by its exact name.
///
/// Prefix queries are rejected: `read_config` and `read_status` share a
/// prefix, so anything short of the full name would be ambiguous.
pub fn find_command(name: &str) -> Option<&'static Command> {
	COMMANDS.iter().find(|cmd| cmd.name == name)
}

impl<G: Gpio> DebugLink<G> {
	/// Send one command frame and read its response.
	///
	/// `params` must hold exactly the declared number of input bytes for
	/// fixed-length commands; anything else is a caller bug, not a
	/// protocol error.
	pub fn execute(&mut self, cmd: &Command, params: &[u8]) -> Result<Vec<u8>> {
		if let Fixed(count) = cmd.input {
			assert_eq!(params.len(), count, "{} takes {} parameter bytes", cmd.name, count);
		}

		self.data_direction(Direction::Out)?;

		// the chip decodes the injected instruction length from the
		// low bits of the command byte itself
		if cmd.opcode == OP_DBG_INST {
			assert!(params.len() >= 1 && params.len() <= 3, "injected instructions are 1 to 3 bytes");
			self.send_byte(cmd.opcode | params.len() as u8)?;
		} else {
			self.send_byte(cmd.opcode)?;
		}
		for byte in params {
			self.send_byte(*byte)?;
		}

		self.data_direction(Direction::In)?;
		self.wait_ready(cmd.name)?;

		let mut answer = Vec::with_capacity(cmd.output);
		for _ in 0..cmd.output {
			answer.push(self.read_byte()?);
		}
		Ok(answer)
	}

	/// Inject one raw CPU instruction (1 to 3 bytes); the response byte
	/// is the accumulator after execution.
	pub(super) fn debug_inst(&mut self, instr: &[u8]) -> Result<u8> {
		Ok(self.execute(&DEBUG_INST, instr)?[0])
	}

	/// Stream one block to the debug DMA channel, bypassing the regular
	/// framing: a two-byte header carrying the block length, followed by
	/// the raw payload. The chip acknowledges with a single status byte
	/// that carries no information here.
	pub fn burst_write_block(&mut self, block: &[u8; BLOCK_SIZE]) -> Result<()> {
		self.data_direction(Direction::Out)?;
		self.send_byte(OP_BURST_WRITE | (BLOCK_SIZE >> 8) as u8)?;
		self.send_byte(BLOCK_SIZE as u8)?;
		for byte in block.iter() {
			self.send_byte(*byte)?;
		}

		self.data_direction(Direction::In)?;
		self.wait_ready(BURST_WRITE.name)?;
		self.read_byte()?;
		Ok(())
	}

	/// Busy-wait until the chip pulls the data line low. While not ready
	/// the chip expects eight clock pulses between samples; there is no
	/// delay beyond the pin round-trips themselves.
	fn wait_ready(&mut self, what: &'static str) -> Result<()> {
		for _ in 0..self.timeout() {
			if !self.data_value()? {
				return Ok(());
			}
			for _ in 0..8 {
				self.pulse_clock()?;
			}
		}
		Err(Error::Timeout(what))
	}
}
