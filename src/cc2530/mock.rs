//! A behavioral model of the chip's debug interface, wired up as a
//! `Gpio` backend so the real link code can be exercised bit by bit.
//!
//! The model decodes the same waveforms the chip would see: data bits
//! are sampled on rising clock edges while the host drives the line,
//! a command frame is considered complete when the host turns the data
//! pin around, and response bits are presented while the host clocks
//! them out. Knobs (all public fields) delay responses or corrupt them
//! to drive the error paths.

use std::collections::VecDeque;
use std::io;

use crate::firmware::BLOCK_SIZE;
use crate::gpio::{
	Direction,
	Gpio,
};

use super::flash;
use super::link::Pins;
use super::session;

pub const PINS: Pins = Pins {
	reset: 0,
	clock: 1,
	data: 2,
};

const BUF0: usize = 0x0000;
const BUF1: usize = 0x0400;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Event {
	/// DMAARM written with these channel bits.
	Arm(u8),
	/// A burst write landed in the buffer fed by this channel.
	Burst(u8),
	/// A flash write was triggered, draining the buffer of this channel.
	FlashTrigger(u8),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum State {
	/// Shifting host bits into a command frame.
	Receiving,
	/// Frame processed, host is polling the data line for ready.
	WaitReady,
	/// Host is clocking the response bits out.
	Responding,
}

pub struct MockChip {
	// knobs
	pub chip_id: u8,
	pub chipinfo0: u8,
	/// Ready polls to answer "busy" before presenting a response.
	pub response_busy_polls: usize,
	/// read_status polls reporting the erase still running.
	pub erase_busy_polls: usize,
	/// FCTL polls reporting busy after each triggered flash write.
	pub flash_busy_polls: usize,
	pub clock_never_stable: bool,
	/// Corrupt this many write_config echoes before behaving.
	pub config_echo_failures: u32,
	/// Flip the flash byte at this index on readback.
	pub verify_corrupt_at: Option<usize>,

	// observations
	pub in_debug: bool,
	pub ready_polls_seen: usize,
	pub events: Vec<Event>,
	pub xdata: Vec<u8>,
	pub flash: Vec<u8>,

	// line state
	clock_high: bool,
	data_line: bool,
	data_dir: Direction,
	reset_active: bool,
	reset_edges: u32,

	// protocol state
	state: State,
	shift: u8,
	shift_bits: u8,
	frame: Vec<u8>,
	response: VecDeque<bool>,

	// chip internals
	acc: u8,
	dptr: u16,
	config: u8,
	bank: u8,
	armed: u8,
	flash_ptr: usize,
	pending_flash_busy: usize,
}

impl MockChip {
	pub fn new() -> MockChip {
		MockChip {
			chip_id: session::CC2530_ID,
			chipinfo0: 0x38, // 128 KB flash, USB present
			response_busy_polls: 0,
			erase_busy_polls: 0,
			flash_busy_polls: 0,
			clock_never_stable: false,
			config_echo_failures: 0,
			verify_corrupt_at: None,
			in_debug: false,
			ready_polls_seen: 0,
			events: Vec::new(),
			xdata: vec![0u8; 0x10000],
			flash: vec![0xffu8; 128 * 1024],
			clock_high: false,
			data_line: false,
			data_dir: Direction::Out,
			reset_active: false,
			reset_edges: 0,
			state: State::Receiving,
			shift: 0,
			shift_bits: 0,
			frame: Vec::new(),
			response: VecDeque::new(),
			acc: 0,
			dptr: 0,
			config: 0,
			bank: 0,
			armed: 0,
			flash_ptr: 0,
			pending_flash_busy: 0,
		}
	}

	fn reset_protocol(&mut self) {
		self.state = State::Receiving;
		self.shift = 0;
		self.shift_bits = 0;
		self.frame.clear();
		self.response.clear();
	}

	fn clock_rise(&mut self) {
		if self.reset_active {
			self.reset_edges += 1;
			return;
		}
		if self.state == State::Receiving && self.data_dir == Direction::Out {
			self.shift = (self.shift << 1) | self.data_line as u8;
			self.shift_bits += 1;
			if self.shift_bits == 8 {
				self.frame.push(self.shift);
				self.shift = 0;
				self.shift_bits = 0;
			}
		}
	}

	fn clock_fall(&mut self) {
		if self.state == State::Responding {
			self.response.pop_front();
		}
	}

	fn poll_ready(&mut self) -> bool {
		self.ready_polls_seen += 1;
		if self.response_busy_polls > 0 {
			self.response_busy_polls -= 1;
			return true; // line still high, not ready
		}
		self.state = State::Responding;
		false
	}

	fn process_frame(&mut self) {
		assert!(self.in_debug, "command frame sent outside debug mode");
		assert_eq!(self.shift_bits, 0, "partial byte in command frame");
		let frame = std::mem::replace(&mut self.frame, Vec::new());
		let cmd = frame[0];

		let answer: Vec<u8> = if cmd & 0xf8 == 0x50 {
			let len = (cmd & 0x07) as usize;
			assert_eq!(frame.len(), 1 + len, "length bits disagree with the frame");
			self.run_instruction(&frame[1..]);
			vec![self.acc]
		} else if cmd & 0xf8 == 0x80 {
			let len = ((cmd & 0x07) as usize) << 8 | frame[1] as usize;
			assert_eq!(frame.len(), 2 + len, "length header disagrees with the frame");
			self.burst(&frame[2..]);
			vec![0x00]
		} else {
			assert_eq!(cmd & 0x07, 0, "unexpected low bits in command 0x{:02x}", cmd);
			match cmd {
				0x10 => vec![0x00], // erase runs in the background
				0x18 => {
					self.config = frame[1];
					if self.config_echo_failures > 0 {
						self.config_echo_failures -= 1;
						vec![frame[1] ^ 0xff]
					} else {
						vec![frame[1]]
					}
				}
				0x20 => vec![self.config],
				0x30 => {
					if self.erase_busy_polls > 0 {
						self.erase_busy_polls -= 1;
						vec![flash::CHIP_ERASE_BUSY]
					} else {
						vec![0x00]
					}
				}
				0x68 => vec![self.chip_id, 0x24],
				_ => vec![0x00],
			}
		};

		self.state = State::WaitReady;
		self.response.clear();
		for byte in answer {
			for bit in (0..8).rev() {
				self.response.push_back(0 != byte & (1 << bit));
			}
		}
	}

	fn run_instruction(&mut self, instr: &[u8]) {
		match instr[0] {
			0x90 => self.dptr = (instr[1] as u16) << 8 | instr[2] as u16,
			0x74 => self.acc = instr[1],
			0xf0 => {
				let (addr, value) = (self.dptr, self.acc);
				self.xdata_write(addr, value);
			}
			0xe0 => self.acc = self.xdata_read(self.dptr),
			0xa3 => self.dptr = self.dptr.wrapping_add(1),
			other => panic!("unsupported injected opcode 0x{:02x}", other),
		}
	}

	fn xdata_write(&mut self, addr: u16, value: u8) {
		self.xdata[addr as usize] = value;
		match addr {
			flash::X_DMAARM => {
				self.armed |= value;
				self.events.push(Event::Arm(value));
			}
			flash::FCTL if value == flash::FCTL_WRITE => self.flash_write(),
			flash::FADDRL | flash::FADDRH => {
				let word = (self.xdata[flash::FADDRH as usize] as usize) << 8
					| self.xdata[flash::FADDRL as usize] as usize;
				// the flash address register counts 32-bit words
				self.flash_ptr = word * 4;
			}
			flash::X_MEMCTR => self.bank = value & 0x07,
			_ => (),
		}
	}

	fn xdata_read(&mut self, addr: u16) -> u8 {
		match addr {
			flash::FCTL => {
				if self.pending_flash_busy > 0 {
					self.pending_flash_busy -= 1;
					flash::FCTL_BUSY
				} else {
					0x00
				}
			}
			session::X_CLKCONSTA => {
				if self.clock_never_stable {
					0x00
				} else {
					self.xdata[session::X_CLKCONCMD as usize]
				}
			}
			session::X_CHIPINFO0 => self.chipinfo0,
			session::X_CHIPINFO1 => 0x20,
			a if a >= session::X_EXT_ADDR && a < session::X_EXT_ADDR + 7 => {
				0x10 + (a - session::X_EXT_ADDR) as u8
			}
			a if a >= 0x8000 => {
				let index = self.bank as usize * 0x8000 + (a as usize - 0x8000);
				let byte = if index < self.flash.len() {
					self.flash[index]
				} else {
					0xff
				};
				if self.verify_corrupt_at == Some(index) {
					byte ^ 0xff
				} else {
					byte
				}
			}
			a => self.xdata[a as usize],
		}
	}

	fn burst(&mut self, payload: &[u8]) {
		let ch = if 0 != self.armed & flash::CH_DBG_TO_BUF0 {
			flash::CH_DBG_TO_BUF0
		} else if 0 != self.armed & flash::CH_DBG_TO_BUF1 {
			flash::CH_DBG_TO_BUF1
		} else {
			panic!("burst write with no armed debug channel");
		};
		let base = if ch == flash::CH_DBG_TO_BUF0 { BUF0 } else { BUF1 };
		self.xdata[base..base + payload.len()].copy_from_slice(payload);
		self.armed &= !ch;
		self.events.push(Event::Burst(ch));
	}

	fn flash_write(&mut self) {
		let ch = if 0 != self.armed & flash::CH_BUF0_TO_FLASH {
			flash::CH_BUF0_TO_FLASH
		} else if 0 != self.armed & flash::CH_BUF1_TO_FLASH {
			flash::CH_BUF1_TO_FLASH
		} else {
			panic!("flash write triggered with no armed buffer channel");
		};
		let base = if ch == flash::CH_BUF0_TO_FLASH { BUF0 } else { BUF1 };
		assert!(self.flash_ptr + BLOCK_SIZE <= self.flash.len(), "flash write past the end");

		let block = self.xdata[base..base + BLOCK_SIZE].to_vec();
		self.flash[self.flash_ptr..self.flash_ptr + BLOCK_SIZE].copy_from_slice(&block);
		self.flash_ptr += BLOCK_SIZE;
		self.pending_flash_busy = self.flash_busy_polls;
		self.armed &= !ch;
		self.events.push(Event::FlashTrigger(ch));
	}
}

impl Gpio for MockChip {
	fn export(&mut self, _pin: u32) -> io::Result<()> {
		Ok(())
	}

	fn unexport(&mut self, _pin: u32) {}

	fn set_direction(&mut self, pin: u32, direction: Direction) -> io::Result<()> {
		if pin == PINS.data {
			if direction == Direction::Out {
				self.reset_protocol();
			} else if !self.frame.is_empty() {
				// the host turning the line around ends the frame
				self.process_frame();
			}
			self.data_dir = direction;
		}
		Ok(())
	}

	fn get_value(&mut self, pin: u32) -> io::Result<bool> {
		if pin != PINS.data {
			panic!("host reads gpio {}, only the data pin is readable", pin);
		}
		if self.data_dir == Direction::Out {
			return Ok(self.data_line);
		}
		Ok(match self.state {
			State::WaitReady => self.poll_ready(),
			State::Responding => *self.response.front().unwrap_or(&false),
			State::Receiving => false,
		})
	}

	fn set_value(&mut self, pin: u32, value: bool) -> io::Result<()> {
		if pin == PINS.reset {
			if !value {
				// reset asserted: protocol state is gone
				self.reset_active = true;
				self.reset_edges = 0;
				self.reset_protocol();
			} else if self.reset_active {
				self.in_debug = self.reset_edges >= 2;
				self.reset_active = false;
			}
		} else if pin == PINS.clock {
			if value && !self.clock_high {
				self.clock_rise();
			} else if !value && self.clock_high {
				self.clock_fall();
			}
			self.clock_high = value;
		} else if pin == PINS.data {
			self.data_line = value;
		} else {
			panic!("host drives unknown gpio {}", pin);
		}
		Ok(())
	}
}
