use crate::gpio::{
	Direction,
	Gpio,
};

use super::Result;

/// Default busy-wait budget, in polling iterations. The link carries no
/// independent clock, so all "timeouts" are bounded iteration counts.
pub const DEFAULT_TIMEOUT: usize = 1000;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Pins {
	pub reset: u32,
	pub clock: u32,
	pub data: u32,
}

impl Pins {
	fn all(&self) -> [u32; 3] {
		[self.reset, self.clock, self.data]
	}
}

/// The bit-banged two-wire debug link.
///
/// Owns the three debug pins for its whole lifetime; they are exported
/// and driven as outputs on open and released again on drop. There is no
/// pacing beyond what the GPIO backend itself imposes: the chip samples
/// data on the rising clock edge, and sysfs round-trips are slow enough
/// on their own.
pub struct DebugLink<G: Gpio> {
	gpio: G,
	pins: Pins,
	entered: bool,
	timeout: usize,
}

impl<G: Gpio> DebugLink<G> {
	pub fn open(gpio: G, pins: Pins) -> Result<DebugLink<G>> {
		let mut link = DebugLink {
			gpio,
			pins,
			entered: false,
			timeout: DEFAULT_TIMEOUT,
		};
		for pin in link.pins.all().iter() {
			link.gpio.export(*pin)?;
			link.gpio.set_direction(*pin, Direction::Out)?;
		}
		Ok(link)
	}

	/// Change the busy-wait budget used by all polling loops.
	pub fn set_timeout(&mut self, budget: usize) {
		self.timeout = budget;
	}

	pub(super) fn timeout(&self) -> usize {
		self.timeout
	}

	pub fn is_entered(&self) -> bool {
		self.entered
	}

	pub(super) fn data_direction(&mut self, direction: Direction) -> Result<()> {
		self.gpio.set_direction(self.pins.data, direction)?;
		Ok(())
	}

	pub(super) fn data_value(&mut self) -> Result<bool> {
		Ok(self.gpio.get_value(self.pins.data)?)
	}

	pub(super) fn pulse_clock(&mut self) -> Result<()> {
		self.gpio.set_value(self.pins.clock, true)?;
		self.gpio.set_value(self.pins.clock, false)?;
		Ok(())
	}

	/// Clock one byte out on the data line, most significant bit first.
	/// Data is set up before the rising edge, which is when the chip
	/// samples it.
	pub fn send_byte(&mut self, byte: u8) -> Result<()> {
		for bit in (0..8).rev() {
			self.gpio.set_value(self.pins.data, 0 != byte & (1 << bit))?;
			self.gpio.set_value(self.pins.clock, true)?;
			self.gpio.set_value(self.pins.clock, false)?;
		}
		Ok(())
	}

	/// Clock one byte in from the data line, most significant bit first.
	pub fn read_byte(&mut self) -> Result<u8> {
		let mut byte = 0u8;
		for bit in (0..8).rev() {
			self.gpio.set_value(self.pins.clock, true)?;
			if self.gpio.get_value(self.pins.data)? {
				byte |= 1 << bit;
			}
			self.gpio.set_value(self.pins.clock, false)?;
		}
		Ok(byte)
	}

	/// Hold reset active while toggling the clock twice; the chip drops
	/// into debug mode once reset is released.
	pub fn enter_debug_mode(&mut self) -> Result<()> {
		// reset is active low
		self.gpio.set_value(self.pins.reset, false)?;
		for _ in 0..2 {
			self.gpio.set_value(self.pins.clock, false)?;
			self.gpio.set_value(self.pins.clock, true)?;
		}
		// keep the clock low
		self.gpio.set_value(self.pins.clock, false)?;
		self.gpio.set_value(self.pins.reset, true)?;
		self.entered = true;
		Ok(())
	}

	/// Pulse reset without any clock activity: reboots the chip into its
	/// firmware. Safe to call whether or not debug mode was ever entered,
	/// which makes it the universal teardown path.
	pub fn leave_debug_mode(&mut self) -> Result<()> {
		self.gpio.set_value(self.pins.reset, false)?;
		self.gpio.set_value(self.pins.reset, true)?;
		self.entered = false;
		Ok(())
	}

	fn release_pins(&mut self) {
		for pin in self.pins.all().iter() {
			if let Err(e) = self.gpio.set_direction(*pin, Direction::In) {
				warn!("failed to set direction on gpio {}: {}", pin, e);
			}
			self.gpio.unexport(*pin);
		}
	}
}

impl<G: Gpio> Drop for DebugLink<G> {
	fn drop(&mut self) {
		// put the pins back into a sane state
		self.release_pins();
	}
}
