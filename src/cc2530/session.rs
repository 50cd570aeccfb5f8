use crate::firmware::Firmware;
use crate::gpio::Gpio;

use super::{
	command,
	find_command,
	link::DebugLink,
	Error,
	Result,
};

pub const CC2530_ID: u8 = 0xa5;

// chip identification registers
pub(super) const X_EXT_ADDR: u16 = 0x616a;
pub(super) const X_CHIPINFO0: u16 = 0x6276;
pub(super) const X_CHIPINFO1: u16 = 0x6277;

// clock control
pub(super) const X_CLKCONCMD: u16 = 0x70c6;
pub(super) const X_CLKCONSTA: u16 = 0x709e;

// select the crystal oscillator; CLKCONSTA echoes the value once the
// switch completed
pub(super) const CLOCK_XOSC: u8 = 0x80;

const CHIPINFO0_USB: u8 = 0x08;
const CHIPINFO0_FLASH_MASK: u8 = 0x70;
const CHIPINFO0_FLASH_SHIFT: u8 = 4;

// debug configuration enabling DMA transfers
pub(super) const DMA_CONFIG: u8 = 0x22;
const CONFIG_RETRIES: u32 = 3;

pub const IDENTIFY_RETRIES: u32 = 3;

#[derive(Clone, Debug)]
pub struct ChipId {
	pub id: u8,
	pub revision: u8,
	pub ext_addr: [u8; 7],
	pub flash_size_kb: u32,
}

impl ChipId {
	pub fn flash_bytes(&self) -> usize {
		self.flash_size_kb as usize * 1024
	}
}

impl<G: Gpio> DebugLink<G> {
	/// Read and validate the chip identity.
	///
	/// A chip id of 0x00 or 0xff usually means nothing answered at all,
	/// or that another debugger is driving the lines.
	pub fn identify(&mut self) -> Result<ChipId> {
		let answer = self.execute(&command::GET_CHIP_ID, &[])?;
		let (id, revision) = (answer[0], answer[1]);
		if id != CC2530_ID {
			if id == 0x00 || id == 0xff {
				return Err(Error::LineHeld(id));
			}
			return Err(Error::UnknownChipId(id));
		}
		info!("Texas Instruments CC2530 (id 0x{:02x}, rev 0x{:02x})", id, revision);

		let mut ext_addr = [0u8; 7];
		for (i, byte) in ext_addr.iter_mut().enumerate() {
			*byte = self.read_xdata(X_EXT_ADDR + i as u16)?;
		}
		info!(
			"extended address: {}",
			ext_addr
				.iter()
				.rev()
				.map(|b| format!("{:02x}", b))
				.collect::<Vec<_>>()
				.join(":")
		);

		let chipinfo0 = self.read_xdata(X_CHIPINFO0)?;
		debug!(
			"USB {}",
			if 0 != chipinfo0 & CHIPINFO0_USB {
				"available"
			} else {
				"not available"
			}
		);

		let field = (chipinfo0 & CHIPINFO0_FLASH_MASK) >> CHIPINFO0_FLASH_SHIFT;
		let flash_size_kb = match field {
			1 => 32,
			2 => 64,
			3 => 128,
			4 => 256,
			_ => return Err(Error::UnknownFlashSize(field)),
		};
		info!("flash size: {} KB", flash_size_kb);

		let chipinfo1 = self.read_xdata(X_CHIPINFO1)?;
		debug!("chip info: 0x{:02x} 0x{:02x}", chipinfo0, chipinfo1);

		Ok(ChipId {
			id,
			revision,
			ext_addr,
			flash_size_kb,
		})
	}

	/// Switch the system clock to the crystal oscillator and wait for the
	/// switch to take effect; DMA flash programming needs the fast clock.
	pub fn configure_clock(&mut self) -> Result<()> {
		self.write_xdata(X_CLKCONCMD, CLOCK_XOSC)?;
		for _ in 0..self.timeout() {
			if self.read_xdata(X_CLKCONSTA)? == CLOCK_XOSC {
				return Ok(());
			}
		}
		Err(Error::Timeout("clock switch"))
	}

	/// Write the debug configuration that enables DMA transfers. The chip
	/// echoes the configuration back; a mismatch means the debug session
	/// is in a bad state, so debug mode is re-entered before trying
	/// again.
	pub fn enable_dma(&mut self) -> Result<()> {
		for attempt in 1..CONFIG_RETRIES {
			let echoed = self.execute(&command::WRITE_CONFIG, &[DMA_CONFIG])?[0];
			if echoed == DMA_CONFIG {
				return Ok(());
			}
			warn!(
				"write_config echoed 0x{:02x} instead of 0x{:02x} (attempt {}/{})",
				echoed, DMA_CONFIG, attempt, CONFIG_RETRIES
			);
			self.enter_debug_mode()?;
		}
		let echoed = self.execute(&command::WRITE_CONFIG, &[DMA_CONFIG])?[0];
		if echoed == DMA_CONFIG {
			return Ok(());
		}
		Err(Error::ConfigMismatch(DMA_CONFIG, echoed))
	}
}

/// Identify the chip, retrying a few times; the first contact after
/// entering debug mode is occasionally garbled.
pub fn identify_with_retry<G: Gpio>(link: &mut DebugLink<G>, attempts: u32) -> Result<ChipId> {
	assert!(attempts >= 1);
	for attempt in 1..attempts {
		match link.identify() {
			Ok(chip) => return Ok(chip),
			Err(e) => warn!("chip identification failed (attempt {}/{}): {}", attempt, attempts, e),
		}
	}
	link.identify()
}

/// Program `firmware` into the chip and optionally read it back.
///
/// The caller is expected to run this under `with_debug_mode`, so the
/// chip reboots into the freshly written image on every exit path, even
/// if programming fails halfway; flash contents are not rolled back.
pub fn program<G: Gpio>(
	link: &mut DebugLink<G>,
	firmware: &mut Firmware,
	readback: bool,
	progress: bool,
) -> Result<()> {
	let chip = identify_with_retry(link, IDENTIFY_RETRIES)?;

	// checked before the chip is touched any further
	if firmware.source_len() > chip.flash_bytes() {
		return Err(Error::FirmwareTooLarge(firmware.source_len(), chip.flash_bytes()));
	}

	link.enable_dma()?;
	link.configure_clock()?;
	link.erase()?;

	firmware.rewind();
	let max_speed = link.program_flash(firmware, progress)?;
	if max_speed {
		info!("programmed at maximum speed");
	} else {
		debug!("link throughput was the bottleneck for at least one block");
	}

	if readback {
		firmware.rewind();
		let report = link.verify_flash(firmware)?;
		if report.compared != firmware.len() || report.mismatched != 0 {
			return Err(Error::VerifyFailed {
				compared: report.compared,
				mismatched: report.mismatched,
			});
		}
		info!("verification passed ({} bytes)", report.compared);
	}

	Ok(())
}

/// Resolve a command by name and run it without parameters, for ad hoc
/// poking at the chip. Commands that take input bytes are rejected up
/// front; there is no way to supply parameters here.
pub fn oneshot<G: Gpio>(link: &mut DebugLink<G>, name: &str) -> Result<Vec<u8>> {
	let cmd = find_command(name).ok_or_else(|| Error::InvalidCommand(name.to_string()))?;
	match cmd.input {
		command::Input::Fixed(0) => (),
		_ => return Err(Error::InputRequired(cmd.name)),
	}
	link.execute(cmd, &[])
}
