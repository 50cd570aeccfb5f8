mod command;
mod flash;
mod link;
mod memory;
mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use self::command::{
	commands,
	find_command,
	Command,
	Input,
};

pub use self::flash::{
	VerifyReport,
	DMA_DESC,
};

pub use self::link::{
	DebugLink,
	Pins,
	DEFAULT_TIMEOUT,
};

pub use self::session::{
	identify_with_retry,
	oneshot,
	program,
	ChipId,
	CC2530_ID,
	IDENTIFY_RETRIES,
};

use std::io;

use crate::gpio::Gpio;

/// Errors of the debug/programming protocol itself.
///
/// Everything the GPIO backend reports is passed through as `Io`; all
/// busy-wait loops are bounded by an iteration budget and surface
/// `Timeout` when it runs out.
#[derive(Debug, Fail)]
pub enum Error {
	#[fail(display = "gpio backend error: {}", _0)]
	Io(#[cause] io::Error),
	#[fail(display = "unknown command: {:?}", _0)]
	InvalidCommand(String),
	#[fail(display = "command {} takes input bytes and cannot be run standalone", _0)]
	InputRequired(&'static str),
	#[fail(display = "timed out waiting for {}", _0)]
	Timeout(&'static str),
	#[fail(display = "unknown chip id: 0x{:02x}", _0)]
	UnknownChipId(u8),
	#[fail(
		display = "chip id reads 0x{:02x}: CLK/DATA lines seem to be held, make sure no other debugger is connected",
		_0
	)]
	LineHeld(u8),
	#[fail(display = "config readback mismatch: wrote 0x{:02x}, chip returned 0x{:02x}", _0, _1)]
	ConfigMismatch(u8, u8),
	#[fail(display = "reserved flash size field in chip info: {}", _0)]
	UnknownFlashSize(u8),
	#[fail(display = "firmware too large: {} bytes (flash holds {})", _0, _1)]
	FirmwareTooLarge(usize, usize),
	#[fail(display = "verification failed: {} bytes compared, {} mismatches", compared, mismatched)]
	VerifyFailed { compared: usize, mismatched: usize },
}

impl From<io::Error> for Error {
	fn from(e: io::Error) -> Self {
		Error::Io(e)
	}
}

pub type Result<T> = std::result::Result<T, Error>;

/// Enter debug mode, run `f`, and reset the chip again afterwards no
/// matter how `f` went.
pub fn with_debug_mode<G, F, R>(link: &mut DebugLink<G>, f: F) -> Result<R>
where
	G: Gpio,
	F: FnOnce(&mut DebugLink<G>) -> Result<R>,
{
	link.enter_debug_mode()?;
	let result = f(link);
	match link.leave_debug_mode() {
		Ok(()) => result,
		Err(e) => {
			if result.is_err() {
				// keep the original error, the reset failure is secondary
				warn!("failed to reset chip after debug session: {}", e);
				result
			} else {
				Err(e)
			}
		}
	}
}
