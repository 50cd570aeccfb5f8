mod sysfs;

pub use self::sysfs::SysfsGpio;

use std::io;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Direction {
	In,
	Out,
}

/// Pin-level capability the debug link is built on.
///
/// Any backend that can drive three pins (reset, clock, data) and read the
/// data pin back will do. `export`/`unexport` bracket pin ownership;
/// backends without such a notion can treat them as no-ops.
pub trait Gpio {
	fn export(&mut self, pin: u32) -> io::Result<()>;
	fn unexport(&mut self, pin: u32);
	fn set_direction(&mut self, pin: u32, direction: Direction) -> io::Result<()>;
	fn get_value(&mut self, pin: u32) -> io::Result<bool>;
	fn set_value(&mut self, pin: u32, value: bool) -> io::Result<()>;
}

impl<'a, G: ?Sized + Gpio> Gpio for &'a mut G {
	fn export(&mut self, pin: u32) -> io::Result<()> {
		G::export(*self, pin)
	}
	fn unexport(&mut self, pin: u32) {
		G::unexport(*self, pin)
	}
	fn set_direction(&mut self, pin: u32, direction: Direction) -> io::Result<()> {
		G::set_direction(*self, pin, direction)
	}
	fn get_value(&mut self, pin: u32) -> io::Result<bool> {
		G::get_value(*self, pin)
	}
	fn set_value(&mut self, pin: u32, value: bool) -> io::Result<()> {
		G::set_value(*self, pin, value)
	}
}
