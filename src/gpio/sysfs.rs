use std::fs;
use std::io::{
	self,
	Read,
	Write,
};

use super::{
	Direction,
	Gpio,
};

const SYSFS_GPIO: &str = "/sys/class/gpio";

fn write_file(path: &str, data: &str) -> io::Result<()> {
	let mut file = fs::OpenOptions::new().write(true).open(path)?;
	file.write_all(data.as_bytes())
}

/// GPIO access through the legacy `/sys/class/gpio` interface.
pub struct SysfsGpio;

impl Gpio for SysfsGpio {
	fn export(&mut self, pin: u32) -> io::Result<()> {
		if fs::metadata(format!("{}/gpio{}", SYSFS_GPIO, pin)).is_ok() {
			// already exported, e.g. by an earlier aborted run
			return Ok(());
		}
		write_file(&format!("{}/export", SYSFS_GPIO), &pin.to_string())
	}

	fn unexport(&mut self, pin: u32) {
		if let Err(e) = write_file(&format!("{}/unexport", SYSFS_GPIO), &pin.to_string()) {
			warn!("failed to unexport gpio {}: {}", pin, e);
		}
	}

	fn set_direction(&mut self, pin: u32, direction: Direction) -> io::Result<()> {
		let value = match direction {
			Direction::In => "in",
			Direction::Out => "out",
		};
		write_file(&format!("{}/gpio{}/direction", SYSFS_GPIO, pin), value)
	}

	fn get_value(&mut self, pin: u32) -> io::Result<bool> {
		let mut file = fs::File::open(format!("{}/gpio{}/value", SYSFS_GPIO, pin))?;
		let mut buf = [0u8; 1];
		file.read_exact(&mut buf)?;
		Ok(buf[0] != b'0')
	}

	fn set_value(&mut self, pin: u32, value: bool) -> io::Result<()> {
		write_file(
			&format!("{}/gpio{}/value", SYSFS_GPIO, pin),
			if value { "1" } else { "0" },
		)
	}
}
