#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate ti_cc2530_flash;
use ti_cc2530_flash::*;

use std::process::exit;

fn get_pin(matches: &clap::ArgMatches, name: &str, default: u32) -> AResult<u32> {
	let param = match matches.value_of(name) {
		Some(p) => p,
		None => return Ok(default),
	};
	param.parse::<u32>().map_err(|e| {
		let e = failure::Error::from(e);
		let msg = format!("invalid parameter {}: {}", name, e);
		e.context(msg).into()
	})
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@arg firmware: -f --firmware +takes_value "Firmware image to program")
		(@arg readback: -r --readback "Read the flash back after programming and compare it against the image")
		(@arg identify: -i --identify "Identify the chip and exit")
		(@arg command: -c --command +takes_value "Run a single named debug command and print its answer")
		(@arg list_commands: -l --("list-commands") "List the known debug commands")
		(@arg progress: -P --progress "Print per-block programming progress")
		(@arg verbose: -v --verbose "More verbose logging")
		(@arg reset_pin: --("reset-pin") +takes_value "GPIO number of the RESET_N line (default 0)")
		(@arg clock_pin: --("clock-pin") +takes_value "GPIO number of the debug clock line (default 1)")
		(@arg data_pin: --("data-pin") +takes_value "GPIO number of the debug data line (default 2)")
	).get_matches();

	env_logger::from_env(env_logger::Env::default().default_filter_or(
		if matches.is_present("verbose") { "debug" } else { "info" },
	))
	.init();

	if matches.is_present("list_commands") {
		for cmd in cc2530::commands() {
			println!("{:<12} opcode 0x{:02x}, {} answer byte(s)", cmd.name, cmd.opcode, cmd.output);
		}
		return Ok(());
	}

	let pins = cc2530::Pins {
		reset: get_pin(&matches, "reset_pin", 0)?,
		clock: get_pin(&matches, "clock_pin", 1)?,
		data: get_pin(&matches, "data_pin", 2)?,
	};
	debug!(
		"using gpios {} (reset), {} (clock), {} (data)",
		pins.reset, pins.clock, pins.data
	);
	let mut link = cc2530::DebugLink::open(gpio::SysfsGpio, pins)?;

	if let Some(name) = matches.value_of("command") {
		let answer = cc2530::with_debug_mode(&mut link, |link| cc2530::oneshot(link, name))?;
		println!(
			"{}",
			answer
				.iter()
				.map(|b| format!("{:02x}", b))
				.collect::<Vec<_>>()
				.join(" ")
		);
		return Ok(());
	}

	if matches.is_present("identify") {
		let chip = cc2530::with_debug_mode(&mut link, |link| {
			cc2530::identify_with_retry(link, cc2530::IDENTIFY_RETRIES)
		})?;
		println!("id: 0x{:02x}", chip.id);
		println!("revision: 0x{:02x}", chip.revision);
		println!("flash: {} KB", chip.flash_size_kb);
		return Ok(());
	}

	let path = match matches.value_of("firmware") {
		Some(p) => p,
		None => bail!("nothing to do: no firmware image given (see --help)"),
	};
	let mut firmware = firmware::Firmware::load(path)?;
	info!(
		"firmware {}: {} bytes, {} block(s)",
		path,
		firmware.source_len(),
		firmware.blocks()
	);

	let readback = matches.is_present("readback");
	let progress = matches.is_present("progress");
	cc2530::with_debug_mode(&mut link, |link| {
		cc2530::program(link, &mut firmware, readback, progress)
	})?;
	info!("done, chip rebooted into the new firmware");

	Ok(())
}

fn main() {
	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}
