use std::convert::TryInto;
use std::fs;
use std::path::Path;

use failure::ResultExt;

/// Granularity of both the burst transfer and the on-chip buffers.
pub const BLOCK_SIZE: usize = 1024;

/// Firmware image with an explicit read cursor.
///
/// Both the programming pipeline and the verification pass walk the image
/// strictly sequentially; `rewind` resets the cursor between the two
/// passes.
pub struct Firmware {
	data: Vec<u8>,
	source_len: usize,
	pos: usize,
}

impl Firmware {
	/// Wrap a flat binary blob, to be written starting at flash address 0.
	///
	/// The data is padded with 0xff (the erased flash state) up to the
	/// next block boundary: the burst transfer always moves full blocks.
	pub fn new(mut data: Vec<u8>) -> Firmware {
		let source_len = data.len();
		let tail = data.len() % BLOCK_SIZE;
		if tail != 0 {
			data.resize(data.len() + BLOCK_SIZE - tail, 0xff);
		}
		Firmware {
			data,
			source_len,
			pos: 0,
		}
	}

	pub fn load<P: AsRef<Path>>(path: P) -> crate::AResult<Firmware> {
		let path = path.as_ref();
		let metadata = fs::metadata(path)
			.with_context(|_| format!("cannot stat firmware file {:?}", path))?;
		ensure!(metadata.is_file(), "firmware {:?} is not a regular file", path);
		let data = fs::read(path)
			.with_context(|_| format!("cannot read firmware file {:?}", path))?;
		ensure!(!data.is_empty(), "firmware file {:?} is empty", path);
		info!("using firmware file {:?} ({} bytes)", path, data.len());
		Ok(Firmware::new(data))
	}

	/// Length of the data as loaded, before padding.
	pub fn source_len(&self) -> usize {
		self.source_len
	}

	/// Padded length; always a multiple of `BLOCK_SIZE`.
	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn blocks(&self) -> usize {
		self.data.len() / BLOCK_SIZE
	}

	pub fn rewind(&mut self) {
		self.pos = 0;
	}

	/// Next byte under the cursor; panics when read past the end.
	pub fn next_byte(&mut self) -> u8 {
		let byte = self.data[self.pos];
		self.pos += 1;
		byte
	}

	/// Next full block under the cursor; panics when read past the end.
	pub fn next_block(&mut self) -> &[u8; BLOCK_SIZE] {
		let end = self.pos + BLOCK_SIZE;
		let block = self.data[self.pos..end]
			.try_into()
			.expect("slice is exactly one block");
		self.pos = end;
		block
	}
}
