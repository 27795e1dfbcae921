use crate::raw::heaps::SizeDebugWrapper;
use std::fmt::{Debug, Formatter};

#[derive(Copy, Clone)]
pub struct BlobHeap<'l> {
	data: &'l [u8],
}

impl<'l> From<&'l [u8]> for BlobHeap<'l> {
	fn from(data: &'l [u8]) -> Self {
		Self { data }
	}
}

impl<'l> BlobHeap<'l> {
	/// Reads the compressed length prefix at `offset`, returning the blob bytes that follow it.
	pub fn get(&self, offset: usize) -> Option<&'l [u8]> {
		let rest = self.data.get(offset..)?;
		let mut cursor = std::io::Cursor::new(rest);
		let len = crate::utilities::read_compressed_u32(&mut cursor).ok()? as usize;
		let start = cursor.position() as usize;
		rest.get(start..start + len)
	}
}

impl Debug for BlobHeap<'_> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		let mut dbg = f.debug_struct("BlobHeap");
		dbg.field("data", &SizeDebugWrapper(self.data.len()));
		dbg.finish()
	}
}
