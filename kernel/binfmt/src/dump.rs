//! Trace-level hex dump of image data as it is read.

use core::fmt;

use kestrel_core::ktrace;

const ROW: usize = 32;

/// One dump row: up to 32 bytes shown as little-endian words.
struct HexRow<'a>(&'a [u8]);

impl fmt::Display for HexRow<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for word in self.0.chunks(4) {
            let mut bytes = [0u8; 4];
            bytes[..word.len()].copy_from_slice(word);
            write!(f, "  {:08x}", u32::from_le_bytes(bytes))?;
        }
        Ok(())
    }
}

/// Logs `data` 32 bytes per line, prefixed with the row offset.
pub(crate) fn dump_readdata(data: &[u8]) {
    for (index, row) in data.chunks(ROW).enumerate() {
        ktrace!("{:04x}:{}", index * ROW, HexRow(row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_renders_words_little_endian() {
        let row = HexRow(&[0x78, 0x56, 0x34, 0x12, 0xff]);
        assert_eq!(row.to_string(), "  12345678  000000ff");
    }

    #[test]
    fn dump_accepts_any_length() {
        dump_readdata(&[]);
        dump_readdata(&[0u8; 70]);
    }
}
