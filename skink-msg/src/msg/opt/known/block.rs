/// The contents of a Block2 option value (RFC 7959 §2.2), kept
/// unpacked: the block number, the more-blocks flag, and the size
/// exponent SZX.
///
/// On the wire the three share one uint, high bits to low:
///
/// ```text
/// NUM (4..20 bits) | M (1 bit) | SZX (3 bits)
/// ```
///
/// A block is `2^(SZX + 4)` bytes, so SZX 6 is the 1024-byte maximum;
/// SZX 7 is reserved by the RFC and read as 1024 here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Block {
  num: u32,
  more: bool,
  szx: u8,
}

impl Block {
  /// Describe block `num` of a transfer using `size`-byte blocks.
  ///
  /// `size` is snapped down to the nearest expressible power of two
  /// (16..=1024).
  pub fn new(size: u16, num: u32, more: bool) -> Self {
    let mut szx = 0u8;
    while szx < 6 && 32u16 << szx <= size {
      szx += 1;
    }

    Self { num, more, szx }
  }

  /// The relative number of this block within the transfer
  pub fn num(&self) -> u32 {
    self.num
  }

  /// Whether blocks follow this one
  pub fn more(&self) -> bool {
    self.more
  }

  /// Block size in bytes
  pub fn size(&self) -> u16 {
    1u16 << (self.szx.min(6) + 4)
  }
}

impl From<u32> for Block {
  fn from(raw: u32) -> Self {
    Self { num: raw >> 4,
           more: raw & 0b1000 != 0,
           szx: (raw & 0b111) as u8 }
  }
}

impl From<Block> for u32 {
  fn from(b: Block) -> u32 {
    (b.num << 4) | ((b.more as u32) << 3) | b.szx as u32
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unpacks_wire_value() {
    let b = Block::from((5 << 4) | 0b1000 | 6);
    assert_eq!(b.num(), 5);
    assert!(b.more());
    assert_eq!(b.size(), 1024);

    let b = Block::from(0b0010_0001);
    assert_eq!(b.num(), 2);
    assert!(!b.more());
    assert_eq!(b.size(), 32);
  }

  #[test]
  fn packs_back_to_the_same_wire_value() {
    // repacking must be lossless so a received option can be echoed
    // into an ACK, reserved SZX included
    for raw in [0u32, 0b0111, 0x16, (77 << 4) | 0b1011, (0xF_FFFF << 4) | 0b1110] {
      assert_eq!(u32::from(Block::from(raw)), raw);
    }
  }

  #[test]
  fn size_snaps_down_to_a_power_of_two() {
    let size_of = |s| Block::new(s, 0, false).size();

    assert_eq!(size_of(0), 16);
    assert_eq!(size_of(16), 16);
    assert_eq!(size_of(100), 64);
    assert_eq!(size_of(512), 512);
    assert_eq!(size_of(1000), 512);
    assert_eq!(size_of(1024), 1024);
    assert_eq!(size_of(4096), 1024);
  }

  #[test]
  fn reserved_szx_reads_as_1024() {
    assert_eq!(Block::from(0b0111).size(), 1024);
  }
}
