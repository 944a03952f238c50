//! Block2 transfer state machines (RFC 7959, server-push flavor).
//!
//! The sender drives a file out to one subscriber as CON notifications
//! carrying Block2; the receiver consumes such a stream, writing each
//! accepted block at its file offset. Neither touches the network: the
//! core turns [`Chunk`]s into messages and routes ACK / notification
//! traffic back in.

use no_std_net::SocketAddr;
use skink_msg::Block;

use crate::fs::File;

/// One block read off the outbound file, ready to be wrapped in a
/// notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
  /// Block number (NUM)
  pub num: u32,
  /// Whether blocks follow this one (M)
  pub more: bool,
  /// The block's bytes; shorter than the block size only on the final
  /// block
  pub bytes: Vec<u8>,
}

/// What an ACK did to the sender's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
  /// Not the outstanding block; nothing changed
  Ignored,
  /// The outstanding block is confirmed, the next may be emitted
  Advanced,
  /// The final block is confirmed; the transfer is done and the
  /// sender should be dropped
  Complete,
}

/// Per-transfer Block2 producer.
///
/// At most one block is outstanding: [`BlockSender::next_chunk`]
/// yields nothing while the last emitted block awaits its ACK.
#[derive(Debug)]
pub struct BlockSender<F: File> {
  file: F,
  peer: SocketAddr,
  num: u32,
  waiting_for_ack: bool,
  is_image: bool,
  block_size: u16,
}

impl<F: File> BlockSender<F> {
  /// Start a transfer of `file` to `peer`.
  pub fn new(file: F, peer: SocketAddr, is_image: bool, block_size: u16) -> Self {
    Self { file,
           peer,
           num: 0,
           waiting_for_ack: false,
           is_image,
           block_size: block_size.min(1024) }
  }

  /// The subscriber this transfer is bound for
  pub fn peer(&self) -> SocketAddr {
    self.peer
  }

  /// Whether the outbound file is the image (selects Content-Format on
  /// block 0)
  pub fn is_image(&self) -> bool {
    self.is_image
  }

  /// The block currently being sent
  pub fn num(&self) -> u32 {
    self.num
  }

  /// True between emitting a block and seeing its ACK
  pub fn waiting_for_ack(&self) -> bool {
    self.waiting_for_ack
  }

  /// The transfer's block size in bytes
  pub fn block_size(&self) -> u16 {
    self.block_size
  }

  /// Read the current block, if none is outstanding.
  ///
  /// Yields `None` while waiting for the last block's ACK. A read
  /// error aborts the transfer (the caller should drop the sender).
  pub fn next_chunk(&mut self) -> Result<Option<Chunk>, F::Error> {
    if self.waiting_for_ack {
      log::debug!("still waiting for ACK for block {}", self.num);
      return Ok(None);
    }

    let block_size = self.block_size as usize;
    let mut buf = vec![0u8; block_size];

    self.file.seek(self.num as u64 * block_size as u64)?;
    let mut filled = 0;
    loop {
      let n = self.file.read(&mut buf[filled..])?;
      filled += n;
      if n == 0 || filled == block_size {
        break;
      }
    }
    buf.truncate(filled);

    self.waiting_for_ack = true;
    Ok(Some(Chunk { num: self.num,
                    more: filled == block_size,
                    bytes: buf }))
  }

  /// An ACK carrying Block2 number `acked` arrived from the peer.
  pub fn on_ack(&mut self, acked: u32) -> Result<AckOutcome, F::Error> {
    if !self.waiting_for_ack || acked != self.num {
      return Ok(AckOutcome::Ignored);
    }

    self.waiting_for_ack = false;

    let size = self.file.size()?;
    let total_blocks = size.div_ceil(self.block_size as u64);

    if self.num as u64 >= total_blocks.saturating_sub(1) {
      log::debug!("file transfer complete, all blocks ACKed");
      Ok(AckOutcome::Complete)
    } else {
      self.num += 1;
      Ok(AckOutcome::Advanced)
    }
  }
}

/// What [`BlockReceiver::offer`] did with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecvOutcome {
  /// The expected block; it was written at its offset. The receiver
  /// is done when `complete`.
  Accepted {
    /// True when this was the final block (M == 0)
    complete: bool,
  },
  /// Already-written block (NUM < expected): re-ACK and discard
  Duplicate,
  /// Out-of-order block (NUM > expected): drop without ACK, the
  /// sender will retransmit
  Gap,
}

/// Per-stream Block2 consumer writing accepted blocks straight to a
/// file.
#[derive(Debug)]
pub struct BlockReceiver<F: File> {
  file: F,
  expected: u32,
  total_bytes: u64,
}

impl<F: File> BlockReceiver<F> {
  /// Start receiving into `file` (assumed freshly created).
  pub fn new(file: F) -> Self {
    Self { file,
           expected: 0,
           total_bytes: 0 }
  }

  /// The next block number this receiver will accept
  pub fn expected(&self) -> u32 {
    self.expected
  }

  /// Bytes written so far
  pub fn total_bytes(&self) -> u64 {
    self.total_bytes
  }

  /// Validate and store one received block.
  ///
  /// The write offset is `NUM × size`, with the size decoded from the
  /// received SZX so the receiver mirrors whatever block size the
  /// sender chose.
  pub fn offer(&mut self, block: Block, payload: &[u8]) -> Result<RecvOutcome, F::Error> {
    let num = block.num();

    if num < self.expected {
      log::debug!("duplicate block {} (expected {})", num, self.expected);
      return Ok(RecvOutcome::Duplicate);
    }

    if num > self.expected {
      log::warn!("block gap: expected {}, got {}", self.expected, num);
      return Ok(RecvOutcome::Gap);
    }

    self.file.seek(num as u64 * block.size() as u64)?;
    self.file.write(payload)?;
    self.total_bytes += payload.len() as u64;
    self.expected += 1;

    Ok(RecvOutcome::Accepted { complete: !block.more() })
  }
}
