use no_std_net::SocketAddr;

/// Size of the largest datagram we expect to exchange: one 1024-byte
/// block plus header, token and option overhead.
pub const MAX_DGRAM_SIZE: usize = 1536;

/// A payload tagged with the peer address it arrived from or is bound
/// for. Datagrams, parsed messages and cache keys all travel through
/// the endpoint in this shape.
#[derive(PartialEq, PartialOrd, Eq, Ord, Hash, Debug, Clone, Copy)]
pub struct Addrd<T>(pub T, pub SocketAddr);

impl<T> Addrd<T> {
  /// The payload half
  pub fn data(&self) -> &T {
    &self.0
  }

  /// The address half
  pub fn addr(&self) -> SocketAddr {
    self.1
  }

  /// Keep the address, replace the payload with `f` of it
  pub fn map<R>(self, f: impl FnOnce(T) -> R) -> Addrd<R> {
    Addrd(f(self.0), self.1)
  }
}

/// A CoAP datagram transport.
///
/// This is the seam between the endpoint and UDP: anything that can
/// throw a datagram at a peer address and poll for inbound datagrams
/// will do. The `std` implementation for [`std::net::UdpSocket`] lives
/// in [`crate::std`].
pub trait Socket {
  /// The error yielded by socket operations
  type Error: core::fmt::Debug;

  /// Send a datagram to a remote address
  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error>;

  /// Pull one queued datagram and its sender's address into `buffer`.
  ///
  /// A datagram longer than `buffer` loses its tail silently, matching
  /// UDP socket behavior; sizing the buffer at [`MAX_DGRAM_SIZE`]
  /// avoids that.
  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error>;

  /// Poll the socket for one datagram, yielding `None` instead of
  /// blocking when nothing is queued.
  fn poll(&self) -> Result<Option<Addrd<Vec<u8>>>, Self::Error> {
    let mut buf = [0u8; MAX_DGRAM_SIZE];

    match self.recv(&mut buf) {
      | Ok(Addrd(n, addr)) => Ok(Some(Addrd(buf[..n].to_vec(), addr))),
      | Err(nb::Error::WouldBlock) => Ok(None),
      | Err(nb::Error::Other(e)) => Err(e),
    }
  }
}
