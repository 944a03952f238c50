//! `std` implementations of the endpoint's seams: a monotonic
//! millisecond [`Clock`], [`Socket`] for [`std::net::UdpSocket`], and
//! [`DirFs`] mapping file names into a directory.

use ::std::io;
use ::std::net::UdpSocket;
use ::std::path::PathBuf;

use embedded_time::rate::Fraction;
use embedded_time::Instant;

use crate::fs;
use crate::net::{Addrd, Socket};

/// Implement [`embedded_time::Clock`] using [`std::time`] primitives,
/// with millisecond ticks.
#[derive(Debug, Clone, Copy)]
pub struct Clock(::std::time::Instant);

impl Default for Clock {
  fn default() -> Self {
    Self::new()
  }
}

impl Clock {
  /// Create a new clock; time zero is the moment of creation.
  pub fn new() -> Self {
    Self(::std::time::Instant::now())
  }
}

impl embedded_time::Clock for Clock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.0.elapsed().as_millis() as u64))
  }
}

/// Bind a UDP socket suitable for [`Socket`]: non-blocking from the
/// start.
pub fn bind_udp<A: ::std::net::ToSocketAddrs>(addr: A) -> io::Result<UdpSocket> {
  let sock = UdpSocket::bind(addr)?;
  sock.set_nonblocking(true)?;
  Ok(sock)
}

pub(crate) fn io_to_nb(err: io::Error) -> nb::Error<io::Error> {
  match err.kind() {
    | io::ErrorKind::WouldBlock => nb::Error::WouldBlock,
    | _ => nb::Error::Other(err),
  }
}

pub(crate) fn to_std_addr(addr: no_std_net::SocketAddr) -> ::std::net::SocketAddr {
  use ::std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

  match addr {
    | no_std_net::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      (IpAddr::V4(Ipv4Addr::new(a, b, c, d)), v4.port()).into()
    },
    | no_std_net::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      (IpAddr::V6(Ipv6Addr::new(a, b, c, d, e, f, g, h)), v6.port()).into()
    },
  }
}

pub(crate) fn to_no_std_addr(addr: ::std::net::SocketAddr) -> no_std_net::SocketAddr {
  match addr {
    | ::std::net::SocketAddr::V4(v4) => {
      let [a, b, c, d] = v4.ip().octets();
      no_std_net::SocketAddr::V4(no_std_net::SocketAddrV4::new(no_std_net::Ipv4Addr::new(a, b, c,
                                                                                         d),
                                                               v4.port()))
    },
    | ::std::net::SocketAddr::V6(v6) => {
      let [a, b, c, d, e, f, g, h] = v6.ip().segments();
      no_std_net::SocketAddr::V6(no_std_net::SocketAddrV6::new(no_std_net::Ipv6Addr::new(a, b, c,
                                                                                         d, e, f,
                                                                                         g, h),
                                                               v6.port(),
                                                               v6.flowinfo(),
                                                               v6.scope_id()))
    },
  }
}

impl Socket for UdpSocket {
  type Error = io::Error;

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.send_to(msg.data(), to_std_addr(msg.addr()))
        .map(|_| ())
        .map_err(io_to_nb)
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    self.recv_from(buffer)
        .map(|(n, addr)| Addrd(n, to_no_std_addr(addr)))
        .map_err(io_to_nb)
  }
}

/// [`fs::FileSystem`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct DirFs {
  root: PathBuf,
}

impl DirFs {
  /// File names resolve relative to `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }
}

/// A [`fs::File`] backed by [`std::fs::File`].
#[derive(Debug)]
pub struct DirFile(::std::fs::File);

impl fs::File for DirFile {
  type Error = io::Error;

  fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
    io::Read::read(&mut self.0, buf)
  }

  fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
    io::Write::write_all(&mut self.0, bytes)
  }

  fn seek(&mut self, pos: u64) -> Result<(), Self::Error> {
    io::Seek::seek(&mut self.0, io::SeekFrom::Start(pos)).map(|_| ())
  }

  fn size(&mut self) -> Result<u64, Self::Error> {
    self.0.metadata().map(|m| m.len())
  }
}

impl fs::FileSystem for DirFs {
  type Error = io::Error;
  type File = DirFile;

  fn open_read(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    ::std::fs::File::open(self.root.join(name)).map(DirFile)
  }

  fn create(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    ::std::fs::File::create(self.root.join(name)).map(DirFile)
  }

  fn open_append(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    ::std::fs::OpenOptions::new().append(true)
                                 .create(true)
                                 .open(self.root.join(name))
                                 .map(DirFile)
  }
}
