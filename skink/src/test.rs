#![allow(dead_code)]

use ::std::cell::Cell;
use ::std::collections::HashMap;
use ::std::rc::Rc;
use ::std::sync::{Arc, Mutex};

use embedded_time::rate::Fraction;
use embedded_time::Instant;
use no_std_net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use crate::fs;
use crate::net::{Addrd, Socket};

pub fn dummy_addr() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 1), 8080))
}

pub fn dummy_addr_2() -> SocketAddr {
  SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(192, 168, 0, 2), 8080))
}

/// A clock whose "now" is a shared cell of milliseconds, so tests can
/// advance time while the endpoint owns the clock.
#[derive(Debug, Clone, Default)]
pub struct ClockMock(Rc<Cell<u64>>);

impl ClockMock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn set(&self, millis: u64) {
    self.0.set(millis);
  }

  pub fn advance(&self, millis: u64) {
    self.0.set(self.0.get() + millis);
  }

  pub fn instant(n: u64) -> Instant<Self> {
    Instant::new(n)
  }
}

impl embedded_time::Clock for ClockMock {
  type T = u64;

  const SCALING_FACTOR: Fraction = Fraction::new(1, 1000);

  fn try_now(&self) -> Result<Instant<Self>, embedded_time::clock::Error> {
    Ok(Instant::new(self.0.get()))
  }
}

/// A mocked socket; tests push inbound datagrams into `rx` and read
/// outbound datagrams out of `tx` through cloned handles.
#[derive(Debug, Default)]
pub struct SockMock {
  /// Inbound bytes from remote sockets. Address represents the sender
  pub rx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
  /// Outbound bytes to remote sockets. Address represents the destination
  pub tx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
}

impl SockMock {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn handles(&self) -> (Arc<Mutex<Vec<Addrd<Vec<u8>>>>>, Arc<Mutex<Vec<Addrd<Vec<u8>>>>>) {
    (Arc::clone(&self.rx), Arc::clone(&self.tx))
  }
}

impl Socket for SockMock {
  type Error = ::std::convert::Infallible;

  fn send(&self, msg: Addrd<&[u8]>) -> nb::Result<(), Self::Error> {
    self.tx.lock().unwrap().push(msg.map(Vec::from));
    Ok(())
  }

  fn recv(&self, buffer: &mut [u8]) -> nb::Result<Addrd<usize>, Self::Error> {
    let mut rx = self.rx.lock().unwrap();

    if rx.is_empty() {
      return Err(nb::Error::WouldBlock);
    }

    let dgram = rx.remove(0);
    buffer[..dgram.data().len()].copy_from_slice(dgram.data());
    Ok(dgram.map(|bytes| bytes.len()))
  }
}

type SharedBytes = Arc<Mutex<Vec<u8>>>;

/// An in-memory [`fs::FileSystem`]; handles share content with the
/// map, so tests can seed and inspect files while the endpoint holds
/// open handles.
#[derive(Debug, Clone, Default)]
pub struct MemFs {
  files: Arc<Mutex<HashMap<String, SharedBytes>>>,
}

impl MemFs {
  pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
    self.files
        .lock()
        .unwrap()
        .insert(name.into(), Arc::new(Mutex::new(bytes)));
  }

  /// Seed a text file of `lines` lines, each reading `line <n>\n`.
  pub fn insert_lines(&mut self, name: &str, lines: usize) {
    let text = (0..lines).map(|n| format!("line {}\n", n)).collect::<String>();
    self.insert(name, text.into_bytes());
  }

  pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
    self.files
        .lock()
        .unwrap()
        .get(name)
        .map(|data| data.lock().unwrap().clone())
  }
}

#[derive(Debug)]
pub struct MemFile {
  data: SharedBytes,
  pos: u64,
}

impl fs::File for MemFile {
  type Error = &'static str;

  fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
    let data = self.data.lock().unwrap();
    let pos = (self.pos as usize).min(data.len());
    let n = buf.len().min(data.len() - pos);
    buf[..n].copy_from_slice(&data[pos..pos + n]);
    self.pos += n as u64;
    Ok(n)
  }

  fn write(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
    let mut data = self.data.lock().unwrap();
    let pos = self.pos as usize;

    if pos > data.len() {
      data.resize(pos, 0);
    }

    let overlap = bytes.len().min(data.len().saturating_sub(pos));
    data[pos..pos + overlap].copy_from_slice(&bytes[..overlap]);
    data.extend_from_slice(&bytes[overlap..]);

    self.pos += bytes.len() as u64;
    Ok(())
  }

  fn seek(&mut self, pos: u64) -> Result<(), Self::Error> {
    self.pos = pos;
    Ok(())
  }

  fn size(&mut self) -> Result<u64, Self::Error> {
    Ok(self.data.lock().unwrap().len() as u64)
  }
}

impl fs::FileSystem for MemFs {
  type Error = &'static str;
  type File = MemFile;

  fn open_read(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    self.files
        .lock()
        .unwrap()
        .get(name)
        .map(|data| MemFile { data: Arc::clone(data),
                              pos: 0 })
        .ok_or("file not found")
  }

  fn create(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    let data = Arc::new(Mutex::new(Vec::new()));
    self.files
        .lock()
        .unwrap()
        .insert(name.into(), Arc::clone(&data));
    Ok(MemFile { data, pos: 0 })
  }

  fn open_append(&mut self, name: &str) -> Result<Self::File, Self::Error> {
    let mut files = self.files.lock().unwrap();
    let data = files.entry(name.into())
                    .or_insert_with(|| Arc::new(Mutex::new(Vec::new())));
    let pos = data.lock().unwrap().len() as u64;
    Ok(MemFile { data: Arc::clone(data),
                 pos })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fs::{File as _, FileSystem as _};

  #[test]
  fn mem_fs_append_lands_at_end() {
    let mut fs = MemFs::default();
    fs.insert("f", b"abc".to_vec());

    let mut file = fs.open_append("f").unwrap();
    file.write(b"def").unwrap();

    assert_eq!(fs.contents("f").unwrap(), b"abcdef");
  }

  #[test]
  fn mem_file_write_past_end_zero_fills() {
    let mut fs = MemFs::default();
    let mut file = fs.create("f").unwrap();

    file.seek(4).unwrap();
    file.write(b"x").unwrap();

    assert_eq!(fs.contents("f").unwrap(), [0, 0, 0, 0, b'x']);
  }
}
