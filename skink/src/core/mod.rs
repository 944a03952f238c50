//! The endpoint runtime: one struct owning the socket, clock, file
//! system and every protocol state machine, polled cooperatively from
//! a single thread.
//!
//! [`Core`] is symmetric. As a server it dispatches inbound requests
//! over the endpoint table (`/buttons`, `/actuators`, `/file`) and
//! pushes Observe notifications; as a client it issues requests,
//! consumes notifications and reassembles Block2 streams. Both roles
//! share the retransmission table, the duplicate windows and the
//! block-transfer machinery.

use ::std::collections::VecDeque;

use embedded_time::Instant;
use no_std_net::SocketAddr;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use skink_msg::known::{content_format, observe::Action};
use skink_msg::{Block, Code, CodeKind, Id, Message, Token, Type, TryFromBytes, TryIntoBytes};

use crate::block::{AckOutcome, BlockReceiver, BlockSender, RecvOutcome};
use crate::config::Config;
use crate::dedup::{DuplicateWindow, ReplayCache};
use crate::fs::{File, FileSystem};
use crate::logging::msg_summary;
use crate::net::{Addrd, Socket};
use crate::observe::ObserveRegistry;
use crate::reliability::ReliabilityEngine;
use crate::resp;
use crate::time::{elapsed, Clock, Millis};

mod error;
mod resources;

pub use error::*;
pub use resources::Resources;

/// The default CoAP port
pub const COAP_PORT: u16 = 5683;

/// Error type of a [`Core`] parameterized by socket `S` and file
/// system `F`
pub type CoreError<S, F> = Error<<S as Socket>::Error, <F as FileSystem>::Error>;

type CoreResult<T, S, F> = Result<T, CoreError<S, F>>;

/// Things that happened inside the endpoint that the hosting
/// environment may want to react to (status LEDs, buzzers, logs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
  /// A one-byte Observe notification arrived
  NotificationByte(u8),
  /// A text Observe notification arrived
  NotificationText(String),
  /// A piggy-backed response arrived that no internal state machine
  /// claimed
  Response {
    /// The response code
    code: Code,
    /// The response body
    payload: Vec<u8>,
  },
  /// A FETCH response body was saved
  FetchSaved {
    /// File it was saved to
    path: &'static str,
  },
  /// An inbound block transfer finished
  FileReceived {
    /// File it was saved to
    path: &'static str,
  },
  /// An outbound block transfer was fully acknowledged
  TransferComplete {
    /// The subscriber it went to
    peer: SocketAddr,
  },
  /// An outbound block transfer was aborted
  TransferAborted {
    /// The subscriber it was going to
    peer: SocketAddr,
  },
  /// A CON message was abandoned after the final retransmission
  TransmitFailed {
    /// Message ID of the abandoned message
    id: Id,
    /// Peer that never acknowledged it
    peer: SocketAddr,
  },
  /// PUT `/actuators` changed the actuator state
  ActuatorsChanged {
    /// New LED state
    led: bool,
    /// New buzzer state
    buzzer: bool,
  },
}

/// Which of the two served files an operation concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
  /// The text file (iPATCH/FETCH target)
  Text,
  /// The image file (`?type=image`)
  Image,
}

/// The line range a FETCH asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRange {
  /// The first N lines (`"N"` on the wire)
  Lines(u32),
  /// Lines start..=end, zero-based (`"start,end"` on the wire)
  Span(u32, u32),
}

impl FetchRange {
  fn payload(self) -> String {
    match self {
      | FetchRange::Lines(n) => n.to_string(),
      | FetchRange::Span(start, end) => format!("{},{}", start, end),
    }
  }
}

/// Whether a Block2 block arrived as a pushed notification or as the
/// piggy-backed response to our own GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockOrigin {
  /// CON notification: we ACK each accepted block, the server drives
  Notification,
  /// Piggy-backed response: no ACK, we request the next block
  PiggyResponse,
}

/// One row of the endpoint table
struct EndpointEntry<T, C: Clock> {
  method: Code,
  path: &'static [&'static str],
  handler: fn(&mut T, &Addrd<Message>, Instant<C>) -> Message,
}

/// Build the piggy-backed response skeleton for a request: type ACK,
/// same message ID, same token.
pub(crate) fn piggy(req: &Message, code: Code) -> Message {
  let mut resp = Message::new(Type::Ack, code, req.id);
  resp.token = req.token;
  resp
}

/// [`piggy`] with a text/plain body.
pub(crate) fn piggy_text(req: &Message, code: Code, body: &str) -> Message {
  let mut resp = piggy(req, code);
  resp.set_content_format(content_format::TEXT);
  resp.payload.0 = body.as_bytes().to_vec();
  resp
}

/// Message IDs must be unpredictable enough not to collide across
/// restarts (RFC 7252 §4.4); a seeded ChaCha8 stream is plenty.
#[derive(Debug, Clone)]
struct IdGenerator {
  rng: ChaCha8Rng,
}

impl IdGenerator {
  fn new(seed: u64) -> Self {
    Self { rng: ChaCha8Rng::seed_from_u64(seed) }
  }

  fn next(&mut self) -> Id {
    Id(self.rng.gen())
  }

  fn token(&mut self) -> Token {
    let bytes: [u8; 8] = self.rng.gen();
    Token::from_slice(&bytes).unwrap_or_default()
  }
}

/// A symmetric CoAP endpoint over one socket.
///
/// Drive it by calling [`Core::poll`] in a loop; feed host-side
/// changes in through [`Core::set_button`], [`Core::notify_byte`],
/// [`Core::notify_text`] and [`Core::push_file`]; issue client
/// requests with the `subscribe_buttons` / `get_actuators` /
/// `put_actuators` / `append_line` / `fetch_lines` / `request_file`
/// family.
#[derive(Debug)]
pub struct Core<S: Socket, C: Clock, F: FileSystem> {
  config: Config,
  socket: S,
  clock: C,
  fs: F,
  ids: IdGenerator,
  token: Token,
  reliability: ReliabilityEngine<C>,
  req_window: DuplicateWindow,
  note_window: DuplicateWindow,
  replay: ReplayCache,
  subscribers: ObserveRegistry<C>,
  tx_transfer: Option<BlockSender<F::File>>,
  rx_transfer: Option<(BlockReceiver<F::File>, &'static str)>,
  rx_image: bool,
  fetch_pending: bool,
  resources: Resources,
  last_prune: Option<Instant<C>>,
  events: VecDeque<Event>,
}

impl<S: Socket, C: Clock, F: FileSystem> Core<S, C, F> {
  const ENDPOINTS: [EndpointEntry<Self, C>; 6] =
    [EndpointEntry { method: Code::GET,
                     path: &["buttons"],
                     handler: Self::handle_get_buttons },
     EndpointEntry { method: Code::GET,
                     path: &["actuators"],
                     handler: Self::handle_get_actuators },
     EndpointEntry { method: Code::PUT,
                     path: &["actuators"],
                     handler: Self::handle_put_actuators },
     EndpointEntry { method: Code::GET,
                     path: &["file"],
                     handler: Self::handle_get_file },
     EndpointEntry { method: Code::IPATCH,
                     path: &["file"],
                     handler: Self::handle_ipatch_file },
     EndpointEntry { method: Code::FETCH,
                     path: &["file"],
                     handler: Self::handle_fetch_file }];

  /// Create an endpoint from its collaborators.
  pub fn new(config: Config, socket: S, clock: C, fs: F) -> Result<Self, CoreError<S, F>> {
    let now = clock.try_now()
                   .map_err(|_| When::Polling.what(What::ClockError))?;
    let boot_millis = Millis::try_from(now.duration_since_epoch()).map(|m| m.0)
                                                                  .unwrap_or(0);

    let mut ids = IdGenerator::new(config.token_seed ^ boot_millis);
    let token = ids.token();

    Ok(Self { reliability: ReliabilityEngine::new(config.ack_timeout, config.max_retransmits),
              config,
              socket,
              clock,
              fs,
              ids,
              token,
              req_window: DuplicateWindow::default(),
              note_window: DuplicateWindow::default(),
              replay: ReplayCache::default(),
              subscribers: ObserveRegistry::default(),
              tx_transfer: None,
              rx_transfer: None,
              rx_image: false,
              fetch_pending: false,
              resources: Resources::default(),
              last_prune: None,
              events: VecDeque::new() })
  }

  /// The token this endpoint uses for its own requests
  pub fn token(&self) -> Token {
    self.token
  }

  /// The plain data behind `/buttons` and `/actuators`
  pub fn resources(&self) -> &Resources {
    &self.resources
  }

  /// Mutable access to the resource data (e.g. for hosts mirroring
  /// actuator state back after a reboot)
  pub fn resources_mut(&mut self) -> &mut Resources {
    &mut self.resources
  }

  /// Number of live Observe subscribers
  pub fn subscriber_count(&self) -> usize {
    self.subscribers.len()
  }

  /// Whether an outbound block transfer is running
  pub fn transfer_active(&self) -> bool {
    self.tx_transfer.is_some()
  }

  /// Record a button edge so GET `/buttons` reports it.
  pub fn set_button(&mut self, ix: usize, pressed: bool) {
    if let Some(slot) = self.resources.buttons.get_mut(ix) {
      *slot = pressed;
    }
  }

  fn now(&self) -> Result<Instant<C>, CoreError<S, F>> {
    self.clock
        .try_now()
        .map_err(|_| When::Polling.what(What::ClockError))
  }

  /// Service the endpoint: handle at most one inbound datagram, run
  /// the retransmission tick, and prune dead subscribers on the
  /// configured cadence.
  ///
  /// Yields at most one [`Event`]; call in a loop.
  pub fn poll(&mut self) -> CoreResult<Option<Event>, S, F> {
    if let Some(event) = self.events.pop_front() {
      return Ok(Some(event));
    }

    let now = self.now()?;

    let dgram = self.socket
                    .poll()
                    .map_err(|e| When::Polling.what(What::SockError(e)))?;
    if let Some(dgram) = dgram {
      self.handle_datagram(dgram, now)?;
    }

    self.tick(now);

    match self.last_prune {
      | None => self.last_prune = Some(now),
      | Some(last) if elapsed(last, now) > self.config.prune_interval => {
        self.subscribers.prune(now,
                               self.config.subscriber_timeout,
                               self.config.timeout_threshold);
        self.last_prune = Some(now);
      },
      | Some(_) => (),
    }

    Ok(self.events.pop_front())
  }

  fn handle_datagram(&mut self, dgram: Addrd<Vec<u8>>, now: Instant<C>) -> CoreResult<(), S, F> {
    let Addrd(bytes, addr) = dgram;

    let msg = match Message::try_from_bytes(&bytes) {
      | Ok(msg) => msg,
      | Err(e) => {
        // CoAP forbids responding to malformed messages
        log::debug!("dropping unparseable datagram from {}: {:?}", addr, e);
        return Ok(());
      },
    };

    log::trace!("{} -> {}", addr, msg_summary(&msg));

    match msg.ty {
      | Type::Ack => self.handle_ack(msg, addr, now),
      | Type::Con | Type::Non => match msg.code.kind() {
        | CodeKind::Request => self.handle_request(msg, addr, now),
        | CodeKind::Response => self.handle_notification(msg, addr),
        | CodeKind::Empty if msg.ty == Type::Con => {
          // CoAP ping
          self.send_msg(Message::new(Type::Reset, Code::EMPTY, msg.id), addr)
        },
        | CodeKind::Empty => Ok(()),
      },
      | Type::Reset => {
        self.reliability.clear(msg.id);
        self.subscribers.deregister_peer(addr);
        Ok(())
      },
    }
  }

  // -- server role ---------------------------------------------------

  fn handle_request(&mut self,
                    msg: Message,
                    addr: SocketAddr,
                    now: Instant<C>)
                    -> CoreResult<(), S, F> {
    let con = msg.ty == Type::Con;

    if self.req_window.is_duplicate(msg.id) {
      log::debug!("duplicate request {:?}", msg.id);

      if con {
        match self.replay.get(Addrd(msg.id, addr)) {
          | Some(cached) => {
            let cached = cached.to_vec();
            self.send_raw(Addrd(&cached, addr))?;
          },
          | None => self.send_msg(msg.ack(), addr)?,
        }
      }

      return Ok(());
    }

    self.req_window.record(msg.id);

    let req = Addrd(msg, addr);
    let handler = Self::ENDPOINTS.iter()
                                 .find(|e| {
                                   e.method == req.data().code && path_matches(e.path, req.data())
                                 })
                                 .map(|e| e.handler);

    let resp = match handler {
      | Some(handler) => handler(self, &req, now),
      | None => piggy(req.data(), resp::NOT_FOUND),
    };

    if con {
      let bytes = resp.try_into_bytes()
                      .map_err(|e| When::SendingMessage.what(What::ToBytes(e)))?;
      self.replay.store(Addrd(req.data().id, addr), bytes.clone());
      self.send_raw(Addrd(&bytes, addr))?;
    }

    Ok(())
  }

  // -- acknowledgements ----------------------------------------------

  fn handle_ack(&mut self, msg: Message, addr: SocketAddr, now: Instant<C>) -> CoreResult<(), S, F> {
    self.reliability.clear(msg.id);
    self.subscribers.on_ack(addr, now);

    if let Some(block) = msg.block2() {
      if self.tx_transfer.as_ref().map(|tx| tx.peer()) == Some(addr) {
        self.on_transfer_ack(block.num(), now)?;
      }
    }

    if msg.code.kind() == CodeKind::Response {
      self.handle_response(msg, addr)?;
    }

    Ok(())
  }

  fn on_transfer_ack(&mut self, num: u32, now: Instant<C>) -> CoreResult<(), S, F> {
    let tx = match self.tx_transfer.as_mut() {
      | Some(tx) => tx,
      | None => return Ok(()),
    };
    let peer = tx.peer();

    match tx.on_ack(num) {
      | Ok(AckOutcome::Ignored) => Ok(()),
      | Ok(AckOutcome::Complete) => {
        self.tx_transfer = None;
        self.events.push_back(Event::TransferComplete { peer });
        Ok(())
      },
      | Ok(AckOutcome::Advanced) => self.send_transfer_block(now),
      | Err(e) => {
        log::warn!("file error advancing transfer: {:?}", e);
        self.tx_transfer = None;
        self.events.push_back(Event::TransferAborted { peer });
        Ok(())
      },
    }
  }

  // -- client role ---------------------------------------------------

  fn handle_response(&mut self, msg: Message, addr: SocketAddr) -> CoreResult<(), S, F> {
    if let Some(block) = msg.block2() {
      return self.accept_block(&msg, addr, block, BlockOrigin::PiggyResponse);
    }

    if self.fetch_pending && msg.token == self.token && !msg.payload().is_empty() {
      self.fetch_pending = false;

      let path = self.config.files.fetch_out;
      let saved = self.fs
                      .create(path)
                      .and_then(|mut file| file.write(msg.payload()));
      match saved {
        | Ok(()) => {
          log::info!("saved {} fetched bytes to {}", msg.payload().len(), path);
          self.events.push_back(Event::FetchSaved { path });
        },
        | Err(e) => log::warn!("failed to save fetch response: {:?}", e),
      }

      return Ok(());
    }

    self.events.push_back(Event::Response { code: msg.code,
                                            payload: msg.payload().to_vec() });
    Ok(())
  }

  fn handle_notification(&mut self, msg: Message, addr: SocketAddr) -> CoreResult<(), S, F> {
    let con = msg.ty == Type::Con;

    if self.note_window.is_duplicate(msg.id) {
      log::debug!("duplicate notification {:?}, re-acking", msg.id);

      if con {
        let mut ack = msg.ack();
        if let Some(block) = msg.block2() {
          ack.set_block2(block);
        }
        self.send_msg(ack, addr)?;
      }

      return Ok(());
    }

    self.note_window.record(msg.id);

    if let Some(seq) = msg.observe() {
      log::debug!("observe notification (seq={})", seq);
    }

    match msg.block2() {
      | Some(block) => {
        let origin = if con {
          BlockOrigin::Notification
        } else {
          BlockOrigin::PiggyResponse
        };
        self.accept_block(&msg, addr, block, origin)
      },
      | None => {
        if con {
          self.send_msg(msg.ack(), addr)?;
        }

        match msg.payload() {
          | [] => (),
          | [byte] => self.events.push_back(Event::NotificationByte(*byte)),
          | text => {
            self.events
                .push_back(Event::NotificationText(String::from_utf8_lossy(text).into_owned()))
          },
        }

        Ok(())
      },
    }
  }

  fn accept_block(&mut self,
                  msg: &Message,
                  addr: SocketAddr,
                  block: Block,
                  origin: BlockOrigin)
                  -> CoreResult<(), S, F> {
    if block.num() == 0 && self.rx_transfer.is_none() {
      let path = if msg.content_format() == Some(content_format::IMAGE_JPEG) {
        self.config.files.recv_image
      } else {
        self.config.files.recv_text
      };

      match self.fs.create(path) {
        | Ok(file) => {
          log::info!("created {}", path);
          self.rx_transfer = Some((BlockReceiver::new(file), path));
        },
        | Err(e) => {
          log::warn!("failed to create {}: {:?}", path, e);
          return Ok(());
        },
      }
    }

    let (rx, path) = match self.rx_transfer.as_mut() {
      | Some(t) => t,
      | None => return Ok(()), // a gap before block 0; the sender will retry
    };
    let path = *path;

    let outcome = match rx.offer(block, msg.payload()) {
      | Ok(outcome) => outcome,
      | Err(e) => {
        log::warn!("write error, aborting receive: {:?}", e);
        self.rx_transfer = None;
        return Ok(());
      },
    };

    match outcome {
      | RecvOutcome::Accepted { complete } => {
        if origin == BlockOrigin::Notification {
          self.send_block_ack(msg, addr, block)?;
        }

        if complete {
          self.rx_transfer = None;
          log::info!("file transfer complete");
          self.events.push_back(Event::FileReceived { path });
        } else if origin == BlockOrigin::PiggyResponse {
          self.request_file_block(addr, block.num() + 1)?;
        }
      },
      | RecvOutcome::Duplicate => {
        if origin == BlockOrigin::Notification {
          self.send_block_ack(msg, addr, block)?;
        }
      },
      | RecvOutcome::Gap => (),
    }

    Ok(())
  }

  fn send_block_ack(&mut self,
                    msg: &Message,
                    addr: SocketAddr,
                    block: Block)
                    -> CoreResult<(), S, F> {
    let mut ack = msg.ack();
    ack.set_block2(block);
    self.send_msg(ack, addr)
  }

  /// Subscribe to the peer's `/buttons` resource (Observe register).
  pub fn subscribe_buttons(&mut self, server: SocketAddr) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::GET, self.ids.next());
    msg.token = self.token;
    msg.set_observe(Action::Register.value());
    msg.set_path("buttons");
    self.send_con(msg, server)
  }

  /// Ask the peer for its actuator states.
  pub fn get_actuators(&mut self, server: SocketAddr) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::GET, self.ids.next());
    msg.token = self.token;
    msg.set_path("actuators");
    self.send_con(msg, server)
  }

  /// Apply actuator directives (`"LED=ON,BUZZER=OFF"` etc.) on the
  /// peer.
  pub fn put_actuators(&mut self, server: SocketAddr, directives: &str) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::PUT, self.ids.next());
    msg.token = self.token;
    msg.set_path("actuators");
    msg.payload.0 = directives.as_bytes().to_vec();
    self.send_con(msg, server)
  }

  /// Append one line to the peer's text file (iPATCH).
  pub fn append_line(&mut self, server: SocketAddr, line: &str) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::IPATCH, self.ids.next());
    msg.token = self.token;
    msg.set_path("file");
    msg.payload.0 = line.as_bytes().to_vec();
    self.send_con(msg, server)
  }

  /// Retrieve a line range from the peer's text file (FETCH); the
  /// response body is saved to [`crate::config::Files::fetch_out`].
  pub fn fetch_lines(&mut self, server: SocketAddr, range: FetchRange) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::FETCH, self.ids.next());
    msg.token = self.token;
    msg.set_path("file");
    msg.set_content_format(content_format::TEXT);
    msg.payload.0 = range.payload().into_bytes();

    self.fetch_pending = true;
    self.send_con(msg, server)
  }

  /// Start a client-driven block-wise download of the peer's file;
  /// the blocks are written to `recv_text` / `recv_image` as they
  /// arrive.
  pub fn request_file(&mut self, server: SocketAddr, kind: FileKind) -> CoreResult<Id, S, F> {
    self.rx_image = kind == FileKind::Image;
    self.request_file_block(server, 0)
  }

  fn request_file_block(&mut self, server: SocketAddr, num: u32) -> CoreResult<Id, S, F> {
    let mut msg = Message::new(Type::Con, Code::GET, self.ids.next());
    msg.token = self.token;
    msg.set_path("file");
    if self.rx_image {
      msg.add_query("type=image");
    }
    if num > 0 {
      msg.set_block2(Block::new(self.config.block_size, num, false));
    }
    self.send_con(msg, server)
  }

  // -- observe notifications -----------------------------------------

  /// Broadcast a one-byte notification to every subscriber of
  /// `resource`.
  pub fn notify_byte(&mut self, resource: &str, byte: u8) -> CoreResult<(), S, F> {
    self.broadcast(resource, &[byte])
  }

  /// Broadcast a text notification to every subscriber of `resource`.
  pub fn notify_text(&mut self, resource: &str, text: &str) -> CoreResult<(), S, F> {
    self.broadcast(resource, text.as_bytes())
  }

  fn broadcast(&mut self, resource: &str, payload: &[u8]) -> CoreResult<(), S, F> {
    if resource != "buttons" {
      return Err(When::SendingMessage.what(What::NotObservable));
    }

    let subs = self.subscribers
                   .iter_mut()
                   .map(|sub| (sub.peer(), sub.token(), sub.next_seq()))
                   .collect::<Vec<_>>();

    for (peer, token, seq) in subs {
      let mut msg = Message::new(Type::Con, resp::CONTENT, self.ids.next());
      msg.token = token;
      msg.set_observe(seq);
      msg.payload.0 = payload.to_vec();

      match self.send_con(msg, peer) {
        | Ok(_) => (),
        | Err(Error { what: What::PendingQueueFull,
                      .. }) => {
          log::warn!("pending queue full, skipping notification to {}", peer)
        },
        | Err(e) => return Err(e),
      }
    }

    Ok(())
  }

  /// Push a file to the longest-registered live subscriber as a CON
  /// Block2 notification stream.
  pub fn push_file(&mut self, kind: FileKind) -> CoreResult<(), S, F> {
    let peer = match self.subscribers.iter_mut().map(|s| s.peer()).next() {
      | Some(peer) => peer,
      | None => {
        log::debug!("no subscribers to push the file to");
        return Ok(());
      },
    };

    self.push_file_to(peer, kind)
  }

  /// Push a file to a specific subscriber.
  pub fn push_file_to(&mut self, peer: SocketAddr, kind: FileKind) -> CoreResult<(), S, F> {
    if self.tx_transfer.is_some() {
      log::warn!("transfer already in progress");
      return Err(When::FileIo.what(What::TransferActive));
    }

    let is_image = kind == FileKind::Image;
    let name = if is_image {
      self.config.files.image
    } else {
      self.config.files.text
    };

    let file = self.fs
                   .open_read(name)
                   .map_err(|e| When::FileIo.what(What::FileError(e)))?;

    log::info!("starting {:?} transfer of {} to {}", kind, name, peer);
    self.tx_transfer = Some(BlockSender::new(file, peer, is_image, self.config.block_size));

    let now = self.now()?;
    self.send_transfer_block(now)
  }

  fn send_transfer_block(&mut self, _now: Instant<C>) -> CoreResult<(), S, F> {
    let (peer, is_image, block_size, chunk) = match self.tx_transfer.as_mut() {
      | None => return Ok(()),
      | Some(tx) => (tx.peer(), tx.is_image(), tx.block_size(), tx.next_chunk()),
    };

    let chunk = match chunk {
      | Ok(Some(chunk)) => chunk,
      | Ok(None) => return Ok(()),
      | Err(e) => {
        log::warn!("file read error, aborting transfer: {:?}", e);
        self.tx_transfer = None;
        self.events.push_back(Event::TransferAborted { peer });
        return Ok(());
      },
    };

    let (token, seq) = match self.subscribers.find_mut(peer) {
      | Some(sub) => (sub.token(), sub.next_seq()),
      | None => {
        log::warn!("subscriber {} vanished mid-transfer", peer);
        self.tx_transfer = None;
        return Ok(());
      },
    };

    let mut msg = Message::new(Type::Con, resp::CONTENT, self.ids.next());
    msg.token = token;
    msg.set_observe(seq);
    msg.set_block2(Block::new(block_size, chunk.num, chunk.more));
    if chunk.num == 0 && is_image {
      msg.set_content_format(content_format::IMAGE_JPEG);
    }
    msg.payload.0 = chunk.bytes;

    self.send_con(msg, peer).map(|_| ())
  }

  // -- plumbing ------------------------------------------------------

  fn tick(&mut self, now: Instant<C>) {
    let mut failures: Vec<(Id, SocketAddr)> = Vec::new();

    {
      let Core { reliability, socket, .. } = self;
      reliability.tick(now,
                       &mut |msg: Addrd<&[u8]>| {
                         if let Err(e) = socket.send(msg) {
                           log::warn!("retransmission send failed: {:?}", e);
                         }
                       },
                       &mut |id: Id, peer: SocketAddr| failures.push((id, peer)));
    }

    for (id, peer) in failures {
      self.on_transmit_failure(id, peer);
    }
  }

  fn on_transmit_failure(&mut self, id: Id, peer: SocketAddr) {
    self.events.push_back(Event::TransmitFailed { id, peer });

    if self.tx_transfer.as_ref().map(|tx| tx.peer()) == Some(peer) {
      log::warn!("stopping file transfer due to retransmission failure");
      self.tx_transfer = None;
      self.events.push_back(Event::TransferAborted { peer });
    }

    self.subscribers.strike(peer);
  }

  fn send_con(&mut self, msg: Message, peer: SocketAddr) -> CoreResult<Id, S, F> {
    let now = self.now()?;
    let id = msg.id;

    let bytes = msg.try_into_bytes()
                   .map_err(|e| When::SendingMessage.what(What::ToBytes(e)))?;

    if !self.reliability.register(id, peer, bytes.clone(), now) {
      return Err(When::SendingMessage.what(What::PendingQueueFull));
    }

    self.send_raw(Addrd(&bytes, peer))?;
    Ok(id)
  }

  fn send_msg(&mut self, msg: Message, peer: SocketAddr) -> CoreResult<(), S, F> {
    let bytes = msg.try_into_bytes()
                   .map_err(|e| When::SendingMessage.what(What::ToBytes(e)))?;
    self.send_raw(Addrd(&bytes, peer))
  }

  fn send_raw(&mut self, msg: Addrd<&[u8]>) -> CoreResult<(), S, F> {
    match self.socket.send(msg) {
      | Ok(()) => Ok(()),
      | Err(nb::Error::WouldBlock) => {
        // drop it; CON traffic is covered by the retransmission table
        log::warn!("socket would block, dropping datagram to {}", msg.addr());
        Ok(())
      },
      | Err(nb::Error::Other(e)) => Err(When::SendingMessage.what(What::SockError(e))),
    }
  }
}

fn path_matches(spec: &[&str], msg: &Message) -> bool {
  msg.path_segments().count() == spec.len()
  && msg.path_segments()
        .zip(spec)
        .all(|(seg, expected)| seg == expected.as_bytes())
}

#[cfg(test)]
mod tests {
  use ::std::sync::{Arc, Mutex};

  use super::*;
  use crate::test::{dummy_addr, dummy_addr_2, ClockMock, MemFs, SockMock};

  type TestCore = Core<SockMock, ClockMock, MemFs>;

  struct Harness {
    core: TestCore,
    clock: ClockMock,
    fs: MemFs,
    rx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
    tx: Arc<Mutex<Vec<Addrd<Vec<u8>>>>>,
  }

  fn harness() -> Harness {
    let sock = SockMock::new();
    let (rx, tx) = sock.handles();
    let clock = ClockMock::new();
    let fs = MemFs::default();
    let core = Core::new(Config::default(), sock, clock.clone(), fs.clone()).unwrap();

    Harness { core,
              clock,
              fs,
              rx,
              tx }
  }

  impl Harness {
    fn inject(&mut self, msg: Message, from: no_std_net::SocketAddr) -> Vec<Event> {
      self.rx
          .lock()
          .unwrap()
          .push(Addrd(msg.try_into_bytes().unwrap(), from));
      self.drain()
    }

    fn drain(&mut self) -> Vec<Event> {
      let mut events = Vec::new();
      loop {
        match self.core.poll().unwrap() {
          | Some(event) => events.push(event),
          | None => break events,
        }
      }
    }

    fn sent(&self) -> Vec<Addrd<Message>> {
      self.tx
          .lock()
          .unwrap()
          .iter()
          .map(|Addrd(bytes, addr)| Addrd(Message::try_from_bytes(bytes).unwrap(), *addr))
          .collect()
    }

    fn take_sent(&self) -> Vec<Addrd<Message>> {
      let sent = self.sent();
      self.tx.lock().unwrap().clear();
      sent
    }

    fn register_subscriber(&mut self, peer: no_std_net::SocketAddr, token: &[u8]) {
      // one distinct MID per registration so the duplicate window
      // doesn't swallow repeats
      let mut req = Message::new(Type::Con, Code::GET, Id(0x0100 + token[0] as u16));
      req.token = Token::from_slice(token).unwrap();
      req.set_observe(0);
      req.set_path("buttons");
      self.inject(req, peer);
      self.take_sent();
    }
  }

  fn con(code: Code, id: u16) -> Message {
    Message::new(Type::Con, code, Id(id))
  }

  #[test]
  fn observe_registration() {
    let mut h = harness();

    let mut req = con(Code::GET, 0x1234);
    req.token = Token::from_slice(&[0xA1]).unwrap();
    req.set_observe(0);
    req.set_path("buttons");
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent.len(), 1);
    let Addrd(resp, to) = &sent[0];
    assert_eq!(*to, dummy_addr());
    assert_eq!(resp.ty, Type::Ack);
    assert_eq!(resp.id, Id(0x1234));
    assert_eq!(resp.token, Token::from_slice(&[0xA1]).unwrap());
    assert_eq!(resp.code, resp::CONTENT);
    assert_eq!(resp.observe(), Some(0));
    assert!(resp.payload().is_empty());

    assert_eq!(h.core.subscriber_count(), 1);
  }

  #[test]
  fn observe_deregistration_answers_with_state() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    let mut req = con(Code::GET, 0x1235);
    req.token = Token::from_slice(&[0xA1]).unwrap();
    req.set_observe(1);
    req.set_path("buttons");
    h.inject(req, dummy_addr());

    assert_eq!(h.core.subscriber_count(), 0);
    let sent = h.sent();
    assert_eq!(sent[0].data().code, resp::CONTENT);
    assert_eq!(sent[0].data().payload(), b"BTN1=0, BTN2=0, BTN3=0");
  }

  #[test]
  fn subscriber_slots_full_is_bad_request() {
    let mut h = harness();

    for n in 0..crate::observe::MAX_SUBSCRIBERS as u8 {
      h.register_subscriber(dummy_addr(), &[n]);
    }

    let mut req = con(Code::GET, 0x0666);
    req.token = Token::from_slice(&[0xEE]).unwrap();
    req.set_observe(0);
    req.set_path("buttons");
    h.inject(req, dummy_addr_2());

    assert_eq!(h.sent()[0].data().code, resp::BAD_REQUEST);
  }

  #[test]
  fn buttons_read_reports_pressed_state() {
    let mut h = harness();
    h.core.set_button(1, true);

    let mut req = con(Code::GET, 0x0777);
    req.set_path("buttons");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().payload(), b"BTN1=0, BTN2=1, BTN3=0");
  }

  #[test]
  fn actuator_toggle() {
    let mut h = harness();

    let mut req = con(Code::PUT, 0x2000);
    req.token = Token::from_slice(&[0xB2]).unwrap();
    req.set_path("actuators");
    req.payload.0 = b"LED=ON,BUZZER=ON".to_vec();
    let events = h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().id, Id(0x2000));
    assert_eq!(sent[0].data().code, resp::CHANGED);
    assert_eq!(sent[0].data().payload(), b"OK");

    assert!(h.core.resources().led);
    assert!(h.core.resources().buzzer);
    assert_eq!(events,
               [Event::ActuatorsChanged { led: true,
                                          buzzer: true }]);

    // directives apply independently
    let mut req = con(Code::PUT, 0x2001);
    req.set_path("actuators");
    req.payload.0 = b"LED=OFF".to_vec();
    h.inject(req, dummy_addr());

    assert!(!h.core.resources().led);
    assert!(h.core.resources().buzzer);
  }

  #[test]
  fn actuator_put_empty_payload_is_bad_request() {
    let mut h = harness();

    let mut req = con(Code::PUT, 0x2002);
    req.set_path("actuators");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().code, resp::BAD_REQUEST);
  }

  #[test]
  fn actuator_read_back() {
    let mut h = harness();
    h.core.resources_mut().led = true;

    let mut req = con(Code::GET, 0x2003);
    req.set_path("actuators");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().payload(), b"LED=ON,BUZZER=OFF");
  }

  #[test]
  fn fetch_valid_range() {
    let mut h = harness();
    h.fs.insert_lines("server.txt", 20);

    let mut req = con(Code::FETCH, 0x3000);
    req.set_path("file");
    req.set_content_format(content_format::TEXT);
    req.payload.0 = b"0,4".to_vec();
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().id, Id(0x3000));
    assert_eq!(sent[0].data().code, resp::CONTENT);
    assert_eq!(sent[0].data().payload(),
               b"line 0\nline 1\nline 2\nline 3\nline 4\n");
  }

  #[test]
  fn fetch_missing_content_format() {
    let mut h = harness();
    h.fs.insert_lines("server.txt", 20);

    let mut req = con(Code::FETCH, 0x3001);
    req.set_path("file");
    req.payload.0 = b"0,4".to_vec();
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().id, Id(0x3001));
    assert_eq!(sent[0].data().code, resp::BAD_REQUEST);
    assert_eq!(sent[0].data().payload(), b"Content-Format required");
  }

  #[test]
  fn fetch_wrong_content_format() {
    let mut h = harness();
    h.fs.insert_lines("server.txt", 20);

    let mut req = con(Code::FETCH, 0x3002);
    req.set_path("file");
    req.set_content_format(50); // application/json
    req.payload.0 = b"0,4".to_vec();
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().code, resp::UNSUPPORTED_CONTENT_FORMAT);
  }

  #[test]
  fn fetch_count_shorthand() {
    let mut h = harness();
    h.fs.insert_lines("server.txt", 20);

    let mut req = con(Code::FETCH, 0x3003);
    req.set_path("file");
    req.set_content_format(content_format::TEXT);
    req.payload.0 = b"3".to_vec();
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().payload(), b"line 0\nline 1\nline 2\n");
  }

  #[test]
  fn fetch_past_eof_is_empty_content() {
    let mut h = harness();
    h.fs.insert_lines("server.txt", 3);

    let mut req = con(Code::FETCH, 0x3004);
    req.set_path("file");
    req.set_content_format(content_format::TEXT);
    req.payload.0 = b"10,20".to_vec();
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().code, resp::CONTENT);
    assert!(sent[0].data().payload().is_empty());
  }

  #[test]
  fn ipatch_appends_with_newline() {
    let mut h = harness();
    h.fs.insert("server.txt", b"old\n".to_vec());

    let mut req = con(Code::IPATCH, 0x4000);
    req.set_path("file");
    req.payload.0 = b"appended by client".to_vec();
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().code, resp::CHANGED);
    assert_eq!(sent[0].data().payload(), b"Appended");
    assert_eq!(h.fs.contents("server.txt").unwrap(),
               b"old\nappended by client\n");
  }

  #[test]
  fn ipatch_empty_payload_is_bad_request() {
    let mut h = harness();

    let mut req = con(Code::IPATCH, 0x4001);
    req.set_path("file");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().code, resp::BAD_REQUEST);
  }

  #[test]
  fn block2_download_completion() {
    let mut h = harness();
    h.fs.insert("server.txt", (0..2500u32).map(|n| n as u8).collect());

    let expect = [(0u32, true, 1024usize), (1, true, 1024), (2, false, 452)];

    for (num, more, len) in expect {
      let mut req = con(Code::GET, 0x5000 + num as u16);
      req.set_path("file");
      if num > 0 {
        req.set_block2(Block::new(1024, num, false));
      }
      h.inject(req, dummy_addr());

      let sent = h.take_sent();
      let resp = sent[0].data();
      assert_eq!(resp.code, resp::CONTENT);

      let block = resp.block2().unwrap();
      assert_eq!((block.num(), block.more(), block.size()), (num, more, 1024));
      assert_eq!(resp.payload().len(), len);

      // Content-Format only on block 0
      assert_eq!(resp.content_format(),
                 (num == 0).then_some(content_format::TEXT));
    }
  }

  #[test]
  fn get_file_image_query() {
    let mut h = harness();
    h.fs.insert("server.jpg", vec![0xFF; 100]);

    let mut req = con(Code::GET, 0x5100);
    req.set_path("file");
    req.add_query("type=image");
    h.inject(req, dummy_addr());

    let resp = &h.sent()[0];
    assert_eq!(resp.data().content_format(), Some(content_format::IMAGE_JPEG));
    assert_eq!(resp.data().block2().map(|b| b.more()), Some(false));
    assert_eq!(resp.data().payload().len(), 100);
  }

  #[test]
  fn get_file_missing_is_not_found() {
    let mut h = harness();

    let mut req = con(Code::GET, 0x5200);
    req.set_path("file");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().code, resp::NOT_FOUND);
  }

  #[test]
  fn unknown_path_is_not_found() {
    let mut h = harness();

    let mut req = con(Code::GET, 0x6000);
    req.set_path("nope");
    h.inject(req, dummy_addr());

    assert_eq!(h.sent()[0].data().code, resp::NOT_FOUND);
  }

  #[test]
  fn non_request_runs_handler_without_response() {
    let mut h = harness();

    let mut req = Message::new(Type::Non, Code::PUT, Id(0x6100));
    req.set_path("actuators");
    req.payload.0 = b"LED=ON".to_vec();
    h.inject(req, dummy_addr());

    assert!(h.core.resources().led);
    assert!(h.sent().is_empty());
  }

  #[test]
  fn duplicate_con_replays_cached_response() {
    let mut h = harness();

    let mut req = con(Code::PUT, 0x7000);
    req.set_path("actuators");
    req.payload.0 = b"LED=ON".to_vec();
    h.inject(req.clone(), dummy_addr());
    assert!(h.core.resources().led);

    // if the handler ran again it would re-set this
    h.core.resources_mut().led = false;
    h.inject(req, dummy_addr());

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0], sent[1]);
    assert!(!h.core.resources().led);
  }

  #[test]
  fn duplicate_mid_from_other_peer_gets_empty_ack() {
    let mut h = harness();

    let mut req = con(Code::PUT, 0x7100);
    req.set_path("actuators");
    req.payload.0 = b"LED=ON".to_vec();
    h.inject(req.clone(), dummy_addr());

    // same MID from a different peer: replay must not leak across
    // peers, and with the MID burned in the window we answer with an
    // empty ACK rather than re-running the handler
    h.inject(req, dummy_addr_2());

    let sent = h.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].addr(), dummy_addr_2());
    assert_eq!(sent[1].data().code, Code::EMPTY);
  }

  #[test]
  fn ping_gets_reset() {
    let mut h = harness();

    h.inject(Message::new(Type::Con, Code::EMPTY, Id(0x0042)), dummy_addr());

    let sent = h.sent();
    assert_eq!(sent[0].data().ty, Type::Reset);
    assert_eq!(sent[0].data().id, Id(0x0042));
  }

  #[test]
  fn notification_retransmit_exhaustion() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    h.core.notify_byte("buttons", 0x42).unwrap();

    let mut events = Vec::new();
    for ms in (0..70_000u64).step_by(100) {
      h.clock.set(ms);
      events.extend(h.drain());
    }

    let to_peer = h.sent()
                   .into_iter()
                   .filter(|m| m.data().payload() == [0x42])
                   .collect::<Vec<_>>();

    // initial transmission + 4 retransmissions
    assert_eq!(to_peer.len(), 5);
    let id = to_peer[0].data().id;
    assert!(events.contains(&Event::TransmitFailed { id,
                                                     peer: dummy_addr() }));
  }

  #[test]
  fn notification_sequence_increases() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    h.core.notify_byte("buttons", 1).unwrap();
    h.core.notify_text("buttons", "Hello from Server!").unwrap();
    h.core.notify_byte("buttons", 2).unwrap();

    let seqs = h.sent()
                .iter()
                .filter_map(|m| m.data().observe())
                .collect::<Vec<_>>();
    assert_eq!(seqs, [0, 1, 2]);
  }

  #[test]
  fn notify_unknown_resource_is_refused() {
    let mut h = harness();

    assert!(matches!(h.core.notify_byte("actuators", 1),
                     Err(Error { what: What::NotObservable,
                                 .. })));
  }

  #[test]
  fn server_push_file_block_flow() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);
    h.fs.insert("server.txt", (0..2500u32).map(|n| n as u8).collect());

    h.core.push_file(FileKind::Text).unwrap();
    assert!(h.core.transfer_active());

    let mut events = Vec::new();
    for expected_num in 0..3u32 {
      let sent = h.take_sent();
      assert_eq!(sent.len(), 1, "exactly one block outstanding");

      let block_msg = sent[0].data();
      assert_eq!(block_msg.ty, Type::Con);
      let block = block_msg.block2().unwrap();
      assert_eq!(block.num(), expected_num);
      assert_eq!(block.more(), expected_num < 2);
      assert!(block_msg.observe().is_some());

      // text pushes carry no Content-Format
      assert_eq!(block_msg.content_format(), None);

      let mut ack = block_msg.ack();
      ack.set_block2(Block::new(1024, expected_num, block.more()));
      events.extend(h.inject(ack, dummy_addr()));
    }

    assert!(!h.core.transfer_active());
    assert!(events.contains(&Event::TransferComplete { peer: dummy_addr() }));
  }

  #[test]
  fn push_file_image_marks_block_zero() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);
    h.fs.insert("server.jpg", vec![9; 10]);

    h.core.push_file(FileKind::Image).unwrap();

    let sent = h.sent();
    assert_eq!(sent[0].data().content_format(), Some(content_format::IMAGE_JPEG));
  }

  #[test]
  fn push_file_rejects_overlap() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);
    h.fs.insert("server.txt", vec![1; 10]);
    h.fs.insert("server.jpg", vec![2; 10]);

    h.core.push_file(FileKind::Text).unwrap();

    assert!(matches!(h.core.push_file(FileKind::Image),
                     Err(Error { what: What::TransferActive,
                                 .. })));
  }

  #[test]
  fn push_file_without_subscribers_is_a_noop() {
    let mut h = harness();
    h.fs.insert("server.txt", vec![1; 10]);

    h.core.push_file(FileKind::Text).unwrap();
    assert!(!h.core.transfer_active());
    assert!(h.sent().is_empty());
  }

  #[test]
  fn retransmit_failure_aborts_push_and_strikes_subscriber() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);
    h.fs.insert("server.txt", vec![1; 2048]);

    h.core.push_file(FileKind::Text).unwrap();

    let mut events = Vec::new();
    for ms in (0..70_000u64).step_by(100) {
      h.clock.set(ms);
      events.extend(h.drain());
    }

    assert!(!h.core.transfer_active());
    assert!(events.contains(&Event::TransferAborted { peer: dummy_addr() }));
  }

  #[test]
  fn client_subscribe_and_receive_notifications() {
    let mut h = harness();
    let server = dummy_addr_2();

    h.core.subscribe_buttons(server).unwrap();

    let sent = h.take_sent();
    assert_eq!(sent[0].addr(), server);
    assert_eq!(sent[0].data().code, Code::GET);
    assert_eq!(sent[0].data().observe(), Some(0));
    assert_eq!(sent[0].data().token, h.core.token());

    // a one-byte notification
    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9000));
    note.token = h.core.token();
    note.set_observe(1);
    note.payload.0 = vec![0x42];
    let events = h.inject(note, server);

    assert_eq!(events, [Event::NotificationByte(0x42)]);
    let acks = h.take_sent();
    assert_eq!(acks[0].data().ty, Type::Ack);
    assert_eq!(acks[0].data().id, Id(0x9000));

    // a text notification
    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9001));
    note.token = h.core.token();
    note.set_observe(2);
    note.payload.0 = b"Hello from Server!".to_vec();
    let events = h.inject(note, server);

    assert_eq!(events,
               [Event::NotificationText("Hello from Server!".into())]);
  }

  #[test]
  fn duplicate_notification_is_reacked_once_handled() {
    let mut h = harness();
    let server = dummy_addr_2();

    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9100));
    note.token = h.core.token();
    note.payload.0 = vec![0x42];

    let events = h.inject(note.clone(), server);
    assert_eq!(events, [Event::NotificationByte(0x42)]);

    let events = h.inject(note, server);
    assert!(events.is_empty());

    // both deliveries were ACKed
    assert_eq!(h.sent().len(), 2);
  }

  #[test]
  fn client_receives_blockwise_push() {
    let mut h = harness();
    let server = dummy_addr_2();

    let blocks: [(u32, bool, Vec<u8>); 3] = [(0, true, vec![0xAA; 1024]),
                                             (1, true, vec![0xBB; 1024]),
                                             (2, false, vec![0xCC; 452])];

    let mut events = Vec::new();
    for (num, more, payload) in blocks {
      let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9200 + num as u16));
      note.token = h.core.token();
      note.set_observe(num);
      note.set_block2(Block::new(1024, num, more));
      note.payload.0 = payload;
      events.extend(h.inject(note, server));
    }

    assert!(events.contains(&Event::FileReceived { path: "from_server.txt" }));

    let received = h.fs.contents("from_server.txt").unwrap();
    assert_eq!(received.len(), 2500);
    assert_eq!(received[0], 0xAA);
    assert_eq!(received[1024], 0xBB);
    assert_eq!(received[2048], 0xCC);

    // every block was ACKed with the Block2 option echoed
    let acked_nums = h.sent()
                      .iter()
                      .filter(|m| m.data().ty == Type::Ack)
                      .filter_map(|m| m.data().block2().map(|b| b.num()))
                      .collect::<Vec<_>>();
    assert_eq!(acked_nums, [0, 1, 2]);
  }

  #[test]
  fn client_drops_gap_blocks_without_ack() {
    let mut h = harness();
    let server = dummy_addr_2();

    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9300));
    note.token = h.core.token();
    note.set_block2(Block::new(1024, 0, true));
    note.payload.0 = vec![1; 1024];
    h.inject(note, server);
    h.take_sent();

    // block 2 arrives early
    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9302));
    note.token = h.core.token();
    note.set_block2(Block::new(1024, 2, true));
    note.payload.0 = vec![3; 1024];
    h.inject(note, server);

    assert!(h.sent().is_empty());
  }

  #[test]
  fn image_push_lands_in_image_file() {
    let mut h = harness();
    let server = dummy_addr_2();

    let mut note = Message::new(Type::Con, resp::CONTENT, Id(0x9400));
    note.token = h.core.token();
    note.set_content_format(content_format::IMAGE_JPEG);
    note.set_block2(Block::new(1024, 0, false));
    note.payload.0 = vec![0xD8; 64];
    let events = h.inject(note, server);

    assert!(events.contains(&Event::FileReceived { path: "from_server.jpg" }));
    assert_eq!(h.fs.contents("from_server.jpg").unwrap(), vec![0xD8; 64]);
  }

  #[test]
  fn client_fetch_saves_response_body() {
    let mut h = harness();
    let server = dummy_addr_2();

    let id = h.core.fetch_lines(server, FetchRange::Lines(5)).unwrap();

    let sent = h.take_sent();
    assert_eq!(sent[0].data().code, Code::FETCH);
    assert_eq!(sent[0].data().content_format(), Some(content_format::TEXT));
    assert_eq!(sent[0].data().payload(), b"5");

    let mut resp = Message::new(Type::Ack, resp::CONTENT, id);
    resp.token = h.core.token();
    resp.payload.0 = b"line 0\nline 1\n".to_vec();
    let events = h.inject(resp, server);

    assert!(events.contains(&Event::FetchSaved { path: "from_server_fetch.txt" }));
    assert_eq!(h.fs.contents("from_server_fetch.txt").unwrap(),
               b"line 0\nline 1\n");
  }

  #[test]
  fn client_driven_file_download_requests_next_block() {
    let mut h = harness();
    let server = dummy_addr_2();

    let id = h.core.request_file(server, FileKind::Text).unwrap();

    let sent = h.take_sent();
    assert_eq!(sent[0].data().code, Code::GET);
    assert_eq!(sent[0].data().block2(), None);

    // piggy-backed block 0 with more set
    let mut resp = Message::new(Type::Ack, resp::CONTENT, id);
    resp.token = h.core.token();
    resp.set_content_format(content_format::TEXT);
    resp.set_block2(Block::new(1024, 0, true));
    resp.payload.0 = vec![5; 1024];
    h.inject(resp, server);

    // the endpoint asks for block 1 on its own
    let sent = h.take_sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].data().code, Code::GET);
    assert_eq!(sent[0].data().block2().map(|b| b.num()), Some(1));

    let mut resp = Message::new(Type::Ack, resp::CONTENT, sent[0].data().id);
    resp.token = h.core.token();
    resp.set_block2(Block::new(1024, 1, false));
    resp.payload.0 = vec![6; 100];
    let events = h.inject(resp, server);

    assert!(events.contains(&Event::FileReceived { path: "from_server.txt" }));
    assert_eq!(h.fs.contents("from_server.txt").unwrap().len(), 1124);
  }

  #[test]
  fn unclaimed_piggy_response_surfaces_as_event() {
    let mut h = harness();
    let server = dummy_addr_2();

    let id = h.core.get_actuators(server).unwrap();
    h.take_sent();

    let mut resp = Message::new(Type::Ack, resp::CONTENT, id);
    resp.token = h.core.token();
    resp.payload.0 = b"LED=OFF,BUZZER=OFF".to_vec();
    let events = h.inject(resp, server);

    assert_eq!(events,
               [Event::Response { code: resp::CONTENT,
                                  payload: b"LED=OFF,BUZZER=OFF".to_vec() }]);
  }

  #[test]
  fn ack_refreshes_subscriber_liveness() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    h.core.notify_byte("buttons", 7).unwrap();
    let note = h.take_sent();

    // silence would strike the subscriber; an ACK resets the window
    h.clock.advance(1000);
    h.inject(note[0].data().ack(), dummy_addr());

    assert_eq!(h.core.subscriber_count(), 1);
  }

  #[test]
  fn reset_drops_subscriber() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    h.inject(Message::new(Type::Reset, Code::EMPTY, Id(0x0001)), dummy_addr());
    assert_eq!(h.core.subscriber_count(), 0);
  }

  #[test]
  fn prune_runs_on_cadence() {
    let mut h = harness();
    h.register_subscriber(dummy_addr(), &[0xA1]);

    // three silent 3-hour windows, pruned at the 5s cadence
    for hours in 1..=4u64 {
      h.clock.set(hours * (3 * 60 * 60 * 1000 + 10_000));
      h.drain();
    }

    assert_eq!(h.core.subscriber_count(), 0);
  }
}
