//! Handlers for the three resources the endpoint serves: `/buttons`
//! (observable), `/actuators` (GET/PUT) and `/file` (GET block-wise,
//! iPATCH append, FETCH line ranges).

use embedded_time::Instant;
use skink_msg::known::{content_format, observe::Action};
use skink_msg::{Block, Message};

use super::{piggy, piggy_text, Core, Event};
use crate::fs::{File, FileSystem};
use crate::net::{Addrd, Socket};
use crate::resp;
use crate::time::Clock;

/// FETCH responses are capped at one block's worth of text.
const FETCH_BUFFER: usize = 1024;

/// Plain data behind `/buttons` and `/actuators`; the hosting
/// environment feeds button edges in and mirrors actuator state out to
/// whatever hardware it has.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Resources {
  /// LED state, set by PUT `/actuators`
  pub led: bool,
  /// Buzzer state, set by PUT `/actuators`
  pub buzzer: bool,
  /// Pressed-state of the three buttons reported by GET `/buttons`
  pub buttons: [bool; 3],
}

impl Resources {
  fn buttons_payload(&self) -> String {
    format!("BTN1={}, BTN2={}, BTN3={}",
            self.buttons[0] as u8,
            self.buttons[1] as u8,
            self.buttons[2] as u8)
  }

  fn actuators_payload(&self) -> String {
    let on_off = |b| if b { "ON" } else { "OFF" };
    format!("LED={},BUZZER={}", on_off(self.led), on_off(self.buzzer))
  }
}

impl<S: Socket, C: Clock, F: FileSystem> Core<S, C, F> {
  /// GET `/buttons`: plain reads answer with the current button
  /// states; Observe=0 registers the caller for notifications,
  /// Observe=1 drops the registration.
  pub(super) fn handle_get_buttons(&mut self,
                                   req: &Addrd<Message>,
                                   now: Instant<C>)
                                   -> Message {
    match req.data().observe_action() {
      | Some(Action::Register) => {
        log::info!("observe registration from {}", req.addr());

        match self.subscribers.register(req.addr(), req.data().token, now) {
          | Ok(sub) => {
            let seq = sub.seq();
            let mut resp = piggy(req.data(), resp::CONTENT);
            resp.set_observe(seq);
            resp
          },
          | Err(_) => piggy(req.data(), resp::BAD_REQUEST),
        }
      },
      | Some(Action::Deregister) => {
        self.subscribers.deregister(req.addr(), req.data().token);
        piggy_text(req.data(),
                   resp::CONTENT,
                   &self.resources.buttons_payload())
      },
      | None => piggy_text(req.data(),
                           resp::CONTENT,
                           &self.resources.buttons_payload()),
    }
  }

  /// GET `/actuators`
  pub(super) fn handle_get_actuators(&mut self,
                                     req: &Addrd<Message>,
                                     _: Instant<C>)
                                     -> Message {
    piggy_text(req.data(),
               resp::CONTENT,
               &self.resources.actuators_payload())
  }

  /// PUT `/actuators`: the payload is a text list of directives;
  /// every directive present is applied.
  pub(super) fn handle_put_actuators(&mut self,
                                     req: &Addrd<Message>,
                                     _: Instant<C>)
                                     -> Message {
    let payload = req.data().payload();

    if payload.is_empty() {
      return piggy_text(req.data(), resp::BAD_REQUEST, "Empty payload");
    }

    let text = String::from_utf8_lossy(payload);

    if text.contains("LED=ON") {
      self.resources.led = true;
    } else if text.contains("LED=OFF") {
      self.resources.led = false;
    }

    if text.contains("BUZZER=ON") {
      self.resources.buzzer = true;
    } else if text.contains("BUZZER=OFF") {
      self.resources.buzzer = false;
    }

    self.events.push_back(Event::ActuatorsChanged { led: self.resources.led,
                                                    buzzer: self.resources.buzzer });

    piggy_text(req.data(), resp::CHANGED, "OK")
  }

  /// GET `/file`: one Block2 block per request. The request may name
  /// a block explicitly or default to block 0; `?type=image` selects
  /// the image file.
  pub(super) fn handle_get_file(&mut self, req: &Addrd<Message>, _: Instant<C>) -> Message {
    let is_image = req.data().queries().any(|q| q == b"type=image");
    let name = if is_image {
      self.config.files.image
    } else {
      self.config.files.text
    };

    let requested = req.data().block2();
    let num = requested.map(|b| b.num()).unwrap_or(0);
    let block_size = requested.map(|b| b.size())
                              .unwrap_or(1024)
                              .min(self.config.block_size);

    let mut file = match self.fs.open_read(name) {
      | Ok(f) => f,
      | Err(e) => {
        log::warn!("failed to open {}: {:?}", name, e);
        return piggy(req.data(), resp::NOT_FOUND);
      },
    };

    let read_block = |file: &mut F::File| -> Result<(Vec<u8>, u64), F::Error> {
      let total = file.size()?;
      file.seek(num as u64 * block_size as u64)?;

      let mut buf = vec![0u8; block_size as usize];
      let mut filled = 0;
      loop {
        let n = file.read(&mut buf[filled..])?;
        filled += n;
        if n == 0 || filled == buf.len() {
          break;
        }
      }
      buf.truncate(filled);
      Ok((buf, total))
    };

    let (bytes, total) = match read_block(&mut file) {
      | Ok(r) => r,
      | Err(e) => {
        log::warn!("read error on {}: {:?}", name, e);
        return piggy(req.data(), resp::SERVICE_UNAVAILABLE);
      },
    };

    let more = (num as u64 + 1) * (block_size as u64) < total;

    let mut resp = piggy(req.data(), resp::CONTENT);
    resp.set_block2(Block::new(block_size, num, more));
    if num == 0 {
      resp.set_content_format(if is_image {
                                content_format::IMAGE_JPEG
                              } else {
                                content_format::TEXT
                              });
    }
    resp.payload.0 = bytes;
    resp
  }

  /// iPATCH `/file`: append the payload plus a newline to the text
  /// file.
  pub(super) fn handle_ipatch_file(&mut self, req: &Addrd<Message>, _: Instant<C>) -> Message {
    let payload = req.data().payload();

    if payload.is_empty() {
      return piggy_text(req.data(), resp::BAD_REQUEST, "Empty payload");
    }

    let name = self.config.files.text;
    let mut file = match self.fs.open_append(name) {
      | Ok(f) => f,
      | Err(e) => {
        log::warn!("failed to open {} for append: {:?}", name, e);
        return piggy(req.data(), resp::SERVICE_UNAVAILABLE);
      },
    };

    match file.write(payload).and_then(|()| file.write(b"\n")) {
      | Ok(()) => {
        log::info!("appended {} bytes to {}", payload.len(), name);
        piggy_text(req.data(), resp::CHANGED, "Appended")
      },
      | Err(e) => {
        log::warn!("failed to write to {}: {:?}", name, e);
        piggy(req.data(), resp::SERVICE_UNAVAILABLE)
      },
    }
  }

  /// FETCH `/file`: the payload names an inclusive zero-based line
  /// range (`"start,end"`) or a count (`"N"`, the first N lines).
  pub(super) fn handle_fetch_file(&mut self, req: &Addrd<Message>, _: Instant<C>) -> Message {
    match req.data().content_format() {
      | None => return piggy_text(req.data(), resp::BAD_REQUEST, "Content-Format required"),
      | Some(content_format::TEXT) => (),
      | Some(_) => return piggy(req.data(), resp::UNSUPPORTED_CONTENT_FORMAT),
    }

    let payload = req.data().payload();
    if payload.is_empty() {
      return piggy_text(req.data(), resp::BAD_REQUEST, "Range required");
    }

    let (start, end) = match core::str::from_utf8(payload).map_err(|_| "Invalid range")
                                                          .and_then(parse_fetch_range)
    {
      | Ok(range) => range,
      | Err(diag) => return piggy_text(req.data(), resp::BAD_REQUEST, diag),
    };

    let name = self.config.files.text;
    let mut file = match self.fs.open_read(name) {
      | Ok(f) => f,
      | Err(e) => {
        log::warn!("failed to open {}: {:?}", name, e);
        return piggy(req.data(), resp::NOT_FOUND);
      },
    };

    match read_line_range(&mut file, start, end) {
      | Ok(body) => {
        log::info!("fetched lines {}..={} ({} bytes)", start, end, body.len());
        let mut resp = piggy(req.data(), resp::CONTENT);
        resp.set_content_format(content_format::TEXT);
        resp.payload.0 = body;
        resp
      },
      | Err(e) => {
        log::warn!("read error on {}: {:?}", name, e);
        piggy(req.data(), resp::SERVICE_UNAVAILABLE)
      },
    }
  }
}

/// Parse a FETCH range payload: `"start,end"` (inclusive, zero-based)
/// or `"N"` (shorthand for `"0,N-1"`).
fn parse_fetch_range(s: &str) -> Result<(u32, u32), &'static str> {
  match s.trim().split_once(',') {
    | Some((start, end)) => {
      let start = start.trim().parse().map_err(|_| "Invalid range")?;
      let end = end.trim().parse().map_err(|_| "Invalid range")?;

      if end < start {
        return Err("Invalid range");
      }

      Ok((start, end))
    },
    | None => {
      let n: u32 = s.trim().parse().map_err(|_| "Invalid range")?;

      if n == 0 {
        return Err("Invalid range");
      }

      Ok((0, n - 1))
    },
  }
}

/// Concatenate lines `start..=end` (newlines included), stopping early
/// when the next whole line would overflow [`FETCH_BUFFER`].
///
/// `start` past the last line yields an empty body.
fn read_line_range<F: File>(file: &mut F, start: u32, end: u32) -> Result<Vec<u8>, F::Error> {
  let mut out = Vec::new();
  let mut line = Vec::new();
  let mut line_ix = 0u32;
  let mut buf = [0u8; 256];

  'scan: loop {
    let n = file.read(&mut buf)?;

    if n == 0 {
      // a trailing line without a newline still counts
      if !line.is_empty()
         && line_ix >= start
         && line_ix <= end
         && out.len() + line.len() <= FETCH_BUFFER
      {
        out.extend_from_slice(&line);
      }
      break;
    }

    for &b in &buf[..n] {
      line.push(b);

      if b == b'\n' {
        if line_ix >= start && line_ix <= end {
          if out.len() + line.len() > FETCH_BUFFER {
            log::warn!("fetch buffer full at line {}, truncating", line_ix);
            break 'scan;
          }
          out.extend_from_slice(&line);
        }

        line.clear();
        line_ix += 1;

        if line_ix > end {
          break 'scan;
        }
      }
    }
  }

  Ok(out)
}
