//! Two endpoints talking over localhost UDP: one plays the server role
//! (observable buttons, actuators, a served file), the other subscribes
//! and issues requests. Both are polled from a single thread.
//!
//! ```sh
//! cargo run --example endpoint
//! ```

use std::fs;
use std::net::UdpSocket;

use skink::config::Config;
use skink::core::{Core, Event, FetchRange, FileKind};
use skink::std::{bind_udp, Clock, DirFs};

type Endpoint = Core<UdpSocket, Clock, DirFs>;

fn endpoint(addr: &str, dir: &str, seed: u64) -> Endpoint {
  fs::create_dir_all(dir).unwrap();
  let config = Config { token_seed: seed,
                        ..Config::default() };
  Core::new(config, bind_udp(addr).unwrap(), Clock::new(), DirFs::new(dir)).unwrap()
}

/// Poll both endpoints until `want` shows up on one of them.
fn pump_until(server: &mut Endpoint, client: &mut Endpoint, want: fn(&Event) -> bool) -> Event {
  loop {
    for core in [&mut *server, &mut *client] {
      if let Some(event) = core.poll().unwrap() {
        log::info!("event: {:?}", event);
        if want(&event) {
          return event;
        }
      }
    }
  }
}

pub fn main() {
  std::env::set_var("RUST_LOG", "info,skink=debug");
  simple_logger::init_with_env().unwrap();

  let server_addr = "127.0.0.1:18683";
  let server_dir = std::env::temp_dir().join("skink-demo-server");
  let client_dir = std::env::temp_dir().join("skink-demo-client");

  fs::create_dir_all(&server_dir).unwrap();
  fs::write(server_dir.join("server.txt"),
            (0..20).map(|n| format!("line {}\n", n)).collect::<String>()).unwrap();

  let mut server = endpoint(server_addr, server_dir.to_str().unwrap(), 1);
  let mut client = endpoint("127.0.0.1:28683", client_dir.to_str().unwrap(), 2);

  log::info!("[1] client subscribes to /buttons");
  client.subscribe_buttons(server_addr.parse().unwrap()).unwrap();
  while server.subscriber_count() == 0 {
    server.poll().unwrap();
    client.poll().unwrap();
  }

  log::info!("[2] a button is pressed on the server");
  server.set_button(0, true);
  server.notify_byte("buttons", 0x42).unwrap();
  pump_until(&mut server, &mut client, |e| {
    matches!(e, Event::NotificationByte(0x42))
  });

  log::info!("[3] client switches the LED on");
  client.put_actuators(server_addr.parse().unwrap(), "LED=ON,BUZZER=OFF")
        .unwrap();
  pump_until(&mut server, &mut client, |e| {
    matches!(e, Event::ActuatorsChanged { led: true, .. })
  });

  log::info!("[4] client appends a line, then fetches the tail back");
  client.append_line(server_addr.parse().unwrap(), "hello from the client")
        .unwrap();
  client.fetch_lines(server_addr.parse().unwrap(), FetchRange::Span(18, 20))
        .unwrap();
  pump_until(&mut server, &mut client, |e| {
    matches!(e, Event::FetchSaved { .. })
  });

  log::info!("[5] server pushes the whole file to its subscriber");
  server.push_file(FileKind::Text).unwrap();
  pump_until(&mut server, &mut client, |e| {
    matches!(e, Event::FileReceived { .. })
  });

  log::info!("[6] done; received file at {:?}",
             client_dir.join("from_server.txt"));
}
