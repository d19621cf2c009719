//! Per-socket read/write loop.
//!
//! Each accepted socket gets its own thread. After the handshake the stream
//! goes non-blocking; the loop drains the outbound queue, reads whatever
//! arrived, and sleeps briefly when neither side had work.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{Receiver, TryRecvError, unbounded};
use tungstenite::protocol::Message;
use tungstenite::{Error as WsError, WebSocket};

use super::registry::ClientRegistry;
use crate::core::is_shutdown;

const IDLE_SLEEP: Duration = Duration::from_millis(10);

/// Complete the handshake on `stream` and serve the socket on a new thread.
pub fn spawn_session(stream: TcpStream, registry: Arc<ClientRegistry>) {
    std::thread::spawn(move || {
        // Blocking during the handshake, non-blocking for polling afterwards
        let ws = match tungstenite::accept(stream) {
            Ok(ws) => ws,
            Err(e) => {
                crate::log!("ws"; "handshake failed: {}", e);
                return;
            }
        };
        if let Err(e) = ws.get_ref().set_nonblocking(true) {
            crate::log!("ws"; "failed to configure socket: {}", e);
            return;
        }

        let (tx, rx) = unbounded();
        let id = registry.register(tx);
        run(ws, &rx, |text| registry.handle_inbound(id, text));
        registry.disconnect(id);
    });
}

/// Pump frames until the socket closes, the queue is dropped, or shutdown.
fn run(mut ws: WebSocket<TcpStream>, outbound: &Receiver<String>, mut inbound: impl FnMut(&str)) {
    loop {
        if is_shutdown() {
            let _ = ws.close(None);
            let _ = ws.flush();
            return;
        }

        let mut busy = false;

        loop {
            match outbound.try_recv() {
                Ok(text) => {
                    busy = true;
                    match ws.write(Message::text(text)) {
                        Ok(()) => {}
                        Err(WsError::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
                        Err(e) => {
                            crate::debug!("ws"; "write failed: {}", e);
                            return;
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }

        match ws.flush() {
            Ok(()) => {}
            Err(WsError::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
            Err(_) => return,
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                busy = true;
                inbound(text.as_str());
            }
            Ok(Message::Close(_)) => return,
            Ok(_) => busy = true,
            Err(WsError::Io(ref e)) if e.kind() == ErrorKind::WouldBlock => {}
            Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return,
            Err(e) => {
                crate::debug!("ws"; "read failed: {}", e);
                return;
            }
        }

        if !busy {
            std::thread::sleep(IDLE_SLEEP);
        }
    }
}
