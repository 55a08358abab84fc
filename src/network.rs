//! Two transports implementing `node_core::Network`: an in-process
//! `FakeNet` for tests and single-binary demos, and `TcpNet`, a real
//! connect-per-message TCP transport. Both dispatch inbound envelopes to
//! whatever [`MessageSink`] was registered under the destination address.

use node_core::{Envelope, MessageSink, REGISTER};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, warn};

/// An in-process network: registered peers are invoked directly (on a
/// spawned thread, so a peer reacting to a message by broadcasting again
/// doesn't deadlock the caller). Used by tests and the single-process demo.
#[derive(Default, Clone)]
pub struct FakeNet {
    peers: Arc<Mutex<HashMap<String, Arc<dyn MessageSink>>>>,
}

impl FakeNet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sink(&self, address: &str, sink: Arc<dyn MessageSink>) {
        self.peers
            .lock()
            .expect("peers lock poisoned")
            .insert(address.to_string(), sink);
    }
}

impl node_core::Network for FakeNet {
    fn broadcast(&self, msg: &str, data: Vec<u8>) {
        let peers = self.peers.lock().expect("peers lock poisoned");
        for sink in peers.values() {
            let sink = sink.clone();
            let msg = msg.to_string();
            let data = data.clone();
            thread::spawn(move || sink.deliver(&msg, data));
        }
    }

    fn send_message(&self, address: &str, msg: &str, data: Vec<u8>) {
        let peers = self.peers.lock().expect("peers lock poisoned");
        if let Some(sink) = peers.get(address).cloned() {
            let msg = msg.to_string();
            thread::spawn(move || sink.deliver(&msg, data));
        }
    }

    fn register(&self, _address: &str, _connection: &str) {
        // Sinks are registered directly via `register_sink`; FakeNet has no
        // separate connection string to track.
    }
}

/// A real TCP transport: one connection per outgoing message, framed as a
/// JSON envelope read back in 512-byte chunks, grounded in the node's
/// original connect-per-message network layer.
pub struct TcpNet {
    peers: Mutex<HashMap<String, String>>,
}

impl Default for TcpNet {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpNet {
    #[must_use]
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
        }
    }

    fn send(&self, connection: &str, envelope: &Envelope) {
        let Ok(bytes) = serde_json::to_vec(envelope) else {
            return;
        };
        match TcpStream::connect(connection) {
            Ok(mut stream) => {
                if let Err(err) = stream.write_all(&bytes) {
                    warn!(%err, connection, "failed to send envelope");
                }
            }
            Err(err) => warn!(%err, connection, "failed to connect to peer"),
        }
    }

    /// Listens forever on `listen_address`, dispatching every received
    /// envelope to `sink`. Intended to be run on its own thread.
    pub fn listen(listen_address: &str, net: Arc<Self>, sink: Arc<dyn MessageSink>) {
        let listener = match TcpListener::bind(listen_address) {
            Ok(listener) => listener,
            Err(err) => {
                warn!(%err, listen_address, "failed to bind listener");
                return;
            }
        };

        for stream in listener.incoming() {
            let Ok(mut stream) = stream else { continue };
            let net = net.clone();
            let sink = sink.clone();
            thread::spawn(move || {
                let mut data = Vec::new();
                let mut chunk = [0u8; 512];
                loop {
                    match stream.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(n) => {
                            data.extend_from_slice(&chunk[..n]);
                            if n < chunk.len() {
                                break;
                            }
                        }
                        Err(err) => {
                            warn!(%err, "failed to read from peer connection");
                            return;
                        }
                    }
                }

                let Ok(envelope) = serde_json::from_slice::<Envelope>(&data) else {
                    warn!("received malformed envelope");
                    return;
                };

                if envelope.msg == REGISTER {
                    if let Ok(info) =
                        serde_json::from_slice::<shared::types::PeerInfo>(&envelope.data)
                    {
                        debug!(address = %info.address, connection = %info.connection, "registering peer");
                        net.peers
                            .lock()
                            .expect("peers lock poisoned")
                            .insert(info.address, info.connection);
                    }
                    return;
                }

                sink.deliver(&envelope.msg, envelope.data);
            });
        }
    }
}

impl node_core::Network for TcpNet {
    fn broadcast(&self, msg: &str, data: Vec<u8>) {
        let envelope = Envelope::new(msg.to_string(), data);
        let peers = self.peers.lock().expect("peers lock poisoned");
        for connection in peers.values() {
            self.send(connection, &envelope);
        }
    }

    fn send_message(&self, address: &str, msg: &str, data: Vec<u8>) {
        let envelope = Envelope::new(msg.to_string(), data);
        let connection = self
            .peers
            .lock()
            .expect("peers lock poisoned")
            .get(address)
            .cloned();
        if let Some(connection) = connection {
            self.send(&connection, &envelope);
        } else {
            warn!(address, "send_message: address not registered");
        }
    }

    fn register(&self, address: &str, connection: &str) {
        self.peers
            .lock()
            .expect("peers lock poisoned")
            .insert(address.to_string(), connection.to_string());
    }
}
