//! The message set and transport-facing trait the chain manager and miner
//! speak against. Concrete transports (an in-process fake for tests, a real
//! TCP implementation) live in the node binary and implement this trait.

/// A new transaction is being announced to the network.
pub const POST_TRANSACTION: &str = "POST_TRANSACTION";
/// A newly mined block is being announced.
pub const PROOF_FOUND: &str = "PROOF_FOUND";
/// A peer is asking for a block it doesn't have.
pub const MISSING_BLOCK: &str = "MISSING_BLOCK";
/// Told to (re)start the mining search.
pub const START_MINING: &str = "START_MINING";
/// A peer is announcing itself for the first time.
pub const REGISTER: &str = "REGISTER";

/// A message envelope as exchanged between nodes: a tag naming which of the
/// constants above this is, plus an opaque, already-serialized payload.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Envelope {
    pub msg: String,
    pub data: Vec<u8>,
}

impl Envelope {
    #[must_use]
    pub const fn new(msg: String, data: Vec<u8>) -> Self {
        Self { msg, data }
    }
}

/// Transport abstraction the chain manager and miner broadcast and unicast
/// through. Implementations are expected to be cheap to clone (an `Arc`
/// internally) since every node handle holds one.
pub trait Network: Send + Sync {
    /// Sends `data` tagged `msg` to every peer this node knows about.
    fn broadcast(&self, msg: &str, data: Vec<u8>);

    /// Sends `data` tagged `msg` to exactly one peer, by address.
    fn send_message(&self, address: &str, msg: &str, data: Vec<u8>);

    /// Registers this node's own address/connection info with the network.
    fn register(&self, address: &str, connection: &str);
}

/// The receiving half of the transport: anything a [`Network`] implementation
/// can hand an inbound envelope to. A node registers one of these with every
/// transport it uses so `POST_TRANSACTION`/`PROOF_FOUND`/`MISSING_BLOCK`
/// envelopes reach its chain manager and miner.
pub trait MessageSink: Send + Sync {
    fn deliver(&self, msg: &str, data: Vec<u8>);
}
