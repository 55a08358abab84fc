use clap::{Args, Parser, Subcommand};
use node_core::block::Block;
use node_core::blockchain::Chain;
use node_core::mining::Miner;
use node_core::transaction::Output;
use node_core::MessageSink;
use shared::types::NodeConfig;
use shared::{KeyPair, Target256};
use std::io::{self, BufRead, Write as _};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::info;

mod config;
mod network;
mod node;

use config::NodeState;
use network::{FakeNet, TcpNet};
use node::Node;

#[derive(Parser)]
#[command(name = "pow-node")]
#[command(about = "A peer-to-peer proof-of-work account-model node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a short, single-process demonstration over an in-memory network.
    Demo,
    /// Start a real TCP node and open the interactive operator menu.
    StartNode(StartNodeArgs),
}

#[derive(Args)]
struct StartNodeArgs {
    /// Display name for this node.
    #[arg(long, default_value = "node")]
    name: String,

    /// Address to listen on for peer connections.
    #[arg(long, default_value = "127.0.0.1:9000")]
    listen: String,

    /// Connection strings of peers to register with on startup.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Path to this node's persisted state file.
    #[arg(long, default_value = "node.json")]
    state_file: String,

    /// Maximum nonce values tried per mining burst.
    #[arg(long, default_value_t = 2000)]
    mining_rounds: u32,

    /// Coinbase reward credited to this node when it mines a block.
    #[arg(long, default_value_t = 25)]
    coinbase_amount: u32,
}

fn main() -> shared::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Demo) | None => run_demo(),
        Some(Commands::StartNode(args)) => start_node(&args),
    }
}

/// Builds a devnet genesis block funding every given address equally.
fn make_genesis(addresses: &[&str], amount: u32, difficulty_bits: u32) -> Block {
    let mut genesis = Block::new(String::new(), None, Target256::with_leading_zero_bits(difficulty_bits), 0);
    for address in addresses {
        genesis.balances.insert((*address).to_string(), amount);
    }
    genesis
}

fn run_demo() -> shared::Result<()> {
    info!("🔗 running a short proof-of-work node demonstration");

    let net = FakeNet::new();
    let config = NodeConfig::default();

    let alice_keys = KeyPair::generate()?;
    let bob_keys = KeyPair::generate()?;
    let alice_addr = alice_keys.public_key.address()?;
    let bob_addr = bob_keys.public_key.address()?;

    let genesis = make_genesis(&[&alice_addr, &bob_addr], 1_000, config.genesis_difficulty_bits);

    let alice = spawn_node(&net, alice_keys, genesis.clone(), &config)?;
    let bob = spawn_node(&net, bob_keys, genesis, &config)?;

    net.register_sink(&alice_addr, Arc::new(alice.clone()));
    net.register_sink(&bob_addr, Arc::new(bob.clone()));

    info!(%alice_addr, %bob_addr, "👥 two accounts funded with 1000 coins each");

    {
        let mut chain = alice.chain.lock().expect("chain lock poisoned");
        chain.post_transaction(vec![Output::new(bob_addr.clone(), 150)], 1)?;
    }
    thread::sleep(Duration::from_millis(50));

    for node in [&alice, &bob] {
        for _ in 0..5 {
            if node.miner.run_burst(&net) {
                break;
            }
        }
    }
    thread::sleep(Duration::from_millis(50));

    for (name, node) in [("alice", &alice), ("bob", &bob)] {
        let chain = node.chain.lock().expect("chain lock poisoned");
        info!(name, tip_length = chain.tip().chain_length, "⛓️ node tip");
        for (address, balance) in chain.show_all_balances() {
            info!(%address, balance, "💰 confirmed balance");
        }
    }

    Ok(())
}

fn spawn_node(
    net: &FakeNet,
    keypair: KeyPair,
    genesis: Block,
    config: &NodeConfig,
) -> shared::Result<Node> {
    let chain = Arc::new(Mutex::new(Chain::new(
        keypair.clone(),
        Arc::new(net.clone()),
        config.clone(),
        genesis,
    )));
    let miner = Arc::new(Miner::new(
        chain.clone(),
        &keypair,
        config.mining_rounds,
        config.coinbase_amount,
    )?);
    Ok(Node::new(chain, miner))
}

fn start_node(args: &StartNodeArgs) -> shared::Result<()> {
    let state = match NodeState::load(&args.state_file) {
        Ok(state) => {
            info!(path = %args.state_file, "📂 loaded existing node state");
            state
        }
        Err(_) => {
            info!(path = %args.state_file, "🆕 no existing state found, generating a new identity");
            let keypair = KeyPair::generate()?;
            let state = NodeState::new(args.name.clone(), args.listen.clone(), keypair);
            state.save(&args.state_file)?;
            state
        }
    };

    let address = state.keypair.public_key.address()?;
    info!(%address, connection = %args.listen, "🚀 starting node");

    let mut config = NodeConfig::default();
    config.listen_address = args.listen.clone();
    config.mining_rounds = args.mining_rounds;
    config.coinbase_amount = args.coinbase_amount;

    let genesis = make_genesis(&[&address], 0, config.genesis_difficulty_bits);

    let tcp_net = Arc::new(TcpNet::new());
    // A bare `--peer` connection string is dialed and registered under
    // itself until the peer's REGISTER handshake reports its real address.
    for peer in &args.peers {
        tcp_net.register(peer, peer);
    }
    for peer in &state.known_peers {
        tcp_net.register(&peer.address, &peer.connection);
    }

    let chain = Arc::new(Mutex::new(Chain::new(
        state.keypair.clone(),
        tcp_net.clone(),
        config.clone(),
        genesis,
    )));

    let miner = Arc::new(Miner::new(
        chain.clone(),
        &state.keypair,
        config.mining_rounds,
        config.coinbase_amount,
    )?);
    let node = Node::new(chain.clone(), miner.clone());

    {
        let listen_address = args.listen.clone();
        let net = tcp_net.clone();
        let sink: Arc<dyn MessageSink> = Arc::new(node.clone());
        thread::spawn(move || TcpNet::listen(&listen_address, net, sink));
    }

    {
        let node = node.clone();
        let tcp_net = tcp_net.clone();
        thread::spawn(move || loop {
            node.miner.run_burst(tcp_net.as_ref());
            thread::sleep(Duration::from_millis(10));
        });
    }

    run_operator_menu(&node, &state, &args.state_file)
}

fn run_operator_menu(node: &Node, state: &NodeState, state_file: &str) -> shared::Result<()> {
    let stdin = io::stdin();
    loop {
        print!(
            "\n[t]ransaction  [r]esend pending  [b]alances  [c]hain  [s]ave  [q]uit\n> "
        );
        io::stdout().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match line.trim() {
            "t" => {
                print!("to address: ");
                io::stdout().flush().ok();
                let mut to = String::new();
                stdin.lock().read_line(&mut to)?;
                print!("amount: ");
                io::stdout().flush().ok();
                let mut amount = String::new();
                stdin.lock().read_line(&mut amount)?;

                let Ok(amount) = amount.trim().parse::<u32>() else {
                    println!("invalid amount");
                    continue;
                };
                let mut chain = node.chain.lock().expect("chain lock poisoned");
                match chain.post_transaction(vec![Output::new(to.trim().to_string(), amount)], 1) {
                    Ok(tx) => println!("posted transaction {}", tx.id()?),
                    Err(err) => println!("rejected: {err}"),
                }
            }
            "r" => {
                node.chain.lock().expect("chain lock poisoned").resend_pending_transactions();
                println!("resent pending transactions");
            }
            "b" => {
                let chain = node.chain.lock().expect("chain lock poisoned");
                for (address, balance) in chain.show_all_balances() {
                    println!("{address}\t{balance}");
                }
            }
            "c" => {
                let chain = node.chain.lock().expect("chain lock poisoned");
                let mut cursor = Some(chain.tip_hash());
                println!("BLOCKCHAIN:");
                while let Some(hash) = cursor {
                    println!("{hash}");
                    cursor = chain.get_block(&hash).and_then(|b| b.prev_hash);
                }
            }
            "s" => {
                state.save(state_file)?;
                println!("state saved to {state_file}");
            }
            "q" => break,
            other => println!("unrecognized command: {other}"),
        }
    }
    Ok(())
}
