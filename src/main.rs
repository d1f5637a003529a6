// The node entry point: parse flags, bring up the network, the shared state,
// the miner, and the operator console, then tear everything down when the
// operator quits.

use clap::Parser;
use ferrocoin::cli::console;
use ferrocoin::{mine_for_gold, NodeState, Opt, PeerNetwork};
use log::{error, LevelFilter};
use std::process;
use std::sync::{mpsc, Arc};
use std::thread;

fn main() {
    let opt = Opt::parse();

    let level = if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::builder().filter_level(level).init();

    // A panic anywhere (a corrupt key set is the one expected source) must
    // take the whole node down with a non-zero exit, not strand the other
    // threads behind a poisoned lock.
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        default_hook(info);
        process::exit(1);
    }));

    if let Err(e) = run(opt) {
        error!("Error: {e}");
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(opt: Opt) -> Result<(), Box<dyn std::error::Error>> {
    let (network, events) = PeerNetwork::new(&opt.listen, opt.connect.as_deref())?;
    let state = Arc::new(NodeState::new());

    let dispatcher = network.start(events, state.clone());

    // bootstrap the primary chain from a random peer
    if network.has_peers() {
        network.request_blockchain(None);
    }

    let (quit_sender, quit_receiver) = mpsc::channel();
    let miner = {
        let state = Arc::clone(&state);
        let network = Arc::clone(&network);
        thread::spawn(move || mine_for_gold(state, network, quit_receiver))
    };

    println!("Startup complete, listening on {}", network.local_addr());

    console::run(&state, &network);

    let _ = quit_sender.send(());
    let _ = miner.join();

    network.close();
    let _ = dispatcher.join();

    Ok(())
}
