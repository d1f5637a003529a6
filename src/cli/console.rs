// The interactive operator console: a line-oriented loop on stdin. A reader
// thread feeds lines into a channel so that multi-step commands (pay) can
// consume follow-up input from the same stream.

use crate::core::{BlockChain, Transaction, TxnOutput, MINING_REWARD};
use crate::network::PeerNetwork;
use crate::state::NodeState;
use crate::wallet::Keypair;
use data_encoding::HEXLOWER;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

// How long `pay` waits for the payee to answer with a key
const PAY_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

pub fn run(state: &NodeState, network: &PeerNetwork) {
    println!("Welcome to Ferrocoin");
    println!();
    print_help();

    let input = spawn_input_reader();

    print_prompt();
    while let Ok(line) = input.recv() {
        match line.trim() {
            "" => {}
            "state" => print_state(state),
            "wallet" => print_wallet(state),
            "cons" => consolidate_wallet(state, network),
            "pay" => do_pay(state, network, &input),
            "help" => print_help(),
            "quit" => return,
            _ => println!("Unknown input, try 'help' or 'quit'"),
        }
        print_prompt();
    }
}

fn spawn_input_reader() -> Receiver<String> {
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if sender.send(line).is_err() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    });
    receiver
}

fn print_prompt() {
    print!("> ");
    let _ = io::stdout().flush();
}

fn print_inner_prompt() {
    print!(">> ");
    let _ = io::stdout().flush();
}

/// Spend every positive-balance wallet key into one fresh key
fn consolidate_wallet(state: &NodeState, network: &PeerNetwork) {
    let mut total = 0u64;
    let mut inputs = vec![];
    for (key, amount) in state.get_wallet() {
        if amount == 0 {
            continue;
        }
        match state.gen_txn_input(&key) {
            Ok(input) => {
                total += amount;
                inputs.push(input);
            }
            Err(e) => {
                println!("{e}");
                return;
            }
        }
    }

    if inputs.is_empty() {
        println!("Wallet empty.");
        return;
    }

    let key = match Keypair::generate() {
        Ok(key) => key,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    let mut txn = Transaction::new(inputs, vec![TxnOutput::new(key.public().clone(), total)]);

    if let Err(e) = state.sign_txn(&mut txn) {
        println!("{e}");
        return;
    }

    if state.add_txn(txn.clone()) {
        state.add_to_wallet(key);
        network.broadcast_txn(&txn);
        println!("Wallet consolidated.");
    } else {
        println!("Failed.");
    }
}

/// Interactively select a peer and an amount, request a payable key from the
/// peer, and build, sign, and broadcast the payment
fn do_pay(state: &NodeState, network: &PeerNetwork, input: &Receiver<String>) {
    let peers = network.peer_addr_list();
    if peers.is_empty() {
        println!("No connected peers to pay.");
        return;
    }

    println!("Select your payee (empty line to cancel):");
    for (i, peer) in peers.iter().enumerate() {
        println!(" {:2} -- {}", i + 1, peer);
    }

    let peer = loop {
        print_inner_prompt();
        let line = match input.recv() {
            Ok(line) => line,
            Err(_) => return,
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match line.parse::<usize>() {
            Ok(i) if i >= 1 && i <= peers.len() => break peers[i - 1].clone(),
            _ => println!("Invalid input"),
        }
    };

    let balances = state.get_wallet();
    let available: u64 = balances.values().sum();
    println!("Pay how much? (You have {available} in your wallet; empty line to cancel)");
    let amount = loop {
        print_inner_prompt();
        let line = match input.recv() {
            Ok(line) => line,
            Err(_) => return,
        };
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match line.parse::<u64>() {
            Ok(v) if v >= 1 && v <= available => break v,
            _ => println!("Invalid input"),
        }
    };

    let expect = match network.request_payable_address(&peer) {
        Ok(expect) => expect,
        Err(e) => {
            println!("{e}");
            return;
        }
    };
    let payee_key = match expect.recv_timeout(PAY_RESPONSE_TIMEOUT) {
        Ok(key) => key,
        Err(RecvTimeoutError::Timeout) => {
            network.cancel_pay_expectation(&peer);
            println!("No response from peer.");
            return;
        }
        Err(RecvTimeoutError::Disconnected) => {
            println!("Peer disconnected.");
            return;
        }
    };

    // select wallet keys until the amount is covered
    let mut covered = 0u64;
    let mut inputs = vec![];
    for (key, value) in balances {
        if value == 0 {
            continue;
        }
        match state.gen_txn_input(&key) {
            Ok(input) => {
                covered += value;
                inputs.push(input);
            }
            Err(e) => {
                println!("{e}");
                return;
            }
        }
        if covered >= amount {
            break;
        }
    }

    let mut outputs = vec![TxnOutput::new(payee_key, amount)];
    let mut change_key = None;
    if covered > amount {
        let change = match Keypair::generate() {
            Ok(key) => key,
            Err(e) => {
                println!("{e}");
                return;
            }
        };
        outputs.push(TxnOutput::new(change.public().clone(), covered - amount));
        change_key = Some(change);
    }

    let mut txn = Transaction::new(inputs, outputs);
    if let Err(e) = state.sign_txn(&mut txn) {
        println!("{e}");
        return;
    }

    if state.add_txn(txn.clone()) {
        if let Some(change) = change_key {
            state.add_to_wallet(change);
        }
        network.broadcast_txn(&txn);
        println!("Payment sent.");
    } else {
        println!("Failed, please try again.");
    }
}

fn print_state(state: &NodeState) {
    let snapshot = state.snapshot();

    println!();
    println!("Primary Chain ({} Blocks)", snapshot.primary.len());
    print_block_chain(&snapshot.primary);

    println!();
    println!("{} Alternate Chains", snapshot.alternates);

    let mined = snapshot
        .being_mined
        .saturating_sub(1)
        .min(snapshot.pending.len());

    println!();
    println!("{mined} Transactions Being Mined (+1 miner's txn)");
    for txn in &snapshot.pending[..mined] {
        print_txn(txn);
    }

    println!();
    println!("{} Transactions Queued", snapshot.pending.len() - mined);
    for txn in &snapshot.pending[mined..] {
        print_txn(txn);
    }
    println!();
}

fn print_block_chain(chain: &BlockChain) {
    for block in chain.blocks() {
        println!(
            "\tBlock ({} Txns) - Nonce: {:10}; Hash: 0x{}...",
            block.txns().len(),
            block.nonce(),
            HEXLOWER.encode(&block.hash()[..12])
        );
        for txn in block.txns() {
            print!("\t\t");
            print_txn(txn);
        }
    }
}

fn print_txn(txn: &Transaction) {
    if txn.is_miner() {
        println!(
            "Txn mined {} coins for {}",
            MINING_REWARD,
            txn.outputs()[0].key().fingerprint()
        );
        return;
    }

    match txn.outputs() {
        [] => println!(
            "Txn from {} keys paid {} coins to nobody!?",
            txn.inputs().len(),
            txn.total_output()
        ),
        [only] => println!(
            "Txn from {} keys paid {} coins to {}",
            txn.inputs().len(),
            only.amount(),
            only.key().fingerprint()
        ),
        outputs => {
            print!("Txn from {} keys paid ", txn.inputs().len());
            for output in &outputs[..outputs.len() - 1] {
                print!("{} to {}, ", output.amount(), output.key().fingerprint());
            }
            let last = &outputs[outputs.len() - 1];
            println!("{} to {}", last.amount(), last.key().fingerprint());
        }
    }
}

fn print_wallet(state: &NodeState) {
    println!();
    println!("  Amount | Public Key");
    let mut total = 0u64;
    for (key, value) in state.get_wallet() {
        let hex: String = HEXLOWER.encode(key.as_bytes()).chars().take(40).collect();
        println!("{value:8} | {hex}...");
        total += value;
    }
    println!();
    println!("Total Coins: {total}");
    println!();
}

fn print_help() {
    println!();
    println!("Possible commands are:");
    println!();
    println!("  state  - display blockchain and transaction state");
    println!("  wallet - display wallet");
    println!();
    println!("  cons   - consolidate wallet into a single key");
    println!("  pay    - perform a payment to another peer");
    println!();
    println!("  help   - display this help");
    println!("  quit   - shut down the node (your wallet will be lost)");
    println!();
}
