// The mining loop. It never blocks: between nonce attempts it polls the
// state's reset flag and the quit channel, and add_block re-checks the chain
// tip under the state lock so a stale attempt cannot land.

use crate::network::PeerNetwork;
use crate::state::NodeState;
use data_encoding::HEXLOWER;
use log::{debug, error, info};
use rand::Rng;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;

pub fn mine_for_gold(state: Arc<NodeState>, network: Arc<PeerNetwork>, quit: Receiver<()>) {
    let mut rng = rand::thread_rng();

    'mine_new_block: loop {
        debug!("Mining a new block");
        let (mut block, key) = match state.construct_block() {
            Ok(template) => template,
            Err(e) => {
                error!("Failed to construct a block template: {e}");
                return;
            }
        };

        loop {
            if state.reset_requested() {
                // the chain or mempool changed under us; the unmined reward
                // key is discarded with the template
                continue 'mine_new_block;
            }

            match quit.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => return,
                Err(TryRecvError::Empty) => {}
            }

            block.set_nonce(rng.gen());
            let (accepted, have_chain) = state.add_block(&block);
            if accepted && have_chain {
                info!(
                    "Mined block 0x{}...",
                    HEXLOWER.encode(&block.hash()[..6])
                );
                state.add_to_wallet(key);
                network.broadcast_block(&block);
                continue 'mine_new_block;
            }
        }
    }
}
