use crate::core::{Block, BlockChain, Transaction};
use crate::error::{NodeError, Result};
use crate::network::message::{read_message, write_message, NetEvent, NetworkMessage};
use crate::network::peer::PeerConn;
use crate::wallet::PublicKey;
use data_encoding::HEXLOWER;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::net::{TcpListener, TcpStream};
use std::process;
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

// A freshly accepted connection must identify itself within this window;
// promoted peer connections read without a deadline.
const FIRST_MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// The narrow interface through which network events drive the node state.
/// The network performs all I/O itself; the handler only mutates state.
pub trait NodeHandle: Send + Sync {
    /// Serve a chain request: the chain whose tip matches `tip`, or the
    /// primary chain when `tip` is None
    fn on_chain_request(&self, tip: Option<&[u8]>) -> Option<BlockChain>;
    /// A whole chain arrived and passed verification
    fn on_chain_response(&self, chain: BlockChain);
    /// A block arrived; returns (accepted, have_parent_chain)
    fn on_block(&self, block: &Block) -> (bool, bool);
    /// A transaction arrived; returns whether it entered the mempool
    fn on_txn(&self, txn: Transaction) -> bool;
    /// A peer wants to pay us: mint a fresh key and return its public half
    fn on_pay_request(&self) -> Result<PublicKey>;
}

#[derive(Default)]
struct NetInner {
    peers: HashMap<String, Arc<PeerConn>>,
    pay_expects: HashMap<String, SyncSender<PublicKey>>,
    closing: bool,
}

/// The peer network: listener, persistent peer registry, and the single
/// events channel every connection reader feeds.
pub struct PeerNetwork {
    local_addr: String,
    listener: TcpListener,
    events_tx: mpsc::Sender<NetEvent>,
    inner: RwLock<NetInner>,
}

impl PeerNetwork {
    /// Bind the listener, optionally fetch a peer list from a bootstrap
    /// node, and open a persistent connection to every returned peer.
    /// Returns the network and the receiving end of its events channel.
    pub fn new(
        listen_addr: &str,
        bootstrap: Option<&str>,
    ) -> Result<(Arc<PeerNetwork>, Receiver<NetEvent>)> {
        let peer_addrs = match bootstrap {
            Some(addr) => Self::fetch_peer_list(addr)?,
            None => vec![],
        };

        let listener = TcpListener::bind(listen_addr)
            .map_err(|e| NodeError::Network(format!("Failed to bind to {listen_addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NodeError::Network(format!("Failed to resolve listen address: {e}")))?
            .to_string();

        let (events_tx, events_rx) = mpsc::channel();

        let network = Arc::new(PeerNetwork {
            local_addr,
            listener,
            events_tx,
            inner: RwLock::new(NetInner::default()),
        });

        let acceptor = Arc::clone(&network);
        thread::spawn(move || acceptor.accept_loop());

        for addr in peer_addrs {
            if addr == network.local_addr {
                continue;
            }
            if let Err(e) = network.connect_to_peer(&addr) {
                warn!("Failed to connect to peer {addr}: {e}");
            }
        }

        Ok((network, events_rx))
    }

    /// One-shot bootstrap handshake: ask the start peer for its peer list
    /// and close the connection
    fn fetch_peer_list(addr: &str) -> Result<Vec<String>> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| NodeError::Network(format!("Failed to connect to {addr}: {e}")))?;

        write_message(&stream, &NetworkMessage::PeerListRequest)?;

        match read_message(&stream)? {
            NetworkMessage::PeerListResponse(addrs) => Ok(addrs),
            other => Err(NodeError::Protocol(format!(
                "expected PeerListResponse, received {other:?}"
            ))),
        }
    }

    /// Open a persistent connection and announce our listening address
    fn connect_to_peer(self: &Arc<Self>, addr: &str) -> Result<()> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| NodeError::Network(format!("Failed to connect to {addr}: {e}")))?;
        let peer = Arc::new(PeerConn::new(stream)?);

        peer.send(&NetworkMessage::PeerBroadcast(self.local_addr.clone()))?;

        if !self.register_peer(addr.to_string(), peer) {
            return Err(NodeError::Network(format!("already connected to {addr}")));
        }
        Ok(())
    }

    fn register_peer(self: &Arc<Self>, addr: String, peer: Arc<PeerConn>) -> bool {
        {
            let mut inner = self.write_inner();
            if inner.closing || inner.peers.contains_key(&addr) {
                return false;
            }
            inner.peers.insert(addr.clone(), Arc::clone(&peer));
        }
        info!("New peer: {addr}");
        self.spawn_reader(addr, peer);
        true
    }

    /// Every persistent connection gets a reader thread that decodes frames
    /// and forwards them to the events channel
    fn spawn_reader(self: &Arc<Self>, addr: String, peer: Arc<PeerConn>) {
        let network = Arc::clone(self);
        thread::spawn(move || loop {
            match peer.receive() {
                Ok(msg) => {
                    let event = NetEvent::Wire {
                        from: addr.clone(),
                        msg,
                    };
                    if network.events_tx.send(event).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    let _ = network.events_tx.send(NetEvent::Lost {
                        from: Some(addr),
                        err,
                    });
                    return;
                }
            }
        });
    }

    fn accept_loop(self: Arc<Self>) {
        loop {
            match self.listener.accept() {
                Ok((stream, _)) => {
                    if self.is_closing() {
                        // the wakeup connection from close()
                        drop(stream);
                        let _ = self.events_tx.send(NetEvent::Lost {
                            from: None,
                            err: NodeError::Disconnected,
                        });
                        return;
                    }
                    self.handle_inbound(stream);
                }
                Err(e) => {
                    let _ = self.events_tx.send(NetEvent::Lost {
                        from: None,
                        err: NodeError::Network(format!("accept failed: {e}")),
                    });
                    return;
                }
            }
        }
    }

    /// The first message on an accepted connection decides its fate:
    /// a peer-list request gets a one-shot reply, a peer broadcast promotes
    /// the connection to a persistent peer, anything else closes it.
    fn handle_inbound(self: &Arc<Self>, stream: TcpStream) {
        if stream
            .set_read_timeout(Some(FIRST_MESSAGE_TIMEOUT))
            .is_err()
        {
            return;
        }

        let peer = match PeerConn::new(stream) {
            Ok(peer) => Arc::new(peer),
            Err(e) => {
                warn!("Failed to set up inbound connection: {e}");
                return;
            }
        };

        let first = match peer.receive() {
            Ok(msg) => msg,
            Err(_) => {
                peer.shutdown();
                return;
            }
        };

        match first {
            NetworkMessage::PeerListRequest => {
                let mut list = self.peer_addr_list();
                list.push(self.local_addr.clone());
                let _ = peer.send(&NetworkMessage::PeerListResponse(list));
                peer.shutdown();
            }
            NetworkMessage::PeerBroadcast(addr) => {
                if peer.set_read_timeout(None).is_err() || !self.register_peer(addr, peer.clone())
                {
                    peer.shutdown();
                }
            }
            _ => peer.shutdown(),
        }
    }

    /// Spawn the event dispatcher. All network-originated state mutation
    /// happens on this one thread, in arrival order.
    pub fn start(self: &Arc<Self>, events: Receiver<NetEvent>, node: Arc<dyn NodeHandle>) -> JoinHandle<()> {
        let network = Arc::clone(self);
        thread::spawn(move || network.handle_events(events, node))
    }

    fn handle_events(&self, events: Receiver<NetEvent>, node: Arc<dyn NodeHandle>) {
        while let Ok(event) = events.recv() {
            match event {
                NetEvent::Wire { from, msg } => self.handle_message(from, msg, node.as_ref()),
                NetEvent::Lost { from: None, err } => {
                    if self.is_closing() {
                        if self.peer_count() == 0 {
                            return;
                        }
                        // keep draining until the last peer is gone
                    } else {
                        error!("Listener failed: {err}");
                        process::exit(1);
                    }
                }
                NetEvent::Lost {
                    from: Some(addr),
                    err,
                } => {
                    if self.deregister_peer(&addr) && !self.handle_peer_loss(&addr, err) {
                        return;
                    }
                }
            }
        }
    }

    fn handle_message(&self, from: String, msg: NetworkMessage, node: &dyn NodeHandle) {
        match msg {
            NetworkMessage::BlockChainRequest(tip) => {
                match node.on_chain_request(tip.as_deref()) {
                    Some(chain) => {
                        self.send_to_peer(&from, &NetworkMessage::BlockChainResponse(chain))
                    }
                    None => debug!("No chain with the tip requested by {from}"),
                }
            }
            NetworkMessage::BlockChainResponse(mut chain) => {
                info!("Received blockchain from {from}");
                if chain.verify_whole() {
                    node.on_chain_response(chain);
                } else {
                    warn!("Discarding invalid chain from {from}");
                }
            }
            NetworkMessage::BlockBroadcast(block) => {
                debug!(
                    "Received block 0x{}... from {from}",
                    HEXLOWER.encode(&block.hash()[..6])
                );
                let (valid, have_chain) = node.on_block(&block);
                if valid && !have_chain {
                    self.request_blockchain(Some(block.hash()));
                }
            }
            NetworkMessage::TransactionRequest => match node.on_pay_request() {
                Ok(key) => self.send_to_peer(&from, &NetworkMessage::TransactionResponse(key)),
                Err(e) => error!("Failed to mint a payable key: {e}"),
            },
            NetworkMessage::TransactionResponse(key) => {
                let expect = self.write_inner().pay_expects.remove(&from);
                match expect {
                    Some(sender) => {
                        let _ = sender.send(key);
                    }
                    None => debug!("Unsolicited transaction response from {from}"),
                }
            }
            NetworkMessage::TransactionBroadcast(txn) => {
                debug!("Received txn from {from}");
                node.on_txn(txn);
            }
            NetworkMessage::PeerListRequest
            | NetworkMessage::PeerListResponse(_)
            | NetworkMessage::PeerBroadcast(_) => {
                // handshake messages have no business on a persistent
                // connection
                warn!("Protocol violation from {from}, dropping peer");
                self.drop_peer(&from);
            }
        }
    }

    /// Returns whether the address named a registered peer
    fn deregister_peer(&self, addr: &str) -> bool {
        let mut inner = self.write_inner();
        inner.pay_expects.remove(addr);
        inner.peers.remove(addr).is_some()
    }

    /// Returns false when the dispatcher should stop (closing and drained)
    fn handle_peer_loss(&self, addr: &str, err: NodeError) -> bool {
        info!("Lost peer: {addr}");

        let (closing, remaining) = {
            let inner = self.read_inner();
            (inner.closing, inner.peers.len())
        };

        if remaining == 0 {
            if closing {
                return false;
            }
            if !matches!(err, NodeError::Disconnected) {
                error!("Lost last peer {addr}: {err}");
                process::exit(1);
            }
        }
        true
    }

    fn drop_peer(&self, addr: &str) {
        let peer = {
            let mut inner = self.write_inner();
            inner.pay_expects.remove(addr);
            inner.peers.remove(addr)
        };
        if let Some(peer) = peer {
            info!("Dropped peer: {addr}");
            peer.shutdown();
        }
    }

    fn send_to_peer(&self, addr: &str, msg: &NetworkMessage) {
        let peer = self.read_inner().peers.get(addr).cloned();
        match peer {
            Some(peer) => {
                if let Err(e) = peer.send(msg) {
                    // the peer's reader will surface the loss
                    warn!("Failed to send to {addr}: {e}");
                }
            }
            None => debug!("No connection to {addr}"),
        }
    }

    /// Send a block to every persistent peer
    pub fn broadcast_block(&self, block: &Block) {
        self.broadcast(&NetworkMessage::BlockBroadcast(block.clone()));
    }

    /// Send a transaction to every persistent peer
    pub fn broadcast_txn(&self, txn: &Transaction) {
        self.broadcast(&NetworkMessage::TransactionBroadcast(txn.clone()));
    }

    fn broadcast(&self, msg: &NetworkMessage) {
        let peers: Vec<(String, Arc<PeerConn>)> = {
            let inner = self.read_inner();
            inner
                .peers
                .iter()
                .map(|(addr, peer)| (addr.clone(), Arc::clone(peer)))
                .collect()
        };

        for (addr, peer) in peers {
            if let Err(e) = peer.send(msg) {
                warn!("Failed to send to {addr}: {e}");
            }
        }
    }

    /// Ask one arbitrarily chosen peer for the chain with the given tip
    /// (None for its primary chain)
    pub fn request_blockchain(&self, tip: Option<Vec<u8>>) {
        let peer = {
            let inner = self.read_inner();
            inner
                .peers
                .iter()
                .next()
                .map(|(addr, peer)| (addr.clone(), Arc::clone(peer)))
        };

        match peer {
            Some((addr, peer)) => {
                if let Err(e) = peer.send(&NetworkMessage::BlockChainRequest(tip)) {
                    warn!("Failed to request chain from {addr}: {e}");
                }
            }
            None => debug!("No peers to request a chain from"),
        }
    }

    /// Register a one-shot expectation for a payable key from `addr` and
    /// send the request. The returned receiver is fulfilled by a matching
    /// TransactionResponse.
    pub fn request_payable_address(&self, addr: &str) -> Result<Receiver<PublicKey>> {
        let peer = self
            .read_inner()
            .peers
            .get(addr)
            .cloned()
            .ok_or_else(|| NodeError::Network(format!("peer {addr} no longer connected")))?;

        let (sender, receiver) = mpsc::sync_channel(1);
        self.write_inner()
            .pay_expects
            .insert(addr.to_string(), sender);

        if let Err(e) = peer.send(&NetworkMessage::TransactionRequest) {
            self.cancel_pay_expectation(addr);
            return Err(e);
        }

        Ok(receiver)
    }

    pub fn cancel_pay_expectation(&self, addr: &str) {
        self.write_inner().pay_expects.remove(addr);
    }

    pub fn peer_addr_list(&self) -> Vec<String> {
        self.read_inner().peers.keys().cloned().collect()
    }

    pub fn peer_count(&self) -> usize {
        self.read_inner().peers.len()
    }

    pub fn has_peers(&self) -> bool {
        self.peer_count() > 0
    }

    pub fn local_addr(&self) -> &str {
        self.local_addr.as_str()
    }

    fn is_closing(&self) -> bool {
        self.read_inner().closing
    }

    /// Stop accepting, shut every peer connection down, and let the event
    /// dispatcher drain the resulting loss events
    pub fn close(&self) {
        {
            let mut inner = self.write_inner();
            inner.closing = true;
            for peer in inner.peers.values() {
                peer.shutdown();
            }
        }
        // wake the accept loop so it can observe the closing flag
        let _ = TcpStream::connect(&self.local_addr);
    }

    // A poisoned registry lock means a thread died while rewiring peers;
    // terminate rather than cascade the panic into every caller.
    fn read_inner(&self) -> RwLockReadGuard<'_, NetInner> {
        match self.inner.read() {
            Ok(guard) => guard,
            Err(_) => {
                error!("Peer registry lock poisoned, aborting");
                process::exit(1);
            }
        }
    }

    fn write_inner(&self) -> RwLockWriteGuard<'_, NetInner> {
        match self.inner.write() {
            Ok(guard) => guard,
            Err(_) => {
                error!("Peer registry lock poisoned, aborting");
                process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::Keypair;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records everything the dispatcher hands it
    #[derive(Default)]
    struct RecordingNode {
        blocks: Mutex<Vec<Block>>,
        txns: Mutex<Vec<Transaction>>,
    }

    impl NodeHandle for RecordingNode {
        fn on_chain_request(&self, _tip: Option<&[u8]>) -> Option<BlockChain> {
            Some(BlockChain::new())
        }

        fn on_chain_response(&self, _chain: BlockChain) {}

        fn on_block(&self, block: &Block) -> (bool, bool) {
            self.blocks.lock().unwrap().push(block.clone());
            (true, true)
        }

        fn on_txn(&self, txn: Transaction) -> bool {
            self.txns.lock().unwrap().push(txn);
            true
        }

        fn on_pay_request(&self) -> Result<PublicKey> {
            Ok(Keypair::generate()?.public().clone())
        }
    }

    fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            thread::sleep(Duration::from_millis(10));
        }
    }

    fn start_node(
        bootstrap: Option<&str>,
    ) -> (Arc<PeerNetwork>, Arc<RecordingNode>, JoinHandle<()>) {
        let (network, events) = PeerNetwork::new("127.0.0.1:0", bootstrap).unwrap();
        let node = Arc::new(RecordingNode::default());
        let dispatcher = network.start(events, node.clone());
        (network, node, dispatcher)
    }

    #[test]
    fn test_fresh_network_has_no_peers() {
        let (network, _node, _dispatcher) = start_node(None);
        assert!(!network.has_peers());
        assert!(network.local_addr().starts_with("127.0.0.1:"));
    }

    #[test]
    fn test_bootstrap_handshake_registers_both_sides() {
        let (a, _a_node, _a_dispatcher) = start_node(None);
        let (b, _b_node, _b_dispatcher) = start_node(Some(a.local_addr()));

        assert_eq!(b.peer_addr_list(), vec![a.local_addr().to_string()]);
        wait_until("A to register B", || a.peer_count() == 1);
    }

    #[test]
    fn test_broadcast_reaches_every_peer_exactly_once() {
        let (a, _a_node, _a_dispatcher) = start_node(None);
        let (_b, b_node, _b_dispatcher) = start_node(Some(a.local_addr()));
        let (_c, c_node, _c_dispatcher) = start_node(Some(a.local_addr()));

        wait_until("A to register B and C", || a.peer_count() == 2);

        let key = Keypair::generate().unwrap();
        let block = Block::new(None, vec![Transaction::new_miners_txn(key.public().clone())]);
        a.broadcast_block(&block);

        wait_until("B to receive the block", || {
            !b_node.blocks.lock().unwrap().is_empty()
        });
        wait_until("C to receive the block", || {
            !c_node.blocks.lock().unwrap().is_empty()
        });

        // give any duplicate time to arrive, then check the fan-out is one
        // message per peer
        thread::sleep(Duration::from_millis(100));
        assert_eq!(b_node.blocks.lock().unwrap().len(), 1);
        assert_eq!(c_node.blocks.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_txn_broadcast_is_delivered() {
        let (a, _a_node, _a_dispatcher) = start_node(None);
        let (_b, b_node, _b_dispatcher) = start_node(Some(a.local_addr()));

        wait_until("A to register B", || a.peer_count() == 1);

        let key = Keypair::generate().unwrap();
        let txn = Transaction::new_miners_txn(key.public().clone());
        a.broadcast_txn(&txn);

        wait_until("B to receive the txn", || {
            !b_node.txns.lock().unwrap().is_empty()
        });
        assert_eq!(b_node.txns.lock().unwrap()[0], txn);
    }

    #[test]
    fn test_payable_address_request_is_fulfilled() {
        let (a, _a_node, _a_dispatcher) = start_node(None);
        let (b, _b_node, _b_dispatcher) = start_node(Some(a.local_addr()));

        wait_until("A to register B", || a.peer_count() == 1);

        // B asks A's node for a payable key
        let expect = b.request_payable_address(a.local_addr()).unwrap();
        let key = expect.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!key.as_bytes().is_empty());
    }

    #[test]
    fn test_close_drains_the_dispatcher() {
        let (a, _a_node, a_dispatcher) = start_node(None);
        let (b, _b_node, b_dispatcher) = start_node(Some(a.local_addr()));

        wait_until("A to register B", || a.peer_count() == 1);

        b.close();
        b_dispatcher.join().unwrap();

        a.close();
        a_dispatcher.join().unwrap();
    }
}
