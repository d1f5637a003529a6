use crate::error::{NodeError, Result};
use crate::network::message::{read_message, write_message, NetworkMessage};
use std::net::{Shutdown, TcpStream};
use std::sync::Mutex;

/// One persistent peer connection.
///
/// Reads happen from a single reader thread; writes can come from any thread
/// (miner, dispatcher, operator) and are serialised by the writer mutex.
pub struct PeerConn {
    stream: TcpStream,
    writer: Mutex<TcpStream>,
}

impl PeerConn {
    pub fn new(stream: TcpStream) -> Result<PeerConn> {
        let writer = stream
            .try_clone()
            .map_err(|e| NodeError::Network(format!("failed to clone stream: {e}")))?;
        Ok(PeerConn {
            stream,
            writer: Mutex::new(writer),
        })
    }

    pub fn send(&self, msg: &NetworkMessage) -> Result<()> {
        let guard = match self.writer.lock() {
            Ok(guard) => guard,
            Err(_) => return Err(NodeError::Network("peer writer lock poisoned".to_string())),
        };
        write_message(&*guard, msg)
    }

    pub fn receive(&self) -> Result<NetworkMessage> {
        read_message(&self.stream)
    }

    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.stream
            .set_read_timeout(timeout)
            .map_err(|e| NodeError::Network(format!("failed to set read timeout: {e}")))
    }

    pub fn shutdown(&self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
