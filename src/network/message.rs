use crate::core::{Block, BlockChain, Transaction};
use crate::error::{NodeError, Result};
use crate::utils::{deserialize, serialize};
use crate::wallet::PublicKey;
use serde::{Deserialize, Serialize};
use std::io::{ErrorKind, Read, Write};

// Upper bound on a single wire frame; anything larger is treated as a codec
// error and the connection is dropped.
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Everything that travels between peers
#[derive(Debug, Serialize, Deserialize)]
pub enum NetworkMessage {
    PeerListRequest,
    PeerListResponse(Vec<String>),
    PeerBroadcast(String),
    BlockChainRequest(Option<Vec<u8>>),
    BlockChainResponse(BlockChain),
    BlockBroadcast(Block),
    TransactionRequest,
    TransactionResponse(PublicKey),
    TransactionBroadcast(Transaction),
}

/// What the event dispatcher consumes: decoded wire messages, plus internal
/// connection-loss notices. `from: None` marks an accept-loop failure.
#[derive(Debug)]
pub enum NetEvent {
    Wire { from: String, msg: NetworkMessage },
    Lost { from: Option<String>, err: NodeError },
}

/// Write one length-delimited frame: u32 big-endian length, then the
/// bincode-encoded message
pub fn write_message<W: Write>(mut writer: W, msg: &NetworkMessage) -> Result<()> {
    let payload = serialize(msg)?;
    let len = u32::try_from(payload.len())
        .map_err(|_| NodeError::Codec(format!("frame too large: {} bytes", payload.len())))?;

    writer
        .write_all(&len.to_be_bytes())
        .and_then(|_| writer.write_all(&payload))
        .and_then(|_| writer.flush())
        .map_err(|e| NodeError::Network(format!("write failed: {e}")))
}

/// Read one length-delimited frame. A clean close before the length prefix
/// is reported as `Disconnected`; everything else is a transport or codec
/// error.
pub fn read_message<R: Read>(mut reader: R) -> Result<NetworkMessage> {
    let mut len_buf = [0u8; 4];
    if let Err(e) = reader.read_exact(&mut len_buf) {
        return Err(match e.kind() {
            ErrorKind::UnexpectedEof => NodeError::Disconnected,
            _ => NodeError::Network(format!("read failed: {e}")),
        });
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(NodeError::Codec(format!("oversized frame: {len} bytes")));
    }

    let mut payload = vec![0u8; len];
    reader
        .read_exact(&mut payload)
        .map_err(|e| NodeError::Network(format!("read failed: {e}")))?;

    deserialize(&payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::wallet::Keypair;
    use std::io::Cursor;

    fn round_trip(msg: &NetworkMessage) -> NetworkMessage {
        let mut buf = Vec::new();
        write_message(&mut buf, msg).unwrap();
        read_message(Cursor::new(buf)).unwrap()
    }

    #[test]
    fn test_block_broadcast_round_trip() {
        let key = Keypair::generate().unwrap();
        let block = Block::new(
            Some(vec![1; 32]),
            vec![Transaction::new_miners_txn(key.public().clone())],
        );

        match round_trip(&NetworkMessage::BlockBroadcast(block.clone())) {
            NetworkMessage::BlockBroadcast(decoded) => assert_eq!(decoded, block),
            other => panic!("wrong message kind: {other:?}"),
        }
    }

    #[test]
    fn test_txn_broadcast_round_trip() {
        let key = Keypair::generate().unwrap();
        let txn = Transaction::new_miners_txn(key.public().clone());

        match round_trip(&NetworkMessage::TransactionBroadcast(txn.clone())) {
            NetworkMessage::TransactionBroadcast(decoded) => assert_eq!(decoded, txn),
            other => panic!("wrong message kind: {other:?}"),
        }
    }

    #[test]
    fn test_chain_request_round_trip() {
        match round_trip(&NetworkMessage::BlockChainRequest(None)) {
            NetworkMessage::BlockChainRequest(None) => {}
            other => panic!("wrong message kind: {other:?}"),
        }

        match round_trip(&NetworkMessage::BlockChainRequest(Some(vec![7; 32]))) {
            NetworkMessage::BlockChainRequest(Some(hash)) => assert_eq!(hash, vec![7; 32]),
            other => panic!("wrong message kind: {other:?}"),
        }
    }

    #[test]
    fn test_chain_response_round_trip() {
        let key = Keypair::generate().unwrap();
        let mut chain = BlockChain::new();
        assert!(chain.append(Block::new(
            None,
            vec![Transaction::new_miners_txn(key.public().clone())],
        )));

        match round_trip(&NetworkMessage::BlockChainResponse(chain.clone())) {
            NetworkMessage::BlockChainResponse(decoded) => {
                assert_eq!(decoded.blocks(), chain.blocks())
            }
            other => panic!("wrong message kind: {other:?}"),
        }
    }

    #[test]
    fn test_peer_list_round_trip() {
        let addrs = vec!["127.0.0.1:4000".to_string(), "127.0.0.1:4001".to_string()];
        match round_trip(&NetworkMessage::PeerListResponse(addrs.clone())) {
            NetworkMessage::PeerListResponse(decoded) => assert_eq!(decoded, addrs),
            other => panic!("wrong message kind: {other:?}"),
        }
    }

    #[test]
    fn test_two_frames_in_sequence() {
        let mut buf = Vec::new();
        write_message(&mut buf, &NetworkMessage::PeerListRequest).unwrap();
        write_message(&mut buf, &NetworkMessage::TransactionRequest).unwrap();

        let mut cursor = Cursor::new(buf);
        assert!(matches!(
            read_message(&mut cursor).unwrap(),
            NetworkMessage::PeerListRequest
        ));
        assert!(matches!(
            read_message(&mut cursor).unwrap(),
            NetworkMessage::TransactionRequest
        ));
    }

    #[test]
    fn test_closed_stream_reads_as_disconnected() {
        let empty: &[u8] = &[];
        assert!(matches!(read_message(empty), Err(NodeError::Disconnected)));
    }

    #[test]
    fn test_oversized_frame_is_a_codec_error() {
        let huge = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        assert!(matches!(
            read_message(&huge[..]),
            Err(NodeError::Codec(_))
        ));
    }
}
