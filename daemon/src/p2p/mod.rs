pub mod message;

pub use message::{
    ConfirmAck, ConfirmReq, Keepalive, Message, MessageError, MessageHeader, MessageType, Publish,
    KEEPALIVE_PEERS, MESSAGE_MAGIC,
};

use lattice_common::{block::Block, vote::Vote};

/// The slice of the wire layer the core talks to: serialized messages go
/// out, nothing comes back. The transport (connection management,
/// peering, bootstrap) lives outside the core.
pub trait NetworkHandle: Send + Sync {
    fn publish(&self, block: &Block);
    fn confirm_req(&self, block: &Block);
    fn confirm_ack(&self, vote: &Vote);
}

/// Stand-in used when the node runs without a transport.
#[derive(Default)]
pub struct NullNetwork;

impl NetworkHandle for NullNetwork {
    fn publish(&self, block: &Block) {
        trace!("publish {} (no transport)", block.hash());
    }

    fn confirm_req(&self, block: &Block) {
        trace!("confirm_req {} (no transport)", block.hash());
    }

    fn confirm_ack(&self, vote: &Vote) {
        trace!("confirm_ack from {} (no transport)", vote.account);
    }
}
