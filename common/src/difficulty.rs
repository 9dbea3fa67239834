use crate::block::Root;
use crate::network::Network;
use blake2::digest::consts::U8;
use blake2::{Blake2b, Digest};

type WorkHash = Blake2b<U8>;

/// Evaluate the work function for a nonce against a root: an 8-byte
/// blake2b over nonce-little-endian then the root, read little-endian.
pub fn work_value(root: &Root, work: u64) -> u64 {
    let mut hasher = WorkHash::new();
    hasher.update(work.to_le_bytes());
    hasher.update(root.as_bytes());
    let digest: [u8; 8] = hasher.finalize().into();
    u64::from_le_bytes(digest)
}

/// Whether the nonce clears the active network's threshold.
pub fn work_valid(network: Network, root: &Root, work: u64) -> bool {
    work_value(root, work) >= network.work_threshold()
}
