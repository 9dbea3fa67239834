/// Process-wide randomness helpers.
///
/// Everything here draws from the operating system CSPRNG; work nonce
/// candidates and key material must never come from a thread-local PRNG.
use rand::rngs::OsRng;
use rand::RngCore;

pub fn secure_random_u64() -> u64 {
    OsRng.next_u64()
}
