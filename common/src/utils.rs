use std::io;
use std::thread::{Builder, JoinHandle};

/// Advisory names for the node's long-running threads, visible in
/// debuggers and /proc. Kept under 16 characters, the smallest maximum
/// among supported platforms.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadRole {
    Io,
    WorkPool,
    BlockProcessing,
    VoteProcessing,
    Voting,
    Alarm,
}

impl ThreadRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ThreadRole::Io => "I/O",
            ThreadRole::WorkPool => "Work pool",
            ThreadRole::BlockProcessing => "Blck processing",
            ThreadRole::VoteProcessing => "Vote processing",
            ThreadRole::Voting => "Voting",
            ThreadRole::Alarm => "Alarm",
        }
    }
}

/// Spawn an OS thread carrying a role name.
pub fn spawn_thread<F, T>(role: ThreadRole, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Builder::new().name(role.as_str().to_owned()).spawn(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names_fit_platform_limit() {
        for role in [
            ThreadRole::Io,
            ThreadRole::WorkPool,
            ThreadRole::BlockProcessing,
            ThreadRole::VoteProcessing,
            ThreadRole::Voting,
            ThreadRole::Alarm,
        ] {
            assert!(role.as_str().len() < 16);
        }
    }
}
