use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Which lattice this node participates in. Selects the work threshold,
/// default ports and genesis record.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Devnet,
}

// Local work thresholds for rate-limiting block publishing.
// ~5 seconds of CPU work on the main network.
pub const WORK_THRESHOLD_MAIN: u64 = 0xffff_ffc0_0000_0000;
pub const WORK_THRESHOLD_TEST: u64 = 0xff00_0000_0000_0000;

impl Network {
    pub fn work_threshold(&self) -> u64 {
        match self {
            Network::Mainnet => WORK_THRESHOLD_MAIN,
            Network::Testnet | Network::Devnet => WORK_THRESHOLD_TEST,
        }
    }

    pub fn default_peering_port(&self) -> u16 {
        match self {
            Network::Mainnet => 7175,
            Network::Testnet => 17175,
            Network::Devnet => 27175,
        }
    }
}

impl Display for Network {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for Network {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" => Ok(Network::Devnet),
            _ => Err("expected one of: mainnet, testnet, devnet"),
        }
    }
}
