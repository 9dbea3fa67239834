use lattice_common::{
    config::{self, Amount, UNIT},
    crypto::{Hash, PublicKey},
    network::Network,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current config file schema. Version 1 predates the accelerator keys.
pub const CONFIG_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unknown config version {0}")]
    UnknownVersion(u32),
    #[error("malformed config: {0}")]
    Malformed(&'static str),
}

// Raw amounts are serialized as decimal strings; they do not fit JSON
// numbers.
mod amount_string {
    use lattice_common::config::Amount;
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse::<Amount>()
            .map_err(|_| D::Error::custom("expected a decimal amount string"))
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RpcConfig {
    pub address: String,
    pub port: u16,
    pub enable_control: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        RpcConfig {
            address: "::1".to_string(),
            port: 7176,
            enable_control: false,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OpenclConfig {
    pub platform: u32,
    pub device: u32,
    pub threads: u32,
}

impl Default for OpenclConfig {
    fn default() -> Self {
        OpenclConfig {
            platform: 0,
            device: 0,
            threads: 1024 * 1024,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub peering_port: u16,
    pub io_threads: u32,
    pub network_threads: u32,
    pub work_threads: u32,
    pub enable_voting: bool,
    pub preconfigured_peers: Vec<String>,
    pub preconfigured_representatives: Vec<PublicKey>,
    #[serde(with = "amount_string")]
    pub receive_minimum: Amount,
    #[serde(with = "amount_string")]
    pub online_weight_minimum: Amount,
    /// Percentage of online weight a winning tally must reach.
    pub online_weight_quorum: u64,
    /// Milliseconds one block-processing write transaction may span.
    pub block_processor_batch_max_time: u64,
    pub callback_address: String,
    pub callback_port: u16,
    pub callback_target: String,
    pub lmdb_max_dbs: u32,
    pub epoch_block_link: Hash,
    pub epoch_block_signer: PublicKey,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            peering_port: Network::Mainnet.default_peering_port(),
            io_threads: 4,
            network_threads: 4,
            work_threads: num_cpus::get() as u32,
            enable_voting: true,
            preconfigured_peers: vec!["peering.lattice.network".to_string()],
            preconfigured_representatives: vec![config::genesis_account(Network::Mainnet)],
            receive_minimum: UNIT,
            online_weight_minimum: 60_000 * UNIT,
            online_weight_quorum: 60,
            block_processor_batch_max_time: 5_000,
            callback_address: String::new(),
            callback_port: 0,
            callback_target: String::new(),
            lmdb_max_dbs: 128,
            epoch_block_link: Hash::zero(),
            epoch_block_signer: PublicKey::zero(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DaemonConfig {
    pub version: String,
    pub rpc_enable: bool,
    pub rpc: RpcConfig,
    pub node: NodeConfig,
    pub opencl_enable: bool,
    pub opencl: OpenclConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            version: CONFIG_VERSION.to_string(),
            rpc_enable: false,
            rpc: RpcConfig::default(),
            node: NodeConfig::default(),
            opencl_enable: false,
            opencl: OpenclConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn serialize_json(&self) -> Result<Value, ConfigError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Parse a config document, applying schema upgrades in place.
    /// Returns the config and whether the document was modified.
    pub fn deserialize_json(value: &mut Value) -> Result<(Self, bool), ConfigError> {
        let Some(object) = value.as_object_mut() else {
            return Err(ConfigError::Malformed("expected a JSON object"));
        };
        if object.is_empty() {
            let defaults = DaemonConfig::default();
            *object = match defaults.serialize_json()? {
                Value::Object(map) => map,
                _ => return Err(ConfigError::Malformed("expected a JSON object")),
            };
            return Ok((defaults, true));
        }

        let version = match object.get("version") {
            Some(Value::String(text)) => text
                .parse::<u32>()
                .map_err(|_| ConfigError::Malformed("version is not an integer"))?,
            Some(_) => return Err(ConfigError::Malformed("version must be a string")),
            None => {
                object.insert("version".to_string(), Value::String("1".to_string()));
                1
            }
        };
        let upgraded = Self::upgrade_json(version, object)?;
        let config: DaemonConfig = serde_json::from_value(Value::Object(object.clone()))?;
        Ok((config, upgraded))
    }

    // Upgrades are cumulative: a document at any historical version
    // passes through every later step in order.
    fn upgrade_json(mut version: u32, object: &mut Map<String, Value>) -> Result<bool, ConfigError> {
        if version == 0 || version > CONFIG_VERSION {
            return Err(ConfigError::UnknownVersion(version));
        }
        let mut upgraded = false;
        while version < CONFIG_VERSION {
            match version {
                1 => {
                    object
                        .entry("opencl_enable".to_string())
                        .or_insert(Value::Bool(false));
                    if !object.contains_key("opencl") {
                        object.insert(
                            "opencl".to_string(),
                            serde_json::to_value(OpenclConfig::default())?,
                        );
                    }
                    object.insert("version".to_string(), Value::String("2".to_string()));
                    version = 2;
                }
                other => return Err(ConfigError::UnknownVersion(other)),
            }
            upgraded = true;
        }
        Ok(upgraded)
    }

    /// Read `config.json`, creating it with defaults when absent and
    /// rewriting it when an upgrade ran. The file is kept at mode 0600.
    pub fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let config = if path.exists() {
            let text = fs::read_to_string(path)?;
            let mut value: Value = serde_json::from_str(&text)?;
            let (config, upgraded) = Self::deserialize_json(&mut value)?;
            if upgraded {
                info!("Upgrading {} to version {}", path.display(), CONFIG_VERSION);
                fs::write(path, serde_json::to_string_pretty(&value)?)?;
            }
            config
        } else {
            let config = DaemonConfig::default();
            fs::write(path, serde_json::to_string_pretty(&config.serialize_json()?)?)?;
            config
        };
        secure_file(path)?;
        Ok(config)
    }
}

/// Default data directory for a network, under the user's home.
pub fn working_path(network: Network) -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let name = match network {
        Network::Mainnet => "Lattice",
        Network::Testnet => "LatticeTest",
        Network::Devnet => "LatticeDev",
    };
    home.join(name)
}

/// Create the data directory with owner-only permissions.
pub fn ensure_data_directory(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o700))?;
    }
    Ok(())
}

fn secure_file(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}
