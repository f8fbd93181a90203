//! # Node Configuration
//!
//! A node is described by one TOML file, normally `config.toml` in the data
//! directory, written by `nomina-node init`. CLI flags override the listen address and ports.
//!
//! ```toml
//! [network]
//! name = "devnet"
//! bind_address = "127.0.0.1"
//! rpc_port = 9841
//! metrics_port = 9842
//!
//! [registrar]
//! tld = "nom"
//! admin = "0x…"
//! payment_recipient = "0x…"
//! signer_public_key = "…"
//!
//! [[registrar.tiers]]
//! bucket = 4
//! registration = "10"
//! renewal = "8"
//!
//! [price_feed]
//! answer = 200000000
//! decimals = 8
//! ```
//!
//! Tier prices here are decimal strings in the reference currency, so
//! `"10"` means ten units rather than ten base units.

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use nomina_contracts::config::ControllerConfig;
use nomina_contracts::pricing::{PriceTiers, TierPrice};
use nomina_contracts::registry::NameRegistry;
use nomina_protocol::amount::ReferenceAmount;
use nomina_protocol::config::{
    chain_id_for_network, DEFAULT_BASE_TLD, DEFAULT_GRACE_PERIOD, DEFAULT_METRICS_PORT,
    DEFAULT_MIN_REGISTRATION_DURATION, DEFAULT_RPC_PORT, PRICE_TIER_COUNT,
};
use nomina_protocol::crypto::hash::{self, Hash32};
use nomina_protocol::crypto::keys::NominaPublicKey;
use nomina_protocol::identity::Address;
use nomina_protocol::oracle::{Quote, StaticPriceFeed};

pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkSection,
    pub registrar: RegistrarSection,
    pub price_feed: PriceFeedSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSection {
    #[serde(default = "default_network")]
    pub name: String,
    /// Overrides the chain id derived from `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Interface the RPC and metrics servers listen on. RPC calls are not
    /// authenticated, so this stays on loopback unless something in front
    /// of the node checks callers.
    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrarSection {
    #[serde(default = "default_tld")]
    pub tld: String,
    pub admin: Address,
    pub payment_recipient: Address,
    /// The controller's own address. Derived from the network name when
    /// omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_address: Option<Address>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer_public_key: Option<NominaPublicKey>,
    /// Hex-encoded allowlist root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist_root: Option<String>,
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    #[serde(default = "default_min_registration")]
    pub min_registration_secs: u64,
    #[serde(default)]
    pub tiers: Vec<TierSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierSection {
    /// 1 through 5; bucket 5 covers every label of five or more characters.
    pub bucket: usize,
    pub registration: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceFeedSection {
    /// Reference-currency price of one native token, scaled by
    /// `10^decimals`.
    pub answer: u64,
    #[serde(default = "default_quote_decimals")]
    pub decimals: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
    /// `EnvFilter` directives used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            filter: default_log_filter(),
        }
    }
}

fn default_network() -> String {
    "devnet".to_string()
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_rpc_port() -> u16 {
    DEFAULT_RPC_PORT
}

fn default_metrics_port() -> u16 {
    DEFAULT_METRICS_PORT
}

fn default_tld() -> String {
    DEFAULT_BASE_TLD.to_string()
}

fn default_grace_period() -> u64 {
    DEFAULT_GRACE_PERIOD
}

fn default_min_registration() -> u64 {
    DEFAULT_MIN_REGISTRATION_DURATION
}

fn default_quote_decimals() -> u32 {
    8
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_filter() -> String {
    "nomina_node=info,nomina_contracts=info,nomina_protocol=info,tower_http=debug".to_string()
}

impl NodeConfig {
    /// A devnet config with the same sample price table `init` writes.
    pub fn devnet(admin: Address, signer: Option<NominaPublicKey>) -> Self {
        let tier = |bucket: usize, registration: &str, renewal: &str| TierSection {
            bucket,
            registration: registration.to_string(),
            renewal: Some(renewal.to_string()),
        };
        Self {
            network: NetworkSection {
                name: default_network(),
                chain_id: None,
                bind_address: default_bind_address(),
                rpc_port: DEFAULT_RPC_PORT,
                metrics_port: DEFAULT_METRICS_PORT,
            },
            registrar: RegistrarSection {
                tld: default_tld(),
                admin,
                payment_recipient: admin,
                controller_address: None,
                signer_public_key: signer,
                allowlist_root: None,
                grace_period_secs: DEFAULT_GRACE_PERIOD,
                min_registration_secs: DEFAULT_MIN_REGISTRATION_DURATION,
                tiers: vec![
                    tier(1, "640", "640"),
                    tier(2, "320", "320"),
                    tier(3, "160", "160"),
                    tier(4, "10", "8"),
                    tier(5, "5", "5"),
                ],
            },
            price_feed: PriceFeedSection {
                answer: 2_0000_0000,
                decimals: 8,
                max_age_secs: None,
            },
            logging: LoggingSection::default(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config in {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
        let contents = toml::to_string_pretty(self).context("failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("failed to write config to {}", path.display()))?;
        Ok(())
    }

    /// Checks everything that can be checked without building the
    /// registrar.
    pub fn validate(&self) -> Result<()> {
        self.chain_id()?;
        self.tiers()?;
        self.allowlist_root()?;
        if self.registrar.admin.is_zero() {
            bail!("registrar.admin must not be the zero address");
        }
        if self.registrar.payment_recipient.is_zero() {
            bail!("registrar.payment_recipient must not be the zero address");
        }
        if self.price_feed.answer == 0 {
            bail!("price_feed.answer must be positive");
        }
        Ok(())
    }

    pub fn chain_id(&self) -> Result<u64> {
        match self.network.chain_id {
            Some(id) => Ok(id),
            None => chain_id_for_network(&self.network.name).ok_or_else(|| {
                anyhow!(
                    "unknown network {:?}; set network.chain_id explicitly",
                    self.network.name
                )
            }),
        }
    }

    pub fn controller_address(&self) -> Address {
        self.registrar.controller_address.unwrap_or_else(|| {
            Address::from_label(&format!("nomina-controller:{}", self.network.name))
        })
    }

    pub fn allowlist_root(&self) -> Result<Option<Hash32>> {
        self.registrar
            .allowlist_root
            .as_deref()
            .map(|s| hash::from_hex(s).ok_or_else(|| anyhow!("invalid allowlist root: {s}")))
            .transpose()
    }

    pub fn tiers(&self) -> Result<PriceTiers> {
        let mut tiers = PriceTiers::default();
        for section in &self.registrar.tiers {
            if section.bucket == 0 || section.bucket > PRICE_TIER_COUNT {
                bail!("tier bucket {} is outside 1..={}", section.bucket, PRICE_TIER_COUNT);
            }
            let registration = parse_price(&section.registration)
                .with_context(|| format!("tier {} registration price", section.bucket))?;
            let renewal = section
                .renewal
                .as_deref()
                .map(parse_price)
                .transpose()
                .with_context(|| format!("tier {} renewal price", section.bucket))?;
            tiers.set(
                section.bucket,
                Some(TierPrice {
                    registration,
                    renewal,
                }),
            )?;
        }
        Ok(tiers)
    }

    pub fn controller_config(&self) -> Result<ControllerConfig> {
        let mut config = ControllerConfig::new(
            self.registrar.admin,
            self.registrar.payment_recipient,
            self.chain_id()?,
            self.controller_address(),
        )
        .with_tiers(self.tiers()?);
        config.signer = self.registrar.signer_public_key;
        config.allowlist_root = self.allowlist_root()?;
        Ok(config)
    }

    pub fn registry(&self) -> Result<NameRegistry> {
        let registry = NameRegistry::new(
            self.registrar.admin,
            self.controller_address(),
            &self.registrar.tld,
        )?
        .with_durations(
            self.registrar.grace_period_secs,
            self.registrar.min_registration_secs,
        );
        Ok(registry)
    }

    pub fn price_feed(&self) -> StaticPriceFeed {
        let quote = Quote::new(
            u128::from(self.price_feed.answer),
            self.price_feed.decimals,
            chrono::Utc::now().timestamp(),
        );
        match self.price_feed.max_age_secs {
            Some(max_age) => StaticPriceFeed::with_max_age(quote, max_age),
            None => StaticPriceFeed::new(quote),
        }
    }
}

fn parse_price(s: &str) -> Result<ReferenceAmount> {
    ReferenceAmount::parse_decimal(s).map_err(|e| anyhow!("invalid price {s:?}: {e}"))
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> NodeConfig {
        NodeConfig::devnet(Address::from_label("admin"), None)
    }

    #[test]
    fn test_config_roundtrip() {
        let dir = tempdir().unwrap();
        let path = config_path(dir.path());
        let config = sample();
        config.save(&path).unwrap();

        let loaded = NodeConfig::load(&path).unwrap();
        assert_eq!(loaded.registrar.admin, config.registrar.admin);
        assert_eq!(loaded.registrar.tiers.len(), 5);
        assert_eq!(loaded.tiers().unwrap(), config.tiers().unwrap());
    }

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let admin = Address::from_label("admin").to_hex();
        let toml = format!(
            r#"
            [network]
            [registrar]
            admin = "{admin}"
            payment_recipient = "{admin}"
            [[registrar.tiers]]
            bucket = 4
            registration = "10"
            renewal = "8"
            [price_feed]
            answer = 200000000
            "#
        );
        let config: NodeConfig = toml::from_str(&toml).unwrap();
        config.validate().unwrap();
        assert_eq!(config.network.rpc_port, DEFAULT_RPC_PORT);
        assert!(config.network.bind_address.is_loopback());
        assert_eq!(config.registrar.tld, "nom");
        assert_eq!(config.logging.format, "pretty");

        let tiers = config.tiers().unwrap();
        assert_eq!(
            tiers.get(4).unwrap(),
            Some(TierPrice::new(
                ReferenceAmount::from_units(10).unwrap(),
                ReferenceAmount::from_units(8).unwrap()
            ))
        );
        assert_eq!(tiers.get(1).unwrap(), None);
    }

    #[test]
    fn test_validation_errors() {
        let mut config = sample();
        config.network.name = "moonnet".into();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.registrar.tiers[0].bucket = 6;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.registrar.tiers[0].registration = "ten".into();
        assert!(config.validate().is_err());

        let mut config = sample();
        config.price_feed.answer = 0;
        assert!(config.validate().is_err());

        let mut config = sample();
        config.registrar.allowlist_root = Some("zz".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builds_registrar_parts() {
        let config = sample();
        let controller = config.controller_config().unwrap();
        let registry = config.registry().unwrap();
        assert_eq!(registry.controller(), controller.controller_address);
        assert_eq!(registry.tld(), "nom");
        assert_eq!(controller.chain_id, config.chain_id().unwrap());
    }
}
