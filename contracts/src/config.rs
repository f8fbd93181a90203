//! Controller configuration.
//!
//! All administratively set policy lives in one [`ControllerConfig`]: who
//! the admin is, where proceeds go, the price table, the voucher signer,
//! and the allowlist root. The controller takes it at construction, exposes
//! it read-only through `config()`, and changes it only through
//! admin-gated setters. Test fixtures build alternative configs with the
//! `with_*` helpers instead of poking at controller internals.
//!
//! The price feed is not part of the config: it is a live collaborator,
//! not data, and it is not persisted.

use serde::{Deserialize, Serialize};

use nomina_protocol::config::{TYPED_DATA_DOMAIN_NAME, TYPED_DATA_DOMAIN_VERSION};
use nomina_protocol::crypto::hash::Hash32;
use nomina_protocol::crypto::keys::NominaPublicKey;
use nomina_protocol::crypto::typed_data::TypedDataDomain;
use nomina_protocol::identity::Address;

use crate::pricing::PriceTiers;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerConfig {
    pub admin: Address,
    pub payment_recipient: Address,
    /// Key whose signatures authorize voucher registrations. `None`
    /// disables both signature paths.
    pub signer: Option<NominaPublicKey>,
    /// Allowlist commitment. `None` disables the allowlist path.
    pub allowlist_root: Option<Hash32>,
    pub tiers: PriceTiers,
    /// Chain the vouchers are bound to.
    pub chain_id: u64,
    /// The controller's own address: the registry's trusted caller and the
    /// verifying contract in the voucher domain.
    pub controller_address: Address,
}

impl ControllerConfig {
    pub fn new(
        admin: Address,
        payment_recipient: Address,
        chain_id: u64,
        controller_address: Address,
    ) -> Self {
        Self {
            admin,
            payment_recipient,
            signer: None,
            allowlist_root: None,
            tiers: PriceTiers::default(),
            chain_id,
            controller_address,
        }
    }

    pub fn with_signer(mut self, signer: NominaPublicKey) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_allowlist_root(mut self, root: Hash32) -> Self {
        self.allowlist_root = Some(root);
        self
    }

    pub fn with_tiers(mut self, tiers: PriceTiers) -> Self {
        self.tiers = tiers;
        self
    }

    /// The typed-data domain vouchers must be signed under.
    pub fn typed_data_domain(&self) -> TypedDataDomain {
        TypedDataDomain::new(
            TYPED_DATA_DOMAIN_NAME,
            TYPED_DATA_DOMAIN_VERSION,
            self.chain_id,
            self.controller_address,
        )
    }
}
