//! # Name Registry
//!
//! The ledger of names: who owns what, until when. The registry knows
//! nothing about prices or signatures. It trusts exactly one address, the
//! **controller**, to create and extend top-level names, and it enforces the
//! lifecycle rules that hold no matter who is calling.
//!
//! ## Lifecycle
//!
//! ```text
//!              register                     expiry         expiry + grace
//!   (none) ─────────────▶ Active ───────────────▶ InGrace ─────────────▶ Expired
//!                           ▲   renew               │  renew                │
//!                           └───────────────────────┘                       │
//!                           ▲              register (fresh claim)           │
//!                           └───────────────────────────────────────────────┘
//! ```
//!
//! - **Active** (`now < expiry`): transferable by the owner, the owner's
//!   approved delegate, or the registry admin.
//! - **InGrace** (`expiry <= now < expiry + grace`): renewable, not
//!   transferable by anyone, not available to others.
//! - **Expired**: available. A fresh registration reuses the identifier and
//!   reassigns ownership. Records are never deleted.
//!
//! Renewal adds to the prior expiry, including during the grace period, so
//! a late renewal never shortens or gifts time.
//!
//! ## Event log
//!
//! The registry owns the registrar's event outbox. Components layered on
//! top (controller, auctions) append to the same log so one drain returns
//! a call's events in order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use nomina_protocol::config::{DEFAULT_GRACE_PERIOD, DEFAULT_MIN_REGISTRATION_DURATION};
use nomina_protocol::identity::Address;

use crate::error::RegistrarError;
use crate::events::{EventLog, RegistrarEvent};
use crate::namehash::{self, NameId};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Lifecycle state of a record at a given time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameStatus {
    Active,
    InGrace,
    Expired,
}

impl std::fmt::Display for NameStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NameStatus::Active => write!(f, "Active"),
            NameStatus::InGrace => write!(f, "InGrace"),
            NameStatus::Expired => write!(f, "Expired"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameRecord {
    pub id: NameId,
    /// Full name without the TLD, e.g. `"alice"` or `"pay.alice"`.
    pub name: String,
    pub parent: NameId,
    pub owner: Address,
    pub expiry: i64,
    /// Single address allowed to transfer on the owner's behalf.
    pub approved: Option<Address>,
    pub registered_at: i64,
}

impl NameRecord {
    /// The leftmost label, which is what pricing looks at.
    pub fn label(&self) -> &str {
        self.name.split('.').next().unwrap_or(&self.name)
    }

    pub fn status(&self, now: i64, grace_period: u64) -> NameStatus {
        if now < self.expiry {
            NameStatus::Active
        } else if now < grace_end(self.expiry, grace_period) {
            NameStatus::InGrace
        } else {
            NameStatus::Expired
        }
    }
}

fn grace_end(expiry: i64, grace_period: u64) -> i64 {
    expiry.saturating_add(i64::try_from(grace_period).unwrap_or(i64::MAX))
}

/// `ts + secs`, failing instead of wrapping.
pub fn add_seconds(ts: i64, secs: u64) -> Result<i64, RegistrarError> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| ts.checked_add(s))
        .ok_or(RegistrarError::Overflow)
}

fn unauthorized(caller: Address, action: &'static str) -> RegistrarError {
    warn!(%caller, action, "rejected unauthorized registry call");
    RegistrarError::Unauthorized { caller, action }
}

// ---------------------------------------------------------------------------
// NameRegistry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NameRegistry {
    admin: Address,
    controller: Address,
    tld: String,
    base_node: NameId,
    grace_period: u64,
    min_registration_duration: u64,
    records: HashMap<NameId, NameRecord>,
    events: EventLog,
}

impl NameRegistry {
    /// A registry for `.tld` with default grace period and minimum
    /// registration duration.
    pub fn new(admin: Address, controller: Address, tld: &str) -> Result<Self, RegistrarError> {
        namehash::validate_label(tld)?;
        Ok(Self {
            admin,
            controller,
            tld: tld.to_string(),
            base_node: namehash::base_node(tld),
            grace_period: DEFAULT_GRACE_PERIOD,
            min_registration_duration: DEFAULT_MIN_REGISTRATION_DURATION,
            records: HashMap::new(),
            events: EventLog::default(),
        })
    }

    pub fn with_durations(mut self, grace_period: u64, min_registration_duration: u64) -> Self {
        self.grace_period = grace_period;
        self.min_registration_duration = min_registration_duration;
        self
    }

    // -- Accessors ----------------------------------------------------------

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn controller(&self) -> Address {
        self.controller
    }

    pub fn tld(&self) -> &str {
        &self.tld
    }

    pub fn base_node(&self) -> NameId {
        self.base_node
    }

    pub fn grace_period(&self) -> u64 {
        self.grace_period
    }

    pub fn min_registration_duration(&self) -> u64 {
        self.min_registration_duration
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn records(&self) -> impl Iterator<Item = &NameRecord> {
        self.records.values()
    }

    // -- Lookups ------------------------------------------------------------

    pub fn identifier_of(&self, name: &str) -> Result<NameId, RegistrarError> {
        namehash::resolve(&self.base_node, name, &self.tld)
    }

    pub fn record(&self, id: &NameId) -> Option<&NameRecord> {
        self.records.get(id)
    }

    pub fn record_by_name(&self, name: &str) -> Result<Option<&NameRecord>, RegistrarError> {
        Ok(self.records.get(&self.identifier_of(name)?))
    }

    pub fn owner_of(&self, id: &NameId) -> Option<Address> {
        self.records.get(id).map(|r| r.owner)
    }

    pub fn expiry_of(&self, id: &NameId) -> Option<i64> {
        self.records.get(id).map(|r| r.expiry)
    }

    pub fn name_of(&self, id: &NameId) -> Option<&str> {
        self.records.get(id).map(|r| r.name.as_str())
    }

    pub fn status_of(&self, id: &NameId, now: i64) -> Option<NameStatus> {
        self.records
            .get(id)
            .map(|r| r.status(now, self.grace_period))
    }

    pub fn is_active(&self, id: &NameId, now: i64) -> bool {
        self.records.get(id).map_or(false, |r| now < r.expiry)
    }

    /// No record, or the grace period has fully lapsed.
    pub fn is_available_id(&self, id: &NameId, now: i64) -> bool {
        self.records
            .get(id)
            .map_or(true, |r| now >= grace_end(r.expiry, self.grace_period))
    }

    pub fn available(&self, name: &str, now: i64) -> Result<bool, RegistrarError> {
        Ok(self.is_available_id(&self.identifier_of(name)?, now))
    }

    // -- Pre-flight checks --------------------------------------------------

    /// Everything [`register`](Self::register) checks except the caller.
    /// Returns the identifier and the normalized label.
    pub fn check_registrable(
        &self,
        name: &str,
        duration: u64,
        now: i64,
    ) -> Result<(NameId, String), RegistrarError> {
        let label = namehash::top_level_label(name, &self.tld)?;
        if duration < self.min_registration_duration {
            return Err(RegistrarError::DurationTooShort {
                duration,
                minimum: self.min_registration_duration,
            });
        }
        let id = namehash::namehash(&self.base_node, label);
        if !self.is_available_id(&id, now) {
            return Err(RegistrarError::NotAvailable {
                name: label.to_string(),
            });
        }
        add_seconds(now, duration)?;
        Ok((id, label.to_string()))
    }

    /// Everything [`renew`](Self::renew) checks except the caller. Returns
    /// the record and its new expiry.
    pub fn check_renewable(
        &self,
        id: &NameId,
        extra: u64,
        now: i64,
    ) -> Result<(&NameRecord, i64), RegistrarError> {
        let record = self
            .records
            .get(id)
            .ok_or_else(|| RegistrarError::UnknownName(id.to_hex()))?;
        if extra == 0 {
            return Err(RegistrarError::ZeroDuration);
        }
        if now >= grace_end(record.expiry, self.grace_period) {
            return Err(RegistrarError::Expired {
                name: record.name.clone(),
                expiry: record.expiry,
            });
        }
        let new_expiry = add_seconds(record.expiry, extra)?;
        Ok((record, new_expiry))
    }

    // -- Controller operations ----------------------------------------------

    /// Claims a top-level name. Controller only.
    pub fn register(
        &mut self,
        caller: Address,
        name: &str,
        owner: Address,
        duration: u64,
        now: i64,
    ) -> Result<(NameId, i64), RegistrarError> {
        if caller != self.controller {
            return Err(unauthorized(caller, "register names"));
        }
        if owner.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        let (id, label) = self.check_registrable(name, duration, now)?;
        let expiry = add_seconds(now, duration)?;

        let previous_owner = self.records.get(&id).map(|r| r.owner);
        self.records.insert(
            id,
            NameRecord {
                id,
                name: label.clone(),
                parent: self.base_node,
                owner,
                expiry,
                approved: None,
                registered_at: now,
            },
        );

        info!(name = %label, %owner, expiry, "name registered");
        self.events.emit(RegistrarEvent::NameRegistered {
            id,
            name: label,
            owner,
            expiry,
            previous_owner,
        });
        Ok((id, expiry))
    }

    /// Extends a record's expiry by `extra`. Controller only. Works during
    /// the grace period; fails after it.
    pub fn renew(
        &mut self,
        caller: Address,
        id: &NameId,
        extra: u64,
        now: i64,
    ) -> Result<i64, RegistrarError> {
        if caller != self.controller {
            return Err(unauthorized(caller, "renew names"));
        }
        let (_, new_expiry) = self.check_renewable(id, extra, now)?;
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistrarError::UnknownName(id.to_hex()))?;
        record.expiry = new_expiry;

        info!(name = %record.name, expiry = new_expiry, "name renewed");
        let event = RegistrarEvent::NameRenewed {
            id: *id,
            name: record.name.clone(),
            expiry: new_expiry,
        };
        self.events.emit(event);
        Ok(new_expiry)
    }

    // -- Owner operations ---------------------------------------------------

    /// Moves a name from `from` to `to`.
    ///
    /// The caller must be the owner, the approved delegate, or the registry
    /// admin. Nobody can transfer once `now >= expiry`, grace period
    /// included.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        id: &NameId,
        from: Address,
        to: Address,
        now: i64,
    ) -> Result<(), RegistrarError> {
        let admin = self.admin;
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistrarError::UnknownName(id.to_hex()))?;

        if now >= record.expiry {
            return Err(RegistrarError::Expired {
                name: record.name.clone(),
                expiry: record.expiry,
            });
        }
        let authorized =
            caller == record.owner || record.approved == Some(caller) || caller == admin;
        if !authorized {
            return Err(unauthorized(caller, "transfer this name"));
        }
        if from != record.owner {
            return Err(RegistrarError::OwnerMismatch { claimed: from });
        }
        if to.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }

        record.owner = to;
        record.approved = None;
        info!(name = %record.name, %from, %to, "name transferred");
        self.events.emit(RegistrarEvent::Transfer { id: *id, from, to });
        Ok(())
    }

    /// Sets (or clears) the single transfer delegate. Owner only, active
    /// names only.
    pub fn approve(
        &mut self,
        caller: Address,
        id: &NameId,
        delegate: Option<Address>,
        now: i64,
    ) -> Result<(), RegistrarError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| RegistrarError::UnknownName(id.to_hex()))?;
        if now >= record.expiry {
            return Err(RegistrarError::Expired {
                name: record.name.clone(),
                expiry: record.expiry,
            });
        }
        if caller != record.owner {
            return Err(unauthorized(caller, "approve a delegate for this name"));
        }
        record.approved = delegate;
        self.events.emit(RegistrarEvent::Approval {
            id: *id,
            owner: caller,
            delegate,
        });
        Ok(())
    }

    /// Creates or overwrites `label` under `parent`.
    ///
    /// The parent must be active and the caller must be its owner or the
    /// controller. An existing sub-record is replaced outright, whatever
    /// its owner or expiry: the parent always controls its subtree.
    pub fn register_subname(
        &mut self,
        caller: Address,
        label: &str,
        parent: &NameId,
        owner: Address,
        duration: u64,
        now: i64,
    ) -> Result<(NameId, i64), RegistrarError> {
        namehash::validate_label(label)?;
        let parent_record = self
            .records
            .get(parent)
            .ok_or_else(|| RegistrarError::UnknownName(parent.to_hex()))?;
        if now >= parent_record.expiry {
            return Err(RegistrarError::InactiveParent {
                name: parent_record.name.clone(),
            });
        }
        if caller != parent_record.owner && caller != self.controller {
            return Err(unauthorized(caller, "create sub-names under this parent"));
        }
        if owner.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        if duration == 0 {
            return Err(RegistrarError::ZeroDuration);
        }
        let expiry = add_seconds(now, duration)?;

        let id = namehash::namehash(parent, label);
        let name = format!("{label}.{}", parent_record.name);
        let previous_owner = self.records.get(&id).map(|r| r.owner);
        if let Some(prev) = previous_owner {
            info!(%name, previous_owner = %prev, "overwriting sub-name");
        }
        self.records.insert(
            id,
            NameRecord {
                id,
                name: name.clone(),
                parent: *parent,
                owner,
                expiry,
                approved: None,
                registered_at: now,
            },
        );

        info!(%name, %owner, expiry, "sub-name registered");
        self.events.emit(RegistrarEvent::SubnameRegistered {
            id,
            parent: *parent,
            name,
            owner,
            expiry,
            previous_owner,
        });
        Ok((id, expiry))
    }

    // -- Admin operations ---------------------------------------------------

    fn require_admin(&self, caller: Address, action: &'static str) -> Result<(), RegistrarError> {
        if caller != self.admin {
            return Err(unauthorized(caller, action));
        }
        Ok(())
    }

    pub fn set_controller(
        &mut self,
        caller: Address,
        controller: Address,
    ) -> Result<(), RegistrarError> {
        self.require_admin(caller, "replace the registry controller")?;
        self.controller = controller;
        info!(%controller, "registry controller changed");
        self.events
            .emit(RegistrarEvent::RegistryControllerChanged { controller });
        Ok(())
    }

    pub fn set_grace_period(&mut self, caller: Address, seconds: u64) -> Result<(), RegistrarError> {
        self.require_admin(caller, "change the grace period")?;
        self.grace_period = seconds;
        self.events.emit(RegistrarEvent::GracePeriodChanged { seconds });
        Ok(())
    }

    pub fn set_min_registration_duration(
        &mut self,
        caller: Address,
        seconds: u64,
    ) -> Result<(), RegistrarError> {
        self.require_admin(caller, "change the minimum registration duration")?;
        self.min_registration_duration = seconds;
        self.events
            .emit(RegistrarEvent::MinRegistrationDurationChanged { seconds });
        Ok(())
    }

    pub fn transfer_admin(&mut self, caller: Address, admin: Address) -> Result<(), RegistrarError> {
        self.require_admin(caller, "transfer registry admin")?;
        if admin.is_zero() {
            return Err(RegistrarError::ZeroAddress);
        }
        self.admin = admin;
        info!(%admin, "registry admin changed");
        self.events.emit(RegistrarEvent::RegistryAdminChanged { admin });
        Ok(())
    }

    // -- Events -------------------------------------------------------------

    pub(crate) fn emit(&mut self, event: RegistrarEvent) {
        self.events.emit(event);
    }

    pub fn pending_events(&self) -> &[RegistrarEvent] {
        self.events.pending()
    }

    pub fn drain_events(&mut self) -> Vec<RegistrarEvent> {
        self.events.drain()
    }

    pub fn total_events(&self) -> u64 {
        self.events.total()
    }
}
