//! # Registrar Events
//!
//! Every successful state change appends one or more [`RegistrarEvent`]s.
//! Failed calls append nothing. The [`EventLog`] is an outbox: the host
//! drains it after each call to persist and broadcast the events.

use serde::{Deserialize, Serialize};

use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::identity::Address;

use crate::auction::BatchId;
use crate::authorization::ClaimPath;
use crate::namehash::NameId;
use crate::pricing::TierPrice;

/// Why an account's withdrawable balance went up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditReason {
    /// Registration or renewal proceeds for the payment recipient.
    Proceeds,
    /// Overpayment returned to the caller.
    Refund,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrarEvent {
    // -- Registry ---------------------------------------------------------
    NameRegistered {
        id: NameId,
        name: String,
        owner: Address,
        expiry: i64,
        previous_owner: Option<Address>,
    },
    NameRenewed {
        id: NameId,
        name: String,
        expiry: i64,
    },
    Transfer {
        id: NameId,
        from: Address,
        to: Address,
    },
    Approval {
        id: NameId,
        owner: Address,
        delegate: Option<Address>,
    },
    SubnameRegistered {
        id: NameId,
        parent: NameId,
        name: String,
        owner: Address,
        expiry: i64,
        previous_owner: Option<Address>,
    },
    RegistryControllerChanged {
        controller: Address,
    },
    RegistryAdminChanged {
        admin: Address,
    },
    GracePeriodChanged {
        seconds: u64,
    },
    MinRegistrationDurationChanged {
        seconds: u64,
    },

    // -- Controller -------------------------------------------------------
    NameClaimed {
        id: NameId,
        name: String,
        owner: Address,
        payer: Address,
        path: ClaimPath,
        base_price: ReferenceAmount,
        auction_premium: ReferenceAmount,
        price: NativeAmount,
    },
    RenewalPaid {
        id: NameId,
        payer: Address,
        price: NativeAmount,
    },
    NonceConsumed {
        owner: Address,
        nonce: u64,
    },
    AllowlistUsed {
        account: Address,
    },
    ReservationChanged {
        id: NameId,
        name: String,
        holder: Option<Address>,
    },
    PaymentCredited {
        account: Address,
        amount: NativeAmount,
        reason: CreditReason,
    },
    Withdrawal {
        account: Address,
        amount: NativeAmount,
    },
    TierChanged {
        bucket: usize,
        tier: Option<TierPrice>,
    },
    PaymentRecipientChanged {
        recipient: Address,
    },
    AllowlistRootChanged {
        root: Option<String>,
    },
    SignerKeyChanged {
        signer: Option<String>,
    },
    PriceFeedChanged {
        feed: String,
    },
    ControllerAdminChanged {
        admin: Address,
    },

    // -- Auctions ---------------------------------------------------------
    AuctionBatchCreated {
        batch_id: BatchId,
        names: Vec<String>,
        start_price: ReferenceAmount,
        end_price: ReferenceAmount,
        window_start: i64,
        window_duration: u64,
    },
    AuctionBatchToggled {
        batch_id: BatchId,
        active: bool,
    },
}

impl RegistrarEvent {
    /// Short name for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            RegistrarEvent::NameRegistered { .. } => "name_registered",
            RegistrarEvent::NameRenewed { .. } => "name_renewed",
            RegistrarEvent::Transfer { .. } => "transfer",
            RegistrarEvent::Approval { .. } => "approval",
            RegistrarEvent::SubnameRegistered { .. } => "subname_registered",
            RegistrarEvent::RegistryControllerChanged { .. } => "registry_controller_changed",
            RegistrarEvent::RegistryAdminChanged { .. } => "registry_admin_changed",
            RegistrarEvent::GracePeriodChanged { .. } => "grace_period_changed",
            RegistrarEvent::MinRegistrationDurationChanged { .. } => {
                "min_registration_duration_changed"
            }
            RegistrarEvent::NameClaimed { .. } => "name_claimed",
            RegistrarEvent::RenewalPaid { .. } => "renewal_paid",
            RegistrarEvent::NonceConsumed { .. } => "nonce_consumed",
            RegistrarEvent::AllowlistUsed { .. } => "allowlist_used",
            RegistrarEvent::ReservationChanged { .. } => "reservation_changed",
            RegistrarEvent::PaymentCredited { .. } => "payment_credited",
            RegistrarEvent::Withdrawal { .. } => "withdrawal",
            RegistrarEvent::TierChanged { .. } => "tier_changed",
            RegistrarEvent::PaymentRecipientChanged { .. } => "payment_recipient_changed",
            RegistrarEvent::AllowlistRootChanged { .. } => "allowlist_root_changed",
            RegistrarEvent::SignerKeyChanged { .. } => "signer_key_changed",
            RegistrarEvent::PriceFeedChanged { .. } => "price_feed_changed",
            RegistrarEvent::ControllerAdminChanged { .. } => "controller_admin_changed",
            RegistrarEvent::AuctionBatchCreated { .. } => "auction_batch_created",
            RegistrarEvent::AuctionBatchToggled { .. } => "auction_batch_toggled",
        }
    }
}

/// Outbox of events not yet collected by the host.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventLog {
    #[serde(skip)]
    pending: Vec<RegistrarEvent>,
    /// Events ever emitted, drained or not.
    total: u64,
}

impl EventLog {
    pub fn emit(&mut self, event: RegistrarEvent) {
        tracing::trace!(kind = event.kind(), "event");
        self.pending.push(event);
        self.total += 1;
    }

    pub fn pending(&self) -> &[RegistrarEvent] {
        &self.pending
    }

    pub fn drain(&mut self) -> Vec<RegistrarEvent> {
        std::mem::take(&mut self.pending)
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}
