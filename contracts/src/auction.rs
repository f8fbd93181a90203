//! Dutch auctions for premium names.
//!
//! An admin groups names into a batch with a start price, an end price, a
//! window start and a window length. Inside the window the auction price
//! falls linearly from start to end. Once the window has elapsed the name
//! carries no premium at all and any path may claim it at the base price.
//!
//! ```text
//!   price
//!     │ start ●
//!     │        ╲
//!     │          ╲
//!     │            ╲
//!     │   end        ●
//!     └───────┬──────┬──────────────▶ time
//!        window_start  window_end
//! ```
//!
//! A name belongs to at most one batch, ever. How a claim path treats an
//! auction-bound name is decided by its [`AuctionPolicy`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

use nomina_protocol::amount::{NativeAmount, ReferenceAmount};
use nomina_protocol::crypto::keys::NominaSignature;

use crate::authorization::{AuctionPolicy, AuctionPurchase, RegistrationVoucher, SignedVoucher};
use crate::controller::{CallContext, RegistrarController, Registration};
use crate::error::RegistrarError;
use crate::events::RegistrarEvent;
use crate::namehash::{self, NameId};

pub type BatchId = u64;

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionBatch {
    pub id: BatchId,
    pub names: Vec<String>,
    pub identifiers: Vec<NameId>,
    pub start_price: ReferenceAmount,
    pub end_price: ReferenceAmount,
    pub window_duration: u64,
    pub window_start: i64,
    /// Paused batches block every claim path inside their window.
    pub active: bool,
}

impl AuctionBatch {
    pub fn window_end(&self) -> i64 {
        self.window_start
            .saturating_add(i64::try_from(self.window_duration).unwrap_or(i64::MAX))
    }

    pub fn has_started(&self, now: i64) -> bool {
        now >= self.window_start
    }

    pub fn is_complete(&self, now: i64) -> bool {
        now >= self.window_end()
    }

    /// Auction price at `now`, clamped to the end price. Fails before the
    /// window opens. Claims only charge it while the window is open.
    pub fn current_price(&self, now: i64) -> Result<ReferenceAmount, RegistrarError> {
        if !self.has_started(now) {
            return Err(RegistrarError::AuctionNotStarted {
                batch_id: self.id,
                starts_at: self.window_start,
            });
        }
        let elapsed = u64::try_from(now - self.window_start)
            .unwrap_or(u64::MAX)
            .min(self.window_duration);
        let spread = self
            .start_price
            .checked_sub(self.end_price)
            .ok_or(RegistrarError::Overflow)?;
        let drop = spread
            .mul_div(u128::from(elapsed), u128::from(self.window_duration))
            .ok_or(RegistrarError::PriceOverflow(spread))?;
        self.start_price
            .checked_sub(drop)
            .ok_or(RegistrarError::Overflow)
    }

    pub fn status(&self, now: i64) -> AuctionStatus {
        let has_started = self.has_started(now);
        let is_complete = self.is_complete(now);
        let window_end = self.window_end();
        AuctionStatus {
            batch_id: self.id,
            current_price: self.current_price(now).ok(),
            time_remaining: u64::try_from(window_end.saturating_sub(now)).unwrap_or(0),
            is_active: self.active && has_started && !is_complete,
            has_started,
            is_complete,
            window_start: self.window_start,
            window_end,
            start_price: self.start_price,
            end_price: self.end_price,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuctionStatus {
    pub batch_id: BatchId,
    /// `None` before the window opens.
    pub current_price: Option<ReferenceAmount>,
    /// Seconds until the window closes, counted from `now`. Before the
    /// window opens this includes the wait for it.
    pub time_remaining: u64,
    /// True only while the window is open and the batch is not paused.
    pub is_active: bool,
    pub has_started: bool,
    pub is_complete: bool,
    pub window_start: i64,
    pub window_end: i64,
    pub start_price: ReferenceAmount,
    pub end_price: ReferenceAmount,
}

/// Where a name stands relative to its auction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionPhase {
    NotInAuction,
    Scheduled { batch_id: BatchId },
    InWindow { batch_id: BatchId },
    WindowElapsed { batch_id: BatchId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuctionPremium {
    pub batch_id: BatchId,
    pub amount: ReferenceAmount,
}

// ---------------------------------------------------------------------------
// AuctionBook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionBook {
    batches: BTreeMap<BatchId, AuctionBatch>,
    membership: HashMap<NameId, BatchId>,
    next_batch_id: BatchId,
}

impl AuctionBook {
    pub fn batch(&self, id: BatchId) -> Option<&AuctionBatch> {
        self.batches.get(&id)
    }

    pub fn batches(&self) -> impl Iterator<Item = &AuctionBatch> {
        self.batches.values()
    }

    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    pub fn batch_of(&self, id: &NameId) -> Option<BatchId> {
        self.membership.get(id).copied()
    }

    pub fn is_in_auction(&self, id: &NameId) -> bool {
        self.membership.contains_key(id)
    }

    pub fn phase(&self, id: &NameId, now: i64) -> AuctionPhase {
        let Some(batch) = self.batch_of(id).and_then(|b| self.batches.get(&b)) else {
            return AuctionPhase::NotInAuction;
        };
        let batch_id = batch.id;
        if !batch.has_started(now) {
            AuctionPhase::Scheduled { batch_id }
        } else if !batch.is_complete(now) {
            AuctionPhase::InWindow { batch_id }
        } else {
            AuctionPhase::WindowElapsed { batch_id }
        }
    }

    /// The auction component of a claim's price under `policy`, or the
    /// reason the claim may not proceed right now.
    pub fn premium(
        &self,
        id: &NameId,
        label: &str,
        policy: AuctionPolicy,
        now: i64,
    ) -> Result<Option<AuctionPremium>, RegistrarError> {
        let phase = self.phase(id, now);
        let batch_id = match phase {
            AuctionPhase::NotInAuction => {
                return match policy {
                    AuctionPolicy::AuctionOnly => Err(RegistrarError::NotInAuction {
                        name: label.to_string(),
                    }),
                    _ => Ok(None),
                };
            }
            AuctionPhase::Scheduled { batch_id }
            | AuctionPhase::InWindow { batch_id }
            | AuctionPhase::WindowElapsed { batch_id } => batch_id,
        };
        let batch = self
            .batches
            .get(&batch_id)
            .ok_or(RegistrarError::UnknownBatch(batch_id))?;

        match (phase, policy) {
            (AuctionPhase::Scheduled { .. }, _) => Err(RegistrarError::AuctionNotStarted {
                batch_id,
                starts_at: batch.window_start,
            }),
            (AuctionPhase::InWindow { .. }, _) if !batch.active => {
                Err(RegistrarError::AuctionPaused { batch_id })
            }
            (AuctionPhase::InWindow { .. }, AuctionPolicy::RejectInWindow) => {
                Err(RegistrarError::InAuction {
                    name: label.to_string(),
                })
            }
            (AuctionPhase::NotInAuction, _) | (AuctionPhase::WindowElapsed { .. }, _) => Ok(None),
            (AuctionPhase::InWindow { .. }, _) => Ok(Some(AuctionPremium {
                batch_id,
                amount: batch.current_price(now)?,
            })),
        }
    }

    /// Validates and stores a new batch. Names are labels that have already
    /// been resolved to identifiers.
    pub(crate) fn insert(
        &mut self,
        names: Vec<(String, NameId)>,
        start_price: ReferenceAmount,
        end_price: ReferenceAmount,
        window_duration: u64,
        window_start: i64,
    ) -> Result<BatchId, RegistrarError> {
        if names.is_empty() {
            return Err(RegistrarError::InvalidAuctionParameters(
                "batch has no names".into(),
            ));
        }
        if window_duration == 0 {
            return Err(RegistrarError::InvalidAuctionParameters(
                "window duration must be positive".into(),
            ));
        }
        if end_price > start_price {
            return Err(RegistrarError::InvalidAuctionParameters(
                "end price exceeds start price".into(),
            ));
        }
        for (i, (name, id)) in names.iter().enumerate() {
            if let Some(batch_id) = self.batch_of(id) {
                return Err(RegistrarError::AlreadyInAuction {
                    name: name.clone(),
                    batch_id,
                });
            }
            if names[..i].iter().any(|(_, other)| other == id) {
                return Err(RegistrarError::InvalidAuctionParameters(format!(
                    "{name} listed twice"
                )));
            }
        }

        let id = self.next_batch_id;
        self.next_batch_id += 1;
        let (names, identifiers): (Vec<_>, Vec<_>) = names.into_iter().unzip();
        for name_id in &identifiers {
            self.membership.insert(*name_id, id);
        }
        self.batches.insert(
            id,
            AuctionBatch {
                id,
                names,
                identifiers,
                start_price,
                end_price,
                window_duration,
                window_start,
                active: true,
            },
        );
        Ok(id)
    }

    pub(crate) fn set_active(&mut self, batch_id: BatchId, active: bool) -> Result<(), RegistrarError> {
        let batch = self
            .batches
            .get_mut(&batch_id)
            .ok_or(RegistrarError::UnknownBatch(batch_id))?;
        batch.active = active;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Controller entry points
// ---------------------------------------------------------------------------

impl RegistrarController {
    /// Puts `names` up for auction. Admin only.
    pub fn create_auction_batch(
        &mut self,
        ctx: &CallContext,
        names: &[&str],
        start_price: ReferenceAmount,
        end_price: ReferenceAmount,
        window_duration: u64,
        window_start: i64,
    ) -> Result<BatchId, RegistrarError> {
        self.require_admin(ctx, "create auction batches")?;
        let base = self.registry.base_node();
        let mut resolved = Vec::with_capacity(names.len());
        for name in names {
            let label = namehash::top_level_label(name, self.registry.tld())?;
            resolved.push((label.to_string(), namehash::namehash(&base, label)));
        }
        let labels: Vec<String> = resolved.iter().map(|(l, _)| l.clone()).collect();

        let batch_id =
            self.auctions
                .insert(resolved, start_price, end_price, window_duration, window_start)?;

        info!(
            batch_id,
            names = labels.len(),
            start = %start_price,
            end = %end_price,
            window_start,
            window_duration,
            "auction batch created"
        );
        self.registry.emit(RegistrarEvent::AuctionBatchCreated {
            batch_id,
            names: labels,
            start_price,
            end_price,
            window_start,
            window_duration,
        });
        Ok(batch_id)
    }

    /// Pauses or resumes a batch. Admin only.
    pub fn set_auction_batch_active(
        &mut self,
        ctx: &CallContext,
        batch_id: BatchId,
        active: bool,
    ) -> Result<(), RegistrarError> {
        self.require_admin(ctx, "toggle auction batches")?;
        self.auctions.set_active(batch_id, active)?;
        info!(batch_id, active, "auction batch toggled");
        self.registry
            .emit(RegistrarEvent::AuctionBatchToggled { batch_id, active });
        Ok(())
    }

    pub fn current_auction_price(
        &self,
        batch_id: BatchId,
        now: i64,
    ) -> Result<ReferenceAmount, RegistrarError> {
        self.auctions
            .batch(batch_id)
            .ok_or(RegistrarError::UnknownBatch(batch_id))?
            .current_price(now)
    }

    pub fn get_auction_status(
        &self,
        batch_id: BatchId,
        now: i64,
    ) -> Result<AuctionStatus, RegistrarError> {
        Ok(self
            .auctions
            .batch(batch_id)
            .ok_or(RegistrarError::UnknownBatch(batch_id))?
            .status(now))
    }

    pub fn is_in_auction(&self, name: &str) -> Result<bool, RegistrarError> {
        Ok(self.auctions.is_in_auction(&self.registry.identifier_of(name)?))
    }

    pub fn auction_phase(&self, name: &str, now: i64) -> Result<AuctionPhase, RegistrarError> {
        Ok(self.auctions.phase(&self.registry.identifier_of(name)?, now))
    }

    /// Buys an auction-bound name at base price plus the current auction
    /// price, refusing if the total exceeds `price_ceiling`. After the window
    /// only the base price is due.
    pub fn purchase_auction(
        &mut self,
        ctx: &CallContext,
        name: &str,
        duration: u64,
        price_ceiling: NativeAmount,
    ) -> Result<Registration, RegistrarError> {
        self.claim(
            ctx,
            &AuctionPurchase {
                name,
                duration,
                price_ceiling,
            },
        )
    }

    /// Signature claim of an auction-bound name. The voucher is signed over
    /// the auction digest, so a plain registration voucher won't do.
    pub fn register_auction_with_signature(
        &mut self,
        ctx: &CallContext,
        voucher: &RegistrationVoucher,
        signature: &NominaSignature,
    ) -> Result<Registration, RegistrarError> {
        self.claim(
            ctx,
            &SignedVoucher {
                voucher,
                signature,
                auction: true,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const START: i64 = 10_000;
    const DAY: u64 = 86_400;

    fn usd(units: u128) -> ReferenceAmount {
        ReferenceAmount::from_units(units).unwrap()
    }

    fn book_with(names: &[&str]) -> (AuctionBook, Vec<NameId>) {
        let base = namehash::base_node("nom");
        let resolved: Vec<_> = names
            .iter()
            .map(|n| (n.to_string(), namehash::namehash(&base, n)))
            .collect();
        let ids = resolved.iter().map(|(_, id)| *id).collect();
        let mut book = AuctionBook::default();
        book.insert(resolved, usd(10), usd(1), DAY, START).unwrap();
        (book, ids)
    }

    #[test]
    fn test_linear_decay() {
        let (book, _) = book_with(&["gold"]);
        let batch = book.batch(0).unwrap();
        assert_eq!(batch.current_price(START).unwrap(), usd(10));
        assert_eq!(
            batch.current_price(START + 43_200).unwrap(),
            ReferenceAmount::parse_decimal("5.5").unwrap()
        );
        assert_eq!(batch.current_price(START + DAY as i64).unwrap(), usd(1));
        assert_eq!(batch.current_price(START + 10 * DAY as i64).unwrap(), usd(1));
        assert!(matches!(
            batch.current_price(START - 1),
            Err(RegistrarError::AuctionNotStarted { batch_id: 0, starts_at: START })
        ));
    }

    #[test]
    fn test_status_before_and_during() {
        let (book, _) = book_with(&["gold"]);
        let batch = book.batch(0).unwrap();
        let before = batch.status(START - 5);
        assert!(!before.has_started);
        assert_eq!(before.current_price, None);
        assert!(!before.is_active);
        assert_eq!(before.time_remaining, DAY + 5);

        let during = batch.status(START + 100);
        assert!(during.is_active && during.has_started && !during.is_complete);
        assert_eq!(during.time_remaining, DAY - 100);

        let after = batch.status(START + DAY as i64 + 1);
        assert!(after.is_complete && !after.is_active);
        assert_eq!(after.time_remaining, 0);
        assert_eq!(after.current_price, Some(usd(1)));
    }

    #[test]
    fn test_phases() {
        let (book, ids) = book_with(&["gold"]);
        let other = namehash::namehash(&namehash::base_node("nom"), "plain");
        assert_eq!(book.phase(&other, START), AuctionPhase::NotInAuction);
        assert_eq!(book.phase(&ids[0], START - 1), AuctionPhase::Scheduled { batch_id: 0 });
        assert_eq!(book.phase(&ids[0], START), AuctionPhase::InWindow { batch_id: 0 });
        assert_eq!(
            book.phase(&ids[0], START + DAY as i64),
            AuctionPhase::WindowElapsed { batch_id: 0 }
        );
    }

    #[test]
    fn test_premium_by_policy() {
        let (mut book, ids) = book_with(&["gold"]);
        let mid = START + 43_200;
        let half = ReferenceAmount::parse_decimal("5.5").unwrap();

        assert!(matches!(
            book.premium(&ids[0], "gold", AuctionPolicy::RejectInWindow, mid),
            Err(RegistrarError::InAuction { .. })
        ));
        assert_eq!(
            book.premium(&ids[0], "gold", AuctionPolicy::ChargePremiumInWindow, mid)
                .unwrap()
                .map(|p| p.amount),
            Some(half)
        );

        let after = START + 2 * DAY as i64;
        assert_eq!(
            book.premium(&ids[0], "gold", AuctionPolicy::RejectInWindow, after).unwrap(),
            None
        );
        assert_eq!(
            book.premium(&ids[0], "gold", AuctionPolicy::AuctionOnly, after).unwrap(),
            None
        );

        book.set_active(0, false).unwrap();
        for policy in [
            AuctionPolicy::RejectInWindow,
            AuctionPolicy::ChargePremiumInWindow,
            AuctionPolicy::AuctionOnly,
        ] {
            assert_eq!(
                book.premium(&ids[0], "gold", policy, mid),
                Err(RegistrarError::AuctionPaused { batch_id: 0 })
            );
            assert_eq!(book.premium(&ids[0], "gold", policy, after).unwrap(), None);
        }
    }

    #[test]
    fn test_insert_rejects_bad_batches() {
        let (mut book, ids) = book_with(&["gold"]);
        let base = namehash::base_node("nom");
        let silver = ("silver".to_string(), namehash::namehash(&base, "silver"));

        assert!(matches!(
            book.insert(vec![], usd(1), usd(1), DAY, START),
            Err(RegistrarError::InvalidAuctionParameters(_))
        ));
        assert!(matches!(
            book.insert(vec![silver.clone()], usd(1), usd(2), DAY, START),
            Err(RegistrarError::InvalidAuctionParameters(_))
        ));
        assert!(matches!(
            book.insert(vec![silver.clone()], usd(2), usd(1), 0, START),
            Err(RegistrarError::InvalidAuctionParameters(_))
        ));
        assert!(matches!(
            book.insert(vec![silver.clone(), silver.clone()], usd(2), usd(1), DAY, START),
            Err(RegistrarError::InvalidAuctionParameters(_))
        ));
        assert_eq!(
            book.insert(vec![("gold".into(), ids[0])], usd(2), usd(1), DAY, START),
            Err(RegistrarError::AlreadyInAuction {
                name: "gold".into(),
                batch_id: 0
            })
        );
        assert_eq!(book.batch_count(), 1);
        assert_eq!(book.insert(vec![silver], usd(2), usd(2), DAY, START).unwrap(), 1);
    }
}
