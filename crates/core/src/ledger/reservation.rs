//! Reservations: amounts held from a payer until charged or released.

use banker_shared::types::{AccountId, Money, ReservationId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::Account;
use super::error::LedgerError;

/// Lifecycle of a reservation.
///
/// `Held -> Settled` once fully charged, `Held -> Released` once the
/// remainder went back to the payer. Both end states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReservationStatus {
    /// Some amount is still held.
    Held,
    /// The whole held amount was charged.
    Settled,
    /// The remainder was returned to the payer.
    Released,
}

impl ReservationStatus {
    /// Persistence code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Held => "H",
            Self::Settled => "S",
            Self::Released => "R",
        }
    }

    /// Parses a persistence code.
    pub fn from_code(code: &str) -> Result<Self, LedgerError> {
        match code {
            "H" => Ok(Self::Held),
            "S" => Ok(Self::Settled),
            "R" => Ok(Self::Released),
            _ => Err(LedgerError::UnknownCode {
                kind: "reservation status",
                code: code.to_string(),
            }),
        }
    }
}

/// An amount moved from a payer into the reservations account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    business_reference: String,
    account_id: AccountId,
    account_reference: String,
    held: Money,
    charged: Money,
    status: ReservationStatus,
    created_at: DateTime<Utc>,
    version: u64,
}

impl Reservation {
    /// Creates a held reservation of `amount` paid by `payer`.
    pub fn new(
        business_reference: &str,
        payer: &Account,
        amount: Money,
    ) -> Result<Self, LedgerError> {
        let business_reference = business_reference.trim();
        if business_reference.is_empty() {
            return Err(LedgerError::BlankReference);
        }
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }

        Ok(Self {
            id: ReservationId::new(),
            business_reference: business_reference.to_string(),
            account_id: payer.id,
            account_reference: payer.reference.clone(),
            held: amount,
            charged: Money::ZERO,
            status: ReservationStatus::Held,
            created_at: Utc::now(),
            version: 0,
        })
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> ReservationId {
        self.id
    }

    /// Caller-supplied key, e.g. a ride id.
    #[must_use]
    pub fn business_reference(&self) -> &str {
        &self.business_reference
    }

    /// The payer's account.
    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    /// The payer's account reference.
    #[must_use]
    pub fn account_reference(&self) -> &str {
        &self.account_reference
    }

    /// Amount originally held.
    #[must_use]
    pub fn held(&self) -> Money {
        self.held
    }

    /// Amount charged so far.
    #[must_use]
    pub fn charged(&self) -> Money {
        self.charged
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    /// When the reservation was made.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Optimistic concurrency version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Amount still held; zero once settled or released.
    #[must_use]
    pub fn remaining(&self) -> Money {
        match self.status {
            ReservationStatus::Held => self.held.checked_sub(self.charged).unwrap_or(Money::ZERO),
            ReservationStatus::Settled | ReservationStatus::Released => Money::ZERO,
        }
    }

    /// Records a charge of `amount` against the held amount.
    pub fn charge(&mut self, amount: Money) -> Result<(), LedgerError> {
        if !amount.is_positive() {
            return Err(LedgerError::NonPositiveAmount(amount));
        }
        let remaining = self.remaining();
        if amount > remaining {
            return Err(LedgerError::InvalidCharge {
                business_reference: self.business_reference.clone(),
                requested: amount,
                reserved: remaining,
            });
        }

        self.charged = self.charged.checked_add(amount)?;
        if self.charged == self.held {
            self.status = ReservationStatus::Settled;
        }
        Ok(())
    }

    /// Marks the reservation released and returns what was still held.
    pub fn release(&mut self) -> Money {
        let remaining = self.remaining();
        if self.status == ReservationStatus::Held {
            self.status = ReservationStatus::Released;
        }
        remaining
    }

    /// The record as it looks after a successful store commit.
    #[must_use]
    pub fn committed(&self) -> Self {
        Self {
            version: self.version + 1,
            ..self.clone()
        }
    }
}
