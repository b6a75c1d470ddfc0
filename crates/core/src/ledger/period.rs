//! Ledger periods ("book years").
//!
//! A ledger covers the half-open interval `[start_period, end_period)`.
//! The current ledger is open-ended until the next one is opened.

use banker_shared::types::LedgerId;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::transaction::TransactionBuilder;

/// A bounded (or open-ended) accounting period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    id: LedgerId,
    name: String,
    start_period: DateTime<Utc>,
    end_period: Option<DateTime<Utc>>,
    version: u64,
}

impl Ledger {
    /// Creates a new open-ended ledger starting at `start_period`.
    #[must_use]
    pub fn new(name: impl Into<String>, start_period: DateTime<Utc>) -> Self {
        Self {
            id: LedgerId::new(),
            name: name.into(),
            start_period,
            end_period: None,
            version: 0,
        }
    }

    /// Creates a ledger named after the calendar year of `start_period`.
    #[must_use]
    pub fn starting_at(start_period: DateTime<Utc>) -> Self {
        Self::new(start_period.year().to_string(), start_period)
    }

    /// Unique identifier.
    #[must_use]
    pub fn id(&self) -> LedgerId {
        self.id
    }

    /// Display name, e.g. "2019".
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Inclusive start of the period.
    #[must_use]
    pub fn start_period(&self) -> DateTime<Utc> {
        self.start_period
    }

    /// Exclusive end of the period, `None` while open-ended.
    #[must_use]
    pub fn end_period(&self) -> Option<DateTime<Utc>> {
        self.end_period
    }

    /// Optimistic concurrency version, bumped by the store on each commit.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Returns true while the ledger has no end.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_period.is_none()
    }

    /// Returns true if `instant` falls in `[start_period, end_period)`.
    ///
    /// A missing end is treated as +infinity.
    #[must_use]
    pub fn fits_period(&self, instant: DateTime<Utc>) -> bool {
        self.start_period <= instant && self.end_period.is_none_or(|end| instant < end)
    }

    /// Closes the period at `end_period` (exclusive).
    pub fn close(&mut self, end_period: DateTime<Utc>) -> Result<(), LedgerError> {
        if let Some(existing) = self.end_period {
            return Err(LedgerError::InvalidPeriod {
                ledger: self.name.clone(),
                reason: format!("already closed at {existing}"),
            });
        }
        if end_period <= self.start_period {
            return Err(LedgerError::InvalidPeriod {
                ledger: self.name.clone(),
                reason: format!(
                    "end {end_period} must be after start {}",
                    self.start_period
                ),
            });
        }
        self.end_period = Some(end_period);
        Ok(())
    }

    /// Starts a new balanced transaction posting into this ledger.
    ///
    /// `accounting_time` must fit this ledger; choosing the right ledger for
    /// an instant is the caller's job.
    pub fn create_transaction(
        &self,
        description: impl Into<String>,
        accounting_time: DateTime<Utc>,
        transaction_time: DateTime<Utc>,
    ) -> Result<TransactionBuilder, LedgerError> {
        if !self.fits_period(accounting_time) {
            return Err(LedgerError::AccountingTimeOutsidePeriod {
                ledger: self.name.clone(),
                accounting_time,
            });
        }
        Ok(TransactionBuilder::new(
            self.id,
            description.into(),
            accounting_time,
            transaction_time,
        ))
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 1, 0, 0).unwrap()
    }

    fn ledger_2019() -> Ledger {
        let mut ledger = Ledger::new("2019", at(2019, 1, 1));
        ledger.close(at(2020, 1, 1)).unwrap();
        ledger
    }

    #[rstest]
    #[case(at(2019, 1, 1), true)]
    #[case(at(2020, 1, 1), false)]
    #[case(at(2019, 8, 1), true)]
    #[case(at(2018, 8, 1), false)]
    fn test_fits_period_closed(#[case] instant: DateTime<Utc>, #[case] expected: bool) {
        assert_eq!(ledger_2019().fits_period(instant), expected);
    }

    #[test]
    fn test_fits_period_open_ended() {
        let ledger = Ledger::new("2019", at(2019, 1, 1));
        assert!(ledger.is_open());
        assert!(ledger.fits_period(at(2019, 1, 1)));
        assert!(ledger.fits_period(at(2119, 8, 1)));
        assert!(ledger.fits_period(DateTime::<Utc>::MAX_UTC));
        assert!(!ledger.fits_period(at(2018, 12, 31)));
    }

    #[test]
    fn test_fits_period_just_before_end() {
        let ledger = ledger_2019();
        let end = at(2020, 1, 1);
        assert!(ledger.fits_period(end - chrono::Duration::nanoseconds(1)));
    }

    #[test]
    fn test_close_twice_is_rejected() {
        let mut ledger = ledger_2019();
        assert!(matches!(
            ledger.close(at(2021, 1, 1)),
            Err(LedgerError::InvalidPeriod { .. })
        ));
        assert_eq!(ledger.end_period(), Some(at(2020, 1, 1)));
    }

    #[test]
    fn test_close_before_start_is_rejected() {
        let mut ledger = Ledger::new("2019", at(2019, 1, 1));
        assert!(ledger.close(at(2019, 1, 1)).is_err());
        assert!(ledger.close(at(2018, 6, 1)).is_err());
        assert!(ledger.is_open());
    }

    #[test]
    fn test_starting_at_uses_year_as_name() {
        let ledger = Ledger::starting_at(at(2024, 1, 1));
        assert_eq!(ledger.name(), "2024");
        assert_eq!(ledger.version(), 0);
        assert_eq!(ledger.committed().version(), 1);
    }

    #[test]
    fn test_create_transaction_outside_period() {
        let ledger = ledger_2019();
        let result = ledger.create_transaction("late", at(2020, 2, 1), Utc::now());
        assert!(matches!(
            result,
            Err(LedgerError::AccountingTimeOutsidePeriod { .. })
        ));
        assert!(
            ledger
                .create_transaction("in time", at(2019, 2, 1), Utc::now())
                .is_ok()
        );
    }
}
