//! Aggregation state
//!
//! Accumulates per-week totals, per-week unique users and per-user totals from
//! reward transfers. Purely in memory; persistence goes through published
//! reports, which can be fed back with [`AggregationState::seed_from_report`].

use crate::records::AllTimeLeaderboard;
use crate::types::TransferEvent;
use crate::usdc::parse_usdc;
use crate::week::{WeekCalendar, WeekKey};
use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Totals for one reward week.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeekBucket {
    pub total: U256,
    pub users: BTreeSet<Address>,
}

/// Totals for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAggregate {
    pub address: Address,
    pub all_time: U256,
    /// Only weeks with a non-zero total
    pub per_week: BTreeMap<WeekKey, U256>,
}

impl UserAggregate {
    fn new(address: Address) -> Self {
        Self {
            address,
            all_time: U256::ZERO,
            per_week: BTreeMap::new(),
        }
    }

    pub fn week_total(&self, key: WeekKey) -> U256 {
        self.per_week.get(&key).copied().unwrap_or(U256::ZERO)
    }
}

/// Additive reward accounting.
///
/// Users keep the order in which they were first seen; report sorting is
/// stable, so that order breaks ties.
#[derive(Debug, Clone)]
pub struct AggregationState {
    calendar: WeekCalendar,
    weeks: BTreeMap<WeekKey, WeekBucket>,
    users: Vec<UserAggregate>,
    index: HashMap<Address, usize>,
}

impl AggregationState {
    pub fn new(calendar: WeekCalendar) -> Self {
        Self {
            calendar,
            weeks: BTreeMap::new(),
            users: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn calendar(&self) -> &WeekCalendar {
        &self.calendar
    }

    /// Apply one transfer. Returns `false` if it was ignored (zero value).
    ///
    /// Fails only if the transfer predates week 1.
    pub fn ingest(&mut self, event: &TransferEvent) -> Result<bool> {
        if event.value.is_zero() {
            return Ok(false);
        }
        let key = self.calendar.week_key_for(event.timestamp).with_context(|| {
            format!(
                "Transfer at block {} (log {}) cannot be bucketed",
                event.block_number, event.log_index
            )
        })?;
        self.credit(event.to, key, event.value);
        Ok(true)
    }

    fn credit(&mut self, user: Address, key: WeekKey, value: U256) {
        let bucket = self.weeks.entry(key).or_default();
        bucket.total = bucket.total.saturating_add(value);
        bucket.users.insert(user);

        let idx = match self.index.get(&user) {
            Some(&idx) => idx,
            None => {
                self.users.push(UserAggregate::new(user));
                self.index.insert(user, self.users.len() - 1);
                self.users.len() - 1
            }
        };
        let aggregate = &mut self.users[idx];
        aggregate.all_time = aggregate.all_time.saturating_add(value);
        let week = aggregate.per_week.entry(key).or_insert(U256::ZERO);
        *week = week.saturating_add(value);
    }

    /// Rebuild state from a previously published all-time leaderboard.
    ///
    /// Amounts are parsed back exactly. Rows are taken in document order, which
    /// becomes the insertion order of the users.
    pub fn seed_from_report(&mut self, report: &AllTimeLeaderboard) -> Result<()> {
        for key in &report.week_keys {
            self.calendar
                .week_number_for(*key)
                .context("Previous leaderboard uses a different week-1 start")?;
            self.weeks.entry(*key).or_default();
        }

        for row in &report.rows {
            let address: Address = row
                .address
                .parse()
                .map_err(|e| anyhow::anyhow!("Invalid address {:?} in previous leaderboard: {}", row.address, e))?;

            let mut sum = U256::ZERO;
            for (key, amount) in &row.weeks {
                let value = parse_usdc(amount).with_context(|| {
                    format!("Invalid amount for {} in week {}", row.address, key)
                })?;
                if value.is_zero() {
                    continue;
                }
                self.calendar
                    .week_number_for(*key)
                    .context("Previous leaderboard uses a different week-1 start")?;
                self.credit(address, *key, value);
                sum = sum.saturating_add(value);
            }

            let total = parse_usdc(&row.total_usdc)
                .with_context(|| format!("Invalid total for {}", row.address))?;
            if total != sum {
                anyhow::bail!(
                    "Previous leaderboard is inconsistent: {} has total {} but weeks sum to {}",
                    row.address,
                    row.total_usdc,
                    crate::usdc::format_usdc(sum)
                );
            }
        }
        Ok(())
    }

    /// Week buckets in chronological order.
    pub fn weeks(&self) -> impl Iterator<Item = (&WeekKey, &WeekBucket)> {
        self.weeks.iter()
    }

    pub fn week(&self, key: WeekKey) -> Option<&WeekBucket> {
        self.weeks.get(&key)
    }

    pub fn latest_week(&self) -> Option<WeekKey> {
        self.weeks.keys().next_back().copied()
    }

    /// Users in first-seen order.
    pub fn users(&self) -> &[UserAggregate] {
        &self.users
    }

    pub fn user(&self, address: Address) -> Option<&UserAggregate> {
        self.index.get(&address).map(|&idx| &self.users[idx])
    }

    pub fn total(&self) -> U256 {
        self.weeks
            .values()
            .fold(U256::ZERO, |acc, b| acc.saturating_add(b.total))
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
