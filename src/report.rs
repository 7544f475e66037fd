//! Report builder
//!
//! Projects the aggregation state into the four published documents. Nothing
//! here touches the network or the filesystem; the only impurity is the
//! `generated_at_utc` stamp, which callers pass in.

use crate::records::{
    AllTimeLeaderboard, AllTimeRow, AllTimeTotals, BreakdownBucket, LatestWeekLeaderboard,
    LatestWeekRow, LatestWeekSummary, Overview, WeekRow, Weekly,
};
use crate::state::{AggregationState, UserAggregate};
use crate::usdc::{format_usdc, pct_change};
use crate::week::week_label_for;
use alloy_primitives::{Address, U256};
use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;

/// Static facts about the reward program shown in `overview.json`.
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub chain: String,
    pub token: Address,
    pub reward_distributor: Address,
    pub first_reward_block: u64,
}

/// The four published documents.
#[derive(Debug, Clone)]
pub struct Reports {
    pub overview: Overview,
    pub weekly: Weekly,
    pub leaderboard_latest_week: LatestWeekLeaderboard,
    pub leaderboard_all_time: AllTimeLeaderboard,
}

pub struct ReportBuilder {
    meta: ReportMeta,
}

impl ReportBuilder {
    pub fn new(meta: ReportMeta) -> Self {
        Self { meta }
    }

    /// Build every document, stamped with `generated_at`.
    pub fn build(
        &self,
        state: &AggregationState,
        last_processed_block: Option<u64>,
        generated_at: DateTime<Utc>,
    ) -> Result<Reports> {
        Ok(Reports {
            overview: self.overview(state, generated_at),
            weekly: weekly(state, generated_at)?,
            leaderboard_latest_week: latest_week_leaderboard(state, generated_at),
            leaderboard_all_time: all_time_leaderboard(state, last_processed_block, generated_at),
        })
    }

    pub fn overview(&self, state: &AggregationState, generated_at: DateTime<Utc>) -> Overview {
        let latest_week = state.latest_week().map(|key| {
            let (total, users) = state
                .week(key)
                .map(|b| (b.total, b.users.len()))
                .unwrap_or((U256::ZERO, 0));

            // exact-value histogram of what each user earned that week
            let mut counts: BTreeMap<U256, usize> = BTreeMap::new();
            for user in state.users() {
                let earned = user.week_total(key);
                if !earned.is_zero() {
                    *counts.entry(earned).or_insert(0) += 1;
                }
            }
            let breakdown = counts
                .into_iter()
                .rev()
                .map(|(value, users)| BreakdownBucket {
                    reward_usdc: format_usdc(value),
                    users,
                })
                .collect();

            LatestWeekSummary {
                week_start_utc: key,
                week_end_utc: key.end_string(),
                total_usdc: format_usdc(total),
                unique_users: users,
                breakdown,
            }
        });

        Overview {
            generated_at_utc: timestamp_string(generated_at),
            chain: self.meta.chain.clone(),
            token: self.meta.token.to_checksum(None),
            reward_distributor: self.meta.reward_distributor.to_checksum(None),
            first_reward_block: self.meta.first_reward_block,
            all_time: AllTimeTotals {
                total_usdc: format_usdc(state.total()),
                unique_users: state.users().len(),
            },
            latest_week,
        }
    }
}

/// One row per week, oldest first.
pub fn weekly(state: &AggregationState, generated_at: DateTime<Utc>) -> Result<Weekly> {
    let mut week_keys = Vec::new();
    let mut weeks = Vec::new();
    for (key, bucket) in state.weeks() {
        let number = state.calendar().week_number_for(*key)?;
        week_keys.push(*key);
        weeks.push(WeekRow {
            week_number: number,
            week_label: week_label_for(number, *key),
            week_start_utc: *key,
            week_end_utc: key.end_string(),
            total_usdc_amount: format_usdc(bucket.total),
            total_unique_users: bucket.users.len(),
        });
    }
    Ok(Weekly {
        generated_at_utc: timestamp_string(generated_at),
        week_keys,
        weeks,
    })
}

/// Users active in the latest week, highest earners first.
pub fn latest_week_leaderboard(
    state: &AggregationState,
    generated_at: DateTime<Utc>,
) -> LatestWeekLeaderboard {
    let Some(latest) = state.latest_week() else {
        return LatestWeekLeaderboard {
            generated_at_utc: timestamp_string(generated_at),
            latest_week_start_utc: None,
            latest_week_end_utc: None,
            previous_week_start_utc: None,
            rows: Vec::new(),
        };
    };
    let previous = latest.previous();

    let mut active: Vec<(&UserAggregate, U256)> = state
        .users()
        .iter()
        .filter_map(|u| {
            let this_week = u.week_total(latest);
            (!this_week.is_zero()).then_some((u, this_week))
        })
        .collect();
    // stable: ties keep first-seen order
    active.sort_by(|a, b| b.1.cmp(&a.1));

    let rows = active
        .into_iter()
        .enumerate()
        .map(|(i, (user, this_week))| {
            let prev = user.week_total(previous);
            LatestWeekRow {
                rank: i + 1,
                address: user.address.to_checksum(None),
                user_display: user_display(user.address),
                this_week_usdc: format_usdc(this_week),
                previous_week_usdc: format_usdc(prev),
                pct_change: pct_change(this_week, prev),
                all_time_usdc: format_usdc(user.all_time),
            }
        })
        .collect();

    LatestWeekLeaderboard {
        generated_at_utc: timestamp_string(generated_at),
        latest_week_start_utc: Some(latest),
        latest_week_end_utc: Some(latest.end_string()),
        previous_week_start_utc: Some(previous),
        rows,
    }
}

/// Every user ever paid, highest all-time total first.
pub fn all_time_leaderboard(
    state: &AggregationState,
    last_processed_block: Option<u64>,
    generated_at: DateTime<Utc>,
) -> AllTimeLeaderboard {
    let mut users: Vec<&UserAggregate> = state.users().iter().collect();
    users.sort_by(|a, b| b.all_time.cmp(&a.all_time));

    let rows = users
        .into_iter()
        .enumerate()
        .map(|(i, user)| {
            let weeks: BTreeMap<_, _> = user
                .per_week
                .iter()
                .filter(|(_, v)| !v.is_zero())
                .map(|(k, v)| (*k, format_usdc(*v)))
                .collect();
            AllTimeRow {
                all_time_rank: i + 1,
                address: user.address.to_checksum(None),
                user_display: user_display(user.address),
                total_usdc: format_usdc(user.all_time),
                total_weeks_earned: weeks.len(),
                weeks,
            }
        })
        .collect();

    AllTimeLeaderboard {
        generated_at_utc: timestamp_string(generated_at),
        last_processed_block,
        week_keys: state.weeks().map(|(k, _)| *k).collect(),
        rows,
    }
}

/// Shortened checksummed address, e.g. `0x7099…79C8`.
pub fn user_display(address: Address) -> String {
    let full = address.to_checksum(None);
    format!("{}…{}", &full[..6], &full[full.len() - 4..])
}

fn timestamp_string(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}
