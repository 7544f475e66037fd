//! Record types for the published JSON documents
//!
//! These structs are the file contract read by the web layer. Field names
//! match the JSON keys exactly; amounts are decimal USDC strings.

use crate::week::WeekKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `_indexer_state.json`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(rename = "lastProcessedBlock")]
    pub last_processed_block: Option<u64>,
}

/// `overview.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Overview {
    pub generated_at_utc: String,
    pub chain: String,
    pub token: String,
    pub reward_distributor: String,
    pub first_reward_block: u64,
    pub all_time: AllTimeTotals,
    pub latest_week: Option<LatestWeekSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeTotals {
    pub total_usdc: String,
    pub unique_users: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestWeekSummary {
    pub week_start_utc: WeekKey,
    pub week_end_utc: String,
    pub total_usdc: String,
    pub unique_users: usize,
    pub breakdown: Vec<BreakdownBucket>,
}

/// Number of users that earned exactly `reward_usdc` in a week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakdownBucket {
    pub reward_usdc: String,
    pub users: usize,
}

/// `weekly.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weekly {
    pub generated_at_utc: String,
    pub week_keys: Vec<WeekKey>,
    pub weeks: Vec<WeekRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeekRow {
    pub week_number: u32,
    pub week_label: String,
    pub week_start_utc: WeekKey,
    pub week_end_utc: String,
    pub total_usdc_amount: String,
    pub total_unique_users: usize,
}

/// `leaderboard_weekly_latest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestWeekLeaderboard {
    pub generated_at_utc: String,
    pub latest_week_start_utc: Option<WeekKey>,
    pub latest_week_end_utc: Option<String>,
    pub previous_week_start_utc: Option<WeekKey>,
    pub rows: Vec<LatestWeekRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatestWeekRow {
    pub rank: usize,
    pub address: String,
    pub user_display: String,
    pub this_week_usdc: String,
    pub previous_week_usdc: String,
    pub pct_change: Option<f64>,
    pub all_time_usdc: String,
}

/// `leaderboard_all_time.json`
///
/// Also the seed for the next run, so `last_processed_block` records which
/// blocks the totals cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeLeaderboard {
    pub generated_at_utc: String,
    #[serde(default)]
    pub last_processed_block: Option<u64>,
    pub week_keys: Vec<WeekKey>,
    pub rows: Vec<AllTimeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllTimeRow {
    pub all_time_rank: usize,
    pub address: String,
    pub user_display: String,
    pub total_usdc: String,
    pub total_weeks_earned: usize,
    pub weeks: BTreeMap<WeekKey, String>,
}
