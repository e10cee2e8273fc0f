/*
Usage bookkeeping for the dashboard.
Observations are cumulative per app and local day, so a day's total for
an app is the largest value seen that day. Days are taken in the caller's
offset, whatever offset the collector reported in.
*/

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::error::PolicyError;
use crate::models::{AppThresholdConfig, UsageRecord, UsageStatus};
use crate::policy;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppUsageView {
    pub app_id: String,
    pub usage_minutes: u32,
    pub threshold_minutes: i64,
    pub usage_percent: u8,
    pub status: UsageStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub minutes: u32,
}

// Day-by-day series of one app over the summary window
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AppTrend {
    pub app_id: String,
    pub total_minutes: u64,
    pub points: Vec<TrendPoint>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UsageSummary {
    pub date: NaiveDate,
    pub total_minutes: u64,
    pub total_display: String, // "3h 7m"
    pub daily_average_minutes: u64,
    pub weekly_change_percent: Option<i64>,
    pub monitored_apps: usize,
    pub notifications_sent: usize,
    pub apps: Vec<AppUsageView>,
    pub trends: Vec<AppTrend>,
}

// Convert collector milliseconds to whole minutes (rounded)
pub fn ms_to_minutes(ms: u64) -> u32 {
    let minutes = ms.saturating_add(30_000) / 60_000;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

pub fn format_minutes(minutes: u64) -> String {
    format!("{}h {}m", minutes / 60, minutes % 60)
}

// Calendar date of an observation in `tz`
fn local_date(record: &UsageRecord, tz: &FixedOffset) -> NaiveDate {
    record.observed_at.with_timezone(tz).date_naive()
}

// (date, app) -> max cumulative minutes
fn daily_totals<'a>(records: &'a [UsageRecord], tz: &FixedOffset) -> HashMap<(NaiveDate, &'a str), u32> {
    let mut totals: HashMap<(NaiveDate, &str), u32> = HashMap::new();
    for r in records {
        let key = (local_date(r, tz), r.app_id.as_str());
        let entry = totals.entry(key).or_insert(0);
        *entry = (*entry).max(r.usage_minutes);
    }
    totals
}

// Screen time per date, summed across apps
fn totals_by_date(totals: &HashMap<(NaiveDate, &str), u32>) -> BTreeMap<NaiveDate, u64> {
    let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for ((date, _), minutes) in totals {
        *by_date.entry(*date).or_insert(0) += u64::from(*minutes);
    }
    by_date
}

fn sum_window(by_date: &BTreeMap<NaiveDate, u64>, last: NaiveDate, days: i64) -> u64 {
    let first = last - Duration::days(days - 1);
    by_date.range(first..=last).map(|(_, m)| *m).sum()
}

/// Most recent observation of `app_id` on `date`, dates taken in `tz`.
pub fn latest_for_day<'a>(
    records: &'a [UsageRecord],
    app_id: &str,
    date: NaiveDate,
    tz: &FixedOffset,
) -> Option<&'a UsageRecord> {
    records
        .iter()
        .filter(|r| r.app_id == app_id && local_date(r, tz) == date)
        .max_by_key(|r| r.observed_at)
}

/// Build the dashboard summary for the day of `now`.
///
/// - total: today's screen time across all apps
/// - daily average: over the `days` days ending today (rounded)
/// - weekly change: last 7 days vs the 7 before, `None` if the earlier week is empty
/// - apps: one entry per configured app, zero usage when nothing was observed
/// - trends: per configured app, one point per day of the window
pub fn summarize(
    records: &[UsageRecord],
    configs: &[AppThresholdConfig],
    notifications_sent: usize,
    now: DateTime<FixedOffset>,
    days: u32,
) -> Result<UsageSummary, PolicyError> {
    let tz = *now.offset();
    let today = now.date_naive();
    let days = i64::from(days.max(1));
    let totals = daily_totals(records, &tz);
    let by_date = totals_by_date(&totals);

    let total_minutes = by_date.get(&today).copied().unwrap_or(0);
    let window = sum_window(&by_date, today, days);
    let daily_average_minutes = (window * 2 + days as u64) / (2 * days as u64);

    let this_week = sum_window(&by_date, today, 7) as i64;
    let prev_week = sum_window(&by_date, today - Duration::days(7), 7) as i64;
    let weekly_change_percent = (prev_week > 0)
        .then(|| ((this_week - prev_week) as f64 / prev_week as f64 * 100.0).round() as i64);

    let mut apps = Vec::with_capacity(configs.len());
    for c in configs {
        let usage = totals.get(&(today, c.app_id.as_str())).copied().unwrap_or(0);
        apps.push(AppUsageView {
            app_id: c.app_id.clone(),
            usage_minutes: usage,
            threshold_minutes: c.threshold_minutes,
            usage_percent: policy::usage_percent(usage, c.threshold_minutes)?,
            status: policy::usage_status(usage, c.threshold_minutes)?,
        });
    }
    // most used first
    apps.sort_by(|a, b| {
        b.usage_minutes
            .cmp(&a.usage_minutes)
            .then_with(|| a.app_id.cmp(&b.app_id))
    });

    let first = today - Duration::days(days - 1);
    let dates: Vec<NaiveDate> = (0..days).map(|i| first + Duration::days(i)).collect();
    let mut trends: Vec<AppTrend> = configs
        .iter()
        .map(|c| {
            let points: Vec<TrendPoint> = dates
                .iter()
                .map(|d| TrendPoint {
                    date: *d,
                    minutes: totals.get(&(*d, c.app_id.as_str())).copied().unwrap_or(0),
                })
                .collect();
            AppTrend {
                app_id: c.app_id.clone(),
                total_minutes: points.iter().map(|p| u64::from(p.minutes)).sum(),
                points,
            }
        })
        .collect();
    trends.sort_by(|a, b| a.app_id.cmp(&b.app_id));

    Ok(UsageSummary {
        date: today,
        total_minutes,
        total_display: format_minutes(total_minutes),
        daily_average_minutes,
        weekly_change_percent,
        monitored_apps: configs.len(),
        notifications_sent,
        apps,
        trends,
    })
}
