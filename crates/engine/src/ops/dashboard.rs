use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Datelike, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::{
    MoneyCents, ObjectId, ResultEngine,
    store::{AggregateRow, CategoryFilter, Direction, GroupKey, Grouping, TransactionFilter},
};

use super::Engine;

/// Net balance over all history and the rolling window totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub balance: MoneyCents,
    pub income_30d: MoneyCents,
    /// Absolute value of the window's expenses.
    pub expense_30d: MoneyCents,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct MonthlyTrend {
    pub year: i32,
    pub month: u32,
    pub income: MoneyCents,
    pub expense: MoneyCents,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakdownEntry {
    /// `None` for the entry collecting unresolvable categories.
    pub category_id: Option<ObjectId>,
    pub name: String,
    pub icon: String,
    pub color: String,
    pub value: MoneyCents,
    pub percentage: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExpenseBreakdown {
    pub total: MoneyCents,
    pub entries: Vec<BreakdownEntry>,
}

fn direction_sum(rows: &[AggregateRow], direction: Direction) -> MoneyCents {
    rows.iter()
        .filter(|row| row.key == GroupKey::Direction(direction))
        .map(|row| row.sum)
        .sum()
}

/// `(year, month)` moved by `delta` months.
fn shift_month(year: i32, month: u32, delta: i32) -> (i32, u32) {
    let index = year * 12 + month as i32 - 1 + delta;
    (index.div_euclid(12), index.rem_euclid(12) as u32 + 1)
}

/// First instant of a calendar month in `timezone`.
fn month_start(timezone: Tz, year: i32, month: u32) -> Option<DateTime<Utc>> {
    let naive = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    let local = timezone
        .from_local_datetime(&naive)
        .earliest()
        .unwrap_or_else(|| timezone.from_utc_datetime(&naive));
    Some(local.with_timezone(&Utc))
}

impl Engine {
    pub async fn summary(&self, now: DateTime<Utc>) -> ResultEngine<Summary> {
        let totals = self
            .store
            .aggregate(&TransactionFilter::default(), Grouping::Total)
            .await?;
        let balance = totals.iter().map(|row| row.sum).sum();

        let since = now - Duration::days(i64::from(self.config.dashboard.window_days));
        let window = self
            .store
            .aggregate(
                &TransactionFilter::default().since(since),
                Grouping::Direction,
            )
            .await?;

        Ok(Summary {
            balance,
            income_30d: direction_sum(&window, Direction::Income),
            expense_30d: direction_sum(&window, Direction::Expense).abs(),
        })
    }

    /// One entry per calendar month, oldest first, ending with the month of
    /// `now`. Months without transactions are zero.
    pub async fn monthly_trend(&self, now: DateTime<Utc>) -> ResultEngine<Vec<MonthlyTrend>> {
        let timezone = self.config.dashboard.timezone;
        let months = self.config.dashboard.trend_months.max(1) as i32;
        let local = now.with_timezone(&timezone);
        let (first_year, first_month) = shift_month(local.year(), local.month(), 1 - months);

        let mut filter = TransactionFilter::default();
        filter.since = month_start(timezone, first_year, first_month);
        let rows = self
            .store
            .aggregate(&filter, Grouping::MonthDirection { timezone })
            .await?;

        let mut sums: BTreeMap<(i32, u32, Direction), MoneyCents> = BTreeMap::new();
        for row in rows {
            if let GroupKey::MonthDirection {
                year,
                month,
                direction,
            } = row.key
            {
                *sums.entry((year, month, direction)).or_default() += row.sum;
            }
        }

        Ok((0..months)
            .map(|offset| {
                let (year, month) = shift_month(first_year, first_month, offset);
                let sum = |direction| {
                    sums.get(&(year, month, direction))
                        .copied()
                        .unwrap_or_default()
                };
                MonthlyTrend {
                    year,
                    month,
                    income: sum(Direction::Income),
                    expense: sum(Direction::Expense).abs(),
                }
            })
            .collect())
    }

    /// Expenses per category over all history.
    ///
    /// References are merged by the id they normalize to and looked up in one
    /// batch. Anything that does not resolve lands in a single fallback entry.
    pub async fn expense_breakdown(&self) -> ResultEngine<ExpenseBreakdown> {
        let filter = TransactionFilter::default()
            .direction(Direction::Expense)
            .category(CategoryFilter::NotNull);
        let rows = self.store.aggregate(&filter, Grouping::Category).await?;

        let mut by_id: BTreeMap<ObjectId, MoneyCents> = BTreeMap::new();
        let mut unresolved: Option<MoneyCents> = None;
        for row in rows {
            let id = match &row.key {
                GroupKey::Category(category) => category.normalize(),
                _ => None,
            };
            match id {
                Some(id) => *by_id.entry(id).or_default() += row.sum.abs(),
                None => *unresolved.get_or_insert_default() += row.sum.abs(),
            }
        }

        let ids: BTreeSet<ObjectId> = by_id.keys().copied().collect();
        let found = self.lookup_categories(&ids).await?;

        let mut entries = Vec::with_capacity(by_id.len() + 1);
        for (id, value) in by_id {
            match found.get(&id) {
                Some(category) => entries.push(BreakdownEntry {
                    category_id: Some(id),
                    name: category.name.clone(),
                    icon: category.icon.clone(),
                    color: category.color.clone(),
                    value,
                    percentage: 0.0,
                }),
                None => *unresolved.get_or_insert_default() += value,
            }
        }
        if let Some(value) = unresolved {
            let fallback = &self.config.dashboard;
            entries.push(BreakdownEntry {
                category_id: None,
                name: fallback.fallback_name.clone(),
                icon: fallback.fallback_icon.clone(),
                color: fallback.fallback_color.clone(),
                value,
                percentage: 0.0,
            });
        }

        let total: MoneyCents = entries.iter().map(|entry| entry.value).sum();
        for entry in &mut entries {
            entry.percentage = entry.value.percent_of(total);
        }
        entries.sort_by(|a, b| b.value.cmp(&a.value).then_with(|| a.name.cmp(&b.name)));

        Ok(ExpenseBreakdown { total, entries })
    }
}
