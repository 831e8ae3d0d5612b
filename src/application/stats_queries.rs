//! Aggregate statistics for the dashboard surface

use anyhow::Result;
use chrono::{Duration, Utc};

use crate::application::dto::{
    ActivityPoint, BookDto, ComparisonStats, DashboardStats, DataQuality, PriceBucket,
    PriceDistribution, PriceTrendPoint, RecentActivity,
};
use crate::infrastructure::alert_repository::AlertRepository;
use crate::infrastructure::book_repository::BookRepository;
use crate::infrastructure::config::AlertingConfig;

/// Books not touched by the feed for this long count as stale.
const STALE_AFTER_DAYS: i64 = 90;

/// Upper bound on the needs-attention listing.
const ATTENTION_LIMIT: i64 = 20;

/// Fixed dashboard histogram: upper bounds are exclusive, the last
/// bucket is open-ended.
const PRICE_BUCKETS: &[(f64, f64, &str)] = &[
    (0.0, 5.0, "$0-5"),
    (5.0, 10.0, "$5-10"),
    (10.0, 15.0, "$10-15"),
    (15.0, 20.0, "$15-20"),
    (20.0, 25.0, "$20-25"),
    (25.0, 30.0, "$25-30"),
    (30.0, f64::INFINITY, "$30+"),
];

pub struct StatsQueries {
    books: BookRepository,
    alerts: AlertRepository,
    /// An alert is "active" while its cooldown still runs.
    cooldown: Duration,
}

impl StatsQueries {
    pub fn new(
        books: BookRepository,
        alerts: AlertRepository,
        config: &AlertingConfig,
    ) -> Self {
        Self {
            books,
            alerts,
            cooldown: Duration::hours(config.cooldown_hours as i64),
        }
    }

    pub async fn dashboard(&self) -> Result<DashboardStats> {
        let aggregates = self.books.get_catalog_aggregates().await?;
        let alert_stats = self
            .alerts
            .get_active_alert_stats(Utc::now() - self.cooldown)
            .await?;

        let has_active_alerts = alert_stats.active_count > 0;
        let has_priced_books = aggregates.min_price.is_some();

        Ok(DashboardStats {
            total_books: aggregates.total_books,
            active_alerts: alert_stats.active_count,
            average_price_difference: has_active_alerts
                .then_some(alert_stats.average_price_difference),
            total_savings_opportunity: has_active_alerts
                .then_some(alert_stats.total_potential_savings),
            books_with_alerts: alert_stats.books_with_alerts,
            total_catalog_value: has_priced_books.then_some(aggregates.total_catalog_value),
            min_price: aggregates.min_price,
            max_price: aggregates.max_price,
            average_price: aggregates.average_price,
            books_missing_authors: aggregates.books_missing_authors,
            books_missing_urls: aggregates.books_missing_urls,
            books_without_price_history: aggregates.books_without_price_history,
            data_completeness_percentage: percent_of(
                aggregates.books_complete,
                aggregates.total_books,
            ),
        })
    }

    /// Per-day series of average tracked price vs. cheapest third-party
    /// observation over the trailing `days`.
    pub async fn price_trends(&self, days: i64) -> Result<Vec<PriceTrendPoint>> {
        let since = Utc::now() - Duration::days(days.max(1));
        let rows = self.books.get_price_trend_rows(since).await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let difference = match (row.avg_tracked, row.min_third_party) {
                    (Some(tracked), Some(third_party)) => Some(tracked - third_party),
                    _ => None,
                };
                PriceTrendPoint {
                    date: row.day,
                    tracked_price: row.avg_tracked,
                    third_party_price: row.min_third_party,
                    difference,
                }
            })
            .collect())
    }

    /// Histogram of tracked prices; percentages are against the whole
    /// catalog, so unpriced books show up as the missing remainder.
    pub async fn price_distribution(&self) -> Result<PriceDistribution> {
        let aggregates = self.books.get_catalog_aggregates().await?;
        let prices = self.books.get_tracked_prices().await?;

        let buckets = PRICE_BUCKETS
            .iter()
            .map(|&(low, high, label)| {
                let count = prices.iter().filter(|&&p| p >= low && p < high).count() as i64;
                PriceBucket {
                    range: label.to_string(),
                    count,
                    percentage: percent_of(count, aggregates.total_books),
                }
            })
            .collect();

        Ok(PriceDistribution {
            buckets,
            total_books: aggregates.total_books,
        })
    }

    pub async fn comparison_stats(&self) -> Result<ComparisonStats> {
        let totals = self.alerts.get_comparison_totals().await?;

        Ok(ComparisonStats {
            total_comparisons: totals.total_comparisons,
            tracked_cheaper: totals.tracked_cheaper,
            third_party_cheaper: totals.third_party_cheaper,
            average_difference: totals.average_difference,
        })
    }

    pub async fn data_quality(&self) -> Result<DataQuality> {
        let aggregates = self.books.get_catalog_aggregates().await?;
        let stale_cutoff = Utc::now() - Duration::days(STALE_AFTER_DAYS);
        let books_stale = self.books.count_stale_books(stale_cutoff).await?;
        let attention = self
            .books
            .get_books_needing_attention(ATTENTION_LIMIT)
            .await?;

        Ok(DataQuality {
            total_books: aggregates.total_books,
            books_missing_authors: aggregates.books_missing_authors,
            books_missing_urls: aggregates.books_missing_urls,
            books_missing_prices: aggregates.books_missing_prices,
            books_without_price_history: aggregates.books_without_price_history,
            books_stale,
            data_completeness_percentage: percent_of(
                aggregates.books_complete,
                aggregates.total_books,
            ),
            books_needing_attention: attention.into_iter().map(BookDto::from).collect(),
        })
    }

    /// Per-day added/updated counts over the trailing `days`.
    pub async fn recent_activity(&self, days: i64) -> Result<RecentActivity> {
        let since = Utc::now() - Duration::days(days.max(1));
        let rows = self.books.get_daily_book_activity(since).await?;

        let activity = rows
            .into_iter()
            .map(|row| ActivityPoint {
                date: row.day,
                books_added: row.books_added,
                books_updated: row.books_updated,
                total_changes: row.books_added + row.books_updated,
            })
            .collect();

        Ok(RecentActivity {
            activity,
            date_from: since.format("%Y-%m-%d").to_string(),
            date_to: Utc::now().format("%Y-%m-%d").to_string(),
        })
    }
}

/// Share of `part` in `total` as a percentage rounded to two decimals.
fn percent_of(part: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    let percentage = part as f64 / total as f64 * 100.0;
    (percentage * 100.0).round() / 100.0
}
