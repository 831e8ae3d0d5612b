//! Repository for triggered price alerts

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::alert::{
    Alert, AlertSearchCriteria, AlertSearchResult, AlertStatus, ThresholdPolicy,
};

/// Aggregates over `sent` alerts inside the active window
#[derive(Debug, Clone, Default)]
pub struct ActiveAlertStats {
    pub active_count: i64,
    pub average_price_difference: f64,
    pub total_potential_savings: f64,
    pub books_with_alerts: i64,
}

/// Outcome tallies over all delivered alerts
#[derive(Debug, Clone, Default)]
pub struct ComparisonTotals {
    pub total_comparisons: i64,
    pub tracked_cheaper: i64,
    pub third_party_cheaper: i64,
    /// Mean saving over the third-party-cheaper alerts; None when there
    /// are none.
    pub average_difference: Option<f64>,
}

#[derive(Clone)]
pub struct AlertRepository {
    pool: Arc<SqlitePool>,
}

impl AlertRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn insert_alert(
        &self,
        book_id: i64,
        policy: &ThresholdPolicy,
        tracked_price: f64,
        competing_price: f64,
        competing_source: &str,
        triggered_at: DateTime<Utc>,
        status: AlertStatus,
    ) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO alerts (book_id, threshold_type, threshold_value,
                                tracked_price, competing_price, competing_source,
                                triggered_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(book_id)
        .bind(policy.type_name())
        .bind(policy.value())
        .bind(tracked_price)
        .bind(competing_price)
        .bind(competing_source)
        .bind(triggered_at)
        .bind(status.as_str())
        .execute(&*self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn update_status(&self, alert_id: i64, status: AlertStatus) -> Result<()> {
        sqlx::query("UPDATE alerts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(alert_id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    pub async fn get_alert(&self, alert_id: i64) -> Result<Option<Alert>> {
        let row = sqlx::query(
            r#"
            SELECT id, book_id, threshold_type, threshold_value, tracked_price,
                   competing_price, competing_source, triggered_at, status
            FROM alerts WHERE id = ?
            "#,
        )
        .bind(alert_id)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(map_alert).transpose()
    }

    /// Most recent alert for a (book, source) pair regardless of status.
    /// Cooldown suppression keys off this row's trigger time.
    pub async fn get_last_alert_for_pair(
        &self,
        book_id: i64,
        competing_source: &str,
    ) -> Result<Option<Alert>> {
        let row = sqlx::query(
            r#"
            SELECT id, book_id, threshold_type, threshold_value, tracked_price,
                   competing_price, competing_source, triggered_at, status
            FROM alerts
            WHERE book_id = ? AND competing_source = ?
            ORDER BY triggered_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(book_id)
        .bind(competing_source)
        .fetch_optional(&*self.pool)
        .await?;

        row.map(map_alert).transpose()
    }

    /// Paginated alert listing, newest first.
    pub async fn list_alerts(&self, criteria: &AlertSearchCriteria) -> Result<AlertSearchResult> {
        let mut conditions = Vec::new();

        if criteria.status.is_some() {
            conditions.push("status = ?");
        }
        if criteria.from.is_some() {
            conditions.push("triggered_at >= ?");
        }
        if criteria.to.is_some() {
            conditions.push("triggered_at <= ?");
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let page = criteria.page.unwrap_or(1).max(1);
        let limit = criteria.limit.unwrap_or(50).clamp(1, 500);
        let offset = (page - 1) * limit;

        let count_query = format!("SELECT COUNT(*) FROM alerts {}", where_clause);
        let mut count_query_builder = sqlx::query_scalar::<_, i64>(&count_query);
        if let Some(status) = criteria.status {
            count_query_builder = count_query_builder.bind(status.as_str());
        }
        if let Some(from) = criteria.from {
            count_query_builder = count_query_builder.bind(from);
        }
        if let Some(to) = criteria.to {
            count_query_builder = count_query_builder.bind(to);
        }
        let total_count = count_query_builder.fetch_one(&*self.pool).await?;

        let data_query = format!(
            r#"
            SELECT id, book_id, threshold_type, threshold_value, tracked_price,
                   competing_price, competing_source, triggered_at, status
            FROM alerts
            {}
            ORDER BY triggered_at DESC, id DESC
            LIMIT ? OFFSET ?
            "#,
            where_clause
        );
        let mut data_query_builder = sqlx::query(&data_query);
        if let Some(status) = criteria.status {
            data_query_builder = data_query_builder.bind(status.as_str());
        }
        if let Some(from) = criteria.from {
            data_query_builder = data_query_builder.bind(from);
        }
        if let Some(to) = criteria.to {
            data_query_builder = data_query_builder.bind(to);
        }
        data_query_builder = data_query_builder.bind(limit).bind(offset);
        let rows = data_query_builder.fetch_all(&*self.pool).await?;

        let alerts = rows
            .into_iter()
            .map(map_alert)
            .collect::<Result<Vec<_>>>()?;
        let total_pages = (total_count + limit - 1) / limit;

        Ok(AlertSearchResult {
            alerts,
            total_count,
            page,
            limit,
            total_pages,
        })
    }

    /// Aggregates over alerts that were delivered after the cutoff.
    pub async fn get_active_alert_stats(&self, since: DateTime<Utc>) -> Result<ActiveAlertStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS active_count,
                   COALESCE(AVG(tracked_price - competing_price), 0.0) AS avg_difference,
                   COALESCE(SUM(tracked_price - competing_price), 0.0) AS total_savings,
                   COUNT(DISTINCT book_id) AS books_with_alerts
            FROM alerts
            WHERE status = 'sent' AND triggered_at >= ?
            "#,
        )
        .bind(since)
        .fetch_one(&*self.pool)
        .await?;

        Ok(ActiveAlertStats {
            active_count: row.get("active_count"),
            average_price_difference: row.get("avg_difference"),
            total_potential_savings: row.get("total_savings"),
            books_with_alerts: row.get("books_with_alerts"),
        })
    }

    /// Outcome tallies over every delivered alert, regardless of age.
    pub async fn get_comparison_totals(&self) -> Result<ComparisonTotals> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_comparisons,
                   COALESCE(SUM(CASE WHEN tracked_price < competing_price THEN 1 ELSE 0 END), 0)
                       AS tracked_cheaper,
                   COALESCE(SUM(CASE WHEN tracked_price > competing_price THEN 1 ELSE 0 END), 0)
                       AS third_party_cheaper,
                   AVG(CASE WHEN tracked_price > competing_price
                            THEN tracked_price - competing_price END)
                       AS average_difference
            FROM alerts
            WHERE status = 'sent'
            "#,
        )
        .fetch_one(&*self.pool)
        .await?;

        Ok(ComparisonTotals {
            total_comparisons: row.get("total_comparisons"),
            tracked_cheaper: row.get("tracked_cheaper"),
            third_party_cheaper: row.get("third_party_cheaper"),
            average_difference: row.get("average_difference"),
        })
    }
}

fn map_alert(row: sqlx::sqlite::SqliteRow) -> Result<Alert> {
    let threshold_type: String = row.get("threshold_type");
    let threshold_value: f64 = row.get("threshold_value");
    let policy = ThresholdPolicy::from_parts(&threshold_type, threshold_value)
        .ok_or_else(|| anyhow::anyhow!("unknown threshold type in alert row: {threshold_type}"))?;

    let status_text: String = row.get("status");
    let status = AlertStatus::parse(&status_text)
        .ok_or_else(|| anyhow::anyhow!("unknown alert status in alert row: {status_text}"))?;

    Ok(Alert {
        id: row.get("id"),
        book_id: row.get("book_id"),
        policy,
        tracked_price: row.get("tracked_price"),
        competing_price: row.get("competing_price"),
        competing_source: row.get("competing_source"),
        triggered_at: row.get("triggered_at"),
        status,
    })
}
