//! PostgreSQL store backed by sqlx.
//!
//! Queries are runtime-checked (`sqlx::query` with explicit binds) so the
//! crate builds without a live database. Enum columns are persisted as
//! their snake_case strings, department coverage and run errors as JSONB,
//! lead id lists as `UUID[]`.
//!
//! Expected schema (owned by the embedding service's migrations):
//!
//! ```sql
//! CREATE TABLE leadflow_leads (
//!   lead_id UUID PRIMARY KEY,
//!   phone TEXT NOT NULL,
//!   name TEXT NOT NULL,
//!   department TEXT NOT NULL,
//!   product TEXT NOT NULL,
//!   entity TEXT NOT NULL,
//!   source TEXT NOT NULL,
//!   created_at TIMESTAMPTZ,
//!   freshness TEXT NOT NULL,
//!   backlog_reason TEXT,
//!   status TEXT NOT NULL,
//!   delivered_to_client UUID,
//!   delivered_to_client_name TEXT,
//!   delivered_at TIMESTAMPTZ,
//!   delivery_id UUID,
//!   updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE leadflow_orders (
//!   order_id UUID PRIMARY KEY,
//!   entity TEXT NOT NULL,
//!   client_id UUID NOT NULL,
//!   product TEXT NOT NULL,
//!   coverage JSONB NOT NULL,
//!   weekly_quota INTEGER NOT NULL,
//!   backlog_cap_percent INTEGER NOT NULL,
//!   priority INTEGER NOT NULL,
//!   active BOOLEAN NOT NULL,
//!   auto_renew BOOLEAN NOT NULL,
//!   created_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE leadflow_clients (
//!   client_id UUID PRIMARY KEY,
//!   name TEXT NOT NULL,
//!   delivery_emails JSONB NOT NULL,
//!   active BOOLEAN NOT NULL
//! );
//!
//! CREATE TABLE leadflow_deliveries (
//!   delivery_id UUID PRIMARY KEY,
//!   entity TEXT NOT NULL,
//!   order_id UUID NOT NULL,
//!   client_id UUID NOT NULL,
//!   client_name TEXT NOT NULL,
//!   product TEXT NOT NULL,
//!   method TEXT NOT NULL,
//!   lead_ids UUID[] NOT NULL,
//!   fresh_count INTEGER NOT NULL,
//!   backlog_count INTEGER NOT NULL,
//!   status TEXT NOT NULL,
//!   outcome TEXT NOT NULL,
//!   attempt_count INTEGER NOT NULL,
//!   last_error TEXT,
//!   created_at TIMESTAMPTZ NOT NULL,
//!   packaged_at TIMESTAMPTZ,
//!   sent_at TIMESTAMPTZ,
//!   failed_at TIMESTAMPTZ,
//!   outcome_at TIMESTAMPTZ,
//!   updated_at TIMESTAMPTZ NOT NULL
//! );
//!
//! CREATE TABLE leadflow_run_reports (
//!   run_id UUID PRIMARY KEY,
//!   entity TEXT NOT NULL,
//!   run_date DATE NOT NULL,
//!   started_at TIMESTAMPTZ NOT NULL,
//!   finished_at TIMESTAMPTZ,
//!   counters JSONB NOT NULL,
//!   errors JSONB NOT NULL,
//!   UNIQUE (entity, run_date)
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::constants::status_groups;
use crate::models::{
    BacklogReason, BusinessEntity, ClientInfo, Delivery, DeliveryMethod, DeliveryOutcome,
    DeliveryStatus, FreshnessTag, Lead, LeadSource, LeadStatus, NewDelivery, NewLead, Order,
    RunReport,
};

use super::{
    ClientDirectory, DeliveryStore, LeadStore, OrderStore, RunReportStore, StorageError,
    StorageResult,
};

/// Status group as an owned list for a `= ANY($n)` bind.
fn status_list(group: &[&str]) -> Vec<String> {
    group.iter().map(|s| (*s).to_string()).collect()
}

const LEAD_COLUMNS: &str = "lead_id, phone, name, department, product, entity, source, \
     created_at, freshness, backlog_reason, status, delivered_to_client, \
     delivered_to_client_name, delivered_at, delivery_id, updated_at";

const DELIVERY_COLUMNS: &str = "delivery_id, entity, order_id, client_id, client_name, product, \
     method, lead_ids, fresh_count, backlog_count, status, outcome, attempt_count, last_error, \
     created_at, packaged_at, sent_at, failed_at, outcome_at, updated_at";

/// Production store over a PostgreSQL pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_enum<T: std::str::FromStr<Err = String>>(value: &str) -> StorageResult<T> {
    value.parse().map_err(StorageError::serialization)
}

fn lead_from_row(row: &PgRow) -> StorageResult<Lead> {
    let entity: String = row.try_get("entity")?;
    let source: String = row.try_get("source")?;
    let freshness: String = row.try_get("freshness")?;
    let status: String = row.try_get("status")?;
    let backlog_reason: Option<String> = row.try_get("backlog_reason")?;

    Ok(Lead {
        lead_id: row.try_get("lead_id")?,
        phone: row.try_get("phone")?,
        name: row.try_get("name")?,
        department: row.try_get("department")?,
        product: row.try_get("product")?,
        entity: parse_enum(&entity)?,
        source: serde_json::from_value(serde_json::Value::String(source))
            .map_err(StorageError::serialization)?,
        created_at: row.try_get("created_at")?,
        freshness: parse_enum(&freshness)?,
        backlog_reason: backlog_reason
            .map(|r| {
                serde_json::from_value(serde_json::Value::String(r))
                    .map_err(StorageError::serialization)
            })
            .transpose()?,
        status: parse_enum(&status)?,
        delivered_to_client: row.try_get("delivered_to_client")?,
        delivered_to_client_name: row.try_get("delivered_to_client_name")?,
        delivered_at: row.try_get("delivered_at")?,
        delivery_id: row.try_get("delivery_id")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_row(row: &PgRow) -> StorageResult<Order> {
    let entity: String = row.try_get("entity")?;
    let coverage: serde_json::Value = row.try_get("coverage")?;

    Ok(Order {
        order_id: row.try_get("order_id")?,
        entity: parse_enum(&entity)?,
        client_id: row.try_get("client_id")?,
        product: row.try_get("product")?,
        coverage: serde_json::from_value(coverage).map_err(StorageError::serialization)?,
        weekly_quota: row.try_get("weekly_quota")?,
        backlog_cap_percent: row.try_get("backlog_cap_percent")?,
        priority: row.try_get("priority")?,
        active: row.try_get("active")?,
        auto_renew: row.try_get("auto_renew")?,
        created_at: row.try_get("created_at")?,
    })
}

fn delivery_from_row(row: &PgRow) -> StorageResult<Delivery> {
    let entity: String = row.try_get("entity")?;
    let method: String = row.try_get("method")?;
    let status: String = row.try_get("status")?;
    let outcome: String = row.try_get("outcome")?;

    Ok(Delivery {
        delivery_id: row.try_get("delivery_id")?,
        entity: parse_enum(&entity)?,
        order_id: row.try_get("order_id")?,
        client_id: row.try_get("client_id")?,
        client_name: row.try_get("client_name")?,
        product: row.try_get("product")?,
        method: serde_json::from_value(serde_json::Value::String(method))
            .map_err(StorageError::serialization)?,
        lead_ids: row.try_get("lead_ids")?,
        fresh_count: row.try_get("fresh_count")?,
        backlog_count: row.try_get("backlog_count")?,
        status: parse_enum(&status)?,
        outcome: parse_enum(&outcome)?,
        attempt_count: row.try_get("attempt_count")?,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        packaged_at: row.try_get("packaged_at")?,
        sent_at: row.try_get("sent_at")?,
        failed_at: row.try_get("failed_at")?,
        outcome_at: row.try_get("outcome_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn method_str(method: DeliveryMethod) -> &'static str {
    match method {
        DeliveryMethod::CsvExport => "csv_export",
    }
}

fn source_str(source: LeadSource) -> &'static str {
    match source {
        LeadSource::Web => "web",
        LeadSource::Api => "api",
        LeadSource::Partner => "partner",
    }
}

#[async_trait]
impl LeadStore for PgStore {
    async fn create_lead(&self, new_lead: NewLead, now: DateTime<Utc>) -> StorageResult<Lead> {
        let status = if new_lead.is_routable_quality() {
            LeadStatus::New
        } else {
            LeadStatus::NonRoutable
        };
        let lead_id = Uuid::new_v4();

        let sql = format!(
            "INSERT INTO leadflow_leads ({LEAD_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, NULL, NULL, NULL, NULL, $11) \
             RETURNING {LEAD_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .bind(&new_lead.phone)
            .bind(&new_lead.name)
            .bind(&new_lead.department)
            .bind(&new_lead.product)
            .bind(new_lead.entity.as_str())
            .bind(source_str(new_lead.source))
            .bind(new_lead.created_at)
            .bind(FreshnessTag::Fresh.to_string())
            .bind(status.to_string())
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        lead_from_row(&row)
    }

    async fn get_lead(&self, lead_id: Uuid) -> StorageResult<Option<Lead>> {
        let sql = format!("SELECT {LEAD_COLUMNS} FROM leadflow_leads WHERE lead_id = $1");
        let row = sqlx::query(&sql)
            .bind(lead_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(lead_from_row).transpose()
    }

    async fn find_routable(&self, entity: BusinessEntity) -> StorageResult<Vec<Lead>> {
        let sql = format!(
            "SELECT {LEAD_COLUMNS} FROM leadflow_leads \
             WHERE entity = $1 AND status = ANY($2) \
             ORDER BY created_at ASC NULLS LAST, lead_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(entity.as_str())
            .bind(status_list(status_groups::ROUTABLE))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(lead_from_row).collect()
    }

    async fn promote_aged(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE leadflow_leads \
             SET freshness = 'backlog', backlog_reason = $1, updated_at = $2 \
             WHERE status = ANY($4) \
               AND freshness = 'fresh' \
               AND created_at IS NOT NULL AND created_at <= $3",
        )
        .bind(BacklogReason::Age8Days.as_str())
        .bind(now)
        .bind(cutoff)
        .bind(status_list(status_groups::ROUTABLE))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn promote_delivered(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE leadflow_leads \
             SET freshness = 'backlog', backlog_reason = $1, updated_at = $2 \
             WHERE status = 'delivered' AND freshness = 'fresh'",
        )
        .bind(BacklogReason::AlreadyDelivered.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn update_status_if(
        &self,
        lead_id: Uuid,
        expected: LeadStatus,
        next: LeadStatus,
        now: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE leadflow_leads SET status = $1, updated_at = $2 \
             WHERE lead_id = $3 AND status = $4",
        )
        .bind(next.to_string())
        .bind(now)
        .bind(lead_id)
        .bind(expected.to_string())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_non_routable(
        &self,
        lead_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE leadflow_leads SET status = 'non_routable', updated_at = $1 \
             WHERE lead_id = ANY($2)",
        )
        .bind(now)
        .bind(lead_ids)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn attach_delivery(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
        client_name: &str,
        delivery_id: Uuid,
        delivered_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE leadflow_leads \
             SET status = 'delivered', delivered_to_client = $1, \
                 delivered_to_client_name = $2, delivered_at = $3, delivery_id = $4, \
                 updated_at = $3 \
             WHERE lead_id = $5",
        )
        .bind(client_id)
        .bind(client_name)
        .bind(delivered_at)
        .bind(delivery_id)
        .bind(lead_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_to_new(&self, lead_id: Uuid, now: DateTime<Utc>) -> StorageResult<()> {
        sqlx::query(
            "UPDATE leadflow_leads \
             SET status = 'new', delivered_to_client = NULL, \
                 delivered_to_client_name = NULL, delivered_at = NULL, delivery_id = NULL, \
                 updated_at = $1 \
             WHERE lead_id = $2",
        )
        .bind(now)
        .bind(lead_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn active_orders(&self, entity: BusinessEntity) -> StorageResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT order_id, entity, client_id, product, coverage, weekly_quota, \
                    backlog_cap_percent, priority, active, auto_renew, created_at \
             FROM leadflow_orders \
             WHERE entity = $1 AND active = true \
             ORDER BY priority ASC, created_at ASC",
        )
        .bind(entity.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }
}

#[async_trait]
impl ClientDirectory for PgStore {
    async fn client(&self, client_id: Uuid) -> StorageResult<Option<ClientInfo>> {
        let row = sqlx::query(
            "SELECT client_id, name, delivery_emails, active FROM leadflow_clients \
             WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let emails: serde_json::Value = row.try_get("delivery_emails")?;
            Ok(ClientInfo {
                client_id: row.try_get("client_id")?,
                name: row.try_get("name")?,
                delivery_emails: serde_json::from_value(emails)
                    .map_err(StorageError::serialization)?,
                active: row.try_get("active")?,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl DeliveryStore for PgStore {
    async fn create_delivery(
        &self,
        new_delivery: NewDelivery,
        now: DateTime<Utc>,
    ) -> StorageResult<Delivery> {
        let sql = format!(
            "INSERT INTO leadflow_deliveries ({DELIVERY_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'pending_csv', 'accepted', 0, \
                     NULL, $11, NULL, NULL, NULL, NULL, $11) \
             RETURNING {DELIVERY_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(new_delivery.entity.as_str())
            .bind(new_delivery.order_id)
            .bind(new_delivery.client_id)
            .bind(&new_delivery.client_name)
            .bind(&new_delivery.product)
            .bind(method_str(new_delivery.method))
            .bind(&new_delivery.lead_ids)
            .bind(new_delivery.fresh_count)
            .bind(new_delivery.backlog_count)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;
        delivery_from_row(&row)
    }

    async fn get_delivery(&self, delivery_id: Uuid) -> StorageResult<Option<Delivery>> {
        let sql =
            format!("SELECT {DELIVERY_COLUMNS} FROM leadflow_deliveries WHERE delivery_id = $1");
        let row = sqlx::query(&sql)
            .bind(delivery_id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn transition_status(
        &self,
        delivery_id: Uuid,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        at: DateTime<Utc>,
        error: Option<&str>,
    ) -> StorageResult<bool> {
        // The per-state timestamp and attempt counter move together with
        // the optimistic precondition, in a single statement.
        let sql = match next {
            DeliveryStatus::ReadyToSend => {
                "UPDATE leadflow_deliveries SET status = $1, packaged_at = $2, updated_at = $2 \
                 WHERE delivery_id = $3 AND status = $4"
            }
            DeliveryStatus::Sending => {
                "UPDATE leadflow_deliveries SET status = $1, attempt_count = attempt_count + 1, \
                 updated_at = $2 WHERE delivery_id = $3 AND status = $4"
            }
            DeliveryStatus::Sent => {
                "UPDATE leadflow_deliveries SET status = $1, sent_at = $2, updated_at = $2 \
                 WHERE delivery_id = $3 AND status = $4"
            }
            DeliveryStatus::Failed => {
                "UPDATE leadflow_deliveries SET status = $1, failed_at = $2, last_error = $5, \
                 updated_at = $2 WHERE delivery_id = $3 AND status = $4"
            }
            DeliveryStatus::PendingCsv => {
                "UPDATE leadflow_deliveries SET status = $1, updated_at = $2 \
                 WHERE delivery_id = $3 AND status = $4"
            }
        };

        let mut query = sqlx::query(sql)
            .bind(next.to_string())
            .bind(at)
            .bind(delivery_id)
            .bind(expected.to_string());
        if next == DeliveryStatus::Failed {
            query = query.bind(error);
        }
        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() == 1)
    }

    async fn apply_outcome(
        &self,
        delivery_id: Uuid,
        outcome: DeliveryOutcome,
        at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "UPDATE leadflow_deliveries SET outcome = $1, outcome_at = $2, updated_at = $2 \
             WHERE delivery_id = $3 AND status = 'sent' AND outcome = 'accepted'",
        )
        .bind(outcome.to_string())
        .bind(at)
        .bind(delivery_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(cardinality(lead_ids)), 0) AS units \
             FROM leadflow_deliveries \
             WHERE order_id = $1 AND status = ANY($3) AND sent_at >= $2",
        )
        .bind(order_id)
        .bind(since)
        .bind(status_list(status_groups::QUOTA_COUNTED))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("units")?)
    }

    async fn backlog_units_sent_for_order_since(
        &self,
        order_id: Uuid,
        since: DateTime<Utc>,
    ) -> StorageResult<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(backlog_count), 0) AS units \
             FROM leadflow_deliveries \
             WHERE order_id = $1 AND status = ANY($3) AND sent_at >= $2",
        )
        .bind(order_id)
        .bind(since)
        .bind(status_list(status_groups::QUOTA_COUNTED))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("units")?)
    }

    async fn last_delivered_at(
        &self,
        phone: &str,
        product: &str,
        client_id: Uuid,
    ) -> StorageResult<Option<DateTime<Utc>>> {
        let row = sqlx::query(
            "SELECT MAX(d.sent_at) AS last_sent \
             FROM leadflow_deliveries d \
             JOIN leadflow_leads l ON l.lead_id = ANY(d.lead_ids) \
             WHERE d.client_id = $1 AND d.product = $2 AND l.phone = $3 \
               AND d.status = 'sent' AND d.outcome = 'accepted'",
        )
        .bind(client_id)
        .bind(product)
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("last_sent")?)
    }

    async fn lead_delivered_to_client(
        &self,
        lead_id: Uuid,
        client_id: Uuid,
    ) -> StorageResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS ( \
               SELECT 1 FROM leadflow_deliveries \
               WHERE client_id = $1 AND status = 'sent' AND outcome = 'accepted' \
                 AND $2 = ANY(lead_ids) \
             ) AS delivered",
        )
        .bind(client_id)
        .bind(lead_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get("delivered")?)
    }
}

#[async_trait]
impl RunReportStore for PgStore {
    async fn acquire_run_lock(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
        started_at: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let result = sqlx::query(
            "INSERT INTO leadflow_run_reports (run_id, entity, run_date, started_at, \
                                               finished_at, counters, errors) \
             VALUES ($1, $2, $3, $4, NULL, '{}'::jsonb, '[]'::jsonb) \
             ON CONFLICT (entity, run_date) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(entity.as_str())
        .bind(run_date)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn save_report(&self, report: &RunReport) -> StorageResult<()> {
        let counters = serde_json::json!({
            "promoted_aged": report.promoted_aged,
            "promoted_delivered": report.promoted_delivered,
            "non_routable": report.non_routable,
            "missing_timestamp": report.missing_timestamp,
            "orders_processed": report.orders_processed,
            "orders_skipped_quota_full": report.orders_skipped_quota_full,
            "leads_matched_fresh": report.leads_matched_fresh,
            "leads_matched_backlog": report.leads_matched_backlog,
            "deliveries_sent": report.deliveries_sent,
            "deliveries_failed": report.deliveries_failed,
            "fallback_matched": report.fallback_matched,
        });
        let errors =
            serde_json::to_value(&report.errors).map_err(StorageError::serialization)?;

        sqlx::query(
            "UPDATE leadflow_run_reports \
             SET finished_at = $1, counters = $2, errors = $3 \
             WHERE entity = $4 AND run_date = $5",
        )
        .bind(report.finished_at)
        .bind(counters)
        .bind(errors)
        .bind(report.entity.as_str())
        .bind(report.run_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_report(
        &self,
        entity: BusinessEntity,
        run_date: NaiveDate,
    ) -> StorageResult<Option<RunReport>> {
        let row = sqlx::query(
            "SELECT run_id, entity, run_date, started_at, finished_at, counters, errors \
             FROM leadflow_run_reports WHERE entity = $1 AND run_date = $2",
        )
        .bind(entity.as_str())
        .bind(run_date)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let entity_str: String = row.try_get("entity")?;
            let counters: serde_json::Value = row.try_get("counters")?;
            let errors: serde_json::Value = row.try_get("errors")?;
            let counter =
                |name: &str| -> u64 { counters.get(name).and_then(|v| v.as_u64()).unwrap_or(0) };

            Ok(RunReport {
                run_id: row.try_get("run_id")?,
                entity: parse_enum(&entity_str)?,
                run_date: row.try_get("run_date")?,
                started_at: row.try_get("started_at")?,
                finished_at: row.try_get("finished_at")?,
                promoted_aged: counter("promoted_aged"),
                promoted_delivered: counter("promoted_delivered"),
                non_routable: counter("non_routable"),
                missing_timestamp: counter("missing_timestamp"),
                orders_processed: counter("orders_processed"),
                orders_skipped_quota_full: counter("orders_skipped_quota_full"),
                leads_matched_fresh: counter("leads_matched_fresh"),
                leads_matched_backlog: counter("leads_matched_backlog"),
                deliveries_sent: counter("deliveries_sent"),
                deliveries_failed: counter("deliveries_failed"),
                fallback_matched: counter("fallback_matched"),
                errors: serde_json::from_value(errors).map_err(StorageError::serialization)?,
            })
        })
        .transpose()
    }
}
