//! Invoice quota tracking
//!
//! Counts invoices created per user per calendar month and gates creation
//! against the limit of the user's effective plan. The counter is monotonic:
//! it is incremented once per successful creation and never decremented, so
//! deleting or canceling an invoice does not give the slot back.

use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

/// Calendar month a usage counter belongs to (UTC)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UsagePeriod {
    pub year: i32,
    pub month: i32,
}

impl UsagePeriod {
    pub fn current() -> Self {
        Self::containing(OffsetDateTime::now_utc())
    }

    pub fn containing(at: OffsetDateTime) -> Self {
        Self {
            year: at.year(),
            month: i32::from(u8::from(at.month())),
        }
    }
}

/// Whether one more invoice fits. A limit of 0 means unlimited.
pub fn can_create(limit: i32, used: i32) -> bool {
    limit == 0 || used < limit
}

/// Usage as a whole percentage of the limit (0 for unlimited plans)
pub fn usage_percentage(limit: i32, used: i32) -> i32 {
    if limit <= 0 {
        return 0;
    }
    ((i64::from(used) * 100) / i64::from(limit)) as i32
}

/// Guard for moving a user to a plan with `target_limit`.
///
/// Rejected only when this month's usage already exceeds the target limit;
/// landing exactly on the limit is allowed.
pub fn check_downgrade(target_limit: i32, used: i32) -> BillingResult<()> {
    if target_limit != 0 && used > target_limit {
        return Err(BillingError::DowngradeBlocked {
            used,
            limit: target_limit,
        });
    }
    Ok(())
}

/// Per-month invoice counter
#[derive(Clone)]
pub struct QuotaTracker {
    pool: PgPool,
}

impl QuotaTracker {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Invoices created by the user in `period`
    pub async fn usage(&self, user_id: Uuid, period: UsagePeriod) -> BillingResult<i32> {
        let count: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT invoice_count
            FROM invoice_usage
            WHERE user_id = $1 AND year = $2 AND month = $3
            "#,
        )
        .bind(user_id)
        .bind(period.year)
        .bind(period.month)
        .fetch_optional(&self.pool)
        .await?;

        Ok(count.map(|(c,)| c).unwrap_or(0))
    }

    pub async fn current_usage(&self, user_id: Uuid) -> BillingResult<i32> {
        self.usage(user_id, UsagePeriod::current()).await
    }

    /// Non-locking check, for display and early rejection
    pub async fn can_create_invoice(&self, user_id: Uuid, limit: i32) -> BillingResult<bool> {
        let used = self.current_usage(user_id).await?;
        Ok(can_create(limit, used))
    }

    /// Lock this month's counter row and verify one more invoice fits.
    ///
    /// Must run inside the creation transaction. The row lock is held until
    /// commit, so concurrent creations for the same user serialize here.
    pub async fn reserve_slot(
        conn: &mut PgConnection,
        user_id: Uuid,
        limit: i32,
    ) -> BillingResult<UsagePeriod> {
        let period = UsagePeriod::current();

        sqlx::query(
            r#"
            INSERT INTO invoice_usage (user_id, year, month, invoice_count)
            VALUES ($1, $2, $3, 0)
            ON CONFLICT (user_id, year, month) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(period.year)
        .bind(period.month)
        .execute(&mut *conn)
        .await?;

        let (used,): (i32,) = sqlx::query_as(
            r#"
            SELECT invoice_count
            FROM invoice_usage
            WHERE user_id = $1 AND year = $2 AND month = $3
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .bind(period.year)
        .bind(period.month)
        .fetch_one(&mut *conn)
        .await?;

        if !can_create(limit, used) {
            tracing::info!(
                user_id = %user_id,
                used = used,
                limit = limit,
                "Invoice creation rejected: monthly limit reached"
            );
            return Err(BillingError::InvoiceLimitReached { limit, used });
        }

        Ok(period)
    }

    /// Count one created invoice. Call after the invoice rows are written.
    pub async fn record_creation(
        conn: &mut PgConnection,
        user_id: Uuid,
        period: UsagePeriod,
    ) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE invoice_usage
            SET invoice_count = invoice_count + 1, updated_at = NOW()
            WHERE user_id = $1 AND year = $2 AND month = $3
            "#,
        )
        .bind(user_id)
        .bind(period.year)
        .bind(period.month)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }
}
