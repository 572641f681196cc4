//! Subscription management
//!
//! Upgrades are paid by bank transfer: a user request creates a
//! `pending_payment` row carrying a variable symbol, and an administrator
//! confirms the payment once it shows up on the operator's account. Admin
//! operations (plan change, cancel, reactivate, extend) act on rows directly.

use fakturace_shared::{BillingCycle, SubscriptionStatus};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgConnection, PgPool};
use time::{Date, Month, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{SubscriptionPayment, SubscriptionPlan, UserSubscription};
use crate::plans::{PlanResolver, FREE_PLAN_ID};
use crate::spayd::{CzechAccount, Spayd};
use crate::usage::{check_downgrade, QuotaTracker};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, plan_id, status, billing_cycle, \
     current_period_start, current_period_end, variable_symbol, created_at";

// =============================================================================
// Period arithmetic
// =============================================================================

/// Add calendar months, clamping the day to the target month's length
/// (Jan 31 + 1 month = Feb 28/29).
pub fn add_months(at: OffsetDateTime, months: u32) -> BillingResult<OffsetDateTime> {
    let index = at.year() * 12 + i32::from(u8::from(at.month())) - 1 + months as i32;
    let year = index.div_euclid(12);
    let month = Month::try_from((index.rem_euclid(12) + 1) as u8)
        .map_err(|e| BillingError::Internal(format!("Invalid month: {}", e)))?;

    let date = (1..=at.day())
        .rev()
        .find_map(|day| Date::from_calendar_date(year, month, day).ok())
        .ok_or_else(|| BillingError::Internal(format!("No valid day in {}-{}", year, month)))?;

    Ok(at.replace_date(date))
}

/// End of a billing period that starts at `start`
pub fn period_end(start: OffsetDateTime, cycle: BillingCycle) -> BillingResult<OffsetDateTime> {
    add_months(start, cycle.months())
}

/// Start and end of a freshly assigned plan. Every assignment, Free included,
/// carries an end so that extending always has one to push out.
pub fn assigned_period(
    now: OffsetDateTime,
    cycle: BillingCycle,
) -> BillingResult<(OffsetDateTime, OffsetDateTime)> {
    Ok((now, period_end(now, cycle)?))
}

/// Extending adds one cycle to the existing end rather than restarting from now.
/// Rows inserted by hand without an end start counting from `now`.
pub fn extend_period(
    current_end: Option<OffsetDateTime>,
    cycle: BillingCycle,
    now: OffsetDateTime,
) -> BillingResult<OffsetDateTime> {
    period_end(current_end.unwrap_or(now), cycle)
}

/// Ten-digit variable symbol derived from the subscription id
pub fn subscription_variable_symbol(id: Uuid) -> String {
    format!("{:010}", id.as_u128() % 10_000_000_000)
}

// =============================================================================
// Results
// =============================================================================

/// Payment instructions returned for an upgrade request
#[derive(Debug, Clone, Serialize)]
pub struct UpgradeRequest {
    pub subscription: UserSubscription,
    pub plan: SubscriptionPlan,
    pub amount: Decimal,
    pub currency: String,
    pub variable_symbol: String,
    pub iban: String,
    pub spayd: String,
}

/// Subscription row joined with its owner and plan, for admin listings
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionListItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub plan_id: i16,
    pub plan_name: String,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: Option<OffsetDateTime>,
    pub variable_symbol: Option<String>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct SubscriptionService {
    pool: PgPool,
    plans: PlanResolver,
    quota: QuotaTracker,
}

impl SubscriptionService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            plans: PlanResolver::new(pool.clone()),
            quota: QuotaTracker::new(pool.clone()),
            pool,
        }
    }

    /// Free subscription for a newly registered user. Runs inside the
    /// registration transaction.
    pub async fn create_initial(conn: &mut PgConnection, user_id: Uuid) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();
        let (start, end) = assigned_period(OffsetDateTime::now_utc(), BillingCycle::Monthly)?;
        sqlx::query(
            r#"
            INSERT INTO user_subscriptions
                (id, user_id, plan_id, status, billing_cycle,
                 current_period_start, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(FREE_PLAN_ID)
        .bind(SubscriptionStatus::Active)
        .bind(BillingCycle::Monthly)
        .bind(start)
        .bind(end)
        .execute(&mut *conn)
        .await?;

        Ok(id)
    }

    pub async fn get(&self, subscription_id: Uuid) -> BillingResult<UserSubscription> {
        sqlx::query_as::<_, UserSubscription>(&format!(
            "SELECT {} FROM user_subscriptions WHERE id = $1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
    }

    pub async fn list(
        &self,
        status: Option<SubscriptionStatus>,
    ) -> BillingResult<Vec<SubscriptionListItem>> {
        let rows = sqlx::query_as::<_, SubscriptionListItem>(
            r#"
            SELECT s.id, s.user_id, u.email AS user_email, s.plan_id, p.name AS plan_name,
                   s.status, s.billing_cycle, s.current_period_start, s.current_period_end,
                   s.variable_symbol, s.created_at
            FROM user_subscriptions s
            JOIN users u ON u.id = s.user_id
            JOIN subscription_plans p ON p.id = s.plan_id
            WHERE ($1::VARCHAR IS NULL OR s.status = $1)
            ORDER BY s.created_at DESC
            "#,
        )
        .bind(status.map(|s| s.to_string()))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    pub async fn payments(&self, subscription_id: Uuid) -> BillingResult<Vec<SubscriptionPayment>> {
        let rows = sqlx::query_as::<_, SubscriptionPayment>(
            r#"
            SELECT id, subscription_id, amount, variable_symbol, paid_at, note, is_synthetic
            FROM subscription_payments
            WHERE subscription_id = $1
            ORDER BY paid_at DESC
            "#,
        )
        .bind(subscription_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Pending subscription waiting for a payment with this variable symbol
    pub async fn find_pending_by_variable_symbol(
        &self,
        variable_symbol: &str,
    ) -> BillingResult<Option<UserSubscription>> {
        let sub = sqlx::query_as::<_, UserSubscription>(&format!(
            "SELECT {} FROM user_subscriptions \
             WHERE variable_symbol = $1 AND status = 'pending_payment' \
             ORDER BY created_at DESC LIMIT 1",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(variable_symbol)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// User-initiated upgrade. Creates a `pending_payment` row and returns the
    /// bank transfer details for the operator's account. The limits in force
    /// do not change until the payment is confirmed.
    pub async fn request_upgrade(
        &self,
        user_id: Uuid,
        plan_id: i16,
        cycle: BillingCycle,
        operator_account: &CzechAccount,
    ) -> BillingResult<UpgradeRequest> {
        let plan = self.plans.plan(plan_id).await?;
        if plan.is_free() {
            return Err(BillingError::InvalidInput(
                "Free plan cannot be purchased".to_string(),
            ));
        }
        let amount = plan.price_for(cycle);

        let mut tx = self.pool.begin().await?;

        // A newer request supersedes any unpaid one
        let superseded = sqlx::query(
            r#"
            UPDATE user_subscriptions
            SET status = 'canceled', updated_at = NOW()
            WHERE user_id = $1 AND status = 'pending_payment'
            "#,
        )
        .bind(user_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let id = Uuid::new_v4();
        let variable_symbol = subscription_variable_symbol(id);
        let subscription = sqlx::query_as::<_, UserSubscription>(&format!(
            r#"
            INSERT INTO user_subscriptions
                (id, user_id, plan_id, status, billing_cycle, variable_symbol)
            VALUES ($1, $2, $3, 'pending_payment', $4, $5)
            RETURNING {}
            "#,
            SUBSCRIPTION_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .bind(plan_id)
        .bind(cycle)
        .bind(&variable_symbol)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let spayd = Spayd::new(operator_account, amount, "CZK")
            .variable_symbol(&variable_symbol)?
            .message(&format!("Predplatne {}", plan.name))
            .build();

        tracing::info!(
            user_id = %user_id,
            subscription_id = %id,
            plan_id = plan_id,
            billing_cycle = %cycle,
            superseded = superseded,
            "Upgrade requested, awaiting payment"
        );

        Ok(UpgradeRequest {
            subscription,
            amount,
            currency: "CZK".to_string(),
            variable_symbol,
            iban: operator_account.to_iban(),
            spayd,
            plan,
        })
    }

    /// Admin: pending_payment -> active, starting a fresh period now.
    /// Optionally records a synthetic payment for bookkeeping.
    pub async fn confirm_payment(
        &self,
        subscription_id: Uuid,
        create_payment_record: bool,
        note: Option<String>,
    ) -> BillingResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;
        let current = lock_subscription(&mut *tx, subscription_id).await?;

        if current.status != SubscriptionStatus::PendingPayment {
            return Err(BillingError::InvalidSubscriptionState(format!(
                "cannot confirm payment of a {} subscription",
                current.status
            )));
        }

        let (now, end) = assigned_period(OffsetDateTime::now_utc(), current.billing_cycle)?;
        let updated = set_active_period(&mut *tx, subscription_id, now, end).await?;

        if create_payment_record {
            let plan = self.plans.plan(current.plan_id).await?;
            sqlx::query(
                r#"
                INSERT INTO subscription_payments
                    (id, subscription_id, amount, variable_symbol, paid_at, note, is_synthetic)
                VALUES ($1, $2, $3, $4, $5, $6, TRUE)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(subscription_id)
            .bind(plan.price_for(current.billing_cycle))
            .bind(&current.variable_symbol)
            .bind(now)
            .bind(&note)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            user_id = %current.user_id,
            plan_id = current.plan_id,
            payment_recorded = create_payment_record,
            "Subscription payment confirmed"
        );

        Ok(updated)
    }

    /// Admin: move a user to another plan immediately.
    ///
    /// A move to a plan with a lower monthly limit is rejected when this
    /// month's usage already exceeds the target limit.
    pub async fn admin_change_plan(
        &self,
        user_id: Uuid,
        plan_id: i16,
        cycle: Option<BillingCycle>,
    ) -> BillingResult<UserSubscription> {
        let target = self.plans.plan(plan_id).await?;
        let current_plan = self.plans.effective_plan(user_id).await?;

        if is_downgrade(&current_plan, &target) {
            let used = self.quota.current_usage(user_id).await?;
            check_downgrade(target.invoice_limit_monthly, used).map_err(|e| {
                tracing::info!(
                    user_id = %user_id,
                    from_plan = current_plan.id,
                    to_plan = target.id,
                    used = used,
                    "Plan downgrade rejected"
                );
                e
            })?;
        }

        let mut tx = self.pool.begin().await?;

        let current: Option<UserSubscription> = sqlx::query_as(&format!(
            "SELECT {} FROM user_subscriptions WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;

        let cycle = cycle
            .or(current.as_ref().map(|s| s.billing_cycle))
            .unwrap_or_default();
        let (start, end) = assigned_period(OffsetDateTime::now_utc(), cycle)?;

        let updated = match current {
            Some(sub) => {
                sqlx::query_as::<_, UserSubscription>(&format!(
                    r#"
                    UPDATE user_subscriptions
                    SET plan_id = $2, status = 'active', billing_cycle = $3,
                        current_period_start = $4, current_period_end = $5, updated_at = NOW()
                    WHERE id = $1
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLUMNS
                ))
                .bind(sub.id)
                .bind(plan_id)
                .bind(cycle)
                .bind(start)
                .bind(end)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, UserSubscription>(&format!(
                    r#"
                    INSERT INTO user_subscriptions
                        (id, user_id, plan_id, status, billing_cycle,
                         current_period_start, current_period_end)
                    VALUES ($1, $2, $3, 'active', $4, $5, $6)
                    RETURNING {}
                    "#,
                    SUBSCRIPTION_COLUMNS
                ))
                .bind(Uuid::new_v4())
                .bind(user_id)
                .bind(plan_id)
                .bind(cycle)
                .bind(start)
                .bind(end)
                .fetch_one(&mut *tx)
                .await?
            }
        };

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            from_plan = current_plan.id,
            to_plan = plan_id,
            billing_cycle = %cycle,
            "Plan changed by admin"
        );

        Ok(updated)
    }

    pub async fn cancel(&self, subscription_id: Uuid) -> BillingResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;
        let current = lock_subscription(&mut *tx, subscription_id).await?;

        if current.status == SubscriptionStatus::Canceled {
            return Err(BillingError::InvalidSubscriptionState(
                "subscription is already canceled".to_string(),
            ));
        }

        let updated = sqlx::query_as::<_, UserSubscription>(&format!(
            "UPDATE user_subscriptions SET status = 'canceled', updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            user_id = %current.user_id,
            previous_status = %current.status,
            "Subscription canceled"
        );

        Ok(updated)
    }

    /// Admin: canceled -> active with a new period starting now
    pub async fn reactivate(&self, subscription_id: Uuid) -> BillingResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;
        let current = lock_subscription(&mut *tx, subscription_id).await?;

        if current.status != SubscriptionStatus::Canceled {
            return Err(BillingError::InvalidSubscriptionState(format!(
                "only canceled subscriptions can be reactivated (is {})",
                current.status
            )));
        }

        let (start, end) = assigned_period(OffsetDateTime::now_utc(), current.billing_cycle)?;
        let updated = set_active_period(&mut *tx, subscription_id, start, end).await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            user_id = %current.user_id,
            "Subscription reactivated"
        );

        Ok(updated)
    }

    /// Admin: push the period end out by one billing cycle
    pub async fn extend(&self, subscription_id: Uuid) -> BillingResult<UserSubscription> {
        let mut tx = self.pool.begin().await?;
        let current = lock_subscription(&mut *tx, subscription_id).await?;

        if current.status != SubscriptionStatus::Active {
            return Err(BillingError::InvalidSubscriptionState(format!(
                "only active subscriptions can be extended (is {})",
                current.status
            )));
        }

        let new_end = extend_period(
            current.current_period_end,
            current.billing_cycle,
            OffsetDateTime::now_utc(),
        )?;

        let updated = sqlx::query_as::<_, UserSubscription>(&format!(
            "UPDATE user_subscriptions SET current_period_end = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {}",
            SUBSCRIPTION_COLUMNS
        ))
        .bind(subscription_id)
        .bind(new_end)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            subscription_id = %subscription_id,
            new_period_end = %new_end,
            "Subscription period extended"
        );

        Ok(updated)
    }
}

/// Lower monthly limit than the current plan (0 counts as unlimited)
fn is_downgrade(current: &SubscriptionPlan, target: &SubscriptionPlan) -> bool {
    match (current.invoice_limit_monthly, target.invoice_limit_monthly) {
        (_, 0) => false,
        (0, _) => true,
        (from, to) => to < from,
    }
}

async fn lock_subscription(
    conn: &mut PgConnection,
    subscription_id: Uuid,
) -> BillingResult<UserSubscription> {
    sqlx::query_as::<_, UserSubscription>(&format!(
        "SELECT {} FROM user_subscriptions WHERE id = $1 FOR UPDATE",
        SUBSCRIPTION_COLUMNS
    ))
    .bind(subscription_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| BillingError::SubscriptionNotFound(subscription_id.to_string()))
}

async fn set_active_period(
    conn: &mut PgConnection,
    subscription_id: Uuid,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> BillingResult<UserSubscription> {
    let sub = sqlx::query_as::<_, UserSubscription>(&format!(
        r#"
        UPDATE user_subscriptions
        SET status = 'active', current_period_start = $2, current_period_end = $3,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        SUBSCRIPTION_COLUMNS
    ))
    .bind(subscription_id)
    .bind(start)
    .bind(end)
    .fetch_one(&mut *conn)
    .await?;

    Ok(sub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PlanFeatures;
    use sqlx::types::Json;
    use time::macros::datetime;

    fn plan(id: i16, limit: i32) -> SubscriptionPlan {
        SubscriptionPlan {
            id,
            name: format!("plan-{}", id),
            invoice_limit_monthly: limit,
            price_monthly: Decimal::ONE,
            price_yearly: Decimal::TEN,
            features: Json(PlanFeatures::default()),
        }
    }

    #[test]
    fn test_add_months_clamps_day() {
        let jan31 = datetime!(2026-01-31 10:00 UTC);
        assert_eq!(add_months(jan31, 1).unwrap(), datetime!(2026-02-28 10:00 UTC));

        let leap = datetime!(2028-01-31 10:00 UTC);
        assert_eq!(add_months(leap, 1).unwrap(), datetime!(2028-02-29 10:00 UTC));
    }

    #[test]
    fn test_add_months_crosses_year() {
        let nov = datetime!(2026-11-15 08:30 UTC);
        assert_eq!(add_months(nov, 3).unwrap(), datetime!(2027-02-15 08:30 UTC));
    }

    #[test]
    fn test_period_end_per_cycle() {
        let start = datetime!(2026-03-10 00:00 UTC);
        assert_eq!(
            period_end(start, BillingCycle::Monthly).unwrap(),
            datetime!(2026-04-10 00:00 UTC)
        );
        assert_eq!(
            period_end(start, BillingCycle::Yearly).unwrap(),
            datetime!(2027-03-10 00:00 UTC)
        );
    }

    #[test]
    fn test_extend_adds_to_existing_end() {
        let now = datetime!(2026-03-01 00:00 UTC);
        let end = datetime!(2026-06-15 00:00 UTC);
        assert_eq!(
            extend_period(Some(end), BillingCycle::Monthly, now).unwrap(),
            datetime!(2026-07-15 00:00 UTC)
        );
        assert_eq!(
            extend_period(None, BillingCycle::Monthly, now).unwrap(),
            datetime!(2026-04-01 00:00 UTC)
        );
    }

    #[test]
    fn test_free_assignment_gets_period_end() {
        let now = datetime!(2026-01-31 09:00 UTC);
        let (start, end) = assigned_period(now, BillingCycle::Monthly).unwrap();
        assert_eq!(start, now);
        assert_eq!(end, datetime!(2026-02-28 09:00 UTC));

        // Extending the assignment pushes its own end, not "now + cycle"
        let later = datetime!(2026-02-10 00:00 UTC);
        assert_eq!(
            extend_period(Some(end), BillingCycle::Monthly, later).unwrap(),
            datetime!(2026-03-28 09:00 UTC)
        );

        let (_, yearly_end) = assigned_period(now, BillingCycle::Yearly).unwrap();
        assert_eq!(yearly_end, datetime!(2027-01-31 09:00 UTC));
    }

    #[test]
    fn test_variable_symbol_is_ten_digits() {
        for _ in 0..20 {
            let vs = subscription_variable_symbol(Uuid::new_v4());
            assert_eq!(vs.len(), 10);
            assert!(vs.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_is_downgrade() {
        assert!(is_downgrade(&plan(2, 100), &plan(1, 10)));
        assert!(is_downgrade(&plan(3, 0), &plan(2, 50)));
        assert!(!is_downgrade(&plan(1, 4), &plan(2, 50)));
        assert!(!is_downgrade(&plan(2, 50), &plan(3, 0)));
        assert!(!is_downgrade(&plan(2, 50), &plan(4, 50)));
    }

    #[test]
    fn test_downgrade_from_100_with_usage_50_to_10_rejected() {
        let from = plan(2, 100);
        let to = plan(1, 10);
        assert!(is_downgrade(&from, &to));
        assert!(matches!(
            check_downgrade(to.invoice_limit_monthly, 50),
            Err(BillingError::DowngradeBlocked { used: 50, limit: 10 })
        ));
    }
}
