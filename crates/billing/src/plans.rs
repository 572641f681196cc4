//! Subscription plan resolution
//!
//! Answers "which plan limits apply to this user right now?". The current
//! subscription is the most recently created row regardless of its status;
//! the effective plan is then derived from that row's status:
//!
//! - `active`: the row's own plan
//! - `pending_payment`: the plan of the latest `active` row, or Free if none
//!   (an unpaid upgrade request does not unlock the higher limit)
//! - `canceled`: Free

use fakturace_shared::SubscriptionStatus;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::models::{SubscriptionPlan, UserSubscription};
use crate::usage::{can_create, usage_percentage, QuotaTracker, UsagePeriod};

/// Plan every user falls back to
pub const FREE_PLAN_ID: i16 = 1;

/// Pure resolution of the plan whose limits apply.
pub fn effective_plan_id(
    current: Option<&UserSubscription>,
    last_active: Option<&UserSubscription>,
) -> i16 {
    match current {
        Some(sub) => match sub.status {
            SubscriptionStatus::Active => sub.plan_id,
            SubscriptionStatus::PendingPayment => {
                last_active.map(|s| s.plan_id).unwrap_or(FREE_PLAN_ID)
            }
            SubscriptionStatus::Canceled => FREE_PLAN_ID,
        },
        None => FREE_PLAN_ID,
    }
}

/// What the subscription page shows
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionOverview {
    pub subscription: Option<UserSubscription>,
    /// Plan whose limits are enforced
    pub plan: SubscriptionPlan,
    pub period: UsagePeriod,
    pub invoice_limit: i32,
    pub invoices_used: i32,
    pub usage_percentage: i32,
    pub can_create_invoice: bool,
    pub unlimited: bool,
}

impl SubscriptionOverview {
    pub fn compute(
        subscription: Option<UserSubscription>,
        plan: SubscriptionPlan,
        period: UsagePeriod,
        used: i32,
    ) -> Self {
        let limit = plan.invoice_limit_monthly;
        Self {
            subscription,
            period,
            invoice_limit: limit,
            invoices_used: used,
            usage_percentage: usage_percentage(limit, used),
            can_create_invoice: can_create(limit, used),
            unlimited: plan.is_unlimited(),
            plan,
        }
    }
}

/// Plan lookups and effective-plan resolution
#[derive(Clone)]
pub struct PlanResolver {
    pool: PgPool,
    quota: QuotaTracker,
}

impl PlanResolver {
    pub fn new(pool: PgPool) -> Self {
        let quota = QuotaTracker::new(pool.clone());
        Self { pool, quota }
    }

    pub async fn list_plans(&self) -> BillingResult<Vec<SubscriptionPlan>> {
        let plans = sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, invoice_limit_monthly, price_monthly, price_yearly, features
            FROM subscription_plans
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    pub async fn plan(&self, plan_id: i16) -> BillingResult<SubscriptionPlan> {
        sqlx::query_as::<_, SubscriptionPlan>(
            r#"
            SELECT id, name, invoice_limit_monthly, price_monthly, price_yearly, features
            FROM subscription_plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Plan {} not found", plan_id)))
    }

    /// Most recently created subscription row, whatever its status
    pub async fn current_subscription(
        &self,
        user_id: Uuid,
    ) -> BillingResult<Option<UserSubscription>> {
        let sub = sqlx::query_as::<_, UserSubscription>(
            r#"
            SELECT id, user_id, plan_id, status, billing_cycle, current_period_start,
                   current_period_end, variable_symbol, created_at
            FROM user_subscriptions
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    pub async fn last_active_subscription(
        &self,
        user_id: Uuid,
    ) -> BillingResult<Option<UserSubscription>> {
        let sub = sqlx::query_as::<_, UserSubscription>(
            r#"
            SELECT id, user_id, plan_id, status, billing_cycle, current_period_start,
                   current_period_end, variable_symbol, created_at
            FROM user_subscriptions
            WHERE user_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    /// Plan whose limits apply to the user right now
    pub async fn effective_plan(&self, user_id: Uuid) -> BillingResult<SubscriptionPlan> {
        let current = self.current_subscription(user_id).await?;
        let last_active = match &current {
            Some(sub) if sub.status == SubscriptionStatus::PendingPayment => {
                self.last_active_subscription(user_id).await?
            }
            _ => None,
        };

        let plan_id = effective_plan_id(current.as_ref(), last_active.as_ref());
        self.plan(plan_id).await
    }

    /// Monthly invoice limit in force (0 = unlimited)
    pub async fn invoice_limit(&self, user_id: Uuid) -> BillingResult<i32> {
        Ok(self.effective_plan(user_id).await?.invoice_limit_monthly)
    }

    pub async fn overview(&self, user_id: Uuid) -> BillingResult<SubscriptionOverview> {
        let subscription = self.current_subscription(user_id).await?;
        let plan = self.effective_plan(user_id).await?;
        let period = UsagePeriod::current();
        let used = self.quota.usage(user_id, period).await?;

        tracing::debug!(
            user_id = %user_id,
            plan_id = plan.id,
            used = used,
            "Resolved subscription overview"
        );

        Ok(SubscriptionOverview::compute(subscription, plan, period, used))
    }
}
