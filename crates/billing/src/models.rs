//! Database models for invoices, clients and subscriptions

use fakturace_shared::{BillingCycle, InvoiceStatus, SubscriptionStatus};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{types::Json, FromRow};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

// =============================================================================
// Invoices
// =============================================================================

/// Invoice row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Invoice {
    pub id: Uuid,
    pub user_id: Uuid,
    pub client_id: Uuid,
    #[sqlx(rename = "status_id")]
    pub status: InvoiceStatus,
    pub invoice_number: Option<String>,
    pub issue_date: Date,
    pub due_term_id: i16,
    pub due_date: Date,
    pub payment_date: Option<Date>,
    pub total_amount: Decimal,
    pub currency: String,
    pub note: Option<String>,
    pub is_paid: bool,
    pub is_canceled: bool,
    pub is_deleted: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Line item row, owned by exactly one invoice
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct InvoiceItem {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub unit: String,
    pub order_number: i32,
}

/// Invoice together with its items in display order
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceWithItems {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub items: Vec<InvoiceItem>,
}

/// Line item as submitted by the user
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItemInput {
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Editable invoice fields (create and draft update)
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceDraft {
    pub client_id: Uuid,
    pub issue_date: Date,
    pub due_term_id: i16,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    pub items: Vec<InvoiceItemInput>,
}

/// Named payment term ("14 dní")
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DueTerm {
    pub id: i16,
    pub name: String,
    pub days_count: i32,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Feature flags attached to a plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanFeatures {
    pub qr_payments: bool,
    pub email_sending: bool,
    pub custom_branding: bool,
    pub registry_lookup: bool,
}

/// Subscription plan row
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionPlan {
    pub id: i16,
    pub name: String,
    /// 0 means unlimited
    pub invoice_limit_monthly: i32,
    pub price_monthly: Decimal,
    pub price_yearly: Decimal,
    pub features: Json<PlanFeatures>,
}

impl SubscriptionPlan {
    pub fn is_unlimited(&self) -> bool {
        self.invoice_limit_monthly == 0
    }

    pub fn price_for(&self, cycle: BillingCycle) -> Decimal {
        match cycle {
            BillingCycle::Monthly => self.price_monthly,
            BillingCycle::Yearly => self.price_yearly,
        }
    }

    pub fn is_free(&self) -> bool {
        self.price_monthly.is_zero() && self.price_yearly.is_zero()
    }
}

/// User subscription row. The most recently created row is the current one.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: i16,
    pub status: SubscriptionStatus,
    pub billing_cycle: BillingCycle,
    pub current_period_start: OffsetDateTime,
    pub current_period_end: Option<OffsetDateTime>,
    pub variable_symbol: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Payment recorded against a subscription
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionPayment {
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub amount: Decimal,
    pub variable_symbol: Option<String>,
    pub paid_at: OffsetDateTime,
    pub note: Option<String>,
    pub is_synthetic: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn plan(limit: i32, monthly: Decimal, yearly: Decimal) -> SubscriptionPlan {
        SubscriptionPlan {
            id: 1,
            name: "Test".to_string(),
            invoice_limit_monthly: limit,
            price_monthly: monthly,
            price_yearly: yearly,
            features: Json(PlanFeatures::default()),
        }
    }

    #[test]
    fn test_plan_price_for_cycle() {
        let p = plan(50, dec!(149), dec!(1490));
        assert_eq!(p.price_for(BillingCycle::Monthly), dec!(149));
        assert_eq!(p.price_for(BillingCycle::Yearly), dec!(1490));
        assert!(!p.is_free());
        assert!(!p.is_unlimited());
    }

    #[test]
    fn test_free_unlimited_flags() {
        let p = plan(0, dec!(0), dec!(0));
        assert!(p.is_free());
        assert!(p.is_unlimited());
    }

    #[test]
    fn test_plan_features_missing_keys_default_to_false() {
        let features: PlanFeatures = serde_json::from_str(r#"{"qr_payments": true}"#).unwrap();
        assert!(features.qr_payments);
        assert!(!features.custom_branding);
    }

    #[test]
    fn test_invoice_draft_parses_iso_dates() {
        let draft: InvoiceDraft = serde_json::from_str(
            r#"{
                "client_id": "7a1c8e0e-6f0b-4b7a-9d0e-2f6b1c3d4e5f",
                "issue_date": "2026-03-01",
                "due_term_id": 2,
                "items": [{"description": "Konzultace", "quantity": "2", "unit_price": 100}]
            }"#,
        )
        .unwrap();
        assert_eq!(draft.issue_date.to_string(), "2026-03-01");
        assert_eq!(draft.items[0].quantity, dec!(2));
        assert_eq!(draft.items[0].unit_price, dec!(100));
        assert!(draft.currency.is_none());
    }
}
