//! Common types used across Fakturace

use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Invoice lifecycle state.
///
/// Stored as a small integer (`invoices.status_id`). `Overdue` is part of the
/// closed set for display purposes but no transition ever persists it; it is
/// derived at query time from the due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft = 1,
    Sent = 2,
    Paid = 3,
    Canceled = 4,
    Overdue = 5,
    PartiallyPaid = 6,
}

impl Default for InvoiceStatus {
    fn default() -> Self {
        Self::Draft
    }
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 6] = [
        Self::Draft,
        Self::Sent,
        Self::Paid,
        Self::Canceled,
        Self::Overdue,
        Self::PartiallyPaid,
    ];

    /// Numeric id as stored in `invoices.status_id`
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// Czech display label
    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Koncept",
            Self::Sent => "Odeslaná",
            Self::Paid => "Zaplacená",
            Self::Canceled => "Stornovaná",
            Self::Overdue => "Po splatnosti",
            Self::PartiallyPaid => "Částečně zaplacená",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Sent => "sent",
            Self::Paid => "paid",
            Self::Canceled => "canceled",
            Self::Overdue => "overdue",
            Self::PartiallyPaid => "partially_paid",
        }
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "sent" => Ok(Self::Sent),
            "paid" => Ok(Self::Paid),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "overdue" => Ok(Self::Overdue),
            "partially_paid" | "partially-paid" => Ok(Self::PartiallyPaid),
            other => other
                .parse::<i16>()
                .ok()
                .and_then(Self::from_id)
                .ok_or_else(|| format!("Invalid invoice status: {}", s)),
        }
    }
}

/// User subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PendingPayment,
    Canceled,
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::PendingPayment => write!(f, "pending_payment"),
            Self::Canceled => write!(f, "canceled"),
        }
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "pending_payment" => Ok(Self::PendingPayment),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Billing cycle of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

impl BillingCycle {
    /// Length of one cycle in calendar months
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Monthly => write!(f, "monthly"),
            Self::Yearly => write!(f, "yearly"),
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "monthly" => Ok(Self::Monthly),
            "yearly" | "annual" => Ok(Self::Yearly),
            _ => Err(format!("Invalid billing cycle: {}", s)),
        }
    }
}

/// Account role, resolved once when a session is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "VARCHAR", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    User,
    Admin,
}

impl Default for UserRole {
    fn default() -> Self {
        Self::User
    }
}

impl UserRole {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

// =============================================================================
// API Types
// =============================================================================

/// Paginated response wrapper
#[derive(Debug, Clone, Serialize)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Row offset for a 1-based page. Saturates instead of overflowing, so an
/// absurd page number yields an empty page.
pub fn page_offset(page: i64, per_page: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(per_page.max(0))
}

impl<T> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: i64, page: i64, per_page: i64) -> Self {
        let total_pages = if per_page > 0 {
            (total + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            items,
            total,
            page,
            per_page,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invoice_status_ids_round_trip() {
        for status in InvoiceStatus::ALL {
            assert_eq!(InvoiceStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(InvoiceStatus::from_id(0), None);
        assert_eq!(InvoiceStatus::from_id(7), None);
    }

    #[test]
    fn test_invoice_status_labels() {
        assert_eq!(InvoiceStatus::Draft.label(), "Koncept");
        assert_eq!(InvoiceStatus::Overdue.label(), "Po splatnosti");
        assert_eq!(InvoiceStatus::PartiallyPaid.label(), "Částečně zaplacená");
    }

    #[test]
    fn test_invoice_status_from_str_accepts_ids_and_names() {
        assert_eq!("sent".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Sent));
        assert_eq!("4".parse::<InvoiceStatus>(), Ok(InvoiceStatus::Canceled));
        assert_eq!(
            "partially-paid".parse::<InvoiceStatus>(),
            Ok(InvoiceStatus::PartiallyPaid)
        );
        assert!("archived".parse::<InvoiceStatus>().is_err());
    }

    #[test]
    fn test_invoice_status_serializes_snake_case() {
        let json = serde_json::to_string(&InvoiceStatus::PartiallyPaid).unwrap();
        assert_eq!(json, "\"partially_paid\"");
    }

    #[test]
    fn test_subscription_status_round_trip() {
        for status in [
            SubscriptionStatus::Active,
            SubscriptionStatus::PendingPayment,
            SubscriptionStatus::Canceled,
        ] {
            assert_eq!(status.to_string().parse::<SubscriptionStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_billing_cycle_months() {
        assert_eq!(BillingCycle::Monthly.months(), 1);
        assert_eq!(BillingCycle::Yearly.months(), 12);
        assert_eq!("annual".parse::<BillingCycle>(), Ok(BillingCycle::Yearly));
    }

    #[test]
    fn test_user_role() {
        assert!(UserRole::Admin.is_admin());
        assert!(!UserRole::User.is_admin());
        assert_eq!(UserRole::default(), UserRole::User);
    }

    #[test]
    fn test_paginated_response_pages() {
        let page = PaginatedResponse::new(vec![1, 2, 3], 21, 1, 10);
        assert_eq!(page.total_pages, 3);
        let empty: PaginatedResponse<i32> = PaginatedResponse::new(vec![], 0, 1, 0);
        assert_eq!(empty.total_pages, 0);
    }

    #[test]
    fn test_page_offset_saturates() {
        assert_eq!(page_offset(1, 20), 0);
        assert_eq!(page_offset(3, 20), 40);
        assert_eq!(page_offset(0, 20), 0);
        assert_eq!(page_offset(i64::MAX, 20), i64::MAX);
    }
}
