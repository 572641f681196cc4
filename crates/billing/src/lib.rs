#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Fakturace billing engine
//!
//! Invoicing and subscription logic behind the HTTP API.
//!
//! ## Features
//!
//! - **Invoice lifecycle**: draft, sent, paid, partially paid, canceled, with
//!   overdue derived from the due date
//! - **Numbering**: per-user yearly `YYYY-NNNNN` sequence
//! - **Quota**: monthly invoice limit per plan, enforced inside the creation
//!   transaction
//! - **Subscriptions**: plan resolution, bank-transfer upgrades confirmed by an
//!   admin, period arithmetic
//! - **Payments**: IBAN conversion and SPAYD strings for QR payments
//! - **Webhooks**: signed payment notifications, stored idempotently

pub mod clients;
pub mod error;
pub mod invoices;
pub mod lifecycle;
pub mod models;
pub mod numbering;
pub mod plans;
pub mod spayd;
pub mod subscriptions;
pub mod totals;
pub mod usage;
pub mod webhooks;

// Clients
pub use clients::{is_valid_ico, normalize_ico, Client, ClientInput, ClientService};

// Error
pub use error::{BillingError, BillingResult};

// Invoices
pub use invoices::{InvoiceFilter, InvoiceService, InvoiceSummary, PaymentQr};

// Lifecycle
pub use lifecycle::{LifecycleFields, Transition};

// Models
pub use models::{
    DueTerm, Invoice, InvoiceDraft, InvoiceItem, InvoiceItemInput, InvoiceWithItems,
    PlanFeatures, SubscriptionPayment, SubscriptionPlan, UserSubscription,
};

// Numbering
pub use numbering::{next_invoice_number, InvoiceNumber};

// Plans
pub use plans::{PlanResolver, SubscriptionOverview, FREE_PLAN_ID};

// Payments
pub use spayd::{iban_checksum_valid, CzechAccount, Spayd};

// Subscriptions
pub use subscriptions::{SubscriptionListItem, SubscriptionService, UpgradeRequest};

// Usage
pub use usage::{QuotaTracker, UsagePeriod};

// Webhooks
pub use webhooks::{PaymentWebhookHandler, WebhookOutcome, SIGNATURE_HEADER};

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
#[derive(Clone)]
pub struct BillingService {
    pub clients: ClientService,
    pub invoices: InvoiceService,
    pub plans: PlanResolver,
    pub quota: QuotaTracker,
    pub subscriptions: SubscriptionService,
    pub webhooks: PaymentWebhookHandler,
}

impl BillingService {
    /// `webhook_secret` enables signature checks on payment notifications
    pub fn new(pool: PgPool, webhook_secret: Option<String>) -> Self {
        Self {
            clients: ClientService::new(pool.clone()),
            invoices: InvoiceService::new(pool.clone()),
            plans: PlanResolver::new(pool.clone()),
            quota: QuotaTracker::new(pool.clone()),
            subscriptions: SubscriptionService::new(pool.clone()),
            webhooks: PaymentWebhookHandler::new(pool, webhook_secret),
        }
    }
}
