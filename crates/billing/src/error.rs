//! Billing error types

use fakturace_shared::InvoiceStatus;
use thiserror::Error;

/// Errors raised by the invoicing and subscription engine
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Monthly invoice limit reached ({used}/{limit})")]
    InvoiceLimitReached { limit: i32, used: i32 },

    #[error("Cannot {action} an invoice in status {from}")]
    InvalidTransition {
        from: InvoiceStatus,
        action: &'static str,
    },

    #[error("Only draft invoices can be edited (current status: {0})")]
    NotEditable(InvoiceStatus),

    #[error("Invoice has no line items")]
    NoLineItems,

    #[error("Invoice number already in use: {0}")]
    InvoiceNumberTaken(String),

    #[error("Invalid invoice number: {0}")]
    InvalidInvoiceNumber(String),

    #[error("Invoice number sequence exhausted for year {0}")]
    NumberSequenceExhausted(i32),

    #[error("Current usage ({used}) exceeds the target plan limit ({limit})")]
    DowngradeBlocked { used: i32, limit: i32 },

    #[error("Invalid bank account: {0}")]
    InvalidAccount(String),

    #[error("Bank account not configured")]
    BankAccountMissing,

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Invalid subscription state: {0}")]
    InvalidSubscriptionState(String),

    #[error("Client is referenced by {0} invoice(s)")]
    ClientInUse(i64),

    #[error("Webhook signature verification failed")]
    WebhookSignatureInvalid,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<sqlx::Error> for BillingError {
    fn from(err: sqlx::Error) -> Self {
        BillingError::Database(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
