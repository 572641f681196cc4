//! Invoice lifecycle state machine
//!
//! Pure transition rules over [`InvoiceStatus`]. The invoice service loads the
//! current row, asks [`apply`] for the new lifecycle fields and persists them.
//!
//! | Action               | From                          | To                 |
//! |----------------------|-------------------------------|--------------------|
//! | send                 | draft                         | sent               |
//! | mark paid            | sent, overdue, partially paid | paid               |
//! | mark unpaid          | paid                          | sent               |
//! | mark partially paid  | sent, overdue                 | partially paid     |
//! | return to draft      | sent                          | draft              |
//! | cancel               | anything not paid or canceled | canceled           |
//! | activate             | canceled                      | draft or sent      |
//!
//! Overdue is never written by a transition. It is derived at query time,
//! see [`is_overdue`].

use fakturace_shared::InvoiceStatus;
use time::Date;

use crate::error::{BillingError, BillingResult};

/// Lifecycle-relevant fields of an invoice row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleFields {
    pub status: InvoiceStatus,
    pub is_paid: bool,
    pub is_canceled: bool,
    pub payment_date: Option<Date>,
}

impl LifecycleFields {
    pub fn draft() -> Self {
        Self {
            status: InvoiceStatus::Draft,
            is_paid: false,
            is_canceled: false,
            payment_date: None,
        }
    }
}

/// Explicit user action on an invoice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Send { item_count: usize },
    MarkPaid { payment_date: Date },
    MarkUnpaid,
    MarkPartiallyPaid,
    ReturnToDraft,
    Cancel,
    /// `collides` is true when another live invoice of the same user already
    /// holds this invoice's number
    Activate { has_number: bool, collides: bool },
}

impl Transition {
    pub fn action(&self) -> &'static str {
        match self {
            Self::Send { .. } => "send",
            Self::MarkPaid { .. } => "mark as paid",
            Self::MarkUnpaid => "mark as unpaid",
            Self::MarkPartiallyPaid => "mark as partially paid",
            Self::ReturnToDraft => "return to draft",
            Self::Cancel => "cancel",
            Self::Activate { .. } => "activate",
        }
    }
}

/// Compute the lifecycle fields after `transition`, or reject it.
pub fn apply(current: LifecycleFields, transition: Transition) -> BillingResult<LifecycleFields> {
    use InvoiceStatus::*;

    let reject = || BillingError::InvalidTransition {
        from: current.status,
        action: transition.action(),
    };

    match transition {
        Transition::Send { item_count } => {
            if current.status != Draft {
                return Err(reject());
            }
            if item_count == 0 {
                return Err(BillingError::NoLineItems);
            }
            Ok(LifecycleFields {
                status: Sent,
                ..current
            })
        }
        Transition::MarkPaid { payment_date } => match current.status {
            Sent | Overdue | PartiallyPaid => Ok(LifecycleFields {
                status: Paid,
                is_paid: true,
                is_canceled: false,
                payment_date: Some(payment_date),
            }),
            _ => Err(reject()),
        },
        Transition::MarkUnpaid => match current.status {
            Paid => Ok(LifecycleFields {
                status: Sent,
                is_paid: false,
                is_canceled: false,
                payment_date: None,
            }),
            _ => Err(reject()),
        },
        Transition::MarkPartiallyPaid => match current.status {
            Sent | Overdue => Ok(LifecycleFields {
                status: PartiallyPaid,
                ..current
            }),
            _ => Err(reject()),
        },
        Transition::ReturnToDraft => match current.status {
            Sent => Ok(LifecycleFields {
                status: Draft,
                ..current
            }),
            _ => Err(reject()),
        },
        Transition::Cancel => {
            if current.is_paid || matches!(current.status, Paid | Canceled) {
                return Err(reject());
            }
            Ok(LifecycleFields {
                status: Canceled,
                is_canceled: true,
                ..current
            })
        }
        Transition::Activate {
            has_number,
            collides,
        } => {
            if current.status != Canceled {
                return Err(reject());
            }
            // A colliding number forces renumbering on the next send
            let status = if has_number && !collides { Sent } else { Draft };
            Ok(LifecycleFields {
                status,
                is_paid: false,
                is_canceled: false,
                payment_date: None,
            })
        }
    }
}

/// Field and item edits are only allowed on drafts.
pub fn ensure_editable(status: InvoiceStatus) -> BillingResult<()> {
    if status == InvoiceStatus::Draft {
        Ok(())
    } else {
        Err(BillingError::NotEditable(status))
    }
}

/// Query-time overdue rule: unpaid draft or sent invoice past its due date.
pub fn is_overdue(status: InvoiceStatus, due_date: Date, today: Date) -> bool {
    matches!(status, InvoiceStatus::Draft | InvoiceStatus::Sent) && due_date < today
}
