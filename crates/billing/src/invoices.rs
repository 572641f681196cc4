//! Invoice service
//!
//! Persistence around the pure lifecycle, numbering and totals rules. Every
//! operation is scoped to the owning user; an invoice of another user is
//! reported as not found. Multi-row writes (invoice, items, usage counter)
//! happen in one transaction.

use fakturace_shared::{page_offset, InvoiceStatus, PaginatedResponse};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};
use crate::lifecycle::{self, LifecycleFields, Transition};
use crate::models::{DueTerm, Invoice, InvoiceDraft, InvoiceItem, InvoiceItemInput, InvoiceWithItems};
use crate::numbering::{next_invoice_number, InvoiceNumber};
use crate::plans::PlanResolver;
use crate::spayd::{CzechAccount, Spayd};
use crate::totals::{self, DEFAULT_UNIT};
use crate::usage::QuotaTracker;

const INVOICE_COLUMNS: &str = "id, user_id, client_id, status_id, invoice_number, issue_date, \
     due_term_id, due_date, payment_date, total_amount, currency, note, is_paid, is_canceled, \
     is_deleted, created_at, updated_at";

/// Unique index guarding live invoice numbers
const LIVE_NUMBER_INDEX: &str = "idx_invoices_live_number";

const DEFAULT_CURRENCY: &str = "CZK";
const MAX_PER_PAGE: i64 = 100;

/// Today's date in UTC, used for issue dates, payment dates and overdue checks
pub fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

// =============================================================================
// Listing
// =============================================================================

/// Query parameters for the invoice list
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InvoiceFilter {
    /// `overdue` selects unpaid drafts and sent invoices past their due date
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub year: Option<i32>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl InvoiceFilter {
    fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    fn per_page(&self) -> i64 {
        self.per_page.unwrap_or(20).clamp(1, MAX_PER_PAGE)
    }

    fn offset(&self) -> i64 {
        page_offset(self.page(), self.per_page())
    }
}

#[derive(Debug, Clone, FromRow)]
struct InvoiceListRow {
    #[sqlx(flatten)]
    invoice: Invoice,
    client_name: String,
}

/// List entry with the derived display status
#[derive(Debug, Clone, Serialize)]
pub struct InvoiceSummary {
    #[serde(flatten)]
    pub invoice: Invoice,
    pub client_name: String,
    pub is_overdue: bool,
    /// Stored status, or `overdue` when derived
    pub display_status: InvoiceStatus,
    pub status_label: &'static str,
}

impl InvoiceSummary {
    fn from_row(row: InvoiceListRow, today: Date) -> Self {
        let is_overdue = lifecycle::is_overdue(row.invoice.status, row.invoice.due_date, today);
        let display_status = if is_overdue {
            InvoiceStatus::Overdue
        } else {
            row.invoice.status
        };
        Self {
            is_overdue,
            display_status,
            status_label: display_status.label(),
            client_name: row.client_name,
            invoice: row.invoice,
        }
    }
}

/// Payment instructions for one invoice
#[derive(Debug, Clone, Serialize)]
pub struct PaymentQr {
    pub invoice_id: Uuid,
    pub iban: String,
    pub amount: Decimal,
    pub currency: String,
    pub variable_symbol: Option<String>,
    pub spayd: String,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Clone)]
pub struct InvoiceService {
    pool: PgPool,
    plans: PlanResolver,
}

impl InvoiceService {
    pub fn new(pool: PgPool) -> Self {
        Self {
            plans: PlanResolver::new(pool.clone()),
            pool,
        }
    }

    pub async fn due_terms(&self) -> BillingResult<Vec<DueTerm>> {
        let terms =
            sqlx::query_as::<_, DueTerm>("SELECT id, name, days_count FROM due_terms ORDER BY days_count")
                .fetch_all(&self.pool)
                .await?;
        Ok(terms)
    }

    pub async fn list(
        &self,
        user_id: Uuid,
        filter: &InvoiceFilter,
    ) -> BillingResult<PaginatedResponse<InvoiceSummary>> {
        let today = today();
        let overdue_only = filter.status == Some(InvoiceStatus::Overdue);
        let status_id = filter
            .status
            .filter(|s| *s != InvoiceStatus::Overdue)
            .map(|s| s.id());
        let page = filter.page();
        let per_page = filter.per_page();

        let (total,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM invoices i
            WHERE i.user_id = $1 AND i.is_deleted = FALSE
              AND ($2::SMALLINT IS NULL OR i.status_id = $2)
              AND (NOT $3 OR (i.status_id IN (1, 2) AND i.due_date < $4))
              AND ($5::UUID IS NULL OR i.client_id = $5)
              AND ($6::INT IS NULL OR EXTRACT(YEAR FROM i.issue_date)::INT = $6)
            "#,
        )
        .bind(user_id)
        .bind(status_id)
        .bind(overdue_only)
        .bind(today)
        .bind(filter.client_id)
        .bind(filter.year)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, InvoiceListRow>(
            r#"
            SELECT i.id, i.user_id, i.client_id, i.status_id, i.invoice_number, i.issue_date,
                   i.due_term_id, i.due_date, i.payment_date, i.total_amount, i.currency, i.note,
                   i.is_paid, i.is_canceled, i.is_deleted, i.created_at, i.updated_at,
                   c.name AS client_name
            FROM invoices i
            JOIN clients c ON c.id = i.client_id
            WHERE i.user_id = $1 AND i.is_deleted = FALSE
              AND ($2::SMALLINT IS NULL OR i.status_id = $2)
              AND (NOT $3 OR (i.status_id IN (1, 2) AND i.due_date < $4))
              AND ($5::UUID IS NULL OR i.client_id = $5)
              AND ($6::INT IS NULL OR EXTRACT(YEAR FROM i.issue_date)::INT = $6)
            ORDER BY i.issue_date DESC, i.created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(user_id)
        .bind(status_id)
        .bind(overdue_only)
        .bind(today)
        .bind(filter.client_id)
        .bind(filter.year)
        .bind(per_page)
        .bind(filter.offset())
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .into_iter()
            .map(|row| InvoiceSummary::from_row(row, today))
            .collect();

        Ok(PaginatedResponse::new(items, total, page, per_page))
    }

    pub async fn get(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<InvoiceWithItems> {
        let mut conn = self.pool.acquire().await?;
        let invoice = fetch_invoice(&mut *conn, user_id, invoice_id, false).await?;
        let items = fetch_items(&mut *conn, invoice_id).await?;
        Ok(InvoiceWithItems { invoice, items })
    }

    /// Create a draft. Fails with [`BillingError::InvoiceLimitReached`] when the
    /// monthly quota of the user's effective plan is used up.
    pub async fn create(
        &self,
        user_id: Uuid,
        draft: InvoiceDraft,
    ) -> BillingResult<InvoiceWithItems> {
        let items = totals::normalize_items(&draft.items)?;
        let total = totals::invoice_total(&items)?;
        let currency = totals::validate_currency(draft.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;
        let limit = self.plans.invoice_limit(user_id).await?;

        let mut tx = self.pool.begin().await?;

        let period = QuotaTracker::reserve_slot(&mut *tx, user_id, limit).await?;
        ensure_client_owned(&mut *tx, user_id, draft.client_id).await?;
        let term = due_term(&mut *tx, draft.due_term_id).await?;

        let invoice = insert_invoice(
            &mut *tx,
            user_id,
            &NewInvoice {
                client_id: draft.client_id,
                issue_date: draft.issue_date,
                due_term: &term,
                currency: &currency,
                note: draft.note.as_deref(),
                total,
            },
        )
        .await?;
        let items = insert_items(&mut *tx, invoice.id, &items).await?;
        QuotaTracker::record_creation(&mut *tx, user_id, period).await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = %invoice.id,
            total = %invoice.total_amount,
            items = items.len(),
            "Invoice created"
        );

        Ok(InvoiceWithItems { invoice, items })
    }

    /// Replace a draft's fields and items. Totals and due date are recomputed.
    pub async fn update(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        draft: InvoiceDraft,
    ) -> BillingResult<InvoiceWithItems> {
        let items = totals::normalize_items(&draft.items)?;
        let total = totals::invoice_total(&items)?;
        let currency = totals::validate_currency(draft.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;

        let mut tx = self.pool.begin().await?;

        let current = fetch_invoice(&mut *tx, user_id, invoice_id, true).await?;
        lifecycle::ensure_editable(current.status)?;
        ensure_client_owned(&mut *tx, user_id, draft.client_id).await?;
        let term = due_term(&mut *tx, draft.due_term_id).await?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET client_id = $2, issue_date = $3, due_term_id = $4, due_date = $5,
                total_amount = $6, currency = $7, note = $8, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(draft.client_id)
        .bind(draft.issue_date)
        .bind(term.id)
        .bind(totals::due_date(draft.issue_date, term.days_count))
        .bind(total)
        .bind(&currency)
        .bind(&draft.note)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice_id)
            .execute(&mut *tx)
            .await?;
        let items = insert_items(&mut *tx, invoice_id, &items).await?;

        tx.commit().await?;

        tracing::info!(user_id = %user_id, invoice_id = %invoice_id, "Invoice updated");
        Ok(InvoiceWithItems { invoice, items })
    }

    /// Draft -> sent. Keeps an existing free number, otherwise takes the
    /// requested one or the next in sequence for the issue year.
    pub async fn send(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        requested_number: Option<&str>,
    ) -> BillingResult<InvoiceWithItems> {
        let mut tx = self.pool.begin().await?;

        lock_user_numbering(&mut *tx, user_id).await?;
        let current = fetch_invoice(&mut *tx, user_id, invoice_id, true).await?;
        let item_count = count_items(&mut *tx, invoice_id).await?;
        let next = lifecycle::apply(fields_of(&current), Transition::Send { item_count })?;

        let number = match requested_number.map(str::trim).filter(|n| !n.is_empty()) {
            Some(requested) => {
                let parsed: InvoiceNumber = requested.parse()?;
                let number = parsed.to_string();
                if number_in_use(&mut *tx, user_id, &number, invoice_id).await? {
                    return Err(BillingError::InvoiceNumberTaken(number));
                }
                number
            }
            None => {
                let reusable = match current.invoice_number.as_deref() {
                    Some(existing) if existing.parse::<InvoiceNumber>().is_ok() => {
                        !number_in_use(&mut *tx, user_id, existing, invoice_id).await?
                    }
                    _ => false,
                };
                match current.invoice_number.as_deref() {
                    Some(existing) if reusable => existing.to_string(),
                    _ => {
                        let year = current.issue_date.year();
                        let used = numbers_for_year(&mut *tx, user_id, year).await?;
                        next_invoice_number(year, used.iter().map(String::as_str))?.to_string()
                    }
                }
            }
        };

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status_id = $2, invoice_number = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(next.status)
        .bind(&number)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| number_conflict(e, &number))?;

        let items = fetch_items(&mut *tx, invoice_id).await?;
        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = %invoice_id,
            invoice_number = %number,
            "Invoice sent"
        );

        Ok(InvoiceWithItems { invoice, items })
    }

    /// Sent/overdue/partially paid -> paid. Payment date defaults to today.
    pub async fn mark_paid(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        payment_date: Option<Date>,
    ) -> BillingResult<Invoice> {
        let payment_date = payment_date.unwrap_or_else(today);
        self.transition(user_id, invoice_id, Transition::MarkPaid { payment_date })
            .await
    }

    pub async fn mark_unpaid(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<Invoice> {
        self.transition(user_id, invoice_id, Transition::MarkUnpaid)
            .await
    }

    pub async fn mark_partially_paid(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> BillingResult<Invoice> {
        self.transition(user_id, invoice_id, Transition::MarkPartiallyPaid)
            .await
    }

    pub async fn return_to_draft(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<Invoice> {
        self.transition(user_id, invoice_id, Transition::ReturnToDraft)
            .await
    }

    /// Storno. The invoice keeps its number.
    pub async fn cancel(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<Invoice> {
        self.transition(user_id, invoice_id, Transition::Cancel).await
    }

    /// Canceled -> sent, or -> draft when the invoice has no number or its
    /// number has meanwhile been taken by another live invoice. A taken
    /// number is dropped so the draft gets a fresh one when sent again.
    pub async fn activate(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_invoice(&mut *tx, user_id, invoice_id, true).await?;
        let has_number = current.invoice_number.is_some();
        let collides = match current.invoice_number.as_deref() {
            Some(number) => number_in_use(&mut *tx, user_id, number, invoice_id).await?,
            None => false,
        };

        let next = lifecycle::apply(
            fields_of(&current),
            Transition::Activate {
                has_number,
                collides,
            },
        )?;
        let number = if collides {
            None
        } else {
            current.invoice_number.clone()
        };

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status_id = $2, is_paid = $3, is_canceled = $4, payment_date = $5,
                invoice_number = $6, updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(next.status)
        .bind(next.is_paid)
        .bind(next.is_canceled)
        .bind(next.payment_date)
        .bind(&number)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| number_conflict(e, number.as_deref().unwrap_or_default()))?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = %invoice_id,
            status = %invoice.status,
            number_collision = collides,
            "Invoice activated"
        );

        Ok(invoice)
    }

    /// Copy an invoice into a new draft dated today, without a number.
    /// Counts against the monthly quota like any other creation.
    pub async fn duplicate(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
    ) -> BillingResult<InvoiceWithItems> {
        let source = self.get(user_id, invoice_id).await?;
        let limit = self.plans.invoice_limit(user_id).await?;
        let items: Vec<InvoiceItemInput> = source
            .items
            .iter()
            .map(|i| InvoiceItemInput {
                description: i.description.clone(),
                quantity: i.quantity,
                unit_price: i.unit_price,
                unit: Some(i.unit.clone()),
            })
            .collect();
        let total = totals::invoice_total(&items)?;

        let mut tx = self.pool.begin().await?;

        let period = QuotaTracker::reserve_slot(&mut *tx, user_id, limit).await?;
        let term = due_term(&mut *tx, source.invoice.due_term_id).await?;
        let invoice = insert_invoice(
            &mut *tx,
            user_id,
            &NewInvoice {
                client_id: source.invoice.client_id,
                issue_date: today(),
                due_term: &term,
                currency: &source.invoice.currency,
                note: source.invoice.note.as_deref(),
                total,
            },
        )
        .await?;
        let items = insert_items(&mut *tx, invoice.id, &items).await?;
        QuotaTracker::record_creation(&mut *tx, user_id, period).await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            source_id = %invoice_id,
            invoice_id = %invoice.id,
            "Invoice duplicated"
        );

        Ok(InvoiceWithItems { invoice, items })
    }

    /// Soft delete. The usage counter is not decremented.
    pub async fn delete(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE invoices SET is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE
            "#,
        )
        .bind(invoice_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BillingError::NotFound(format!("Invoice {} not found", invoice_id)));
        }

        tracing::info!(user_id = %user_id, invoice_id = %invoice_id, "Invoice deleted");
        Ok(())
    }

    /// SPAYD payment string for the invoice, payable to the user's bank account
    pub async fn payment_qr(&self, user_id: Uuid, invoice_id: Uuid) -> BillingResult<PaymentQr> {
        let invoice = self.get(user_id, invoice_id).await?.invoice;
        if invoice.status == InvoiceStatus::Canceled {
            return Err(BillingError::InvalidTransition {
                from: invoice.status,
                action: "generate payment for",
            });
        }

        let (bank_account,): (Option<String>,) =
            sqlx::query_as("SELECT bank_account FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        let account: CzechAccount = bank_account
            .filter(|a| !a.trim().is_empty())
            .ok_or(BillingError::BankAccountMissing)?
            .parse()?;

        let mut spayd = Spayd::new(&account, invoice.total_amount, &invoice.currency)
            .due_date(invoice.due_date);
        let mut variable_symbol = None;
        if let Some(number) = invoice.invoice_number.as_deref() {
            spayd = spayd
                .variable_symbol(number)?
                .message(&format!("Faktura {}", number));
            variable_symbol = number
                .parse::<InvoiceNumber>()
                .ok()
                .map(|n| n.variable_symbol());
        }

        Ok(PaymentQr {
            invoice_id,
            iban: account.to_iban(),
            amount: invoice.total_amount,
            currency: invoice.currency,
            variable_symbol,
            spayd: spayd.build(),
        })
    }

    /// Load, apply a lifecycle transition and persist the result.
    async fn transition(
        &self,
        user_id: Uuid,
        invoice_id: Uuid,
        transition: Transition,
    ) -> BillingResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let current = fetch_invoice(&mut *tx, user_id, invoice_id, true).await?;
        let next = lifecycle::apply(fields_of(&current), transition)?;

        let invoice = sqlx::query_as::<_, Invoice>(&format!(
            r#"
            UPDATE invoices
            SET status_id = $2, is_paid = $3, is_canceled = $4, payment_date = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            INVOICE_COLUMNS
        ))
        .bind(invoice_id)
        .bind(next.status)
        .bind(next.is_paid)
        .bind(next.is_canceled)
        .bind(next.payment_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            user_id = %user_id,
            invoice_id = %invoice_id,
            action = transition.action(),
            from = %current.status,
            to = %invoice.status,
            "Invoice status changed"
        );

        Ok(invoice)
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn fields_of(invoice: &Invoice) -> LifecycleFields {
    LifecycleFields {
        status: invoice.status,
        is_paid: invoice.is_paid,
        is_canceled: invoice.is_canceled,
        payment_date: invoice.payment_date,
    }
}

fn number_conflict(err: sqlx::Error, number: &str) -> BillingError {
    let is_live_number = err
        .as_database_error()
        .and_then(|db| db.constraint())
        .map(|c| c == LIVE_NUMBER_INDEX)
        .unwrap_or(false);
    if is_live_number {
        BillingError::InvoiceNumberTaken(number.to_string())
    } else {
        err.into()
    }
}

async fn fetch_invoice(
    conn: &mut PgConnection,
    user_id: Uuid,
    invoice_id: Uuid,
    for_update: bool,
) -> BillingResult<Invoice> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE id = $1 AND user_id = $2 AND is_deleted = FALSE{}",
        INVOICE_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, Invoice>(&sql)
        .bind(invoice_id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Invoice {} not found", invoice_id)))
}

async fn fetch_items(conn: &mut PgConnection, invoice_id: Uuid) -> BillingResult<Vec<InvoiceItem>> {
    let items = sqlx::query_as::<_, InvoiceItem>(
        r#"
        SELECT id, invoice_id, description, quantity, unit_price, unit, order_number
        FROM invoice_items
        WHERE invoice_id = $1
        ORDER BY order_number
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(items)
}

async fn count_items(conn: &mut PgConnection, invoice_id: Uuid) -> BillingResult<usize> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invoice_items WHERE invoice_id = $1")
        .bind(invoice_id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(usize::try_from(count).unwrap_or(0))
}

async fn ensure_client_owned(
    conn: &mut PgConnection,
    user_id: Uuid,
    client_id: Uuid,
) -> BillingResult<()> {
    let (exists,): (bool,) =
        sqlx::query_as("SELECT EXISTS(SELECT 1 FROM clients WHERE id = $1 AND user_id = $2)")
            .bind(client_id)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
    if !exists {
        return Err(BillingError::NotFound(format!("Client {} not found", client_id)));
    }
    Ok(())
}

async fn due_term(conn: &mut PgConnection, due_term_id: i16) -> BillingResult<DueTerm> {
    sqlx::query_as::<_, DueTerm>("SELECT id, name, days_count FROM due_terms WHERE id = $1")
        .bind(due_term_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| BillingError::InvalidInput(format!("Unknown due term {}", due_term_id)))
}

/// Serializes number assignment per user for the rest of the transaction
async fn lock_user_numbering(conn: &mut PgConnection, user_id: Uuid) -> BillingResult<()> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("User {} not found", user_id)))?;
    Ok(())
}

/// Whether another live (non-canceled, non-deleted) invoice of the user holds `number`
async fn number_in_use(
    conn: &mut PgConnection,
    user_id: Uuid,
    number: &str,
    except_invoice: Uuid,
) -> BillingResult<bool> {
    let (taken,): (bool,) = sqlx::query_as(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM invoices
            WHERE user_id = $1 AND invoice_number = $2 AND id <> $3
              AND is_canceled = FALSE AND is_deleted = FALSE
        )
        "#,
    )
    .bind(user_id)
    .bind(number)
    .bind(except_invoice)
    .fetch_one(&mut *conn)
    .await?;
    Ok(taken)
}

/// Numbers of all non-deleted invoices (canceled included) for the year
async fn numbers_for_year(
    conn: &mut PgConnection,
    user_id: Uuid,
    year: i32,
) -> BillingResult<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT invoice_number FROM invoices
        WHERE user_id = $1 AND is_deleted = FALSE
          AND invoice_number LIKE $2
        "#,
    )
    .bind(user_id)
    .bind(format!("{:04}-%", year))
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows.into_iter().map(|(n,)| n).collect())
}

struct NewInvoice<'a> {
    client_id: Uuid,
    issue_date: Date,
    due_term: &'a DueTerm,
    currency: &'a str,
    note: Option<&'a str>,
    total: Decimal,
}

async fn insert_invoice(
    conn: &mut PgConnection,
    user_id: Uuid,
    new: &NewInvoice<'_>,
) -> BillingResult<Invoice> {
    let invoice = sqlx::query_as::<_, Invoice>(&format!(
        r#"
        INSERT INTO invoices
            (id, user_id, client_id, status_id, issue_date, due_term_id, due_date,
             total_amount, currency, note)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {}
        "#,
        INVOICE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(new.client_id)
    .bind(InvoiceStatus::Draft)
    .bind(new.issue_date)
    .bind(new.due_term.id)
    .bind(totals::due_date(new.issue_date, new.due_term.days_count))
    .bind(new.total)
    .bind(new.currency)
    .bind(new.note)
    .fetch_one(&mut *conn)
    .await?;
    Ok(invoice)
}

async fn insert_items(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    items: &[InvoiceItemInput],
) -> BillingResult<Vec<InvoiceItem>> {
    let mut stored = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        let unit = item
            .unit
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_UNIT);

        let row = sqlx::query_as::<_, InvoiceItem>(
            r#"
            INSERT INTO invoice_items
                (id, invoice_id, description, quantity, unit_price, unit, order_number)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, invoice_id, description, quantity, unit_price, unit, order_number
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(item.description.trim())
        .bind(item.quantity)
        .bind(item.unit_price)
        .bind(unit)
        .bind(idx as i32 + 1)
        .fetch_one(&mut *conn)
        .await?;
        stored.push(row);
    }
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use time::macros::{date, datetime};

    fn invoice(status: InvoiceStatus, due_date: Date) -> Invoice {
        let now = datetime!(2026-03-01 12:00 UTC);
        Invoice {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            status,
            invoice_number: None,
            issue_date: date!(2026 - 03 - 01),
            due_term_id: 2,
            due_date,
            payment_date: None,
            total_amount: dec!(250),
            currency: "CZK".to_string(),
            note: None,
            is_paid: status == InvoiceStatus::Paid,
            is_canceled: status == InvoiceStatus::Canceled,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_summary_derives_overdue() {
        let row = InvoiceListRow {
            invoice: invoice(InvoiceStatus::Sent, date!(2026 - 03 - 15)),
            client_name: "ACME s.r.o.".to_string(),
        };
        let summary = InvoiceSummary::from_row(row, date!(2026 - 03 - 20));
        assert!(summary.is_overdue);
        assert_eq!(summary.display_status, InvoiceStatus::Overdue);
        assert_eq!(summary.status_label, "Po splatnosti");
        // Stored status is untouched
        assert_eq!(summary.invoice.status, InvoiceStatus::Sent);
    }

    #[test]
    fn test_summary_paid_never_overdue() {
        let row = InvoiceListRow {
            invoice: invoice(InvoiceStatus::Paid, date!(2026 - 03 - 15)),
            client_name: "ACME s.r.o.".to_string(),
        };
        let summary = InvoiceSummary::from_row(row, date!(2026 - 04 - 20));
        assert!(!summary.is_overdue);
        assert_eq!(summary.display_status, InvoiceStatus::Paid);
    }

    #[test]
    fn test_filter_paging_bounds() {
        let filter = InvoiceFilter {
            page: Some(0),
            per_page: Some(1000),
            ..Default::default()
        };
        assert_eq!(filter.page(), 1);
        assert_eq!(filter.per_page(), MAX_PER_PAGE);
        assert_eq!(filter.offset(), 0);
        assert_eq!(InvoiceFilter::default().per_page(), 20);

        let third = InvoiceFilter {
            page: Some(3),
            ..Default::default()
        };
        assert_eq!(third.offset(), 40);

        let far = InvoiceFilter {
            page: Some(i64::MAX),
            ..Default::default()
        };
        assert_eq!(far.offset(), i64::MAX);
    }

    #[test]
    fn test_filter_parses_status_name() {
        let filter: InvoiceFilter =
            serde_json::from_str(r#"{"status": "overdue", "year": 2026}"#).unwrap();
        assert_eq!(filter.status, Some(InvoiceStatus::Overdue));
        assert_eq!(filter.year, Some(2026));
    }

    #[test]
    fn test_fields_of_invoice() {
        let inv = invoice(InvoiceStatus::Canceled, date!(2026 - 03 - 15));
        let fields = fields_of(&inv);
        assert_eq!(fields.status, InvoiceStatus::Canceled);
        assert!(fields.is_canceled);
    }
}
