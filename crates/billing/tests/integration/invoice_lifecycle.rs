//! Integration tests for the invoice lifecycle and quota engine
//!
//! These run against a real PostgreSQL database with the workspace migrations
//! applied. Each test creates its own user and cleans up afterwards.
//!
//! ## Running Tests
//! ```bash
//! export DATABASE_URL="postgres://localhost/fakturace_test"
//! cargo test -p fakturace-billing --test invoice_lifecycle -- --ignored --test-threads=1
//! ```

#![allow(clippy::unwrap_used, clippy::expect_used)]

use fakturace_billing::{BillingError, BillingService, InvoiceDraft, InvoiceItemInput};
use fakturace_shared::InvoiceStatus;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use time::macros::date;
use uuid::Uuid;

// ============================================================================
// Test Utilities
// ============================================================================

async fn setup() -> (BillingService, PgPool) {
    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");
    let pool = fakturace_shared::connect_and_migrate(&database_url, 5)
        .await
        .expect("Failed to connect to test database");

    (BillingService::new(pool.clone(), None), pool)
}

/// Create a user on the Free plan with one client
async fn create_test_user(pool: &PgPool) -> (Uuid, Uuid) {
    let user_id = Uuid::new_v4();
    let client_id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO users (id, email, password_hash, name, bank_account)
        VALUES ($1, $2, 'TEST_PASSWORD_HASH', 'Test User', '19-2000145399/0800')
        "#,
    )
    .bind(user_id)
    .bind(format!("test-{}@example.com", user_id))
    .execute(pool)
    .await
    .expect("Failed to create test user");

    let mut conn = pool.acquire().await.expect("Failed to acquire connection");
    fakturace_billing::SubscriptionService::create_initial(&mut conn, user_id)
        .await
        .expect("Failed to create Free subscription");

    sqlx::query("INSERT INTO clients (id, user_id, name) VALUES ($1, $2, 'ACME s.r.o.')")
        .bind(client_id)
        .bind(user_id)
        .execute(pool)
        .await
        .expect("Failed to create test client");

    (user_id, client_id)
}

async fn cleanup(pool: &PgPool, user_id: Uuid) {
    // Invoices restrict client deletion, so remove them first
    sqlx::query("DELETE FROM invoices WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(pool)
        .await
        .ok();
}

fn draft(client_id: Uuid) -> InvoiceDraft {
    InvoiceDraft {
        client_id,
        issue_date: date!(2026 - 03 - 01),
        due_term_id: 2,
        currency: None,
        note: None,
        items: vec![
            InvoiceItemInput {
                description: "Vývoj".to_string(),
                quantity: dec!(2),
                unit_price: dec!(100),
                unit: Some("hod".to_string()),
            },
            InvoiceItemInput {
                description: "Licence".to_string(),
                quantity: dec!(1),
                unit_price: dec!(50),
                unit: None,
            },
        ],
    }
}

// ============================================================================
// Test Cases
// ============================================================================

#[tokio::test]
#[ignore] // Requires database
async fn test_create_computes_total_and_due_date() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    let created = billing
        .invoices
        .create(user_id, draft(client_id))
        .await
        .expect("Failed to create invoice");

    assert_eq!(created.invoice.status, InvoiceStatus::Draft);
    assert_eq!(created.invoice.total_amount, dec!(250));
    assert_eq!(created.invoice.due_date, date!(2026 - 03 - 15));
    assert_eq!(created.items.len(), 2);
    assert_eq!(created.items[1].unit, "ks");
    assert_eq!(billing.quota.current_usage(user_id).await.unwrap(), 1);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_total_matches_stored_items() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    let mut input = draft(client_id);
    input.items = vec![InvoiceItemInput {
        description: "Tisk".to_string(),
        quantity: dec!(3),
        unit_price: dec!(0.335),
        unit: None,
    }];

    let created = billing.invoices.create(user_id, input).await.unwrap();
    assert_eq!(created.items[0].unit_price, dec!(0.34));
    assert_eq!(created.invoice.total_amount, dec!(1.02));

    let (stored_sum,): (rust_decimal::Decimal,) = sqlx::query_as(
        "SELECT SUM(quantity * unit_price) FROM invoice_items WHERE invoice_id = $1",
    )
    .bind(created.invoice.id)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(stored_sum, created.invoice.total_amount);

    // Out-of-range values are rejected before anything is written
    let mut huge = draft(client_id);
    huge.items[0].quantity = rust_decimal::Decimal::MAX;
    assert!(matches!(
        billing.invoices.create(user_id, huge).await,
        Err(BillingError::InvalidInput(_))
    ));
    assert_eq!(billing.quota.current_usage(user_id).await.unwrap(), 1);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_free_plan_rejects_fifth_invoice() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    for _ in 0..4 {
        billing
            .invoices
            .create(user_id, draft(client_id))
            .await
            .expect("Invoice within the Free limit should be created");
    }

    let fifth = billing.invoices.create(user_id, draft(client_id)).await;
    assert!(matches!(
        fifth,
        Err(BillingError::InvoiceLimitReached { limit: 4, used: 4 })
    ));

    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 4, "Rejected creation must not leave an invoice behind");
    assert_eq!(billing.quota.current_usage(user_id).await.unwrap(), 4);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_send_assigns_sequential_numbers() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    let first = billing.invoices.create(user_id, draft(client_id)).await.unwrap();
    let second = billing.invoices.create(user_id, draft(client_id)).await.unwrap();

    let sent1 = billing.invoices.send(user_id, first.invoice.id, None).await.unwrap();
    let sent2 = billing.invoices.send(user_id, second.invoice.id, None).await.unwrap();

    assert_eq!(sent1.invoice.invoice_number.as_deref(), Some("2026-00001"));
    assert_eq!(sent2.invoice.invoice_number.as_deref(), Some("2026-00002"));
    assert_eq!(sent2.invoice.status, InvoiceStatus::Sent);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_activate_without_number_returns_to_draft() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    let created = billing.invoices.create(user_id, draft(client_id)).await.unwrap();
    let canceled = billing.invoices.cancel(user_id, created.invoice.id).await.unwrap();
    assert!(canceled.is_canceled);

    let active = billing.invoices.activate(user_id, created.invoice.id).await.unwrap();
    assert_eq!(active.status.id(), 1);
    assert!(!active.is_canceled);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_activate_with_colliding_number_returns_to_draft() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    // Invoice A is sent as 2026-00001 and then canceled
    let a = billing.invoices.create(user_id, draft(client_id)).await.unwrap();
    billing.invoices.send(user_id, a.invoice.id, None).await.unwrap();
    billing.invoices.cancel(user_id, a.invoice.id).await.unwrap();

    // Invoice B takes the same number explicitly
    let b = billing.invoices.create(user_id, draft(client_id)).await.unwrap();
    let sent_b = billing
        .invoices
        .send(user_id, b.invoice.id, Some("2026-00001"))
        .await
        .unwrap();
    assert_eq!(sent_b.invoice.invoice_number.as_deref(), Some("2026-00001"));

    let active_a = billing.invoices.activate(user_id, a.invoice.id).await.unwrap();
    assert_eq!(active_a.status.id(), 1);
    assert!(!active_a.is_canceled);

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_payment_cycle_and_edit_guard() {
    let (billing, pool) = setup().await;
    let (user_id, client_id) = create_test_user(&pool).await;

    let created = billing.invoices.create(user_id, draft(client_id)).await.unwrap();
    let id = created.invoice.id;
    billing.invoices.send(user_id, id, None).await.unwrap();

    let edit = billing.invoices.update(user_id, id, draft(client_id)).await;
    assert!(matches!(edit, Err(BillingError::NotEditable(InvoiceStatus::Sent))));

    let paid = billing
        .invoices
        .mark_paid(user_id, id, Some(date!(2026 - 03 - 10)))
        .await
        .unwrap();
    assert!(paid.is_paid);
    assert_eq!(paid.payment_date, Some(date!(2026 - 03 - 10)));

    let unpaid = billing.invoices.mark_unpaid(user_id, id).await.unwrap();
    assert_eq!(unpaid.status, InvoiceStatus::Sent);
    assert_eq!(unpaid.payment_date, None);

    let qr = billing.invoices.payment_qr(user_id, id).await.unwrap();
    assert!(qr.spayd.starts_with("SPD*1.0*ACC:CZ6508000000192000145399*AM:250.00*CC:CZK"));
    assert_eq!(qr.variable_symbol.as_deref(), Some("202600001"));

    cleanup(&pool, user_id).await;
}

#[tokio::test]
#[ignore] // Requires database
async fn test_downgrade_blocked_when_usage_exceeds_target_limit() {
    let (billing, pool) = setup().await;
    let (user_id, _client_id) = create_test_user(&pool).await;

    sqlx::query(
        r#"
        INSERT INTO subscription_plans (id, name, invoice_limit_monthly, price_monthly, price_yearly)
        VALUES (90, 'Test 100', 100, 10, 100), (91, 'Test 10', 10, 5, 50)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .execute(&pool)
    .await
    .unwrap();

    billing
        .subscriptions
        .admin_change_plan(user_id, 90, None)
        .await
        .expect("Upgrade to the 100 plan should succeed");

    let period = fakturace_billing::UsagePeriod::current();
    sqlx::query(
        "INSERT INTO invoice_usage (user_id, year, month, invoice_count) VALUES ($1, $2, $3, 50)",
    )
    .bind(user_id)
    .bind(period.year)
    .bind(period.month)
    .execute(&pool)
    .await
    .unwrap();

    let result = billing.subscriptions.admin_change_plan(user_id, 91, None).await;
    assert!(matches!(
        result,
        Err(BillingError::DowngradeBlocked { used: 50, limit: 10 })
    ));

    let plan = billing.plans.effective_plan(user_id).await.unwrap();
    assert_eq!(plan.id, 90, "Rejected downgrade must leave the plan unchanged");

    cleanup(&pool, user_id).await;
}
