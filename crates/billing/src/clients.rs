//! Client (customer) records

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::{BillingError, BillingResult};

const CLIENT_COLUMNS: &str =
    "id, user_id, name, ico, dic, street, city, zip, country, email, phone, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Client {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    pub ico: Option<String>,
    pub dic: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ClientInput {
    pub name: String,
    pub ico: Option<String>,
    pub dic: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    pub country: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Czech company id (IČO): 8 digits, the last one a weighted mod-11 check digit.
pub fn is_valid_ico(ico: &str) -> bool {
    let digits: Vec<u32> = ico.chars().filter_map(|c| c.to_digit(10)).collect();
    if ico.len() != 8 || digits.len() != 8 {
        return false;
    }

    let sum: u32 = digits[..7]
        .iter()
        .zip((2..=8).rev())
        .map(|(d, w)| d * w)
        .sum();
    let check = match sum % 11 {
        0 => 1,
        1 => 0,
        r => 11 - r,
    };
    digits[7] == check
}

/// Left-pads short IČO values ("6947" -> "00006947") as printed on older documents
pub fn normalize_ico(ico: &str) -> String {
    let trimmed: String = ico.chars().filter(|c| !c.is_whitespace()).collect();
    if !trimmed.is_empty() && trimmed.len() < 8 && trimmed.chars().all(|c| c.is_ascii_digit()) {
        format!("{:0>8}", trimmed)
    } else {
        trimmed
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl ClientInput {
    /// Trim fields, normalize identifiers and validate.
    pub fn normalized(self) -> BillingResult<Self> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(BillingError::InvalidInput("client name is required".to_string()));
        }

        let ico = non_empty(self.ico).map(|i| normalize_ico(&i));
        if let Some(ico) = &ico {
            if !is_valid_ico(ico) {
                return Err(BillingError::InvalidInput(format!("invalid IČO: {}", ico)));
            }
        }

        let dic = non_empty(self.dic).map(|d| d.to_ascii_uppercase().replace(' ', ""));
        if let Some(dic) = &dic {
            let valid = dic.is_ascii()
                && dic.len() >= 4
                && dic.len() <= 14
                && dic[..2].chars().all(|c| c.is_ascii_uppercase())
                && dic[2..].chars().all(|c| c.is_ascii_alphanumeric());
            if !valid {
                return Err(BillingError::InvalidInput(format!("invalid DIČ: {}", dic)));
            }
        }

        let email = non_empty(self.email);
        if let Some(email) = &email {
            if !email.contains('@') {
                return Err(BillingError::InvalidInput(format!("invalid email: {}", email)));
            }
        }

        Ok(Self {
            name,
            ico,
            dic,
            street: non_empty(self.street),
            city: non_empty(self.city),
            zip: non_empty(self.zip),
            country: non_empty(self.country),
            email,
            phone: non_empty(self.phone),
        })
    }
}

#[derive(Clone)]
pub struct ClientService {
    pool: PgPool,
}

impl ClientService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, user_id: Uuid) -> BillingResult<Vec<Client>> {
        let clients = sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE user_id = $1 ORDER BY name",
            CLIENT_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(clients)
    }

    pub async fn get(&self, user_id: Uuid, client_id: Uuid) -> BillingResult<Client> {
        sqlx::query_as::<_, Client>(&format!(
            "SELECT {} FROM clients WHERE id = $1 AND user_id = $2",
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Client {} not found", client_id)))
    }

    pub async fn create(&self, user_id: Uuid, input: ClientInput) -> BillingResult<Client> {
        let input = input.normalized()?;

        let client = sqlx::query_as::<_, Client>(&format!(
            r#"
            INSERT INTO clients
                (id, user_id, name, ico, dic, street, city, zip, country, email, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, COALESCE($9, 'Česká republika'), $10, $11)
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.ico)
        .bind(&input.dic)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.zip)
        .bind(&input.country)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_one(&self.pool)
        .await?;

        tracing::info!(user_id = %user_id, client_id = %client.id, "Client created");
        Ok(client)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        client_id: Uuid,
        input: ClientInput,
    ) -> BillingResult<Client> {
        let input = input.normalized()?;

        sqlx::query_as::<_, Client>(&format!(
            r#"
            UPDATE clients
            SET name = $3, ico = $4, dic = $5, street = $6, city = $7, zip = $8,
                country = COALESCE($9, country), email = $10, phone = $11, updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {}
            "#,
            CLIENT_COLUMNS
        ))
        .bind(client_id)
        .bind(user_id)
        .bind(&input.name)
        .bind(&input.ico)
        .bind(&input.dic)
        .bind(&input.street)
        .bind(&input.city)
        .bind(&input.zip)
        .bind(&input.country)
        .bind(&input.email)
        .bind(&input.phone)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| BillingError::NotFound(format!("Client {} not found", client_id)))
    }

    /// Blocked while any invoice row (deleted ones included) references the client.
    pub async fn delete(&self, user_id: Uuid, client_id: Uuid) -> BillingResult<()> {
        let mut tx = self.pool.begin().await?;

        let owned: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM clients WHERE id = $1 AND user_id = $2 FOR UPDATE")
                .bind(client_id)
                .bind(user_id)
                .fetch_optional(&mut *tx)
                .await?;
        if owned.is_none() {
            return Err(BillingError::NotFound(format!("Client {} not found", client_id)));
        }

        let (references,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM invoices WHERE client_id = $1")
                .bind(client_id)
                .fetch_one(&mut *tx)
                .await?;
        if references > 0 {
            return Err(BillingError::ClientInUse(references));
        }

        sqlx::query("DELETE FROM clients WHERE id = $1")
            .bind(client_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!(user_id = %user_id, client_id = %client_id, "Client deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ico_checksum() {
        assert!(is_valid_ico("45274649"));
        assert!(is_valid_ico("27082440"));
        assert!(is_valid_ico("00006947"));
        assert!(!is_valid_ico("12345678"));
        assert!(!is_valid_ico("4527464"));
        assert!(!is_valid_ico("4527464a"));
    }

    #[test]
    fn test_normalize_pads_short_ico() {
        assert_eq!(normalize_ico("6947"), "00006947");
        assert_eq!(normalize_ico(" 452 746 49 "), "45274649");
    }

    #[test]
    fn test_input_normalization() {
        let input = ClientInput {
            name: "  ČEZ, a. s. ".to_string(),
            ico: Some("45274649".to_string()),
            dic: Some("cz 45274649".to_string()),
            email: Some("   ".to_string()),
            ..Default::default()
        }
        .normalized()
        .unwrap();
        assert_eq!(input.name, "ČEZ, a. s.");
        assert_eq!(input.dic.as_deref(), Some("CZ45274649"));
        assert!(input.email.is_none());
    }

    #[test]
    fn test_input_rejects_bad_ico_and_blank_name() {
        let bad_ico = ClientInput {
            name: "Firma".to_string(),
            ico: Some("12345678".to_string()),
            ..Default::default()
        };
        assert!(bad_ico.normalized().is_err());
        assert!(ClientInput::default().normalized().is_err());
    }
}
