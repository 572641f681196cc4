//! ARES company registry client
//!
//! Looks up Czech companies by IČO or name and normalizes the result into the
//! fields a client record needs.

use std::time::Duration;

use fakturace_billing::{is_valid_ico, normalize_ico};
use serde::{Deserialize, Serialize};

/// Company data as used to prefill a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyInfo {
    pub name: String,
    pub ico: String,
    pub dic: Option<String>,
    pub street: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AresSubject {
    ico: String,
    obchodni_jmeno: String,
    #[serde(default)]
    dic: Option<String>,
    #[serde(default)]
    sidlo: Option<AresAddress>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AresAddress {
    nazev_obce: Option<String>,
    nazev_casti_obce: Option<String>,
    nazev_ulice: Option<String>,
    cislo_domovni: Option<u32>,
    cislo_orientacni: Option<u32>,
    cislo_orientacni_pismeno: Option<String>,
    psc: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AresSearchResponse {
    #[serde(default)]
    ekonomicke_subjekty: Vec<AresSubject>,
}

impl AresAddress {
    /// "Ulice 12/3a", falling back to the city district for addresses without streets
    fn street_line(&self) -> Option<String> {
        let name = self
            .nazev_ulice
            .as_deref()
            .or(self.nazev_casti_obce.as_deref())?;

        let number = match (self.cislo_domovni, self.cislo_orientacni) {
            (Some(d), Some(o)) => format!(
                " {}/{}{}",
                d,
                o,
                self.cislo_orientacni_pismeno.as_deref().unwrap_or("")
            ),
            (Some(d), None) => format!(" {}", d),
            (None, Some(o)) => format!(" {}", o),
            (None, None) => String::new(),
        };

        Some(format!("{}{}", name, number))
    }

    /// PSČ is printed as "170 00"
    fn zip(&self) -> Option<String> {
        self.psc.map(|psc| {
            let digits = format!("{:05}", psc);
            format!("{} {}", &digits[..3], &digits[3..])
        })
    }
}

impl From<AresSubject> for CompanyInfo {
    fn from(subject: AresSubject) -> Self {
        let address = subject.sidlo.unwrap_or_default();
        Self {
            name: subject.obchodni_jmeno.trim().to_string(),
            ico: normalize_ico(&subject.ico),
            dic: subject.dic.filter(|d| !d.trim().is_empty()),
            street: address.street_line(),
            city: address.nazev_obce.clone(),
            zip: address.zip(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid IČO: {0}")]
    InvalidIco(String),
    #[error("Company not found")]
    NotFound,
    #[error("Search query too short")]
    QueryTooShort,
    #[error("Registry returned status {0}")]
    Upstream(u16),
    #[error("Registry request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest::Client,
    base_url: String,
}

impl RegistryClient {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, RegistryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Look up a company by IČO
    pub async fn lookup_ico(&self, ico: &str) -> Result<CompanyInfo, RegistryError> {
        let ico = normalize_ico(ico);
        if !is_valid_ico(&ico) {
            return Err(RegistryError::InvalidIco(ico));
        }

        let response = self
            .client
            .get(format!("{}/{}", self.base_url, ico))
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                let subject: AresSubject = response.json().await?;
                Ok(subject.into())
            }
            404 => Err(RegistryError::NotFound),
            status => {
                tracing::warn!(status, ico = %ico, "ARES lookup failed");
                Err(RegistryError::Upstream(status))
            }
        }
    }

    /// Search companies by business name (first 10 matches)
    pub async fn search_by_name(&self, name: &str) -> Result<Vec<CompanyInfo>, RegistryError> {
        let name = name.trim();
        if name.chars().count() < 3 {
            return Err(RegistryError::QueryTooShort);
        }

        let response = self
            .client
            .post(format!("{}/vyhledat", self.base_url))
            .header("Accept", "application/json")
            .json(&serde_json::json!({
                "obchodniJmeno": name,
                "start": 0,
                "pocet": 10,
            }))
            .send()
            .await?;

        match response.status().as_u16() {
            200 => {
                let results: AresSearchResponse = response.json().await?;
                Ok(results
                    .ekonomicke_subjekty
                    .into_iter()
                    .map(CompanyInfo::from)
                    .collect())
            }
            // ARES answers an empty search with 404
            404 => Ok(Vec::new()),
            status => {
                tracing::warn!(status, "ARES search failed");
                Err(RegistryError::Upstream(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUBJECT_JSON: &str = r#"{
        "ico": "27082440",
        "obchodniJmeno": "Alza.cz a.s.",
        "dic": "CZ27082440",
        "sidlo": {
            "nazevObce": "Praha",
            "nazevUlice": "Jankovcova",
            "cisloDomovni": 1522,
            "cisloOrientacni": 53,
            "psc": 17000
        }
    }"#;

    #[test]
    fn test_subject_normalization() {
        let subject: AresSubject = serde_json::from_str(SUBJECT_JSON).unwrap();
        let info = CompanyInfo::from(subject);

        assert_eq!(info.name, "Alza.cz a.s.");
        assert_eq!(info.ico, "27082440");
        assert_eq!(info.dic.as_deref(), Some("CZ27082440"));
        assert_eq!(info.street.as_deref(), Some("Jankovcova 1522/53"));
        assert_eq!(info.city.as_deref(), Some("Praha"));
        assert_eq!(info.zip.as_deref(), Some("170 00"));
    }

    #[test]
    fn test_address_without_street_uses_district() {
        let address = AresAddress {
            nazev_obce: Some("Dolní Lhota".to_string()),
            nazev_casti_obce: Some("Horní Lhota".to_string()),
            cislo_domovni: Some(7),
            psc: Some(1234),
            ..Default::default()
        };
        assert_eq!(address.street_line().as_deref(), Some("Horní Lhota 7"));
        assert_eq!(address.zip().as_deref(), Some("012 34"));
    }

    #[tokio::test]
    async fn test_lookup_ico() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/27082440")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(SUBJECT_JSON)
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url(), 5).unwrap();
        let info = client.lookup_ico("27082440").await.unwrap();
        assert_eq!(info.name, "Alza.cz a.s.");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_lookup_not_found() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/45274649")
            .with_status(404)
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url(), 5).unwrap();
        assert!(matches!(
            client.lookup_ico("45274649").await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_invalid_ico_never_hits_network() {
        let client = RegistryClient::new("http://127.0.0.1:9", 1).unwrap();
        assert!(matches!(
            client.lookup_ico("12345678").await,
            Err(RegistryError::InvalidIco(_))
        ));
    }

    #[tokio::test]
    async fn test_search_by_name() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/vyhledat")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"obchodniJmeno":"Alza"}"#.to_string(),
            ))
            .with_status(200)
            .with_body(format!(
                r#"{{"pocetCelkem":1,"ekonomickeSubjekty":[{}]}}"#,
                SUBJECT_JSON
            ))
            .create_async()
            .await;

        let client = RegistryClient::new(&server.url(), 5).unwrap();
        let results = client.search_by_name(" Alza ").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].ico, "27082440");
    }
}
