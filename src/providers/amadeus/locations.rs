//! 位置目录：GET /v1/reference-data/locations?subType=CITY,AIRPORT&keyword=...

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::AmadeusClient;
use crate::core::ProviderError;
use crate::providers::traits::LocationDirectory;
use crate::providers::types::LocationCandidate;

pub const PROVIDER_NAME: &str = "amadeus_locations";

pub struct AmadeusLocations {
    client: Arc<AmadeusClient>,
}

impl AmadeusLocations {
    pub fn new(client: Arc<AmadeusClient>) -> Self {
        Self { client }
    }
}

/// data[] → 候选项，保持上游顺序
pub fn parse_locations(body: &Value) -> Vec<LocationCandidate> {
    body["data"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| {
                    let code = item["iataCode"].as_str()?;
                    Some(LocationCandidate {
                        iata_code: code.to_string(),
                        name: item["name"].as_str().unwrap_or(code).to_string(),
                        country_code: item["address"]["countryCode"].as_str().map(String::from),
                        sub_type: item["subType"].as_str().unwrap_or("CITY").to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl LocationDirectory for AmadeusLocations {
    async fn search_locations(&self, keyword: &str) -> Result<Vec<LocationCandidate>, ProviderError> {
        let body = self
            .client
            .get_json(
                PROVIDER_NAME,
                "/v1/reference-data/locations",
                &[
                    ("subType", "CITY,AIRPORT".to_string()),
                    ("keyword", keyword.to_string()),
                    ("page[limit]", "10".to_string()),
                ],
            )
            .await?;
        let candidates = parse_locations(&body);
        if candidates.is_empty() {
            return Err(ProviderError::no_results(PROVIDER_NAME));
        }
        Ok(candidates)
    }
}
