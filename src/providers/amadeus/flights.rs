//! 航班主供应商：GET /v2/shopping/flight-offers

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::AmadeusClient;
use crate::cache::{QueryCache, TtlClass};
use crate::core::{Capability, ProviderError};
use crate::providers::cached::cached_lookup;
use crate::providers::http::as_f64;
use crate::providers::traits::{FlightProvider, Provider};
use crate::providers::types::{FlightCriteria, FlightOffer, FlightQuote, Lookup};

pub const PROVIDER_NAME: &str = "amadeus_flights";

pub struct AmadeusFlights {
    client: Arc<AmadeusClient>,
    cache: QueryCache,
}

impl AmadeusFlights {
    pub fn new(client: Arc<AmadeusClient>, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    async fn fetch(&self, criteria: &FlightCriteria) -> Result<FlightQuote, ProviderError> {
        let query = [
            ("originLocationCode", criteria.origin.clone()),
            ("destinationLocationCode", criteria.destination.clone()),
            ("departureDate", criteria.departure_date()),
            ("adults", criteria.adults.to_string()),
            ("currencyCode", "USD".to_string()),
            ("max", "20".to_string()),
        ];
        let body = self
            .client
            .get_json(PROVIDER_NAME, "/v2/shopping/flight-offers", &query)
            .await?;
        normalize_flight_offers(criteria, &body).ok_or_else(|| ProviderError::no_results(PROVIDER_NAME))
    }
}

/// data[].price.grandTotal / validatingAirlineCodes[0] / itineraries[0].segments
pub fn normalize_flight_offers(criteria: &FlightCriteria, body: &Value) -> Option<FlightQuote> {
    let data = body["data"].as_array()?;
    let offers: Vec<FlightOffer> = data
        .iter()
        .filter_map(|offer| {
            let price = as_f64(&offer["price"]["grandTotal"]).or_else(|| as_f64(&offer["price"]["total"]))?;
            let carrier = offer["validatingAirlineCodes"][0]
                .as_str()
                .or_else(|| offer["itineraries"][0]["segments"][0]["carrierCode"].as_str())
                .map(String::from);
            let stops = offer["itineraries"][0]["segments"]
                .as_array()
                .map(|s| s.len().saturating_sub(1))
                .unwrap_or(0);
            Some(FlightOffer { price, carrier, stops })
        })
        .collect();

    let currency = data
        .first()
        .and_then(|o| o["price"]["currency"].as_str())
        .unwrap_or("USD");
    FlightQuote::from_offers(criteria, currency, &offers)
}

impl Provider for AmadeusFlights {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[async_trait]
impl FlightProvider for AmadeusFlights {
    async fn search_flights(&self, criteria: &FlightCriteria) -> Result<Lookup<FlightQuote>, ProviderError> {
        cached_lookup(
            &self.cache,
            PROVIDER_NAME,
            Capability::Flights,
            criteria,
            TtlClass::Flights,
            || self.fetch(criteria),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_offers() {
        let body = json!({
            "data": [
                {
                    "price": {"grandTotal": "612.40", "currency": "USD"},
                    "validatingAirlineCodes": ["AA"],
                    "itineraries": [{"segments": [{"carrierCode": "AA"}, {"carrierCode": "AA"}]}]
                },
                {
                    "price": {"grandTotal": "455.10", "currency": "USD"},
                    "validatingAirlineCodes": ["BA"],
                    "itineraries": [{"segments": [{"carrierCode": "BA"}]}]
                },
                {
                    "price": {"grandTotal": "530.00", "currency": "USD"},
                    "itineraries": [{"segments": [{"carrierCode": "VS"}]}]
                }
            ]
        });
        let criteria = FlightCriteria::new("JFK", "LHR", "2026-06");
        let quote = normalize_flight_offers(&criteria, &body).unwrap();

        assert_eq!(quote.price_low, 455.10);
        assert_eq!(quote.price_median, 530.00);
        assert_eq!(quote.price_high, 612.40);
        assert_eq!(quote.carrier.as_deref(), Some("BA"));
        assert_eq!(quote.route, "JFK → LHR (nonstop)");
        assert_eq!(quote.offer_count, 3);
    }

    #[test]
    fn test_empty_data_is_no_quote() {
        let criteria = FlightCriteria::new("JFK", "LHR", "2026-06");
        assert!(normalize_flight_offers(&criteria, &json!({"data": []})).is_none());
        assert!(normalize_flight_offers(&criteria, &json!({"errors": [{"code": 477}]})).is_none());
    }
}
