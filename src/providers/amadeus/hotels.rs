//! 酒店主供应商
//!
//! 两步：by-city 列出酒店 id（带星级），再用 hotel-offers 取报价。同一次尝试内不重试。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::AmadeusClient;
use crate::cache::{QueryCache, TtlClass};
use crate::core::{Capability, ProviderError};
use crate::providers::cached::cached_lookup;
use crate::providers::http::as_f64;
use crate::providers::traits::{HotelProvider, Provider};
use crate::providers::types::{HotelCriteria, HotelListing, HotelQuote, Lookup, MAX_HOTEL_LISTINGS};

pub const PROVIDER_NAME: &str = "amadeus_hotels";

/// 第二步最多带多少个 hotelId
const MAX_HOTEL_IDS: usize = 20;

pub struct AmadeusHotels {
    client: Arc<AmadeusClient>,
    cache: QueryCache,
}

impl AmadeusHotels {
    pub fn new(client: Arc<AmadeusClient>, cache: QueryCache) -> Self {
        Self { client, cache }
    }

    async fn fetch(&self, criteria: &HotelCriteria) -> Result<HotelQuote, ProviderError> {
        let check_out = criteria
            .check_out()
            .ok_or_else(|| ProviderError::unavailable(PROVIDER_NAME, "invalid check-in date"))?;

        let listing = self
            .client
            .get_json(
                PROVIDER_NAME,
                "/v1/reference-data/locations/hotels/by-city",
                &[("cityCode", criteria.city_code.clone())],
            )
            .await?;
        let ratings = hotel_ratings(&listing);
        if ratings.is_empty() {
            return Err(ProviderError::no_results(PROVIDER_NAME));
        }
        let ids: Vec<&str> = listing["data"]
            .as_array()
            .map(|a| a.iter().filter_map(|h| h["hotelId"].as_str()).take(MAX_HOTEL_IDS).collect())
            .unwrap_or_default();

        let offers = self
            .client
            .get_json(
                PROVIDER_NAME,
                "/v3/shopping/hotel-offers",
                &[
                    ("hotelIds", ids.join(",")),
                    ("adults", criteria.adults.to_string()),
                    ("checkInDate", criteria.check_in.clone()),
                    ("checkOutDate", check_out),
                    ("currency", "USD".to_string()),
                ],
            )
            .await?;

        normalize_hotel_offers(criteria, &offers, &ratings)
            .ok_or_else(|| ProviderError::no_results(PROVIDER_NAME))
    }
}

/// by-city 响应：hotelId → 星级（rating 可缺省）
pub fn hotel_ratings(body: &Value) -> HashMap<String, Option<f32>> {
    body["data"]
        .as_array()
        .map(|hotels| {
            hotels
                .iter()
                .filter_map(|h| {
                    let id = h["hotelId"].as_str()?;
                    let rating = as_f64(&h["rating"]).map(|r| r as f32);
                    Some((id.to_string(), rating))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// hotel-offers 响应：每家酒店的 offers[].price.total 折算为每晚价格区间
pub fn normalize_hotel_offers(
    criteria: &HotelCriteria,
    body: &Value,
    ratings: &HashMap<String, Option<f32>>,
) -> Option<HotelQuote> {
    let nights = f64::from(criteria.nights.max(1));
    let listings: Vec<HotelListing> = body["data"]
        .as_array()?
        .iter()
        .filter_map(|entry| {
            let hotel = &entry["hotel"];
            let name = hotel["name"].as_str()?.to_string();
            let nightly: Vec<f64> = entry["offers"]
                .as_array()?
                .iter()
                .filter_map(|o| as_f64(&o["price"]["total"]))
                .map(|total| total / nights)
                .collect();
            let low = nightly.iter().copied().fold(f64::INFINITY, f64::min);
            let high = nightly.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if !low.is_finite() {
                return None;
            }
            let star_rating = hotel["hotelId"]
                .as_str()
                .and_then(|id| ratings.get(id).copied().flatten())
                .or_else(|| as_f64(&hotel["rating"]).map(|r| r as f32));
            Some(HotelListing {
                name,
                nightly_low: round_cents(low),
                nightly_high: round_cents(high),
                star_rating,
                url: None,
            })
        })
        .take(MAX_HOTEL_LISTINGS)
        .collect();

    if listings.is_empty() {
        return None;
    }
    Some(HotelQuote {
        city_code: criteria.city_code.clone(),
        check_in: criteria.check_in.clone(),
        nights: criteria.nights,
        listings,
    })
}

fn round_cents(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl Provider for AmadeusHotels {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

#[async_trait]
impl HotelProvider for AmadeusHotels {
    async fn search_hotels(&self, criteria: &HotelCriteria) -> Result<Lookup<HotelQuote>, ProviderError> {
        cached_lookup(
            &self.cache,
            PROVIDER_NAME,
            Capability::Hotels,
            criteria,
            TtlClass::Hotels,
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
    fn test_normalize_hotel_offers_band_and_rating() {
        let by_city = json!({"data": [
            {"hotelId": "HLPAR001", "name": "Hotel Lutetia", "rating": "5"},
            {"hotelId": "HLPAR002", "name": "Ibis Bastille"}
        ]});
        let ratings = hotel_ratings(&by_city);

        let offers = json!({"data": [
            {"hotel": {"hotelId": "HLPAR001", "name": "Hotel Lutetia"},
             "offers": [{"price": {"total": "1500.00"}}, {"price": {"total": "1800.00"}}]},
            {"hotel": {"hotelId": "HLPAR002", "name": "Ibis Bastille"},
             "offers": [{"price": {"total": "390.00"}}]},
            {"hotel": {"hotelId": "HLPAR003", "name": "No Offers"}, "offers": []}
        ]});
        let criteria = HotelCriteria::new("PAR", "2026-06-28", 3);
        let quote = normalize_hotel_offers(&criteria, &offers, &ratings).unwrap();

        assert_eq!(quote.listings.len(), 2);
        assert_eq!(quote.listings[0].name, "Hotel Lutetia");
        assert_eq!(quote.listings[0].nightly_low, 500.0);
        assert_eq!(quote.listings[0].nightly_high, 600.0);
        assert_eq!(quote.listings[0].star_rating, Some(5.0));
        assert_eq!(quote.listings[1].nightly_low, 130.0);
        assert_eq!(quote.listings[1].star_rating, None);
    }

    #[test]
    fn test_listings_capped_at_three() {
        let entries: Vec<Value> = (0..6)
            .map(|i| json!({"hotel": {"hotelId": format!("H{}", i), "name": format!("Hotel {}", i)},
                            "offers": [{"price": {"total": "200"}}]}))
            .collect();
        let criteria = HotelCriteria::new("ROM", "2026-05-01", 2);
        let quote = normalize_hotel_offers(&criteria, &json!({"data": entries}), &HashMap::new()).unwrap();
        assert_eq!(quote.listings.len(), MAX_HOTEL_LISTINGS);
        assert_eq!(quote.listings[2].name, "Hotel 2");
    }
}
