//! 方案补全：逐城市解析代码、取酒店报价，并查出发航班
//!
//! 取数失败不会中断：每个缺口记为一条人类可读的说明，交给旅行顾问补齐。

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::{Capability, FetchError};
use crate::handoff::{ChatEntry, DayPlan, FlightChoice, HandoffDraft, HotelChoice};
use crate::providers::{FallbackOrchestrator, FlightCriteria, FlightQuote, HotelCriteria, HotelQuote, Lookup};
use crate::resolver::{CityResolver, ResolvedCity};
use crate::trips::{CityStop, Trip, TripIntake, TripOption};
use crate::validate::{is_iata_code, parse_date};

/// 单个城市的补全结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CityEnrichment {
    pub stop: CityStop,
    pub resolved: ResolvedCity,
    pub check_in: String,
    pub hotels: Option<Lookup<HotelQuote>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enrichment {
    pub option: TripOption,
    pub outbound_flight: Option<Lookup<FlightQuote>>,
    pub cities: Vec<CityEnrichment>,
    /// 缺口说明，例如 "hotels unavailable for Paris, travel professional will provide options"
    pub gaps: Vec<String>,
}

pub struct TripEnricher {
    resolver: Arc<CityResolver>,
    providers: Arc<FallbackOrchestrator>,
}

impl TripEnricher {
    pub fn new(resolver: Arc<CityResolver>, providers: Arc<FallbackOrchestrator>) -> Self {
        Self { resolver, providers }
    }

    pub async fn enrich(&self, intake: &TripIntake, option: &TripOption) -> Enrichment {
        let mut gaps = Vec::new();
        let mut cities = Vec::with_capacity(option.cities.len());
        let departure = intake.departure_date();
        let mut check_in = parse_date(&departure);

        for stop in &option.cities {
            let resolved = self.resolver.resolve(&stop.name, stop.country.as_deref()).await;
            let check_in_str = check_in
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| departure.clone());

            let criteria = HotelCriteria::new(resolved.city_code.clone(), check_in_str.clone(), stop.nights.max(1))
                .with_city_name(stop.name.clone())
                .with_adults(intake.travelers);
            let hotels = match criteria.validate() {
                Ok(()) => match self.providers.search_hotels(&criteria).await {
                    Ok(lookup) => Some(lookup),
                    Err(e) => {
                        gaps.push(gap_message(&e, &stop.name));
                        None
                    }
                },
                Err(reason) => {
                    tracing::warn!(city = %stop.name, reason = %reason, "skipping hotel lookup");
                    gaps.push(format!(
                        "hotels unavailable for {}, travel professional will provide options",
                        stop.name
                    ));
                    None
                }
            };

            cities.push(CityEnrichment {
                stop: stop.clone(),
                resolved,
                check_in: check_in_str,
                hotels,
            });
            check_in = check_in.and_then(|d| d.checked_add_signed(Duration::days(i64::from(stop.nights))));
        }

        let outbound_flight = self.outbound_flight(intake, &cities, &mut gaps).await;

        if !gaps.is_empty() {
            tracing::info!(option = %option.title, gaps = gaps.len(), "enrichment finished with gaps");
        }
        Enrichment {
            option: option.clone(),
            outbound_flight,
            cities,
            gaps,
        }
    }

    async fn outbound_flight(
        &self,
        intake: &TripIntake,
        cities: &[CityEnrichment],
        gaps: &mut Vec<String>,
    ) -> Option<Lookup<FlightQuote>> {
        let destination = cities
            .first()
            .map(|c| c.resolved.city_code.clone())
            .filter(|code| is_iata_code(code))
            .unwrap_or_else(|| intake.destination.clone());
        let mut criteria = FlightCriteria::new(&intake.origin, &destination, &intake.month).with_adults(intake.travelers);
        if let Some(date) = &intake.start_date {
            criteria = criteria.with_date(date.clone());
        }
        let route = format!("{} → {}", intake.origin, destination);
        match self.providers.search_flights(&criteria).await {
            Ok(lookup) => Some(lookup),
            Err(e) => {
                gaps.push(gap_message(&e, &route));
                None
            }
        }
    }

    /// 行程 + 补全结果 → 交接草稿
    pub fn assemble_handoff(trip: &Trip, enrichment: &Enrichment, chat_history: Vec<ChatEntry>) -> HandoffDraft {
        let travelers = f64::from(trip.intake.travelers);

        let all_flight_options: Vec<FlightChoice> = enrichment
            .outbound_flight
            .iter()
            .map(|lookup| FlightChoice {
                id: "flight-1".to_string(),
                route: lookup.data.route.clone(),
                carrier: lookup.data.carrier.clone(),
                price_low_usd: lookup.data.price_low,
                price_high_usd: lookup.data.price_high,
                provider: lookup.provider.clone(),
            })
            .collect();
        let selected_flight_id = all_flight_options.first().map(|f| f.id.clone());

        let mut all_hotel_options = Vec::new();
        let mut selected_hotel_ids = Vec::new();
        let mut hotel_cost = 0.0;
        for (ci, city) in enrichment.cities.iter().enumerate() {
            let Some(lookup) = &city.hotels else { continue };
            for (hi, listing) in lookup.data.listings.iter().enumerate() {
                let id = format!("hotel-{}-{}", ci + 1, hi + 1);
                if hi == 0 {
                    selected_hotel_ids.push(id.clone());
                    hotel_cost += listing.nightly_low * f64::from(city.stop.nights);
                }
                all_hotel_options.push(HotelChoice {
                    id,
                    city: city.stop.name.clone(),
                    name: listing.name.clone(),
                    nightly_low_usd: listing.nightly_low,
                    nightly_high_usd: listing.nightly_high,
                    star_rating: listing.star_rating,
                    provider: lookup.provider.clone(),
                });
            }
        }

        let flight_cost = enrichment
            .outbound_flight
            .as_ref()
            .map(|l| l.data.price_low * travelers)
            .unwrap_or(0.0);
        let live_estimate = flight_cost + hotel_cost;
        let total_estimate_usd = if live_estimate > 0.0 {
            (live_estimate * 100.0).round() / 100.0
        } else {
            enrichment.option.estimate_usd.max(0.0)
        };

        let mut daily_itinerary = Vec::new();
        for city in &enrichment.cities {
            for _ in 0..city.stop.nights {
                daily_itinerary.push(DayPlan {
                    day: daily_itinerary.len() as u32 + 1,
                    city: city.stop.name.clone(),
                    activities: Vec::new(),
                });
            }
        }

        HandoffDraft {
            trip_id: trip.id.clone(),
            user_id: trip.user_id.clone(),
            chat_history,
            research_summary: trip.research_summary.clone(),
            user_preferences: serde_json::json!({
                "tier": trip.intake.tier,
                "activity": trip.intake.activity,
                "travelers": trip.intake.travelers,
                "notes": trip.intake.notes,
                "gaps": enrichment.gaps,
            }),
            all_flight_options,
            selected_flight_id,
            all_hotel_options,
            selected_hotel_ids,
            daily_itinerary,
            total_estimate_usd,
        }
    }
}

/// 把取数失败翻译成给顾问看的缺口说明
fn gap_message(err: &FetchError, subject: &str) -> String {
    let what = match err.capability() {
        Capability::Flights => "flights",
        Capability::Hotels => "hotels",
        Capability::Search => "search results",
    };
    match err {
        FetchError::NoResults { .. } => {
            format!("no {} found for {}, travel professional will provide options", what, subject)
        }
        FetchError::AllUnavailable { .. } => {
            format!("{} unavailable for {}, travel professional will provide options", what, subject)
        }
    }
}
