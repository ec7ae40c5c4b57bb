//! 规范化响应形状：各上游的异构响应都折叠成这里的固定结构

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::validate::{is_date, is_iata_code, is_month, parse_date};

/// 供应商调用结果：数据本体 + 来源与缓存标注
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lookup<T> {
    pub provider: String,
    pub cached: bool,
    /// 命中缓存时条目的年龄（秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_secs: Option<i64>,
    #[serde(flatten)]
    pub data: T,
}

/// 航班查询条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightCriteria {
    pub origin: String,
    pub destination: String,
    /// YYYY-MM
    pub month: String,
    /// YYYY-MM-DD；未指定时取当月 15 日
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    pub adults: u32,
}

impl FlightCriteria {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>, month: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
            month: month.into(),
            date: None,
            adults: 1,
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_adults(mut self, adults: u32) -> Self {
        self.adults = adults;
        self
    }

    pub fn departure_date(&self) -> String {
        self.date
            .clone()
            .unwrap_or_else(|| format!("{}-15", self.month))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_iata_code(&self.origin) {
            return Err(format!("origin must be a 3-letter uppercase code: {}", self.origin));
        }
        if !is_iata_code(&self.destination) {
            return Err(format!(
                "destination must be a 3-letter uppercase code: {}",
                self.destination
            ));
        }
        if !is_month(&self.month) {
            return Err(format!("month must be YYYY-MM: {}", self.month));
        }
        if let Some(date) = &self.date {
            if !is_date(date) {
                return Err(format!("date must be YYYY-MM-DD: {}", date));
            }
        }
        if self.adults == 0 {
            return Err("party size must be positive".to_string());
        }
        Ok(())
    }
}

/// 单条航班报价（规范化前的中间形态）
#[derive(Debug, Clone, PartialEq)]
pub struct FlightOffer {
    pub price: f64,
    pub carrier: Option<String>,
    pub stops: usize,
}

/// 航班价格概览
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlightQuote {
    pub origin: String,
    pub destination: String,
    pub departure_date: String,
    pub price_low: f64,
    pub price_median: f64,
    pub price_high: f64,
    pub currency: String,
    /// 最低价报价的承运人
    pub carrier: Option<String>,
    /// 例如 "JFK → LHR (nonstop)"
    pub route: String,
    pub offer_count: usize,
}

impl FlightQuote {
    /// 由报价列表计算低 / 中位 / 高价；列表为空返回 None
    pub fn from_offers(criteria: &FlightCriteria, currency: &str, offers: &[FlightOffer]) -> Option<Self> {
        let mut sorted: Vec<&FlightOffer> = offers
            .iter()
            .filter(|o| o.price.is_finite() && o.price > 0.0)
            .collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(|a, b| a.price.total_cmp(&b.price));

        let prices: Vec<f64> = sorted.iter().map(|o| o.price).collect();
        let cheapest = sorted[0];
        Some(Self {
            origin: criteria.origin.clone(),
            destination: criteria.destination.clone(),
            departure_date: criteria.departure_date(),
            price_low: prices[0],
            price_median: median(&prices),
            price_high: prices[prices.len() - 1],
            currency: currency.to_string(),
            carrier: cheapest.carrier.clone(),
            route: route_descriptor(&criteria.origin, &criteria.destination, cheapest.stops),
            offer_count: prices.len(),
        })
    }
}

/// 已排序序列的中位数；偶数个取中间两值的平均
fn median(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}

fn route_descriptor(origin: &str, destination: &str, stops: usize) -> String {
    let stops = match stops {
        0 => "nonstop".to_string(),
        1 => "1 stop".to_string(),
        n => format!("{} stops", n),
    };
    format!("{} → {} ({})", origin, destination, stops)
}

/// 酒店查询条件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HotelCriteria {
    /// IATA 城市/机场代码
    pub city_code: String,
    /// 人类可读城市名（关键词搜索类上游使用）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city_name: Option<String>,
    /// YYYY-MM-DD
    pub check_in: String,
    pub nights: u32,
    pub adults: u32,
}

impl HotelCriteria {
    pub fn new(city_code: impl Into<String>, check_in: impl Into<String>, nights: u32) -> Self {
        Self {
            city_code: city_code.into(),
            city_name: None,
            check_in: check_in.into(),
            nights,
            adults: 1,
        }
    }

    pub fn with_city_name(mut self, name: impl Into<String>) -> Self {
        self.city_name = Some(name.into());
        self
    }

    pub fn with_adults(mut self, adults: u32) -> Self {
        self.adults = adults;
        self
    }

    /// 退房日期 = 入住 + nights
    pub fn check_out(&self) -> Option<String> {
        let check_in = parse_date(&self.check_in)?;
        let out = check_in.checked_add_signed(Duration::days(i64::from(self.nights)))?;
        Some(out.format("%Y-%m-%d").to_string())
    }

    pub fn validate(&self) -> Result<(), String> {
        if !is_iata_code(&self.city_code) {
            return Err(format!("city code must be a 3-letter uppercase code: {}", self.city_code));
        }
        if !is_date(&self.check_in) {
            return Err(format!("check-in must be YYYY-MM-DD: {}", self.check_in));
        }
        if self.nights == 0 {
            return Err("nights must be positive".to_string());
        }
        if self.adults == 0 {
            return Err("party size must be positive".to_string());
        }
        Ok(())
    }
}

/// 最多保留的酒店条目数
pub const MAX_HOTEL_LISTINGS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelListing {
    pub name: String,
    /// 每晚价格区间（USD）
    pub nightly_low: f64,
    pub nightly_high: f64,
    pub star_rating: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HotelQuote {
    pub city_code: String,
    pub check_in: String,
    pub nights: u32,
    /// 按上游排序的前 2–3 家
    pub listings: Vec<HotelListing>,
}

/// 通用网页搜索请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_results: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    /// 上游直接给出的答案（answer box / 摘要答案）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    pub hits: Vec<SearchHit>,
}

/// 位置目录中的候选项（城市或机场）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCandidate {
    pub iata_code: String,
    pub name: String,
    pub country_code: Option<String>,
    pub sub_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(price: f64, carrier: &str, stops: usize) -> FlightOffer {
        FlightOffer {
            price,
            carrier: Some(carrier.to_string()),
            stops,
        }
    }

    #[test]
    fn test_quote_price_band() {
        let criteria = FlightCriteria::new("JFK", "LHR", "2026-06");
        let offers = vec![offer(700.0, "AA", 1), offer(420.0, "BA", 0), offer(510.0, "VS", 0), offer(980.0, "DL", 2)];
        let quote = FlightQuote::from_offers(&criteria, "USD", &offers).unwrap();

        assert_eq!(quote.price_low, 420.0);
        assert_eq!(quote.price_median, 605.0);
        assert_eq!(quote.price_high, 980.0);
        assert_eq!(quote.carrier.as_deref(), Some("BA"));
        assert_eq!(quote.route, "JFK → LHR (nonstop)");
        assert_eq!(quote.departure_date, "2026-06-15");
        assert_eq!(quote.offer_count, 4);
    }

    #[test]
    fn test_quote_ignores_unpriced_offers() {
        let criteria = FlightCriteria::new("JFK", "LHR", "2026-06");
        assert!(FlightQuote::from_offers(&criteria, "USD", &[offer(0.0, "AA", 0)]).is_none());
        assert!(FlightQuote::from_offers(&criteria, "USD", &[]).is_none());
    }

    #[test]
    fn test_criteria_validation() {
        assert!(FlightCriteria::new("JFK", "LHR", "2026-06").validate().is_ok());
        assert!(FlightCriteria::new("jfk", "LHR", "2026-06").validate().is_err());
        assert!(FlightCriteria::new("JFK", "LHR", "June").validate().is_err());
        assert!(FlightCriteria::new("JFK", "LHR", "2026-06").with_adults(0).validate().is_err());

        let hotel = HotelCriteria::new("PAR", "2026-06-28", 3);
        assert!(hotel.validate().is_ok());
        assert_eq!(hotel.check_out().as_deref(), Some("2026-07-01"));
        assert!(HotelCriteria::new("PAR", "2026-06-28", 0).validate().is_err());
    }

    #[test]
    fn test_lookup_flattens_data() {
        let lookup = Lookup {
            provider: "tavily".to_string(),
            cached: false,
            cache_age_secs: None,
            data: SearchResults {
                query: "q".to_string(),
                answer: None,
                hits: vec![],
            },
        };
        let json = serde_json::to_value(&lookup).unwrap();
        assert_eq!(json["provider"], "tavily");
        assert_eq!(json["query"], "q");
        assert!(json.get("cache_age_secs").is_none());
    }
}
