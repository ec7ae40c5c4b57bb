//! 静态兜底表：国家 → 枢纽机场，以及搜索查询用的国家名

/// 全局默认枢纽
pub const GLOBAL_DEFAULT_HUB: &str = "JFK";

/// 西欧国家的主要国际枢纽
const HUBS: &[(&str, &str)] = &[
    ("GB", "LHR"),
    ("FR", "CDG"),
    ("DE", "FRA"),
    ("ES", "MAD"),
    ("IT", "FCO"),
    ("NL", "AMS"),
    ("BE", "BRU"),
    ("PT", "LIS"),
    ("IE", "DUB"),
    ("CH", "ZRH"),
    ("AT", "VIE"),
];

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("US", "United States"),
    ("CA", "Canada"),
    ("MX", "Mexico"),
    ("GB", "United Kingdom"),
    ("FR", "France"),
    ("DE", "Germany"),
    ("ES", "Spain"),
    ("IT", "Italy"),
    ("NL", "Netherlands"),
    ("BE", "Belgium"),
    ("PT", "Portugal"),
    ("IE", "Ireland"),
    ("CH", "Switzerland"),
    ("AT", "Austria"),
    ("GR", "Greece"),
    ("HR", "Croatia"),
    ("CZ", "Czech Republic"),
    ("DK", "Denmark"),
    ("NO", "Norway"),
    ("SE", "Sweden"),
    ("IS", "Iceland"),
    ("JP", "Japan"),
    ("TH", "Thailand"),
    ("AU", "Australia"),
    ("NZ", "New Zealand"),
    ("MA", "Morocco"),
];

/// 国家代码对应的枢纽（大小写不敏感）；表外返回 None
pub fn hub_for_country(country_code: &str) -> Option<&'static str> {
    HUBS.iter()
        .find(|(cc, _)| cc.eq_ignore_ascii_case(country_code))
        .map(|(_, hub)| *hub)
}

/// 国家名；表外原样返回代码
pub fn country_name(country_code: &str) -> String {
    COUNTRY_NAMES
        .iter()
        .find(|(cc, _)| cc.eq_ignore_ascii_case(country_code))
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| country_code.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hub_lookup() {
        assert_eq!(hub_for_country("gb"), Some("LHR"));
        assert_eq!(hub_for_country("AT"), Some("VIE"));
        assert_eq!(hub_for_country("US"), None);
    }

    #[test]
    fn test_country_name() {
        assert_eq!(country_name("GB"), "United Kingdom");
        assert_eq!(country_name("zz"), "ZZ");
    }
}
