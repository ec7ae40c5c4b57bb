//! 调用方输入的格式校验：机场/城市代码、月份、日期

use chrono::NaiveDate;

/// 三位大写字母（IATA 机场或城市代码）
pub fn is_iata_code(s: &str) -> bool {
    s.len() == 3 && s.chars().all(|c| c.is_ascii_uppercase())
}

/// `YYYY-MM`
pub fn is_month(s: &str) -> bool {
    let Some((year, month)) = s.split_once('-') else {
        return false;
    };
    year.len() == 4
        && month.len() == 2
        && year.chars().all(|c| c.is_ascii_digit())
        && matches!(month.parse::<u32>(), Ok(1..=12))
}

/// `YYYY-MM-DD`，且是真实存在的日期
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    if s.len() != 10 {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()
}

pub fn is_date(s: &str) -> bool {
    parse_date(s).is_some()
}
