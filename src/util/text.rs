use std::str::FromStr;

use anyhow::*;
use chrono::NaiveDate;
use hashbrown::HashSet;
use rust_decimal::Decimal;
use serde_json::Value;

const NUMBER_ESCAPE_CHAR: &[char] = &['%', ',', ' ', '"', '\n'];

/// 東方財富以 `-` 表示沒有數值
const EMPTY_MARK: &str = "-";

/// Parses a decimal value from a given string.
///
/// Thousands separators and the characters in `NUMBER_ESCAPE_CHAR` are removed
/// before parsing. Scientific notation such as `1.2e10` is accepted.
///
/// # Example
///
/// ```
/// let s = "1,234.56";
/// let decimal_value = parse_decimal(s, None).unwrap();
/// ```
pub fn parse_decimal(s: &str, escape_chars: Option<Vec<char>>) -> Result<Decimal> {
    let cleaned = clean_escape_chars(s, escape_chars);
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        // 小於 Decimal 可表示的最小值(1e-28)視為 0
        .or_else(|why| match cleaned.parse::<f64>() {
            std::result::Result::Ok(f) if f.is_finite() && f.abs() < 1e-28 => {
                std::result::Result::Ok(Decimal::ZERO)
            }
            _ => std::result::Result::Err(why),
        })
        .map_err(|why| anyhow!("Failed to parse '{}' as Decimal because {:?}", cleaned, why))
}

/// 將 JSON 值轉成 Decimal，無法轉換時回傳 None
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => parse_decimal(&n.to_string(), None).ok(),
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() || s == EMPTY_MARK {
                return None;
            }
            parse_decimal(s, None).ok()
        }
        _ => None,
    }
}

/// 將 `YYYYMMDD` 格式的整數或字串轉成日期，無法轉換時回傳 None
pub fn date_from_value(value: &Value) -> Option<NaiveDate> {
    let text = match value {
        Value::Number(n) => n.as_u64()?.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };

    if text.len() != 8 || !text.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    NaiveDate::parse_from_str(&text, "%Y%m%d").ok()
}

/// 將 JSON 值轉成字串，空值或 `-` 回傳 None
pub fn string_from_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };

    if text.is_empty() || text == EMPTY_MARK {
        return None;
    }

    Some(text)
}

pub(crate) fn clean_escape_chars(s: &str, escape_chars: Option<Vec<char>>) -> String {
    let mut combined: Vec<char> = NUMBER_ESCAPE_CHAR.to_vec();
    if let Some(ec) = escape_chars {
        combined.extend(ec);
    }

    let filters = combined.iter().collect::<HashSet<_>>();
    s.chars().filter(|c| !filters.contains(c)).collect()
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_decimal() {
        assert_eq!(parse_decimal("1,234.56", None).unwrap(), dec!(1234.56));
        assert_eq!(parse_decimal("12.5%", None).unwrap(), dec!(12.5));
        assert_eq!(parse_decimal("1.5e3", None).unwrap(), dec!(1500));
        assert!(parse_decimal("abc", None).is_err());
        assert!(parse_decimal("", None).is_err());
        assert_eq!(parse_decimal("1e-400", None).unwrap(), Decimal::ZERO);
        assert_eq!(parse_decimal("-1e-300", None).unwrap(), Decimal::ZERO);
        assert!(parse_decimal("1e400", None).is_err());
    }

    #[test]
    fn test_decimal_from_value() {
        assert_eq!(decimal_from_value(&json!(10.52)), Some(dec!(10.52)));
        assert_eq!(decimal_from_value(&json!(-3)), Some(dec!(-3)));
        assert_eq!(decimal_from_value(&json!("7.01")), Some(dec!(7.01)));
        assert_eq!(decimal_from_value(&json!(123456789012.0)), Some(dec!(123456789012)));
        assert_eq!(decimal_from_value(&json!("-")), None);
        assert_eq!(decimal_from_value(&json!("")), None);
        assert_eq!(decimal_from_value(&json!(null)), None);
        assert_eq!(decimal_from_value(&json!("N/A")), None);
        assert_eq!(decimal_from_value(&json!([1])), None);
        assert_eq!(decimal_from_value(&json!(-1e-300)), Some(Decimal::ZERO));
    }

    #[test]
    fn test_date_from_value() {
        assert_eq!(
            date_from_value(&json!(19910403)),
            NaiveDate::from_ymd_opt(1991, 4, 3)
        );
        assert_eq!(
            date_from_value(&json!("20240930")),
            NaiveDate::from_ymd_opt(2024, 9, 30)
        );
        assert_eq!(date_from_value(&json!(0)), None);
        assert_eq!(date_from_value(&json!("-")), None);
        assert_eq!(date_from_value(&json!(20241332)), None);
        assert_eq!(date_from_value(&json!(2024093.5)), None);
        assert_eq!(date_from_value(&json!(null)), None);
    }

    #[test]
    fn test_string_from_value() {
        assert_eq!(string_from_value(&json!(" 銀行 ")), Some("銀行".to_string()));
        assert_eq!(string_from_value(&json!("-")), None);
        assert_eq!(string_from_value(&json!(null)), None);
    }
}
