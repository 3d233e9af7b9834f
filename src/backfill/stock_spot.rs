use anyhow::Result;
use chrono::NaiveDate;
use concat_string::concat_string;
use rust_decimal::Decimal;
use tokio::sync::watch;

use crate::{
    config, crawler::eastmoney, crawler::eastmoney::RawRecord,
    database::table::stock_spot::StockSpot, declare, export, logging,
};

/// 有成交價且大於 0 視為當日有開盤，停牌的股票沒有最新價
pub fn is_open(price: Option<Decimal>) -> bool {
    matches!(price, Some(p) if p > Decimal::ZERO)
}

/// 只留下 A 股主板、創業板且 `is_open` 成立的資料
pub fn filter<F>(rows: Vec<StockSpot>, is_open: F) -> Vec<StockSpot>
where
    F: Fn(Option<Decimal>) -> bool,
{
    rows.into_iter()
        .filter(|row| declare::is_a_stock(&row.code) && is_open(row.new_price))
        .collect()
}

/// 原始資料轉成行情，筆數與順序不變
pub fn normalize(date: NaiveDate, records: &[RawRecord]) -> Vec<StockSpot> {
    records
        .iter()
        .map(|record| StockSpot::from_record(date, record))
        .collect()
}

/// 抓取當下的行情並標記為 `date`
pub async fn fetch_stocks(
    app: &config::App,
    date: NaiveDate,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<StockSpot>> {
    let records = eastmoney::spot::visit(&app.eastmoney, cancel).await?;
    Ok(normalize(date, &records))
}

/// 抓取、輸出 CSV、過濾後寫入資料庫，回傳寫入的筆數
pub async fn execute(app: &config::App, date: NaiveDate, cancel: watch::Receiver<bool>) -> Result<usize> {
    let stocks = fetch_stocks(app, date, cancel).await?;
    save(app, date, stocks).await
}

/// 輸出 CSV 後過濾並寫入資料庫，沒有資料時不動到資料表中該日期的資料
pub async fn save(app: &config::App, date: NaiveDate, stocks: Vec<StockSpot>) -> Result<usize> {
    if stocks.is_empty() {
        logging::warn_file_async(format!("{} 沒有取得任何 A 股行情", date));
        return Ok(0);
    }

    let csv_path = &app.stock_spot.csv_path;
    if !csv_path.is_empty() {
        match export::write_csv(csv_path, &stocks) {
            Ok(count) => logging::info_file_async(concat_string!(
                "行情 CSV 輸出完成 ",
                csv_path,
                " ",
                count.to_string(),
                " 筆"
            )),
            Err(why) => logging::error_file_async(format!(
                "Failed to write_csv({}) because {:?}",
                csv_path, why
            )),
        }
    }

    let fetched = stocks.len();
    let stocks = filter(stocks, is_open);
    if stocks.is_empty() {
        logging::warn_file_async(format!(
            "{} 取得 {} 筆行情，過濾後沒有資料，保留資料表原有的資料",
            date, fetched
        ));
        return Ok(0);
    }

    logging::info_file_async(format!(
        "{} 取得 {} 筆行情，過濾後 {} 筆",
        date,
        fetched,
        stocks.len()
    ));

    let inserted = StockSpot::upsert_by_date(&app.stock_spot.table, date, &stocks).await?;

    Ok(inserted as usize)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use crate::database;

    use super::*;

    fn spot(code: &str, price: Option<Decimal>) -> StockSpot {
        let mut s = StockSpot::new(NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(), code.to_string());
        s.new_price = price;
        s
    }

    #[test]
    fn test_is_open() {
        assert!(is_open(Some(dec!(10.5))));
        assert!(!is_open(Some(Decimal::ZERO)));
        assert!(!is_open(None));
    }

    #[test]
    fn test_filter_by_prefix_and_price() {
        let rows = vec![
            spot("000001", Some(dec!(10.5))),
            spot("900001", Some(dec!(0.5))),
            spot("600000", None),
            spot("300750", Some(dec!(180))),
            spot("688981", Some(dec!(50))),
            spot("830799", Some(dec!(12))),
        ];

        let kept: Vec<String> = filter(rows, is_open).into_iter().map(|s| s.code).collect();
        assert_eq!(kept, vec!["000001".to_string(), "300750".to_string()]);
    }

    #[test]
    fn test_filter_with_caller_predicate() {
        let rows = vec![spot("000001", None), spot("601318", Some(dec!(45)))];

        let kept = filter(rows, |_| true);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_normalize_keeps_count_and_order() {
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let records: Vec<RawRecord> = vec![
            json!({ "f12": "600000", "f14": "浦发银行", "f2": 7.1 }),
            json!({ "f12": "000001", "f14": "平安银行", "f2": "-" }),
            json!({ "f12": "600000", "f14": "浦发银行", "f2": 7.2 }),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let rows = normalize(date, &records);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].code, "000001");
        assert_eq!(rows[1].new_price, None);
        assert_eq!(rows[2].new_price, Some(dec!(7.2)));
        assert!(rows.iter().all(|r| r.date == date));
    }

    #[tokio::test]
    async fn test_save_skips_database_when_nothing_passes_filter() {
        // 資料庫未初始化，只要碰到資料庫就會回傳錯誤
        let mut app = config::App::default();
        app.stock_spot.csv_path = String::new();
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let records: Vec<RawRecord> = vec![
            json!({ "f12": "000001", "f2": "-" }),
            json!({ "f12": "900001", "f2": 1 }),
        ]
        .into_iter()
        .map(|v| v.as_object().unwrap().clone())
        .collect();

        let stocks = normalize(date, &records);
        assert_eq!(stocks.len(), 2);

        assert_eq!(save(&app, date, stocks).await.unwrap(), 0);
        assert_eq!(save(&app, date, Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore]
    async fn test_execute() {
        dotenv::dotenv().ok();
        let _ = rustls::crypto::ring::default_provider().install_default();
        let mut app = config::App::load(config::CONFIG_PATH).unwrap();
        app.stock_spot.table = "cn_stock_spot_test".to_string();
        app.stock_spot.csv_path = String::new();
        database::init(&app.postgresql).unwrap();
        let (_tx, rx) = watch::channel(false);

        let today = chrono::Local::now().date_naive();
        match execute(&app, today, rx).await {
            Ok(count) => logging::debug_file_async(format!("stock_spot::execute {}", count)),
            Err(why) => logging::error_file_async(format!("Failed to execute because {:?}", why)),
        }
    }
}
