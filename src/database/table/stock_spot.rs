use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;
use hashbrown::HashSet;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::{
    database::{
        self,
        schema::{Column, ColumnKind, TableSchema},
        CopyIn,
    },
    logging,
    util::text,
};

const COLUMNS: &[Column] = &[
    Column::new("date", "日期", None, ColumnKind::Date),
    Column::new("code", "代码", Some("f12"), ColumnKind::Text(6)),
    Column::new("name", "名称", Some("f14"), ColumnKind::Text(20)),
    Column::new("new_price", "最新价", Some("f2"), ColumnKind::Numeric),
    Column::new("change_rate", "涨跌幅", Some("f3"), ColumnKind::Numeric),
    Column::new("ups_downs", "涨跌额", Some("f4"), ColumnKind::Numeric),
    Column::new("volume", "成交量", Some("f5"), ColumnKind::Numeric),
    Column::new("deal_amount", "成交额", Some("f6"), ColumnKind::Numeric),
    Column::new("amplitude", "振幅", Some("f7"), ColumnKind::Numeric),
    Column::new("turnoverrate", "换手率", Some("f8"), ColumnKind::Numeric),
    Column::new("volume_ratio", "量比", Some("f10"), ColumnKind::Numeric),
    Column::new("open_price", "今开", Some("f17"), ColumnKind::Numeric),
    Column::new("high_price", "最高", Some("f15"), ColumnKind::Numeric),
    Column::new("low_price", "最低", Some("f16"), ColumnKind::Numeric),
    Column::new("pre_close_price", "昨收", Some("f18"), ColumnKind::Numeric),
    Column::new("speed_increase", "涨速", Some("f22"), ColumnKind::Numeric),
    Column::new("speed_increase_5", "5分钟涨跌", Some("f11"), ColumnKind::Numeric),
    Column::new("speed_increase_60", "60日涨跌幅", Some("f24"), ColumnKind::Numeric),
    Column::new("speed_increase_all", "年初至今涨跌幅", Some("f25"), ColumnKind::Numeric),
    Column::new("dtsyl", "市盈率动", Some("f9"), ColumnKind::Numeric),
    Column::new("pe9", "市盈率TTM", Some("f115"), ColumnKind::Numeric),
    Column::new("pe", "市盈率静", Some("f114"), ColumnKind::Numeric),
    Column::new("pbnewmrq", "市净率", Some("f23"), ColumnKind::Numeric),
    Column::new("basic_eps", "每股收益", Some("f112"), ColumnKind::Numeric),
    Column::new("bvps", "每股净资产", Some("f113"), ColumnKind::Numeric),
    Column::new("per_capital_reserve", "每股公积金", Some("f61"), ColumnKind::Numeric),
    Column::new("per_unassign_profit", "每股未分配利润", Some("f48"), ColumnKind::Numeric),
    Column::new("roe_weight", "加权净资产收益率", Some("f37"), ColumnKind::Numeric),
    Column::new("sale_gpr", "毛利率", Some("f49"), ColumnKind::Numeric),
    Column::new("debt_asset_ratio", "资产负债率", Some("f57"), ColumnKind::Numeric),
    Column::new("total_operate_income", "营业收入", Some("f40"), ColumnKind::Numeric),
    Column::new("toi_yoy_ratio", "营业收入同比增长", Some("f41"), ColumnKind::Numeric),
    Column::new("parent_netprofit", "归属净利润", Some("f45"), ColumnKind::Numeric),
    Column::new("netprofit_yoy_ratio", "归属净利润同比增长", Some("f46"), ColumnKind::Numeric),
    Column::new("report_date", "报告期", Some("f221"), ColumnKind::Date),
    Column::new("total_shares", "总股本", Some("f38"), ColumnKind::Numeric),
    Column::new("free_shares", "已流通股份", Some("f39"), ColumnKind::Numeric),
    Column::new("total_market_cap", "总市值", Some("f20"), ColumnKind::Numeric),
    Column::new("free_cap", "流通市值", Some("f21"), ColumnKind::Numeric),
    Column::new("industry", "所处行业", Some("f100"), ColumnKind::Text(50)),
    Column::new("listing_date", "上市时间", Some("f26"), ColumnKind::Date),
];

static NULL: Value = Value::Null;

/// 每日 A 股實時行情資料表的結構
pub const SCHEMA: TableSchema = TableSchema {
    columns: COLUMNS,
    primary_key: &["date", "code"],
};

#[derive(Default, Debug, Clone, PartialEq)]
/// 每日 A 股實時行情
pub struct StockSpot {
    pub date: NaiveDate,
    /// 股票代號
    pub code: String,
    pub name: String,
    /// 最新價
    pub new_price: Option<Decimal>,
    /// 漲跌幅
    pub change_rate: Option<Decimal>,
    /// 漲跌額
    pub ups_downs: Option<Decimal>,
    /// 成交量
    pub volume: Option<Decimal>,
    /// 成交額
    pub deal_amount: Option<Decimal>,
    /// 振幅
    pub amplitude: Option<Decimal>,
    /// 換手率
    pub turnoverrate: Option<Decimal>,
    /// 量比
    pub volume_ratio: Option<Decimal>,
    pub open_price: Option<Decimal>,
    pub high_price: Option<Decimal>,
    pub low_price: Option<Decimal>,
    pub pre_close_price: Option<Decimal>,
    /// 漲速
    pub speed_increase: Option<Decimal>,
    /// 5 分鐘漲跌
    pub speed_increase_5: Option<Decimal>,
    /// 60 日漲跌幅
    pub speed_increase_60: Option<Decimal>,
    /// 年初至今漲跌幅
    pub speed_increase_all: Option<Decimal>,
    /// 動態本益比
    pub dtsyl: Option<Decimal>,
    /// 本益比 TTM
    pub pe9: Option<Decimal>,
    /// 靜態本益比
    pub pe: Option<Decimal>,
    /// 股價淨值比
    pub pbnewmrq: Option<Decimal>,
    pub basic_eps: Option<Decimal>,
    /// 每股淨值
    pub bvps: Option<Decimal>,
    pub per_capital_reserve: Option<Decimal>,
    pub per_unassign_profit: Option<Decimal>,
    pub roe_weight: Option<Decimal>,
    /// 毛利率
    pub sale_gpr: Option<Decimal>,
    pub debt_asset_ratio: Option<Decimal>,
    /// 營業收入
    pub total_operate_income: Option<Decimal>,
    pub toi_yoy_ratio: Option<Decimal>,
    /// 歸屬淨利
    pub parent_netprofit: Option<Decimal>,
    pub netprofit_yoy_ratio: Option<Decimal>,
    /// 財報期
    pub report_date: Option<NaiveDate>,
    pub total_shares: Option<Decimal>,
    pub free_shares: Option<Decimal>,
    /// 總市值
    pub total_market_cap: Option<Decimal>,
    /// 流通市值
    pub free_cap: Option<Decimal>,
    /// 所屬產業
    pub industry: Option<String>,
    /// 上市日期
    pub listing_date: Option<NaiveDate>,
}

/// `StockSpot` 中可由遠端資料填入的成員
enum Slot<'a> {
    Required(&'a mut String),
    Text(&'a mut Option<String>),
    Decimal(&'a mut Option<Decimal>),
    Date(&'a mut Option<NaiveDate>),
}

impl StockSpot {
    pub fn new(date: NaiveDate, code: String) -> Self {
        StockSpot {
            date,
            code,
            ..Default::default()
        }
    }

    /// 將遠端的一筆資料轉成行情資料列，無法轉換的欄位為 None
    ///
    /// 欄位代號只記錄在 `SCHEMA`，依欄位名稱找到對應的成員後轉換型態。
    pub fn from_record(date: NaiveDate, record: &Map<String, Value>) -> Self {
        let mut e = StockSpot {
            date,
            ..Default::default()
        };

        for column in SCHEMA.columns {
            let (Some(source), Some(slot)) = (column.source, e.slot(column.name)) else {
                continue;
            };

            let value = record.get(source).unwrap_or(&NULL);
            match slot {
                Slot::Required(target) => {
                    *target = text::string_from_value(value).unwrap_or_default()
                }
                Slot::Text(target) => *target = text::string_from_value(value),
                Slot::Decimal(target) => *target = text::decimal_from_value(value),
                Slot::Date(target) => *target = text::date_from_value(value),
            }
        }

        e
    }

    /// 依欄位名稱取得可寫入的成員
    fn slot(&mut self, column: &str) -> Option<Slot<'_>> {
        let slot = match column {
            "code" => Slot::Required(&mut self.code),
            "name" => Slot::Required(&mut self.name),
            "industry" => Slot::Text(&mut self.industry),
            "report_date" => Slot::Date(&mut self.report_date),
            "listing_date" => Slot::Date(&mut self.listing_date),
            "new_price" => Slot::Decimal(&mut self.new_price),
            "change_rate" => Slot::Decimal(&mut self.change_rate),
            "ups_downs" => Slot::Decimal(&mut self.ups_downs),
            "volume" => Slot::Decimal(&mut self.volume),
            "deal_amount" => Slot::Decimal(&mut self.deal_amount),
            "amplitude" => Slot::Decimal(&mut self.amplitude),
            "turnoverrate" => Slot::Decimal(&mut self.turnoverrate),
            "volume_ratio" => Slot::Decimal(&mut self.volume_ratio),
            "open_price" => Slot::Decimal(&mut self.open_price),
            "high_price" => Slot::Decimal(&mut self.high_price),
            "low_price" => Slot::Decimal(&mut self.low_price),
            "pre_close_price" => Slot::Decimal(&mut self.pre_close_price),
            "speed_increase" => Slot::Decimal(&mut self.speed_increase),
            "speed_increase_5" => Slot::Decimal(&mut self.speed_increase_5),
            "speed_increase_60" => Slot::Decimal(&mut self.speed_increase_60),
            "speed_increase_all" => Slot::Decimal(&mut self.speed_increase_all),
            "dtsyl" => Slot::Decimal(&mut self.dtsyl),
            "pe9" => Slot::Decimal(&mut self.pe9),
            "pe" => Slot::Decimal(&mut self.pe),
            "pbnewmrq" => Slot::Decimal(&mut self.pbnewmrq),
            "basic_eps" => Slot::Decimal(&mut self.basic_eps),
            "bvps" => Slot::Decimal(&mut self.bvps),
            "per_capital_reserve" => Slot::Decimal(&mut self.per_capital_reserve),
            "per_unassign_profit" => Slot::Decimal(&mut self.per_unassign_profit),
            "roe_weight" => Slot::Decimal(&mut self.roe_weight),
            "sale_gpr" => Slot::Decimal(&mut self.sale_gpr),
            "debt_asset_ratio" => Slot::Decimal(&mut self.debt_asset_ratio),
            "total_operate_income" => Slot::Decimal(&mut self.total_operate_income),
            "toi_yoy_ratio" => Slot::Decimal(&mut self.toi_yoy_ratio),
            "parent_netprofit" => Slot::Decimal(&mut self.parent_netprofit),
            "netprofit_yoy_ratio" => Slot::Decimal(&mut self.netprofit_yoy_ratio),
            "total_shares" => Slot::Decimal(&mut self.total_shares),
            "free_shares" => Slot::Decimal(&mut self.free_shares),
            "total_market_cap" => Slot::Decimal(&mut self.total_market_cap),
            "free_cap" => Slot::Decimal(&mut self.free_cap),
            _ => return None,
        };

        Some(slot)
    }

    /// 依 `SCHEMA` 的欄位順序輸出每個欄位的文字，None 表示空值
    pub fn cells(&self) -> Vec<Option<String>> {
        let d = |v: &Option<Decimal>| v.map(|v| v.normalize().to_string());
        let day = |v: &Option<NaiveDate>| v.map(|v| v.format("%Y-%m-%d").to_string());

        vec![
            Some(self.date.format("%Y-%m-%d").to_string()),
            Some(self.code.clone()),
            Some(self.name.clone()),
            d(&self.new_price),
            d(&self.change_rate),
            d(&self.ups_downs),
            d(&self.volume),
            d(&self.deal_amount),
            d(&self.amplitude),
            d(&self.turnoverrate),
            d(&self.volume_ratio),
            d(&self.open_price),
            d(&self.high_price),
            d(&self.low_price),
            d(&self.pre_close_price),
            d(&self.speed_increase),
            d(&self.speed_increase_5),
            d(&self.speed_increase_60),
            d(&self.speed_increase_all),
            d(&self.dtsyl),
            d(&self.pe9),
            d(&self.pe),
            d(&self.pbnewmrq),
            d(&self.basic_eps),
            d(&self.bvps),
            d(&self.per_capital_reserve),
            d(&self.per_unassign_profit),
            d(&self.roe_weight),
            d(&self.sale_gpr),
            d(&self.debt_asset_ratio),
            d(&self.total_operate_income),
            d(&self.toi_yoy_ratio),
            d(&self.parent_netprofit),
            d(&self.netprofit_yoy_ratio),
            day(&self.report_date),
            d(&self.total_shares),
            d(&self.free_shares),
            d(&self.total_market_cap),
            d(&self.free_cap),
            self.industry.clone(),
            day(&self.listing_date),
        ]
    }

    /// 資料表是否已存在
    pub async fn table_exists(table: &str) -> Result<bool> {
        let sql = r#"
SELECT EXISTS (
    SELECT 1
    FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_name = $1
)
"#;
        let (exists,): (bool,) = sqlx::query_as(sql)
            .bind(table)
            .fetch_one(database::get_connection()?)
            .await
            .context(format!("Failed to StockSpot::table_exists({})", table))?;

        Ok(exists)
    }

    /// 依 `SCHEMA` 建立資料表與欄位註解
    pub async fn create_table(table: &str) -> Result<()> {
        let mut tx = database::get_tx().await?;

        sqlx::query(&SCHEMA.create_table_sql(table))
            .execute(&mut *tx)
            .await
            .context(format!("Failed to StockSpot::create_table({})", table))?;

        for sql in SCHEMA.comment_sql(table) {
            sqlx::query(&sql).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        logging::info_file_async(format!("資料表 {} 建立完成", table));

        Ok(())
    }

    /// 刪除指定日期的資料後批次寫入，同一日期重複執行的結果相同
    ///
    /// # Errors
    /// 資料列的日期與指定日期不同，或 SQL 執行失敗時回傳錯誤。失敗時整個 transaction 會 rollback。
    pub async fn upsert_by_date(table: &str, date: NaiveDate, rows: &[StockSpot]) -> Result<u64> {
        if let Some(row) = rows.iter().find(|r| r.date != date) {
            return Err(anyhow!(
                "StockSpot({}) has date {} but expected {}",
                row.code,
                row.date,
                date
            ));
        }

        let rows = dedup_latest(rows);

        if !Self::table_exists(table).await? {
            Self::create_table(table).await?;
        }

        let mut tx = database::get_tx().await?;

        let deleted = sqlx::query(&format!(r#"DELETE FROM "{}" WHERE "date" = $1"#, table))
            .bind(date)
            .execute(&mut *tx)
            .await
            .context(format!("Failed to delete {} of {}", table, date))?
            .rows_affected();

        let inserted = if rows.is_empty() {
            0
        } else {
            database::copy_in_raw(&mut tx, &SCHEMA.copy_in_sql(table), rows.as_slice())
                .await
                .context(format!("Failed to copy StockSpot into {}", table))?
        };

        tx.commit().await?;

        logging::info_file_async(format!(
            "{} {} 刪除 {} 筆，寫入 {} 筆",
            table, date, deleted, inserted
        ));

        Ok(inserted)
    }

    pub async fn fetch_count_by_date(table: &str, date: NaiveDate) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as(&format!(r#"SELECT COUNT(*) FROM "{}" WHERE "date" = $1"#, table))
                .bind(date)
                .fetch_one(database::get_connection()?)
                .await
                .context(format!("Failed to fetch_count_by_date({}, {})", table, date))?;

        Ok(count)
    }
}

impl CopyIn for StockSpot {
    fn to_csv(&self) -> Result<String> {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::with_capacity(512));

        writer.write_record(self.cells().iter().map(|c| c.as_deref().unwrap_or("")))?;

        let bytes = writer
            .into_inner()
            .map_err(|why| anyhow!("Failed to flush csv because {:?}", why.error()))?;

        Ok(String::from_utf8(bytes)?)
    }
}

/// 同一股票代號重複出現時只保留最後一筆
pub fn dedup_latest(rows: &[StockSpot]) -> Vec<StockSpot> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(rows.len());
    let mut result: Vec<StockSpot> = rows
        .iter()
        .rev()
        .filter(|r| seen.insert(r.code.as_str()))
        .cloned()
        .collect();

    result.reverse();
    result
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use serde_json::json;

    use super::*;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn record(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_every_source_maps_to_one_column() {
        let sources = SCHEMA.sources();
        let unique: HashSet<&str> = sources.iter().copied().collect();
        assert_eq!(sources.len(), 40);
        assert_eq!(unique.len(), sources.len());

        let names = SCHEMA.column_names();
        let unique: HashSet<&str> = names.iter().copied().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(names[0], "date");
    }

    #[test]
    fn test_every_source_column_has_a_matching_slot() {
        let mut spot = StockSpot::default();
        for column in COLUMNS.iter().filter(|c| c.source.is_some()) {
            let matched = match (spot.slot(column.name), column.kind) {
                (Some(Slot::Decimal(_)), ColumnKind::Numeric) => true,
                (Some(Slot::Date(_)), ColumnKind::Date) => true,
                (Some(Slot::Text(_) | Slot::Required(_)), ColumnKind::Text(_)) => true,
                _ => false,
            };
            assert!(matched, "{} has no slot of kind {:?}", column.name, column.kind);
        }

        assert!(spot.slot("date").is_none());
    }

    #[test]
    fn test_from_record_places_each_field_in_its_column() {
        // 每個欄位代號給一個不同的數值，檢查它出現在 SCHEMA 對應的位置
        let mut raw = Map::new();
        for (i, column) in COLUMNS.iter().enumerate() {
            if let Some(source) = column.source {
                let value = match column.kind {
                    ColumnKind::Numeric => json!(i as f64 + 0.5),
                    ColumnKind::Date => json!(20240100 + i as u64 % 28 + 1),
                    ColumnKind::Text(_) => json!(format!("t{}", i)),
                };
                raw.insert(source.to_string(), value);
            }
        }

        let spot = StockSpot::from_record(date(), &raw);
        let cells = spot.cells();
        assert_eq!(cells.len(), COLUMNS.len());

        for (i, column) in COLUMNS.iter().enumerate() {
            let expected = match (column.source, column.kind) {
                (None, _) => "2024-06-03".to_string(),
                (Some(_), ColumnKind::Numeric) => format!("{}.5", i),
                (Some(_), ColumnKind::Date) => format!("2024-01-{:02}", i % 28 + 1),
                (Some(_), ColumnKind::Text(_)) => format!("t{}", i),
            };
            assert_eq!(cells[i].as_deref(), Some(expected.as_str()), "{}", column.name);
        }
    }

    #[test]
    fn test_from_record_coerces_invalid_to_none() {
        let raw = record(json!({
            "f12": "000001",
            "f14": "平安银行",
            "f2": "-",
            "f3": 1.25,
            "f5": "abc",
            "f6": null,
            "f20": 213456789012.0,
            "f26": 19910403,
            "f221": "-",
            "f100": "-"
        }));

        let spot = StockSpot::from_record(date(), &raw);
        assert_eq!(spot.code, "000001");
        assert_eq!(spot.name, "平安银行");
        assert_eq!(spot.date, date());
        assert_eq!(spot.new_price, None);
        assert_eq!(spot.change_rate, Some(dec!(1.25)));
        assert_eq!(spot.volume, None);
        assert_eq!(spot.deal_amount, None);
        assert_eq!(spot.total_market_cap, Some(dec!(213456789012)));
        assert_eq!(spot.listing_date, NaiveDate::from_ymd_opt(1991, 4, 3));
        assert_eq!(spot.report_date, None);
        assert_eq!(spot.industry, None);
        // 沒有出現的欄位也是 None
        assert_eq!(spot.pe9, None);
    }

    #[test]
    fn test_to_csv_writes_null_as_empty() {
        let mut spot = StockSpot::new(date(), "600000".to_string());
        spot.name = "浦发银行, A".to_string();
        spot.new_price = Some(dec!(7.10));

        let line = spot.to_csv().unwrap();
        assert!(line.starts_with("2024-06-03,600000,\"浦发银行, A\",7.1,,"));
        assert!(line.ends_with(",\n"));
        assert_eq!(line.trim_end().split(',').count(), COLUMNS.len() + 1);
    }

    #[test]
    fn test_dedup_latest() {
        let mut a = StockSpot::new(date(), "000001".to_string());
        a.new_price = Some(dec!(10));
        let b = StockSpot::new(date(), "600000".to_string());
        let mut c = StockSpot::new(date(), "000001".to_string());
        c.new_price = Some(dec!(11));

        let rows = dedup_latest(&[a, b.clone(), c.clone()]);
        assert_eq!(rows, vec![b, c]);
    }

    #[tokio::test]
    #[ignore]
    async fn test_upsert_by_date_is_idempotent() {
        dotenv::dotenv().ok();
        let app = crate::config::App::load(crate::config::CONFIG_PATH).unwrap();
        database::init(&app.postgresql).unwrap();
        let table = "cn_stock_spot_test";
        let d = NaiveDate::from_ymd_opt(2000, 1, 3).unwrap();

        let mut rows = vec![
            StockSpot::new(d, "000001".to_string()),
            StockSpot::new(d, "600000".to_string()),
            StockSpot::new(d, "000001".to_string()),
        ];
        rows[0].new_price = Some(dec!(10.5));

        for _ in 0..2 {
            StockSpot::upsert_by_date(table, d, &rows).await.unwrap();
            assert_eq!(StockSpot::fetch_count_by_date(table, d).await.unwrap(), 2);
        }

        let other = NaiveDate::from_ymd_opt(2000, 1, 4).unwrap();
        assert!(StockSpot::upsert_by_date(table, other, &rows).await.is_err());

        let _ = sqlx::query(&format!(r#"DROP TABLE IF EXISTS "{}""#, table))
            .execute(database::get_connection().unwrap())
            .await;
    }
}
