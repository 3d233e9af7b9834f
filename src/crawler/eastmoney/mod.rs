use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Local;
use reqwest::Url;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{config, database::table::stock_spot, util::http};

/// 滬深京 A 股實時行情
pub mod spot;

/// 一筆遠端回傳的原始資料，key 為東方財富的欄位代號(f2、f3...)
pub type RawRecord = Map<String, Value>;

/// clist 介面的回應 `{ "data": { "total": 5000, "diff": [...] } }`
#[derive(Deserialize, Debug, Default)]
pub struct ClistResponse {
    #[serde(default)]
    pub data: Option<ClistData>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ClistData {
    #[serde(default)]
    pub total: u64,
    /// np=1 時為陣列，np=0 時為以序號為 key 的物件
    #[serde(default)]
    pub diff: Option<Value>,
}

impl ClistResponse {
    pub fn total(&self) -> u64 {
        self.data.as_ref().map(|d| d.total).unwrap_or_default()
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        let diff = match self.data.and_then(|d| d.diff) {
            Some(diff) => diff,
            None => return Vec::new(),
        };

        match diff {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                })
                .collect(),
            Value::Object(items) => {
                let mut indexed: Vec<(u64, RawRecord)> = items
                    .into_iter()
                    .filter_map(|(key, item)| match (key.parse::<u64>(), item) {
                        (Ok(index), Value::Object(record)) => Some((index, record)),
                        _ => None,
                    })
                    .collect();
                indexed.sort_by_key(|(index, _)| *index);
                indexed.into_iter().map(|(_, record)| record).collect()
            }
            _ => Vec::new(),
        }
    }
}

/// 提供分頁資料的來源
#[async_trait]
pub trait PageSource: Send + Sync {
    /// 取得第 `page_number` 頁(從 1 開始)，每頁 `page_size` 筆
    async fn page(&self, page_number: u32, page_size: u32) -> Result<ClistResponse>;
}

/// 東方財富 clist 介面
pub struct EastMoneyClient {
    settings: config::EastMoney,
    fields: String,
}

impl EastMoneyClient {
    pub fn new(settings: config::EastMoney) -> Self {
        EastMoneyClient {
            settings,
            fields: stock_spot::SCHEMA.sources().join(","),
        }
    }

    pub fn page_url(&self, page_number: u32, page_size: u32) -> Result<String> {
        let params = [
            ("pn", page_number.to_string()),
            ("pz", page_size.to_string()),
            ("po", "1".to_string()),
            ("np", "1".to_string()),
            ("ut", self.settings.ut.clone()),
            ("fltt", "2".to_string()),
            ("invt", "2".to_string()),
            ("fid", "f12".to_string()),
            ("fs", self.settings.fs.clone()),
            ("fields", self.fields.clone()),
            ("_", Local::now().timestamp_millis().to_string()),
        ];

        Url::parse_with_params(&self.settings.url, &params)
            .map(|url| url.to_string())
            .map_err(|why| anyhow!("Failed to build url from {} because {:?}", self.settings.url, why))
    }
}

#[async_trait]
impl PageSource for EastMoneyClient {
    async fn page(&self, page_number: u32, page_size: u32) -> Result<ClistResponse> {
        let url = self.page_url(page_number, page_size)?;
        http::get_json::<ClistResponse>(&url, None).await
    }
}
