use std::{env, path::Path, str::FromStr};

use anyhow::{anyhow, Result};
use config::{Config as config_config, File as config_file};
use serde::{Deserialize, Serialize};

pub const CONFIG_PATH: &str = "app.json";

#[derive(Serialize, Deserialize, Default, Debug, Clone)]
pub struct App {
    #[serde(default)]
    pub postgresql: PostgreSQL,
    #[serde(default)]
    pub eastmoney: EastMoney,
    #[serde(default)]
    pub stock_spot: StockSpot,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub schedule: Schedule,
}

const POSTGRESQL_HOST: &str = "POSTGRESQL_HOST";
const POSTGRESQL_PORT: &str = "POSTGRESQL_PORT";
const POSTGRESQL_USER: &str = "POSTGRESQL_USER";
const POSTGRESQL_PASSWORD: &str = "POSTGRESQL_PASSWORD";
const POSTGRESQL_DB: &str = "POSTGRESQL_DB";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PostgreSQL {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_postgresql_port")]
    pub port: i32,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: String,
}

impl Default for PostgreSQL {
    fn default() -> Self {
        PostgreSQL {
            host: "localhost".to_string(),
            port: default_postgresql_port(),
            user: Default::default(),
            password: Default::default(),
            db: Default::default(),
        }
    }
}

impl PostgreSQL {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?application_name=spot_crawler_rust",
            self.user, self.password, self.host, self.port, self.db
        )
    }
}

fn default_postgresql_port() -> i32 {
    5432
}

const EASTMONEY_URL: &str = "EASTMONEY_URL";
const EASTMONEY_PAGE_SIZE: &str = "EASTMONEY_PAGE_SIZE";
const EASTMONEY_CONCURRENCY: &str = "EASTMONEY_CONCURRENCY";

/// 東方財富 滬深京 A 股實時行情的查詢參數
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EastMoney {
    #[serde(default = "default_eastmoney_url")]
    pub url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_ut")]
    pub ut: String,
    /// 市場板塊過濾條件
    #[serde(default = "default_fs")]
    pub fs: String,
    /// 0 或 1 時逐頁抓取，大於 1 時以此為同時請求的上限
    #[serde(default)]
    pub concurrency: usize,
    /// 並發抓取時的頁數上限
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
}

impl Default for EastMoney {
    fn default() -> Self {
        EastMoney {
            url: default_eastmoney_url(),
            page_size: default_page_size(),
            ut: default_ut(),
            fs: default_fs(),
            concurrency: 0,
            max_pages: default_max_pages(),
        }
    }
}

fn default_eastmoney_url() -> String {
    "http://82.push2.eastmoney.com/api/qt/clist/get".to_string()
}

fn default_page_size() -> u32 {
    50
}

fn default_ut() -> String {
    "bd1d9ddb04089700cf9c27f6f7426281".to_string()
}

fn default_fs() -> String {
    "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048".to_string()
}

fn default_max_pages() -> u32 {
    200
}

const STOCK_SPOT_TABLE: &str = "STOCK_SPOT_TABLE";
const STOCK_SPOT_CSV_PATH: &str = "STOCK_SPOT_CSV_PATH";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StockSpot {
    #[serde(default = "default_table")]
    pub table: String,
    /// 空字串表示不輸出 CSV
    #[serde(default = "default_csv_path")]
    pub csv_path: String,
}

impl Default for StockSpot {
    fn default() -> Self {
        StockSpot {
            table: default_table(),
            csv_path: default_csv_path(),
        }
    }
}

fn default_table() -> String {
    "cn_stock_spot".to_string()
}

fn default_csv_path() -> String {
    "stock_data.csv".to_string()
}

const LOG_DIR: &str = "LOG_DIR";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Log {
    #[serde(default = "default_log_dir")]
    pub dir: String,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            dir: default_log_dir(),
        }
    }
}

fn default_log_dir() -> String {
    "log".to_string()
}

const SCHEDULE_CRON: &str = "SCHEDULE_CRON";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Schedule {
    /// sec min hour day-of-month month day-of-week，UTC 時間
    #[serde(default = "default_cron")]
    pub cron: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            cron: default_cron(),
        }
    }
}

fn default_cron() -> String {
    // 北京時間 15:30 收盤後
    "0 30 7 * * Mon-Fri".to_string()
}

impl App {
    /// 讀取設定檔後以環境變數覆蓋，設定檔不存在時只使用預設值與環境變數
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let config: App = config_config::builder()
                .add_source(config_file::from(path))
                .build()?
                .try_deserialize()?;
            return config.override_with_env().validate();
        }

        App::default().override_with_env().validate()
    }

    fn validate(self) -> Result<Self> {
        if self.eastmoney.page_size == 0 {
            return Err(anyhow!("eastmoney.page_size must be greater than 0"));
        }

        if self.stock_spot.table.is_empty()
            || !self
                .stock_spot
                .table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(anyhow!(
                "stock_spot.table '{}' is not a valid table name",
                self.stock_spot.table
            ));
        }

        Ok(self)
    }

    /// 將來至於 env 的設定值覆蓋掉 json 上的設定值
    fn override_with_env(mut self) -> Self {
        if let Ok(host) = env::var(POSTGRESQL_HOST) {
            self.postgresql.host = host;
        }

        if let Ok(port) = env::var(POSTGRESQL_PORT) {
            self.postgresql.port = i32::from_str(&port).unwrap_or(5432);
        }

        if let Ok(user) = env::var(POSTGRESQL_USER) {
            self.postgresql.user = user;
        }

        if let Ok(password) = env::var(POSTGRESQL_PASSWORD) {
            self.postgresql.password = password;
        }

        if let Ok(db) = env::var(POSTGRESQL_DB) {
            self.postgresql.db = db;
        }

        if let Ok(url) = env::var(EASTMONEY_URL) {
            self.eastmoney.url = url;
        }

        if let Ok(page_size) = env::var(EASTMONEY_PAGE_SIZE) {
            self.eastmoney.page_size =
                u32::from_str(&page_size).unwrap_or_else(|_| default_page_size());
        }

        if let Ok(concurrency) = env::var(EASTMONEY_CONCURRENCY) {
            self.eastmoney.concurrency = usize::from_str(&concurrency).unwrap_or(0);
        }

        if let Ok(table) = env::var(STOCK_SPOT_TABLE) {
            self.stock_spot.table = table;
        }

        if let Ok(csv_path) = env::var(STOCK_SPOT_CSV_PATH) {
            self.stock_spot.csv_path = csv_path;
        }

        if let Ok(dir) = env::var(LOG_DIR) {
            self.log.dir = dir;
        }

        if let Ok(cron) = env::var(SCHEDULE_CRON) {
            self.schedule.cron = cron;
        }

        self
    }
}
