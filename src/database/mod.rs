use std::{sync::OnceLock, time::Duration};

use anyhow::{anyhow, Result};
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres, Transaction};

use crate::config;

pub mod schema;
pub mod table;

static POSTGRES: OnceLock<PostgresSQL> = OnceLock::new();

/// PostgreSQL 連線池封裝。
///
/// 由 `init` 依設定建立，供 `database::table::*` 共享使用。
pub struct PostgresSQL {
    /// SQLx PostgreSQL 連線池實例。
    pub pool: PgPool,
}

/// 提供 `COPY ... FROM STDIN` 所需的 CSV 序列化能力。
pub(crate) trait CopyIn: Send {
    /// 將資料列轉成 PostgreSQL `COPY` 可接受的單行 CSV。
    fn to_csv(&self) -> Result<String>;
}

/// 在指定的 transaction 內以 PostgreSQL `COPY FROM STDIN` 批次寫入資料。
///
/// # Errors
/// 當序列化、建立 copy writer、傳送資料或結束 copy 流程失敗時回傳錯誤。
pub(crate) async fn copy_in_raw(
    tx: &mut Transaction<'_, Postgres>,
    copy_in_query: &str,
    items: &[impl CopyIn],
) -> Result<u64> {
    let mut data = String::with_capacity(items.len() * 256);
    for item in items {
        data.push_str(&item.to_csv()?);
    }

    let mut writer = tx.copy_in_raw(copy_in_query).await?;
    writer.send(data.as_bytes()).await?;

    Ok(writer.finish().await?)
}

impl PostgresSQL {
    /// 建立 PostgreSQL 連線池，連線在第一次使用時才建立。
    ///
    /// # Errors
    /// 當連線字串無法解析時回傳錯誤。
    pub fn new(settings: &config::PostgreSQL) -> Result<PostgresSQL> {
        let db = PgPoolOptions::new()
            .max_lifetime(Some(Duration::from_secs(1800))) // 30 分鐘
            .max_connections(5)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Some(Duration::from_secs(600))) // 10 分鐘
            .connect_lazy(&settings.url())
            .map_err(|why| {
                anyhow!(
                    "wrong database URL for {}:{}/{} because {:?}",
                    settings.host,
                    settings.port,
                    settings.db,
                    why
                )
            })?;

        Ok(Self { pool: db })
    }

    /// 取得連線池參考。
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 從目前連線池建立一筆 transaction。
    pub async fn tx(&self) -> Result<Transaction<'_, Postgres>> {
        Ok(self.pool().begin().await?)
    }
}

/// 依設定建立全域連線池，重複呼叫時保留第一次建立的連線池。
pub fn init(settings: &config::PostgreSQL) -> Result<()> {
    if POSTGRES.get().is_some() {
        return Ok(());
    }

    let _ = POSTGRES.set(PostgresSQL::new(settings)?);
    Ok(())
}

fn get_postgresql() -> Result<&'static PostgresSQL> {
    POSTGRES
        .get()
        .ok_or_else(|| anyhow!("database::init must be called before using the database"))
}

/// 取得全域 PostgreSQL 連線池。
pub fn get_connection() -> Result<&'static PgPool> {
    Ok(get_postgresql()?.pool())
}

/// 從全域 PostgreSQL 連線池建立 transaction。
///
/// # Errors
/// 當尚未初始化或無法成功建立 transaction 時回傳錯誤。
pub async fn get_tx() -> Result<Transaction<'static, Postgres>> {
    get_postgresql()?.tx().await
}
