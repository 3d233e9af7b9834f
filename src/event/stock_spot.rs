use std::future::Future;

use anyhow::Result;
use chrono::{Local, NaiveDate};
use tokio::sync::watch;

use crate::{backfill, config, logging, util::datetime::Weekend};

/// 依序為每個日期執行 `job`，某一天失敗時記錄後繼續下一天，回傳成功的天數
///
/// `cancel` 為 true 時不再處理剩下的日期。
pub async fn run_with_dates<F, Fut>(
    dates: &[NaiveDate],
    cancel: &watch::Receiver<bool>,
    mut job: F,
) -> usize
where
    F: FnMut(NaiveDate) -> Fut,
    Fut: Future<Output = Result<usize>>,
{
    let mut succeeded = 0;

    for (i, &date) in dates.iter().enumerate() {
        if *cancel.borrow() {
            logging::warn_file_async(format!(
                "已取消，略過剩下的 {} 個日期(從 {} 開始)",
                dates.len() - i,
                date
            ));
            break;
        }

        match job(date).await {
            Ok(count) => {
                succeeded += 1;
                logging::info_file_async(format!("{} 行情寫入完成 {} 筆", date, count));
            }
            Err(why) => {
                logging::error_file_async(format!(
                    "Failed to stock_spot::execute({}) because {:?}",
                    date, why
                ));
            }
        }
    }

    succeeded
}

/// 抓取行情並以指定的日期寫入
pub async fn execute(app: &config::App, dates: &[NaiveDate], cancel: watch::Receiver<bool>) -> usize {
    run_with_dates(dates, &cancel, |date| {
        backfill::stock_spot::execute(app, date, cancel.clone())
    })
    .await
}

/// 排程觸發時執行，週末不處理
pub async fn execute_today(app: &config::App, cancel: watch::Receiver<bool>) -> Result<()> {
    let now = Local::now();
    if now.is_weekend() {
        logging::info_file_async(format!("{} 為週末，略過行情抓取", now.date_naive()));
        return Ok(());
    }

    execute(app, &[now.date_naive()], cancel).await;

    Ok(())
}
