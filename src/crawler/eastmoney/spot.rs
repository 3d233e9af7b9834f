use anyhow::{anyhow, Result};
use futures::{stream, StreamExt, TryStreamExt};
use tokio::sync::watch;

use crate::{
    config,
    crawler::eastmoney::{ClistResponse, EastMoneyClient, PageSource, RawRecord},
    logging,
};

/// 依總筆數與每頁筆數計算總頁數(無條件進位)
pub fn page_count(total: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }

    let pages = total.div_ceil(page_size as u64);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// 逐頁抓取所有資料，頁序即資料順序
///
/// 第一頁沒有資料時回傳空集合；任何一頁失敗或 `cancel` 變為 true 時整批失敗。
pub async fn fetch_all<S>(
    source: &S,
    page_size: u32,
    mut cancel: watch::Receiver<bool>,
) -> Result<Vec<RawRecord>>
where
    S: PageSource + ?Sized,
{
    let first = page_or_cancel(source, 1, page_size, &mut cancel).await?;
    let total = first.total();
    let mut records = first.into_records();
    if records.is_empty() {
        return Ok(records);
    }

    let pages = page_count(total, page_size);
    for page_number in 2..=pages {
        let page = page_or_cancel(source, page_number, page_size, &mut cancel).await?;
        records.extend(page.into_records());
    }

    logging::info_file_async(format!(
        "eastmoney total:{} pages:{} records:{}",
        total,
        pages,
        records.len()
    ));

    Ok(records)
}

async fn page_or_cancel<S>(
    source: &S,
    page_number: u32,
    page_size: u32,
    cancel: &mut watch::Receiver<bool>,
) -> Result<ClistResponse>
where
    S: PageSource + ?Sized,
{
    // 已取消時不再送出請求
    tokio::select! {
        biased;
        _ = cancelled(cancel) => Err(anyhow!("fetch cancelled at page {}", page_number)),
        res = source.page(page_number, page_size) => res,
    }
}

/// 以固定並行數抓取所有資料，結果依頁序排列
///
/// 頁數上限在送出請求前就由第一頁的 total 與 `max_pages` 決定，不會因後續頁面的回應改變。
/// `cancel` 變為 true 時停止並回傳錯誤。
pub async fn fetch_all_concurrent<S>(
    source: &S,
    page_size: u32,
    max_pages: u32,
    concurrency: usize,
    mut cancel: watch::Receiver<bool>,
) -> Result<Vec<RawRecord>>
where
    S: PageSource + ?Sized,
{
    let first = page_or_cancel(source, 1, page_size, &mut cancel).await?;

    let total = first.total();
    let mut records = first.into_records();
    if records.is_empty() {
        return Ok(records);
    }

    let wanted = page_count(total, page_size);
    let pages = wanted.min(max_pages.max(1));
    if pages < wanted {
        logging::warn_file_async(format!(
            "eastmoney total:{} needs {} pages, only {} will be fetched",
            total, wanted, pages
        ));
    }

    let rest = stream::iter(2..=pages)
        .map(|page_number| async move {
            source
                .page(page_number, page_size)
                .await
                .map_err(|why| anyhow!("Failed to fetch page {} because {:?}", page_number, why))
        })
        .buffered(concurrency.max(1))
        .try_collect::<Vec<_>>();

    let rest = tokio::select! {
        res = rest => res?,
        _ = cancelled(&mut cancel) => return Err(anyhow!("fetch cancelled after page 1")),
    };

    for page in rest {
        records.extend(page.into_records());
    }

    logging::info_file_async(format!(
        "eastmoney total:{} pages:{} concurrency:{} records:{}",
        total,
        pages,
        concurrency.max(1),
        records.len()
    ));

    Ok(records)
}

/// 等到取消訊號為 true；發送端已關閉時永遠不會完成
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }

        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// 依設定向東方財富抓取當下全部的行情
///
/// concurrency 大於 1 時並行抓取，否則逐頁抓取。
pub async fn visit(settings: &config::EastMoney, cancel: watch::Receiver<bool>) -> Result<Vec<RawRecord>> {
    let client = EastMoneyClient::new(settings.clone());

    if settings.concurrency > 1 {
        fetch_all_concurrent(
            &client,
            settings.page_size,
            settings.max_pages,
            settings.concurrency,
            cancel,
        )
        .await
    } else {
        fetch_all(&client, settings.page_size, cancel).await
    }
}
