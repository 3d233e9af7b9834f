use std::{future::Future, sync::Arc};

use anyhow::{Error, Result};
use tokio::sync::watch;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::{config, event, logging};

/// 啟動排程
pub async fn start(
    sched: &JobScheduler,
    app: Arc<config::App>,
    cancel: watch::Receiver<bool>,
) -> Result<()> {
    //                 sec  min   hour   day of month   month   day of week
    // UTC 時間，預設 "0 30 7 * * Mon-Fri" 為收盤後的 15:30
    let cron_expr = app.schedule.cron.clone();
    let job = create_job(&cron_expr, move || {
        let app = Arc::clone(&app);
        let cancel = cancel.clone();
        async move { event::stock_spot::execute_today(&app, cancel).await }
    })?;

    sched.add(job).await?;
    sched.start().await?;

    logging::info_file_async(format!("行情排程已啟動 cron:{}", cron_expr));

    Ok(())
}

fn create_job<F, Fut>(cron_expr: &str, task: F) -> Result<Job>
where
    F: Fn() -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = Result<(), Error>> + Send,
{
    let expr = cron_expr.to_string();

    Ok(Job::new_async(cron_expr, move |_uuid, _l| {
        let task = task.clone();
        let expr = expr.clone();
        Box::pin(async move {
            if let Err(why) = task().await {
                logging::error_file_async(format!(
                    "Failed to execute task({}) because {:?}",
                    expr, why
                ));
            }
        })
    })?)
}
