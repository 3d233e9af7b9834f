use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;
use tokio_cron_scheduler::JobScheduler;

pub mod backfill;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod database;
pub mod declare;
pub mod event;
pub mod export;
pub mod logging;
pub mod scheduler;
pub mod util;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    // reqwest 使用 rustls-no-provider，需要在第一次發出請求前安裝 crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let args = cli::Cli::parse();
    let app = Arc::new(config::App::load(&args.config)?);

    if !logging::init(&app.log.dir) {
        logging::warn_file_async(format!("log dir already set, {} is ignored", app.log.dir));
    }

    database::init(&app.postgresql)?;

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            logging::info_console("收到中斷訊號，停止抓取".to_string());
            let _ = cancel_tx.send(true);
        }
    });

    match &args.command {
        cli::Commands::Run { .. } => {
            let dates = args.command.dates()?;
            let succeeded = event::stock_spot::execute(&app, &dates, cancel_rx).await;
            logging::info_console(format!("完成 {}/{} 個日期", succeeded, dates.len()));
        }
        cli::Commands::Schedule => {
            let mut sched = JobScheduler::new().await?;
            scheduler::start(&sched, Arc::clone(&app), cancel_rx.clone()).await?;
            logging::info_console(format!("排程已啟動 cron:{}", app.schedule.cron));

            let mut cancel_rx = cancel_rx;
            while !*cancel_rx.borrow_and_update() {
                if cancel_rx.changed().await.is_err() {
                    break;
                }
            }

            sched.shutdown().await?;
        }
    }

    // 等背景寫檔的執行緒把剩下的日誌寫完
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    Ok(())
}
