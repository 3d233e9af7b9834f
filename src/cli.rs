use anyhow::{anyhow, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};

use crate::{config, util::datetime};

#[derive(Parser, Debug)]
#[command(name = "spot_crawler")]
#[command(about = "抓取滬深 A 股實時行情並寫入 PostgreSQL")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// 設定檔路徑
    #[arg(short, long, default_value = config::CONFIG_PATH)]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// 抓取一次行情，預設以今天為日期
    Run {
        /// 指定日期，多個日期以逗號分隔(2024-06-03,2024-06-04)
        #[arg(short, long, value_delimiter = ',', conflicts_with_all = ["start", "end"])]
        date: Vec<String>,

        /// 區間起日(含)，週末略過
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// 區間迄日(含)
        #[arg(long, requires = "start")]
        end: Option<String>,
    },

    /// 常駐並依設定的 cron 定時抓取
    Schedule,
}

impl Commands {
    /// `Run` 要處理的日期
    pub fn dates(&self) -> Result<Vec<NaiveDate>> {
        match self {
            Commands::Run { date, start, end } => match (start, end) {
                (Some(start), Some(end)) => {
                    datetime::weekdays_between(datetime::parse_ymd(start)?, datetime::parse_ymd(end)?)
                }
                (None, None) if date.is_empty() => Ok(vec![Local::now().date_naive()]),
                (None, None) => date.iter().map(|d| datetime::parse_ymd(d)).collect(),
                _ => Err(anyhow!("--start and --end must be given together")),
            },
            Commands::Schedule => Ok(Vec::new()),
        }
    }
}
