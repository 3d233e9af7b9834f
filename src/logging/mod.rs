use std::{
    fmt::Write as _,
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    thread,
};

use chrono::{format::DelayedFormat, DateTime, Local, NaiveDate};
use crossbeam_channel::{unbounded, Sender};
use once_cell::sync::{Lazy, OnceCell};

const DEFAULT_LOG_DIR: &str = "log";

/// 日誌目錄，由 `init` 明確設定，未設定時使用 `log`
static LOG_DIR: OnceCell<PathBuf> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("default"));

/// 設定日誌目錄，必須在第一次寫日誌之前呼叫，重複呼叫時保留第一次的設定
pub fn init<P: AsRef<Path>>(dir: P) -> bool {
    let dir = dir.as_ref();
    let dir = if dir.as_os_str().is_empty() {
        PathBuf::from(DEFAULT_LOG_DIR)
    } else {
        dir.to_path_buf()
    };

    LOG_DIR.set(dir).is_ok()
}

fn log_dir() -> &'static Path {
    LOG_DIR
        .get_or_init(|| PathBuf::from(DEFAULT_LOG_DIR))
        .as_path()
}

pub struct Logger {
    writer: Sender<LogMessage>,
}

impl Logger {
    pub fn new(log_name: &str) -> Self {
        let (tx, rx) = unbounded::<LogMessage>();
        let mut file = DailyFile::new(log_name);

        // 寫入檔案的操作使用另一個線程處理
        thread::spawn(move || {
            let mut line = String::with_capacity(4096);

            while let Ok(received) = rx.recv() {
                line.clear();
                if writeln!(
                    &mut line,
                    "{} {} {}",
                    received.created_at.format("%F %X%.6f"),
                    received.level,
                    received.msg
                )
                .is_err()
                {
                    continue;
                }

                let writer = match file.get_writer(received.created_at.date_naive()) {
                    Some(writer) => writer,
                    None => {
                        console(received.level, received.msg);
                        continue;
                    }
                };

                if writer.write_all(line.as_bytes()).is_err() {
                    info_console(line.clone());
                    continue;
                }

                if rx.is_empty() && writer.flush().is_err() {
                    info_console(line.clone());
                }
            }

            file.flush();
        });

        Logger { writer: tx }
    }

    pub fn info(&self, log: String) {
        self.send(log::Level::Info, log);
    }

    pub fn warn(&self, log: String) {
        self.send(log::Level::Warn, log);
    }

    pub fn error(&self, log: String) {
        self.send(log::Level::Error, log);
    }

    pub fn debug(&self, log: String) {
        self.send(log::Level::Debug, log);
    }

    fn send(&self, level: log::Level, msg: String) {
        if let Err(why) = self.writer.send(LogMessage::new(level, msg)) {
            error_console(why.to_string());
        }
    }

    fn get_log_path(name: &str, date: NaiveDate) -> Option<PathBuf> {
        let path = log_dir();

        if !path.exists() {
            fs::create_dir_all(path).ok()?;
        }

        let mut log_path = PathBuf::from(path);
        log_path.push(format!("{}_{}.log", name, date.format("%Y-%m-%d")));

        Some(log_path)
    }
}

/// 依日期切換的日誌檔，日期改變時關閉舊檔並開啟 `{name}_{date}.log`
struct DailyFile {
    name: String,
    date: Option<NaiveDate>,
    writer: Option<BufWriter<File>>,
}

impl DailyFile {
    fn new(name: &str) -> Self {
        DailyFile {
            name: name.to_string(),
            date: None,
            writer: None,
        }
    }

    fn get_writer(&mut self, date: NaiveDate) -> Option<&mut BufWriter<File>> {
        if self.date != Some(date) || self.writer.is_none() {
            self.flush();
            self.writer = None;
            self.date = Some(date);

            let log_path = match Logger::get_log_path(&self.name, date) {
                Some(log_path) => log_path,
                None => {
                    error_console(format!(
                        "Failed to create log directory {}",
                        log_dir().display()
                    ));
                    return None;
                }
            };

            match OpenOptions::new().create(true).append(true).open(&log_path) {
                Ok(file) => self.writer = Some(BufWriter::new(file)),
                Err(why) => {
                    error_console(format!(
                        "Failed to open log file({}) because {:?}",
                        log_path.display(),
                        why
                    ));
                    return None;
                }
            }
        }

        self.writer.as_mut()
    }

    fn flush(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

pub struct LogMessage {
    pub level: log::Level,
    pub msg: String,
    pub created_at: DateTime<Local>,
}

impl LogMessage {
    pub fn new(level: log::Level, msg: String) -> Self {
        LogMessage {
            level,
            msg,
            created_at: Local::now(),
        }
    }
}

pub fn info_file_async(log: String) {
    LOGGER.info(log);
}

pub fn warn_file_async(log: String) {
    LOGGER.warn(log);
}

pub fn error_file_async(log: String) {
    LOGGER.error(log);
}

pub fn debug_file_async(log: String) {
    LOGGER.debug(log);
}

fn console(level: log::Level, log: String) {
    match level {
        log::Level::Error => error_console(log),
        _ => info_console(log),
    }
}

pub fn info_console(log: String) {
    println!(
        "{} Info {}",
        Local::now().format("%Y-%m-%d %H:%M:%S.%3f"),
        log
    );
}

pub fn error_console(log: String) {
    println!(
        "{} Error {}",
        DelayedFormat::to_string(&Local::now().format("%Y-%m-%d %H:%M:%S.%3f")),
        log
    );
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_log_message_keeps_level() {
        let msg = LogMessage::new(log::Level::Warn, "page count changed".to_string());
        assert_eq!(msg.level, log::Level::Warn);
        assert_eq!(msg.msg, "page count changed");
    }

    #[tokio::test]
    async fn test_logger_writes_file() {
        let logger = Logger::new("logging_test");
        logger.info("開始寫入".to_string());
        logger.debug("結束寫入".to_string());
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let path = Logger::get_log_path("logging_test", Local::now().date_naive()).unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("INFO 開始寫入"));
        assert!(content.contains("DEBUG 結束寫入"));
    }

    #[tokio::test]
    async fn test_logger_switches_file_when_date_changes() {
        let name = "logging_rollover_test";
        let before = Local.with_ymd_and_hms(2001, 6, 3, 23, 59, 59).single().unwrap();
        let after = Local.with_ymd_and_hms(2001, 6, 4, 0, 0, 1).single().unwrap();
        for date in [before.date_naive(), after.date_naive()] {
            let _ = fs::remove_file(Logger::get_log_path(name, date).unwrap());
        }

        let logger = Logger::new(name);
        for (created_at, msg) in [(before, "收盤前"), (after, "隔日開始")] {
            logger
                .writer
                .send(LogMessage {
                    level: log::Level::Info,
                    msg: msg.to_string(),
                    created_at,
                })
                .unwrap();
        }
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        let first = fs::read_to_string(Logger::get_log_path(name, before.date_naive()).unwrap()).unwrap();
        let second = fs::read_to_string(Logger::get_log_path(name, after.date_naive()).unwrap()).unwrap();
        assert!(first.contains("INFO 收盤前"));
        assert!(!first.contains("隔日開始"));
        assert!(second.contains("INFO 隔日開始"));
        assert!(!second.contains("收盤前"));
    }
}
