use std::{fs::File, io::Write, path::Path};

use anyhow::{Context, Result};

use crate::database::table::stock_spot::{StockSpot, SCHEMA};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// 將行情寫成帶 BOM 的 UTF-8 CSV，表頭為中文欄位名稱，回傳寫入的資料筆數
pub fn write_csv<P: AsRef<Path>>(path: P, rows: &[StockSpot]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }
    }

    let file = File::create(path).context(format!("Failed to create {}", path.display()))?;
    write_to(file, rows).context(format!("Failed to write csv {}", path.display()))
}

pub fn write_to<W: Write>(mut writer: W, rows: &[StockSpot]) -> Result<usize> {
    writer.write_all(UTF8_BOM)?;

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(SCHEMA.captions())?;
    for row in rows {
        wtr.write_record(row.cells().iter().map(|c| c.as_deref().unwrap_or("")))?;
    }
    wtr.flush()?;

    Ok(rows.len())
}
