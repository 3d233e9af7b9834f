/// 欄位型態
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum ColumnKind {
    Date,
    /// 字串，參數為最大長度
    Text(u16),
    Numeric,
}

impl ColumnKind {
    pub fn sql_type(&self) -> String {
        match self {
            ColumnKind::Date => "DATE".to_string(),
            ColumnKind::Text(len) => format!("VARCHAR({})", len),
            ColumnKind::Numeric => "NUMERIC".to_string(),
        }
    }
}

/// 資料表欄位的描述
#[derive(Debug, Copy, Clone)]
pub struct Column {
    /// 資料表欄位名稱
    pub name: &'static str,
    /// 中文標題，用於 CSV 表頭與欄位註解
    pub caption: &'static str,
    /// 對應遠端資料的欄位代號，None 表示由程式填入
    pub source: Option<&'static str>,
    pub kind: ColumnKind,
}

impl Column {
    pub const fn new(
        name: &'static str,
        caption: &'static str,
        source: Option<&'static str>,
        kind: ColumnKind,
    ) -> Self {
        Column {
            name,
            caption,
            source,
            kind,
        }
    }
}

/// 資料表結構的描述，第一次寫入時依此建立資料表
#[derive(Debug, Copy, Clone)]
pub struct TableSchema {
    pub columns: &'static [Column],
    pub primary_key: &'static [&'static str],
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn captions(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.caption).collect()
    }

    /// 遠端資料的欄位代號，依欄位順序
    pub fn sources(&self) -> Vec<&'static str> {
        self.columns.iter().filter_map(|c| c.source).collect()
    }

    pub fn create_table_sql(&self, table: &str) -> String {
        let mut defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let not_null = if self.primary_key.contains(&c.name) {
                    " NOT NULL"
                } else {
                    ""
                };
                format!("    \"{}\" {}{}", c.name, c.kind.sql_type(), not_null)
            })
            .collect();

        if !self.primary_key.is_empty() {
            let keys = self
                .primary_key
                .iter()
                .map(|k| format!("\"{}\"", k))
                .collect::<Vec<_>>()
                .join(", ");
            defs.push(format!("    PRIMARY KEY ({})", keys));
        }

        format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" (\n{}\n);",
            table,
            defs.join(",\n")
        )
    }

    pub fn comment_sql(&self, table: &str) -> Vec<String> {
        self.columns
            .iter()
            .map(|c| {
                format!(
                    "COMMENT ON COLUMN \"{}\".\"{}\" IS '{}';",
                    table,
                    c.name,
                    c.caption.replace('\'', "''")
                )
            })
            .collect()
    }

    pub fn copy_in_sql(&self, table: &str) -> String {
        let cols = self
            .columns
            .iter()
            .map(|c| format!("\"{}\"", c.name))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "COPY \"{}\" ({}) FROM STDIN WITH (FORMAT csv)",
            table, cols
        )
    }
}
