/// 滬深 A 股板塊
#[derive(PartialEq, Debug, Copy, Clone)]
pub enum Board {
    /// 上證主板 600、601、603、605
    ShanghaiMain,
    /// 深證主板 000、001、002、003
    ShenzhenMain,
    /// 創業板 300、301
    ChiNext,
}

impl Board {
    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Board::ShanghaiMain => &["600", "601", "603", "605"],
            Board::ShenzhenMain => &["000", "001", "002", "003"],
            Board::ChiNext => &["300", "301"],
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Board::ShanghaiMain => "上證主板",
            Board::ShenzhenMain => "深證主板",
            Board::ChiNext => "創業板",
        }
    }

    /// 依股票代號的前綴判斷所屬板塊
    pub fn from_code(code: &str) -> Option<Board> {
        Self::iterator().find(|board| board.prefixes().iter().any(|p| code.starts_with(p)))
    }

    pub fn iterator() -> impl Iterator<Item = Self> {
        [Self::ShanghaiMain, Self::ShenzhenMain, Self::ChiNext]
            .iter()
            .copied()
    }
}

/// 是否為上證或深證的 A 股
pub fn is_a_stock(code: &str) -> bool {
    Board::from_code(code).is_some()
}
