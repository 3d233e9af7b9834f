/// 滬深 A 股實時行情
pub mod stock_spot;
