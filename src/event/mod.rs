/// 滬深 A 股實時行情的排程與補抓
pub mod stock_spot;
