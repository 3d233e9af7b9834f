/// 東方財富
pub mod eastmoney;
