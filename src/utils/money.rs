// 金额换算工具
// 网关侧金额一律以最小货币单位(分)的整数表示

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};

/// 将以元为单位的金额换算为以分为单位的整数
///
/// 先按四舍五入(half-up)保留两位小数，再乘以100取整。
/// 全程使用十进制运算，避免二进制浮点在货币边界上的一分钱误差。
pub fn to_minor_units(amount: Decimal) -> i64 {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    (rounded * Decimal::ONE_HUNDRED)
        .trunc()
        .to_i64()
        .unwrap_or(0)
}
