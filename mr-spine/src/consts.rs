//! 通用常量.

/// 相邻椎间盘平均距离模板, 单位为毫米.
///
/// 第 `i` 项代表标号 `i + 1` 与 `i + 2` 两椎间盘之间的平均距离,
/// 即依次为 C1/C2 与 C2/C3 之间, C2/C3 与 C3/C4 之间, ...,
/// 直至腰椎区域, 共 22 项.
pub const MEAN_DISC_DISTANCE_MM: [f64; 22] = [
    18.0, 16.0, 18.0, 16.0, 15.1667, 15.3333, 15.8333, 18.1667, 18.6667, 18.6667, 19.8333,
    20.6667, 21.6667, 22.3333, 23.8333, 24.1667, 26.0, 28.6667, 30.5, 33.5, 33.0, 31.333,
];

/// 最上端椎间盘的解剖学标号 (C1/C2).
pub const DISC_LABEL_MIN: u8 = 1;

/// 距离模板所能覆盖的最大种子椎间盘标号.
pub const DISC_LABEL_MAX: u8 = 22;

/// 分割体数据中背景 / 未标注体素的值.
pub const UNLABELED: u8 = 0;

/// 体素是否是前景 (脊髓掩膜内)?
#[inline]
pub const fn is_foreground(p: u8) -> bool {
    p != UNLABELED
}

/// 体素是否是背景?
#[inline]
pub const fn is_background(p: u8) -> bool {
    !is_foreground(p)
}
