//! 运行时错误.

/// 椎间盘检测的启动错误.
///
/// 只有种子不合法时检测才会失败; 搜索开始之后的缺峰, 低置信度,
/// 越界等情况都是算法的正常分支, 不会产生错误.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectError {
    /// 种子椎间盘标号不在 `[1, 22]` 范围内.
    SeedLabelOutOfRange(u8),

    /// 种子 z 索引超出体数据范围.
    ///
    /// 第一个参数为种子 z, 第二个参数为轴向切片总数.
    SeedZOutOfVolume(i64, usize),

    /// 标注体数据不含任何前景体素, 无法从中恢复种子.
    EmptySeedLabel,
}

/// 椎间盘检测结果.
pub type DetectResult<T> = Result<T, DetectError>;
