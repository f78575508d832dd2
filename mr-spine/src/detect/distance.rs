//! 自适应椎间距离模型.

use crate::consts::{DISC_LABEL_MIN, MEAN_DISC_DISTANCE_MM};

use super::Direction;

/// 椎间距离模板的项数.
const TABLE_LEN: usize = MEAN_DISC_DISTANCE_MM.len();

/// 自适应椎间距离模型.
///
/// 以 22 项平均椎间距离模板为先验; 每接受一个新椎间盘, 记录其与
/// 遍历中前一个椎间盘的实测 z 距离, 并重算一个全局标量修正系数
/// (实测 / 先验在全部已观测项上的均值), 使搜索窗口逐步贴合
/// 当前受试者的解剖尺度.
#[derive(Debug, Clone)]
pub struct DiscDistanceModel {
    /// 先验距离, 单位为体素. 只读.
    prior: [f64; TABLE_LEN],

    /// 实测距离, 单位为体素. 0 表示尚未观测.
    observed: [f64; TABLE_LEN],

    /// 全局修正系数. 无任何观测时为 1.
    factor: f64,
}

impl DiscDistanceModel {
    /// 以 z 方向体素分辨率 (毫米) 构建模型, 先验模板换算为体素.
    ///
    /// `z_mm` 必须为正, 否则程序 panic.
    pub fn new(z_mm: f64) -> Self {
        assert!(z_mm > 0.0, "z 方向分辨率必须为正");
        let mut prior = MEAN_DISC_DISTANCE_MM;
        prior.iter_mut().for_each(|d| *d /= z_mm);
        Self {
            prior,
            observed: [0.0; TABLE_LEN],
            factor: 1.0,
        }
    }

    /// 标号 `gap_low` 与 `gap_low + 1` 两相邻椎间盘之间的间隙
    /// 对应的模板下标. 超出模板的标号饱和到最后一项.
    #[inline]
    fn gap_index(gap_low: u8) -> usize {
        debug_assert!(gap_low >= DISC_LABEL_MIN);
        (gap_low as usize).saturating_sub(1).min(TABLE_LEN - 1)
    }

    /// 记录一次新观测: 标号 `a` 与 `b` 两相邻椎间盘之间的实测
    /// z 距离 (体素), 随后重算修正系数.
    pub fn record(&mut self, a: u8, b: u8, distance: f64) {
        debug_assert!(distance >= 0.0);
        self.observed[Self::gap_index(a.min(b))] = distance;
        self.refresh_factor();
        log::debug!("距离修正系数: {:.4}", self.factor);
    }

    /// 修正系数 = 已观测项上 (实测 / 先验) 的均值.
    fn refresh_factor(&mut self) {
        let mut sum = 0.0;
        let mut cnt = 0u32;
        for (obs, pri) in self.observed.iter().zip(self.prior.iter()) {
            if *obs > 0.0 {
                sum += obs / pri;
                cnt += 1;
            }
        }
        self.factor = if cnt == 0 { 1.0 } else { sum / f64::from(cnt) };
    }

    /// 当前全局修正系数.
    #[inline]
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// 修正后的第 `index` 项模板距离 (体素).
    #[inline]
    fn adjusted(&self, index: usize) -> f64 {
        self.prior[index] * self.factor
    }

    /// 自标号 `label` 的椎间盘沿 `direction` 方向到下一个椎间盘的
    /// 期望距离 (体素, 四舍五入, 至少为 1).
    ///
    /// 标号 1 已是最上端, 向上无法继续前进, 此时返回 `None`.
    pub fn expected_step(&self, label: u8, direction: Direction) -> Option<usize> {
        let index = match direction {
            Direction::Superior => {
                if label <= DISC_LABEL_MIN {
                    log::debug!("已到达最上端椎间盘 1, 无法继续向上");
                    return None;
                }
                Self::gap_index(label - 1)
            }
            Direction::Inferior => Self::gap_index(label),
        };
        Some((self.adjusted(index).round() as usize).max(1))
    }
}
