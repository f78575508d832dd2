//! 相关性搜索引擎.
//!
//! 在给定方向上逐偏移地将候选窗口与参考模式做 Pearson 相关,
//! 得到一维相关性剖面, 再从剖面中选出最可信的峰值.

use std::ops::AddAssign;

use ndarray::{Array3, ArrayView3};
use num::Float;
use ordered_float::OrderedFloat;

use super::pattern::PatternWindow;
use super::Direction;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IntoParallelIterator, ParallelIterator};
    }
}

/// 峰值选择结果.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PeakChoice {
    /// 选中的偏移量 (体素).
    pub offset: usize,

    /// 峰值处的相关系数. 低置信度回退时为 `None`.
    pub corr: Option<f64>,
}

impl PeakChoice {
    /// 本次结果是否为低置信度回退 (未找到合格峰值)?
    #[inline]
    pub fn is_fallback(&self) -> bool {
        self.corr.is_none()
    }
}

/// Pearson 相关系数.
///
/// 任一向量为空或方差为零 (含全零) 时返回 0, 不会产生 NaN.
pub(crate) fn pearson<T: Float + AddAssign>(x: &[T], y: &[T]) -> T {
    debug_assert_eq!(x.len(), y.len());

    let mut n = T::zero();
    let (mut sx, mut sy) = (T::zero(), T::zero());
    for (&a, &b) in x.iter().zip(y) {
        sx += a;
        sy += b;
        n += T::one();
    }
    if n == T::zero() {
        return T::zero();
    }
    let (mx, my) = (sx / n, sy / n);

    let (mut cov, mut vx, mut vy) = (T::zero(), T::zero(), T::zero());
    for (&a, &b) in x.iter().zip(y) {
        let (da, db) = (a - mx, b - my);
        cov += da * db;
        vx += da * da;
        vy += db * db;
    }
    let denom = (vx * vy).sqrt();
    if denom > T::zero() {
        cov / denom
    } else {
        T::zero()
    }
}

/// 计算相关性剖面: 对 `[0, len)` 内每个偏移 `iz`, 提取以
/// `current_z + step * iz` 为中心的候选窗口并与参考模式做相关.
///
/// 候选窗口全零时该偏移的相关系数记为 0. 打开 `rayon` feature 时
/// 各偏移并行计算, 剖面在全部偏移完成后才交给峰值选择.
pub(crate) fn correlation_profile(
    data: ArrayView3<'_, f32>,
    window: &PatternWindow,
    pattern: &Array3<f64>,
    current_z: i64,
    direction: Direction,
    len: usize,
) -> Vec<f64> {
    // 由 `Array3::zeros` 构造的数组总是标准布局, 可直接 unwrap.
    let reference = pattern.as_slice().unwrap();
    let step = direction.step();

    let compute = |iz: usize| -> f64 {
        let candidate = window.extract(data, current_z + step * iz as i64);
        let chunk = candidate.as_slice().unwrap();
        if chunk.iter().all(|&v| v == 0.0) {
            log::warn!("偏移 {iz}: 候选窗口全零, 相关系数记 0");
            return 0.0;
        }
        pearson(chunk, reference)
    };

    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            (0..len).into_par_iter().map(compute).collect()
        } else {
            (0..len).map(compute).collect()
        }
    }
}

/// 以 ±`order` 邻域严格比较寻找剖面的局部极大值.
///
/// 邻域在剖面边界处截断, 因此首末元素不可能入选; 相等的平台值
/// 也不构成极大.
pub(crate) fn local_maxima(profile: &[f64], order: usize) -> Vec<usize> {
    let n = profile.len();
    if n < 3 {
        return vec![];
    }
    let mut out = vec![];
    for i in 1..n - 1 {
        let lo = i.saturating_sub(order);
        let hi = (i + order).min(n - 1);
        let v = profile[i];
        if (lo..=hi).filter(|&j| j != i).all(|j| v > profile[j]) {
            out.push(i);
        }
    }
    out
}

/// 在剖面中选择峰值偏移.
///
/// 规则: 取全部局部极大值中相关系数最高者; 若不存在局部极大值,
/// 或最高相关系数低于阈值 `thr`, 则回退到距离模型给出的期望偏移
/// `expected` 并标记为低置信度.
pub(crate) fn select_peak(profile: &[f64], order: usize, thr: f64, expected: usize) -> PeakChoice {
    let maxima = local_maxima(profile, order);
    let Some(&best) = maxima.iter().max_by_key(|&&i| OrderedFloat(profile[i])) else {
        log::warn!("未找到相关性峰值, 回退到修正模板距离 {expected}");
        return PeakChoice {
            offset: expected,
            corr: None,
        };
    };

    if profile[best] < thr {
        log::warn!(
            "峰值相关系数 {:.3} 低于阈值 {thr}, 回退到修正模板距离 {expected}",
            profile[best]
        );
        PeakChoice {
            offset: expected,
            corr: None,
        }
    } else {
        log::debug!("峰值位于偏移 {best} (相关系数 {:.3})", profile[best]);
        PeakChoice {
            offset: best,
            corr: Some(profile[best]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use ndarray::Array3;

    fn float_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_pearson_basic() {
        let x = [1.0, 2.0, 3.0, 4.0];
        let y = [2.0, 4.0, 6.0, 8.0];
        assert!(float_eq(pearson(&x, &y), 1.0));

        let y_neg = [8.0, 6.0, 4.0, 2.0];
        assert!(float_eq(pearson(&x, &y_neg), -1.0));
    }

    #[test]
    fn test_pearson_degenerate_is_zero() {
        let x = [1.0, 2.0, 3.0];
        let zeros = [0.0; 3];
        let flat = [5.0; 3];
        assert_eq!(pearson(&x, &zeros), 0.0);
        assert_eq!(pearson(&x, &flat), 0.0);
        assert_eq!(pearson::<f64>(&[], &[]), 0.0);
    }

    #[test]
    fn test_local_maxima_excludes_edges() {
        // 末元素最大但属于边界, 不可入选.
        let profile = [0.1, 1.0, 5.0, 1.0, 0.5, 0.2, 8.0];
        assert_eq!(local_maxima(&profile, 2), vec![2]);
    }

    #[test]
    fn test_local_maxima_monotonic_profile_is_empty() {
        let profile: Vec<f64> = (0..20).map(|i| 1.0 - i as f64 / 20.0).collect();
        assert!(local_maxima(&profile, 5).is_empty());
    }

    #[test]
    fn test_local_maxima_plateau_rejected() {
        let profile = [0.0, 1.0, 1.0, 0.0, 0.0];
        assert!(local_maxima(&profile, 1).is_empty());
    }

    #[test]
    fn test_select_peak_direct() {
        let mut profile = vec![0.0; 30];
        profile[12] = 0.9;
        profile[20] = 0.6;
        let choice = select_peak(&profile, 5, 0.3, 15);
        assert_eq!(choice.offset, 12);
        assert_eq!(choice.corr, Some(0.9));
        assert!(!choice.is_fallback());
    }

    #[test]
    fn test_select_peak_fallback_no_maximum() {
        // 严格单调递减的剖面没有内部极大值, 必须回退.
        let profile: Vec<f64> = (0..32).map(|i| 1.0 - i as f64 / 32.0).collect();
        let choice = select_peak(&profile, 5, 0.3, 16);
        assert_eq!(choice.offset, 16);
        assert!(choice.is_fallback());
    }

    #[test]
    fn test_select_peak_fallback_below_threshold() {
        let mut profile = vec![0.0; 30];
        profile[12] = 0.2;
        let choice = select_peak(&profile, 5, 0.3, 15);
        assert_eq!(choice.offset, 15);
        assert!(choice.is_fallback());
    }

    #[test]
    fn test_profile_on_zero_volume_is_all_zero() {
        // 零体数据: 每个候选窗口全零, 剖面必须全为 0 而非 NaN.
        let scan = MriScan::fake(Array3::zeros((40, 48, 16)), [1.0; 3]);
        let params = DetectParams {
            size_ap_mm: 2.0,
            size_rl_mm: 3.0,
            size_is_mm: 2.0,
            ..DetectParams::default()
        };
        let win = PatternWindow::new(&params, scan.shape(), scan.pix_dim());
        let mut pattern = win.extract(scan.data(), 20);
        pattern[(2, 2, 3)] = 1.0;

        let profile =
            correlation_profile(scan.data(), &win, &pattern, 20, Direction::Superior, 16);
        assert_eq!(profile.len(), 16);
        assert!(profile.iter().all(|&c| c == 0.0));
    }
}
