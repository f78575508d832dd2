//! 双向遍历控制.
//!
//! 自种子椎间盘出发, 先向上 (z 增大) 逐盘搜索, 到达体数据上缘或
//! 1 号盘后回到种子并转向向下, 直至预计的下一位置触及下缘为止.

use std::collections::VecDeque;

use itertools::Itertools;

use crate::consts::DISC_LABEL_MIN;
use crate::{MriScan, NiftiHeaderAttr};

use super::distance::DiscDistanceModel;
use super::pattern::PatternWindow;
use super::{correlate, DetectParams, Direction, DiscSeed, SearchStep};

/// 单个椎间盘记录.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscRecord {
    /// 轴向 (z) 位置. 外插的顶端椎间盘可能被钳制到切片总数
    /// (即 FOV 上缘之外一格).
    pub z: i64,

    /// 解剖学标号. 1 为最上端 (C1/C2), 数值越大越靠下.
    pub label: u8,
}

/// 按 z 升序排列的椎间盘列表.
///
/// z 升序等价于标号严格降序, 这是全程维持的不变量.
#[derive(Debug, Clone, Default)]
pub struct DiscList {
    records: VecDeque<DiscRecord>,
}

impl DiscList {
    /// 以种子为唯一记录构建列表.
    #[inline]
    pub fn with_seed(seed: DiscRecord) -> Self {
        Self {
            records: VecDeque::from([seed]),
        }
    }

    /// 在上端 (列表尾部) 追加新记录.
    #[inline]
    fn push_superior(&mut self, rec: DiscRecord) {
        self.records.push_back(rec);
        debug_assert!(self.is_ordered());
    }

    /// 在下端 (列表头部) 追加新记录.
    #[inline]
    fn push_inferior(&mut self, rec: DiscRecord) {
        self.records.push_front(rec);
        debug_assert!(self.is_ordered());
    }

    /// 由按 z 升序排列的记录直接构建列表.
    ///
    /// 记录必须满足 z 严格升序且标号严格降序, 否则程序 panic.
    pub fn from_records<I: IntoIterator<Item = DiscRecord>>(records: I) -> Self {
        let list = Self {
            records: records.into_iter().collect(),
        };
        assert!(
            list.is_ordered(),
            "椎间盘记录必须按 z 严格升序且标号严格降序"
        );
        list
    }

    /// 记录个数.
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 列表是否为空.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 按 z 升序迭代全部记录.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &DiscRecord> {
        self.records.iter()
    }

    /// 最上端 (z 最大, 标号最小) 的记录.
    #[inline]
    pub fn most_superior(&self) -> Option<&DiscRecord> {
        self.records.back()
    }

    /// 最下端 (z 最小, 标号最大) 的记录.
    #[inline]
    pub fn most_inferior(&self) -> Option<&DiscRecord> {
        self.records.front()
    }

    /// 列表是否满足 z 严格升序且标号严格降序?
    pub fn is_ordered(&self) -> bool {
        self.records
            .iter()
            .tuple_windows()
            .all(|(a, b)| a.z < b.z && a.label > b.label)
    }
}

/// 遍历状态机的状态.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchState {
    /// 向上搜索.
    Superior,

    /// 向下搜索.
    Inferior,

    /// 遍历结束.
    Done,
}

impl SearchState {
    #[inline]
    fn direction(self) -> Direction {
        match self {
            Self::Superior => Direction::Superior,
            Self::Inferior => Direction::Inferior,
            Self::Done => unreachable!("Done 状态没有搜索方向"),
        }
    }
}

/// 自种子出发双向搜索全部椎间盘.
///
/// 返回的列表按 z 升序, 含种子; 若最上端检出的椎间盘标号大于 1
/// (1 号盘在 FOV 之外), 则按修正模板距离外插一个顶端椎间盘,
/// 其 z 被钳制在切片总数以内.
pub(super) fn search_discs(
    scan: &MriScan,
    window: &PatternWindow,
    mut model: DiscDistanceModel,
    seed: DiscSeed,
    params: &DetectParams,
    mut observer: impl FnMut(&SearchStep<'_>),
) -> DiscList {
    let nz = scan.len_z() as i64;
    let data = scan.data();

    let mut list = DiscList::with_seed(DiscRecord {
        z: seed.z,
        label: seed.label,
    });
    let mut current_z = seed.z;
    let mut current_label = seed.label;

    let mut state = SearchState::Superior;
    let mut expected = match model.expected_step(seed.label, Direction::Superior) {
        Some(d) => d,
        None => {
            // 种子即为 1 号盘, 向上无处可去, 直接转向向下.
            log::info!("种子即为最上端椎间盘, 直接向下搜索");
            state = SearchState::Inferior;
            // 向下查询的模板下标总在范围内, 不会为 None.
            let d = model.expected_step(seed.label, Direction::Inferior).unwrap();
            if inferior_exhausted(seed.z, d, seed.label) {
                state = SearchState::Done;
            }
            d
        }
    };

    while state != SearchState::Done {
        let direction = state.direction();
        log::info!(
            "当前椎间盘: {current_label} (z={current_z}), 方向: {direction:?}"
        );

        // 以当前位置为中心提取参考模式, 在两倍期望距离内搜索峰值.
        let pattern = window.extract(data, current_z);
        let scan_len = expected * 2;
        let profile =
            correlate::correlation_profile(data, window, &pattern, current_z, direction, scan_len);
        let choice = correlate::select_peak(
            &profile,
            params.peak_order,
            params.corr_threshold,
            expected,
        );

        let prev_z = current_z;
        let prev_label = current_label;
        current_z += direction.step() * choice.offset as i64;
        if current_z < 0 {
            // 回退步长可能越过下缘.
            current_z = 0;
        }
        match direction {
            Direction::Superior => current_label -= 1,
            Direction::Inferior => current_label = current_label.saturating_add(1),
        }

        let rec = DiscRecord {
            z: current_z,
            label: current_label,
        };
        match direction {
            Direction::Superior => list.push_superior(rec),
            Direction::Inferior => list.push_inferior(rec),
        }
        model.record(prev_label, current_label, (current_z - prev_z).abs() as f64);
        observer(&SearchStep {
            profile: &profile,
            choice,
            disc: rec,
            direction,
        });

        match state {
            SearchState::Superior => {
                // 到达 1 号盘或预计下一位置超出上缘时转向向下.
                let reached_top = match model.expected_step(current_label, Direction::Superior) {
                    None => true,
                    Some(d) => {
                        expected = d;
                        current_z + d as i64 >= nz
                    }
                };
                if reached_top {
                    log::info!("转向向下搜索");
                    state = SearchState::Inferior;
                    current_z = seed.z;
                    current_label = seed.label;
                    // 向下查询的模板下标总在范围内, 不会为 None.
                    expected = model
                        .expected_step(current_label, Direction::Inferior)
                        .unwrap();
                    if inferior_exhausted(current_z, expected, current_label) {
                        state = SearchState::Done;
                    }
                }
            }
            SearchState::Inferior => {
                // 向下查询的模板下标总在范围内, 不会为 None.
                expected = model
                    .expected_step(current_label, Direction::Inferior)
                    .unwrap();
                if inferior_exhausted(current_z, expected, current_label) {
                    state = SearchState::Done;
                }
            }
            SearchState::Done => unreachable!(),
        }
    }

    extrapolate_top_disc(&mut list, &model, nz);
    debug_assert!(list.is_ordered());
    list
}

/// 向下搜索是否已无法继续?
///
/// 两个终止条件: 预计的下一位置触及下缘, 或标号已达 `u8` 上限
/// (再前进会产生重复标号, 破坏列表的严格降序).
#[inline]
fn inferior_exhausted(z: i64, expected: usize, label: u8) -> bool {
    z - expected as i64 <= 0 || label == u8::MAX
}

/// 顶端外插: 最上端检出的椎间盘标号大于 1 时, 依修正模板距离在其
/// 上方补一个椎间盘, z 钳制到 `nz`.
fn extrapolate_top_disc(list: &mut DiscList, model: &DiscDistanceModel, nz: i64) {
    // 列表总含种子, 不会为空.
    let top = *list.most_superior().unwrap();
    if top.label <= DISC_LABEL_MIN {
        return;
    }
    // top.label >= 2, 向上查询不会为 None.
    let d = model
        .expected_step(top.label, Direction::Superior)
        .unwrap();
    let z = (top.z + d as i64).min(nz);
    if z <= top.z {
        // 最上端记录已在 FOV 上缘之外, 无处可插.
        return;
    }
    let label = top.label - 1;
    log::info!("依修正模板距离外插顶端椎间盘 #{label} (z={z})");
    list.push_superior(DiscRecord { z, label });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::*;
    use ndarray::Array3;

    /// 构造一个在给定 z 位置带亮带的合成直化体数据.
    ///
    /// 亮带覆盖采样窗口所在的 x/y 区域, 厚度为一个体素.
    fn banded_scan(nz: usize, band_z: &[usize]) -> MriScan {
        let mut data = Array3::<f32>::zeros((nz, 64, 32));
        for &z in band_z {
            for y in 40..60 {
                for x in 5..28 {
                    data[(z, y, x)] = 100.0;
                }
            }
        }
        MriScan::fake(data, [1.0; 3])
    }

    fn run(
        scan: &MriScan,
        seed: DiscSeed,
        observer: impl FnMut(&SearchStep<'_>),
    ) -> DiscList {
        let params = DetectParams::default();
        let window = PatternWindow::new(&params, scan.shape(), scan.pix_dim());
        let model = DiscDistanceModel::new(scan.z_mm());
        search_discs(scan, &window, model, seed, &params, observer)
    }

    #[test]
    fn test_walk_finds_equally_spaced_discs() {
        // 亮带间距 16 体素, 种子在 z=100 (标号 4).
        let bands: Vec<usize> = (0..13).map(|i| 4 + 16 * i).collect();
        let scan = banded_scan(200, &bands);
        let mut steps = 0usize;
        let list = run(&scan, DiscSeed { z: 100, label: 4 }, |s| {
            steps += 1;
            assert!(!s.choice.is_fallback());
        });

        assert!(list.is_ordered());
        // 向上: 116, 132, 148 (标号 3, 2, 1); 向下: 84 .. 4 (标号 5 .. 10).
        let records: Vec<DiscRecord> = list.iter().copied().collect();
        let z: Vec<i64> = records.iter().map(|r| r.z).collect();
        let label: Vec<u8> = records.iter().map(|r| r.label).collect();
        assert_eq!(z, vec![4, 20, 36, 52, 68, 84, 100, 116, 132, 148]);
        assert_eq!(label, vec![10, 9, 8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(steps, list.len() - 1);
        // 1 号盘已检出, 不应外插.
        assert_eq!(list.most_superior().unwrap().label, 1);
    }

    #[test]
    fn test_extrapolated_top_disc_clamped_to_nz() {
        // 亮带 10, 26, 42, 58; 种子标号 3 在 z=42. 向上只到 2 号盘
        // (z=58), 1 号盘在 FOV 外, 必须按修正距离外插并钳制到 nz.
        let scan = banded_scan(60, &[10, 26, 42, 58]);
        let list = run(&scan, DiscSeed { z: 42, label: 3 }, |_| {});

        assert!(list.is_ordered());
        let top = *list.most_superior().unwrap();
        assert_eq!(top.label, 1);
        // 58 + 修正后的 C1/C2 间距 (约 17) 超出 nz=60, 应精确钳制.
        assert_eq!(top.z, 60);
    }

    #[test]
    fn test_seed_at_disc_one_goes_inferior_only() {
        let bands: Vec<usize> = (0..8).map(|i| 16 + 16 * i).collect();
        let scan = banded_scan(160, &bands);
        // 种子为 1 号盘 (z=128): 直接向下.
        let list = run(&scan, DiscSeed { z: 128, label: 1 }, |s| {
            assert_eq!(s.direction, Direction::Inferior);
        });
        assert!(list.is_ordered());
        assert_eq!(list.most_superior().unwrap().label, 1);
        assert_eq!(list.most_inferior().unwrap().z, 16);
        assert_eq!(list.len(), 8);
    }

    #[test]
    fn test_inferior_stops_at_label_ceiling() {
        // 标号已达 u8 上限的种子: 向下一步都不能走, 否则会产生
        // 重复标号. 向上则正常前进.
        let scan = banded_scan(70, &[]);
        let list = run(
            &scan,
            DiscSeed {
                z: 64,
                label: u8::MAX,
            },
            |_| {},
        );
        assert!(list.is_ordered());
        assert_eq!(list.most_inferior().unwrap().label, u8::MAX);
        // 全零体数据上仅有一个回退的向上步 (z=95, 标号 254),
        // 随后预计位置超出上缘而转向, 向下立即终止.
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_disc_list_ordering_helpers() {
        let mut list = DiscList::with_seed(DiscRecord { z: 50, label: 5 });
        list.push_superior(DiscRecord { z: 66, label: 4 });
        list.push_inferior(DiscRecord { z: 34, label: 6 });
        assert_eq!(list.len(), 3);
        assert!(!list.is_empty());
        assert!(list.is_ordered());
        assert_eq!(list.most_superior().unwrap().label, 4);
        assert_eq!(list.most_inferior().unwrap().label, 6);
    }
}
