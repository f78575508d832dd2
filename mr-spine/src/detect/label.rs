//! 椎体层级标注传播.

use crate::consts::{is_foreground, UNLABELED};
use crate::CordSeg;

use super::traverse::DiscList;

/// 依据椎间盘列表为分割掩膜的每个前景体素赋椎体层级,
/// 返回与输入同形的新体数据, 输入保持不变.
///
/// 第 `iz` 层的层级 = 其上方最近椎间盘 (z 严格大于 `iz` 者中 z
/// 最小的) 的标号 + 1, 因为紧邻 N/N+1 椎间盘下方的切片属于
/// N+1 号椎体; 上方没有椎间盘的层为 0 (未标注). 背景体素保持 0.
pub(super) fn propagate(seg: &CordSeg, discs: &DiscList) -> CordSeg {
    let mut out = seg.clone();
    for (iz, mut slice) in out.slice_iter_mut().enumerate() {
        let level = level_for_slice(discs, iz as i64);
        slice.mapv_inplace(|p| if is_foreground(p) { level } else { UNLABELED });
    }
    out
}

/// 第 `iz` 层对应的椎体层级.
fn level_for_slice(discs: &DiscList, iz: i64) -> u8 {
    discs
        .iter()
        .filter(|d| d.z > iz)
        .min_by_key(|d| d.z)
        .map_or(UNLABELED, |d| d.label.saturating_add(1))
}

#[cfg(test)]
mod tests {
    use super::super::traverse::DiscRecord;
    use super::*;
    use ndarray::Array3;

    /// 前景为 90..=130 层整层的分割掩膜.
    fn band_seg() -> CordSeg {
        let mut data = Array3::<u8>::zeros((140, 4, 4));
        for z in 90..=130 {
            for y in 0..4 {
                for x in 0..4 {
                    data[(z, y, x)] = 1;
                }
            }
        }
        CordSeg::fake(data, [1.0; 3])
    }

    #[test]
    fn test_boundary_convention() {
        let discs = DiscList::from_records([
            DiscRecord { z: 100, label: 5 },
            DiscRecord { z: 120, label: 4 },
        ]);
        let seg = band_seg();
        let out = propagate(&seg, &discs);

        // 90..=99 层: 上方最近为 z=100 (标号 5) -> 层级 6.
        for z in 90..100 {
            assert_eq!(out[(z, 0, 0)], 6, "z={z}");
        }
        // 100..=119 层: 上方最近为 z=120 (标号 4) -> 层级 5.
        for z in 100..120 {
            assert_eq!(out[(z, 0, 0)], 5, "z={z}");
        }
        // 120..=130 层: 上方没有椎间盘 -> 0.
        for z in 120..=130 {
            assert_eq!(out[(z, 0, 0)], 0, "z={z}");
        }
        // 前景之外的层保持 0.
        assert_eq!(out[(50, 0, 0)], 0);
        assert_eq!(out[(135, 0, 0)], 0);
    }

    #[test]
    fn test_background_untouched() {
        let discs = DiscList::from_records([DiscRecord { z: 100, label: 5 }]);
        let mut seg = band_seg();
        seg[(95, 2, 2)] = 0;
        let out = propagate(&seg, &discs);
        assert_eq!(out[(95, 2, 2)], 0);
        assert_eq!(out[(95, 1, 1)], 6);
    }

    #[test]
    fn test_propagation_idempotent() {
        let discs = DiscList::from_records([
            DiscRecord { z: 100, label: 5 },
            DiscRecord { z: 120, label: 4 },
        ]);
        let seg = band_seg();
        let a = propagate(&seg, &discs);
        let b = propagate(&seg, &discs);
        assert_eq!(a.data(), b.data());
        // 输入未被修改.
        assert_eq!(seg.count(1), 41 * 16);
    }

    #[test]
    fn test_level_saturates_at_u8_max() {
        // 标号已达 u8 上限的椎间盘: 其下方的层级饱和为 u8::MAX,
        // 不得溢出.
        let discs = DiscList::from_records([DiscRecord {
            z: 100,
            label: u8::MAX,
        }]);
        let seg = band_seg();
        let out = propagate(&seg, &discs);
        assert_eq!(out[(95, 0, 0)], u8::MAX);
        assert_eq!(out[(100, 0, 0)], 0);
    }

    #[test]
    fn test_disc_at_fov_upper_edge() {
        // 外插椎间盘可能位于 z = nz: 所有层都在其下方.
        let discs = DiscList::from_records([DiscRecord { z: 140, label: 1 }]);
        let seg = band_seg();
        let out = propagate(&seg, &discs);
        for z in 90..=130 {
            assert_eq!(out[(z, 0, 0)], 2);
        }
    }
}
