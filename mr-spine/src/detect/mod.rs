//! 椎间盘检测与椎体层级标注.
//!
//! 输入为已直化的脊髓 MRI 体数据, 对应的脊髓分割掩膜, 以及一个
//! 人工给定的种子椎间盘; 算法以自校准的 3D 模板相关性搜索沿 z 轴
//! 双向定位全部椎间盘, 再把椎体层级传播到分割掩膜的每个轴向切片.
//!
//! 核心入口为 [`detect`] 与 [`detect_with_observer`].

mod correlate;
mod distance;
mod error;
mod label;
mod pattern;
mod traverse;

pub use correlate::PeakChoice;
pub use distance::DiscDistanceModel;
pub use error::{DetectError, DetectResult};
pub use pattern::PatternWindow;
pub use traverse::{DiscList, DiscRecord};

use crate::consts::{DISC_LABEL_MAX, DISC_LABEL_MIN};
use crate::{CordSeg, MriScan, NiftiHeaderAttr};

/// 沿脊柱轴向的搜索方向.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 向上 (朝头侧, z 增大).
    Superior,

    /// 向下 (朝尾侧, z 减小).
    Inferior,
}

impl Direction {
    /// 带符号的单位步长.
    #[inline]
    pub fn step(self) -> i64 {
        match self {
            Self::Superior => 1,
            Self::Inferior => -1,
        }
    }
}

/// 检测参数.
///
/// 所有长度参数以毫米为单位, 构建 [`PatternWindow`] 时按体素
/// 分辨率换算. 默认值来自对 T2 加权直化图像的经验整定.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectParams {
    /// 采样窗口中心自 y 中线向椎体侧 (前方) 的偏移量.
    pub shift_ap_mm: f64,

    /// 窗口在前后方向的半径.
    pub size_ap_mm: f64,

    /// 窗口在左右方向的半径.
    pub size_rl_mm: f64,

    /// 窗口在下上方向的半径.
    pub size_is_mm: f64,

    /// 寻找相关性剖面局部极大值时向两侧比较的邻域宽度.
    pub peak_order: usize,

    /// 相关性置信阈值. 峰值低于该值时回退到修正模板距离.
    pub corr_threshold: f64,
}

impl Default for DetectParams {
    fn default() -> Self {
        Self {
            shift_ap_mm: 17.0,
            size_ap_mm: 5.0,
            size_rl_mm: 7.0,
            size_is_mm: 7.0,
            peak_order: 5,
            corr_threshold: 0.3,
        }
    }
}

/// 解析完毕的种子椎间盘.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DiscSeed {
    /// 轴向 (z) 位置.
    pub z: i64,

    /// 解剖学标号 (1 为 C1/C2).
    pub label: u8,
}

/// 种子来源.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seed {
    /// 显式给出 (z, 标号).
    Explicit {
        /// 轴向 (z) 位置.
        z: i64,
        /// 解剖学标号.
        label: u8,
    },

    /// 以 FOV 中心切片作为 z, 标号由调用方给定.
    ///
    /// 适用于脊柱在 FOV 内大致居中, 调用方知道投影到中心切片的
    /// 椎间盘标号的情况.
    FovCenter {
        /// 解剖学标号.
        label: u8,
    },
}

impl Seed {
    /// 结合体数据的轴向切片总数解析出具体种子.
    #[inline]
    pub fn resolve(self, nz: usize) -> DiscSeed {
        match self {
            Self::Explicit { z, label } => DiscSeed { z, label },
            Self::FovCenter { label } => DiscSeed {
                z: (nz / 2) as i64,
                label,
            },
        }
    }

    /// 从单点标注体数据恢复种子: 取前景体素质心处的标签值作为
    /// 标号, 质心 z 作为位置.
    ///
    /// 标注体数据全零时返回 [`DetectError::EmptySeedLabel`].
    pub fn from_label_volume(label: &CordSeg) -> DetectResult<DiscSeed> {
        let (z, y, x) = label.center_of_mass().ok_or(DetectError::EmptySeedLabel)?;
        Ok(DiscSeed {
            z: z as i64,
            label: label[(z, y, x)],
        })
    }
}

/// 单步搜索的观察数据, 供可选回调使用.
///
/// 相关性剖面和峰值选择结果可用于上层的调试展示或统计.
#[derive(Debug)]
pub struct SearchStep<'a> {
    /// 本步的相关性剖面.
    pub profile: &'a [f64],

    /// 峰值选择结果 (含低置信度回退标记).
    pub choice: PeakChoice,

    /// 本步新接受的椎间盘.
    pub disc: DiscRecord,

    /// 本步的搜索方向.
    pub direction: Direction,
}

/// 检测输出: 有序椎间盘列表, 标注后的分割体数据, 以及逐步的
/// 峰值选择结果.
#[derive(Debug, Clone)]
pub struct VertebralLabeling {
    /// 检出的椎间盘, 按 z 升序 (标号降序).
    pub discs: DiscList,

    /// 椎体层级标注结果, 与输入分割掩膜同形.
    pub seg: CordSeg,

    /// 每步搜索的峰值选择结果, 按接受顺序排列 (先向上, 后向下).
    ///
    /// 外插的顶端椎间盘不经搜索产生, 不在其中.
    pub steps: Vec<PeakChoice>,
}

impl VertebralLabeling {
    /// 低置信度回退 (未找到合格相关性峰值) 的步数.
    #[inline]
    pub fn fallback_count(&self) -> usize {
        self.steps.iter().filter(|c| c.is_fallback()).count()
    }
}

/// 检测椎间盘并标注椎体层级.
///
/// `scan` 与 `seg` 必须同形, 否则程序 panic. 种子不合法时返回
/// `Err`; 此外的缺峰 / 低置信度 / 越界情况均为算法的正常分支.
pub fn detect(
    scan: &MriScan,
    seg: &CordSeg,
    seed: Seed,
    params: &DetectParams,
) -> DetectResult<VertebralLabeling> {
    detect_with_observer(scan, seg, seed, params, |_| {})
}

/// 同 [`detect`], 但在每步搜索后以 [`SearchStep`] 调用 `observer`.
pub fn detect_with_observer(
    scan: &MriScan,
    seg: &CordSeg,
    seed: Seed,
    params: &DetectParams,
    mut observer: impl FnMut(&SearchStep<'_>),
) -> DetectResult<VertebralLabeling> {
    assert_eq!(scan.shape(), seg.shape(), "扫描与分割掩膜形状不一致");

    let nz = scan.len_z();
    let seed = seed.resolve(nz);
    validate_seed(seed, nz)?;
    log::info!("种子椎间盘: {} (z={})", seed.label, seed.z);

    let window = PatternWindow::new(params, scan.shape(), scan.pix_dim());
    let model = DiscDistanceModel::new(scan.z_mm());
    let mut steps = Vec::new();
    let discs = traverse::search_discs(scan, &window, model, seed, params, |s| {
        steps.push(s.choice);
        observer(s);
    });
    log::info!(
        "共检出 {} 个椎间盘, 其中 {} 步为低置信度回退",
        discs.len(),
        steps.iter().filter(|c| c.is_fallback()).count()
    );

    let seg = label::propagate(seg, &discs);
    Ok(VertebralLabeling { discs, seg, steps })
}

/// 种子合法性检查. 这是检测唯一的致命错误来源.
fn validate_seed(seed: DiscSeed, nz: usize) -> DetectResult<()> {
    if !(DISC_LABEL_MIN..=DISC_LABEL_MAX).contains(&seed.label) {
        return Err(DetectError::SeedLabelOutOfRange(seed.label));
    }
    if seed.z < 0 || seed.z >= nz as i64 {
        return Err(DetectError::SeedZOutOfVolume(seed.z, nz));
    }
    Ok(())
}
