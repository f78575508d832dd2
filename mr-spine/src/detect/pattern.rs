//! 参考模式 (pattern) 窗口提取.

use ndarray::{s, Array3, ArrayView3, Zip};

use crate::Idx3d;

use super::DetectParams;

/// 以体素为单位的固定形状采样窗口.
///
/// 窗口在 x 方向取图像中线, 在 y 方向取中线再向椎体侧 (前方) 偏移
/// `shift_ap_mm`, z 方向以调用方给定的轴向位置为中心. 毫米参数按各轴
/// 分辨率换算为体素.
#[derive(Debug, Clone, Copy)]
pub struct PatternWindow {
    /// 窗口中心 x (左右方向).
    xc: usize,
    /// 窗口中心 y (前后方向, 已含前移量).
    yc: usize,
    half_x: usize,
    half_y: usize,
    half_z: usize,
    /// 体数据的轴向切片总数. z 方向越界以 0 填充.
    nz: usize,
}

impl PatternWindow {
    /// 由检测参数与体数据的形状 / 分辨率构建窗口.
    ///
    /// 若窗口在 x 或 y 方向超出体数据范围, 则程序 panic
    /// (直化居中后的体数据不应出现这种情况).
    pub fn new(params: &DetectParams, shape: Idx3d, pix_dim_mm: [f64; 3]) -> Self {
        let (nz, ny, nx) = shape;
        let [pz, py, px] = pix_dim_mm;

        let to_voxel = |mm: f64, pix: f64| -> usize {
            debug_assert!(pix > 0.0);
            (mm / pix).round() as usize
        };
        let half_x = to_voxel(params.size_rl_mm, px);
        let half_y = to_voxel(params.size_ap_mm, py);
        let half_z = to_voxel(params.size_is_mm, pz);
        let shift = to_voxel(params.shift_ap_mm, py);

        let xc = nx / 2;
        let yc = ny / 2 + shift;
        assert!(
            half_x <= xc && xc + half_x < nx,
            "采样窗口在左右方向超出体数据范围"
        );
        assert!(
            half_y <= yc && yc + half_y < ny,
            "采样窗口在前后方向超出体数据范围"
        );

        Self {
            xc,
            yc,
            half_x,
            half_y,
            half_z,
            nz,
        }
    }

    /// 窗口 (亦即每个提取结果) 的形状, 格式为 (z, y, x).
    #[inline]
    pub fn shape(&self) -> Idx3d {
        (
            2 * self.half_z + 1,
            2 * self.half_y + 1,
            2 * self.half_x + 1,
        )
    }

    /// 提取以 `z_center` 为中心的窗口内容.
    ///
    /// z 方向越界的部分以 0 填充, 保证输出形状恒定. 输出以 `f64`
    /// 保存以便后续统计计算.
    pub fn extract(&self, data: ArrayView3<'_, f32>, z_center: i64) -> Array3<f64> {
        let shape = self.shape();
        let mut out = Array3::<f64>::zeros(shape);
        let y0 = self.yc - self.half_y;
        let x0 = self.xc - self.half_x;

        for (iz, mut plane) in out.outer_iter_mut().enumerate() {
            let z = z_center + iz as i64 - self.half_z as i64;
            if z < 0 || z >= self.nz as i64 {
                // 0 填充.
                continue;
            }
            let src = data.slice(s![z as usize, y0..y0 + shape.1, x0..x0 + shape.2]);
            Zip::from(&mut plane).and(&src).for_each(|o, &v| {
                *o = v as f64;
            });
        }
        out
    }
}
