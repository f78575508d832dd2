//! 直化脊髓 MRI nii 文件基础数据结构.

use std::ops::{Index, IndexMut};
use std::path::Path;

use ndarray::{Array3, ArrayView, ArrayViewMut, ArrayViewMut2, Axis, Ix3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use num::ToPrimitive;

use crate::consts::is_foreground;
use crate::{Idx2d, Idx3d};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 将 (W, H, z) 转换成 (z, H, W). 以后均按照该模式访问.
#[inline]
fn get_shape_from_header(h: &NiftiHeader) -> Idx3d {
    // [W, H, z]. 体素个数数组.
    let [_, w, h, z, ..] = h.dim;
    (z as usize, h as usize, w as usize)
}

/// 3D MRI nii 文件 header 的共用属性和部分通用操作.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取数据形状大小, 格式为 (z, y, x).
    #[inline]
    fn shape(&self) -> Idx3d {
        get_shape_from_header(self.header())
    }

    /// 获取数据水平切片形状大小, 格式为 (y, x).
    #[inline]
    fn slice_shape(&self) -> Idx2d {
        let (_, y, x) = self.shape();
        (y, x)
    }

    /// 获取水平 (轴向) 切片个数.
    #[inline]
    fn len_z(&self) -> usize {
        self.shape().0
    }

    /// 获取数据体素个数.
    #[inline]
    fn size(&self) -> usize {
        let (z, y, x) = self.shape();
        z * y * x
    }

    /// 检查索引是否合法.
    #[inline]
    fn check(&self, (z0, y0, x0): &Idx3d) -> bool {
        let (z, y, x) = self.shape();
        *z0 < z && *y0 < y && *x0 < x
    }

    /// 获取单个体素分辨率. 该分辨率以毫米为单位, 分别代表下上
    /// (rostro-caudal), 前后, 左右三个方向.
    ///
    /// 该值也可以通过 `self.{z_mm, y_mm, x_mm}` 分别获取.
    #[inline]
    fn pix_dim(&self) -> [f64; 3] {
        let [_, x, y, z, ..] = self.header().pixdim;
        [z as f64, y as f64, x as f64]
    }

    /// 获取左右方向体素分辨率, 以毫米为单位.
    #[inline]
    fn x_mm(&self) -> f64 {
        self.header().pixdim[1] as f64
    }

    /// 获取前后方向体素分辨率, 以毫米为单位.
    #[inline]
    fn y_mm(&self) -> f64 {
        self.header().pixdim[2] as f64
    }

    /// 获取下上方向 (相邻轴向切片的方向) 体素分辨率, 以毫米为单位.
    #[inline]
    fn z_mm(&self) -> f64 {
        self.header().pixdim[3] as f64
    }

    /// 体素分辨率在三个维度上是否是各向同的?
    #[inline]
    fn is_isotropic(&self) -> bool {
        let [z, y, x] = self.pix_dim();
        z == y && z == x
    }
}

/// 以 (z, y, x) 形状的数据与分辨率直接拼接一个 nifti header.
///
/// 仅供 `fake_*` 构造器使用.
fn fake_header(shape: Idx3d, pix_dim_mm: [f32; 3]) -> BoxedHeader {
    let (nz, ny, nx) = shape;
    let mut header = Box::<NiftiHeader>::default();
    header.dim = [3, nx as u16, ny as u16, nz as u16, 1, 1, 1, 1];
    let [pz, py, px] = pix_dim_mm;
    header.pixdim[1] = px;
    header.pixdim[2] = py;
    header.pixdim[3] = pz;
    header.intent_name[..4].copy_from_slice(b"fake");
    header
}

/// nii 格式 3D MRI 扫描, 包括 header 和解剖图像强度. 强度值以 `f32` 保存.
#[derive(Debug, Clone)]
pub struct MriScan {
    header: BoxedHeader,
    data: Array3<f32>,
}

impl NiftiHeaderAttr for MriScan {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for MriScan {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl MriScan {
    /// 打开 nii 文件格式的 3D MRI 扫描. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W].
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<f32>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 根据裸强度数据和体素分辨率直接创建 `MriScan` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 (z, y, x) 格式存储.
    /// 2. `pix_dim_mm` 按照 (z, y, x) 格式存储, 单位为毫米.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<f32>, pix_dim_mm: [f32; 3]) -> Self {
        let header = fake_header(data.dim(), pix_dim_mm);
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }
}

/// nii 格式 3D 脊髓分割掩膜 (或其标注结果), 包括 header 和标签值.
/// 标签值以 `u8` 保存.
#[derive(Debug, Clone)]
pub struct CordSeg {
    header: BoxedHeader,
    data: Array3<u8>,
}

impl NiftiHeaderAttr for CordSeg {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }
}

impl Index<Idx3d> for CordSeg {
    type Output = u8;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl IndexMut<Idx3d> for CordSeg {
    #[inline]
    fn index_mut(&mut self, index: Idx3d) -> &mut Self::Output {
        &mut self.data[index]
    }
}

impl CordSeg {
    /// 打开 nii 文件格式的 3D 分割掩膜. `path` 为 nii 文件的本地路径.
    /// 如果打开成功, 则返回 `Ok(Self)`, 否则返回 `Err`.
    pub fn open<P: AsRef<Path>>(path: P) -> nifti::Result<Self> {
        let obj = ReaderOptions::new().read_file(path.as_ref())?;
        let header = Box::new(obj.header().clone());

        // [W, H, z] -> [z, H, W]
        // hint: 原第一维向下增长, 原第二维向右增长.
        let data = obj
            .into_volume()
            .into_ndarray::<u8>()?
            .permuted_axes([2, 1, 0].as_slice());

        // The nature of nifti data field layout.
        debug_assert!(data.is_standard_layout());

        // 该操作不会生成 `Err`, 可直接 unwrap.
        let data =
            Array3::<u8>::from_shape_vec(get_shape_from_header(&header), data.into_raw_vec())
                .unwrap();

        Ok(Self { header, data })
    }

    /// 将分割掩膜保存到 `path`. 文件按 (x, y, z) 惯用布局写出,
    /// 以 `.gz` 结尾的路径会自动压缩. header 沿用本结构自身的 header.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> nifti::Result<()> {
        // (z, y, x) -> (x, y, z). 写出时恢复 nifti 惯用布局.
        let data = self.data.view().permuted_axes([2, 1, 0]);
        WriterOptions::new(path.as_ref())
            .reference_header(&self.header)
            .write_nifti(&data)?;
        Ok(())
    }

    /// 根据裸标签数据和体素分辨率直接创建 `CordSeg` 实体.
    ///
    /// # 参数
    ///
    /// 1. `data` 按照 (z, y, x) 格式存储.
    /// 2. `pix_dim_mm` 按照 (z, y, x) 格式存储, 单位为毫米.
    ///
    /// # 注意
    ///
    /// 该方法可能会创建不一致的实体, 因此你应仅将其用于实验目的.
    pub fn fake(data: Array3<u8>, pix_dim_mm: [f32; 3]) -> Self {
        let header = fake_header(data.dim(), pix_dim_mm);
        Self { header, data }
    }

    /// 直接以现成 header 创建数据. `data` 按照 (z, y, x) 格式存储,
    /// 形状必须与 `header` 一致, 否则程序 panic.
    pub fn fake_with_header(header: &NiftiHeader, data: Array3<u8>) -> Self {
        assert_eq!(
            get_shape_from_header(header),
            data.dim(),
            "header 与数据形状不一致"
        );
        let mut header = Box::new(header.clone());
        header.intent_name[..4].copy_from_slice(b"fake");
        Self { header, data }
    }

    /// 判断该结构是否是由 `fake_*` 方法手动拼接的.
    pub fn is_faked(&self) -> bool {
        self.header.intent_name.starts_with(b"fake")
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, u8, Ix3> {
        self.data.view()
    }

    /// 获得数据的一份可变 shallow copy.
    #[inline]
    pub fn data_mut(&mut self) -> ArrayViewMut<'_, u8, Ix3> {
        self.data.view_mut()
    }

    /// 获取能按升序迭代 3D 掩膜水平可变切片的迭代器.
    #[inline]
    pub fn slice_iter_mut(&mut self) -> impl ExactSizeIterator<Item = ArrayViewMut2<'_, u8>> {
        self.data.axis_iter_mut(Axis(0))
    }

    /// 获取 3D 掩膜中值为 `label` 的体素个数.
    #[inline]
    pub fn count(&self, label: u8) -> usize {
        self.data.iter().filter(|p| **p == label).count()
    }

    /// 计算全部前景 (非零) 体素的整数质心, 格式为 (z, y, x).
    ///
    /// 掩膜全零时返回 `None`.
    pub fn center_of_mass(&self) -> Option<Idx3d> {
        let mut cnt = 0u64;
        let (mut sz, mut sy, mut sx) = (0.0f64, 0.0f64, 0.0f64);
        for ((z, y, x), p) in self.data.indexed_iter() {
            if is_foreground(*p) {
                cnt += 1;
                sz += z as f64;
                sy += y as f64;
                sx += x as f64;
            }
        }
        if cnt == 0 {
            return None;
        }
        let n = cnt as f64;
        // 质心四舍五入到整数索引. 非负浮点数转换不会失败.
        Some((
            (sz / n).round().to_usize().unwrap(),
            (sy / n).round().to_usize().unwrap(),
            (sx / n).round().to_usize().unwrap(),
        ))
    }
}
