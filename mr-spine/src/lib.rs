#![warn(missing_docs)] // <= 合适时移除它.

//! 核心库. 针对已直化 (straightened) 的脊髓 MRI 体数据,
//! 提供椎间盘 (intervertebral disc) 自动检测与椎体层级标注算法.
//!
//! 该 crate 目前仅提供 `safe` 接口.
//!
//! # 注意
//!
//! 1. 算法假定输入体数据已经重采样并直化, 且方向已归一化为
//!   x = 左右, y = 前后, z = 下上 (z 索引增大即朝头侧).
//!   直化与方向归一化由外部工具负责, 本 crate 不做任何几何变换.
//! 2. 在非期望情况下 (如越界索引, 形状不一致), 程序会直接 panic,
//!   而不会导致内存错误. As what Rust promises.
//!
//! # 功能
//!
//! ### 体数据访问 ✅
//!
//! nii 格式 3D MRI 扫描与脊髓分割掩膜的读写, 以及分辨率 / 形状元信息.
//!
//! 实现位于 `mr-spine/src/data`.
//!
//! ### 椎间盘检测 ✅
//!
//! 自单个种子椎间盘出发, 以自校准的 3D 模板相关性搜索沿
//! z 轴双向定位全部椎间盘.
//!
//! 实现位于 `mr-spine/src/detect`.
//!
//! ### 椎体层级标注 ✅
//!
//! 将检出的椎间盘列表传播为分割掩膜上逐层的椎体层级值.
//!
//! 实现位于 `mr-spine/src/detect/label.rs`.

/// 二维索引, 同时也可一定程度上用作非负整数向量.
pub type Idx2d = (usize, usize);

/// 三维索引 (z, y, x), 同时也可一定程度上用作非负整数向量.
///
/// z 为下上方向 (索引增大即朝头侧), y 为前后方向, x 为左右方向.
pub type Idx3d = (usize, usize, usize);

/// 3D MRI nii 文件基础数据结构.
mod data;

pub use data::{CordSeg, MriScan, NiftiHeaderAttr};

pub mod consts;

pub mod detect;

pub mod prelude;
