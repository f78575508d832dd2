//! 涵盖了本 crate 一系列常用功能的一揽子导出.

pub use crate::{Idx2d, Idx3d};

pub use crate::data::{CordSeg, MriScan, NiftiHeaderAttr};

pub use crate::consts::{
    is_background, is_foreground, DISC_LABEL_MAX, DISC_LABEL_MIN, MEAN_DISC_DISTANCE_MM, UNLABELED,
};

pub use crate::detect::{
    detect, detect_with_observer, DetectError, DetectParams, DetectResult, Direction,
    DiscDistanceModel, DiscList, DiscRecord, DiscSeed, PatternWindow, PeakChoice, SearchStep, Seed,
    VertebralLabeling,
};
