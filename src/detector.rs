use opencv::core::{KeyPoint, Ptr, Vector};
use opencv::features2d::BRISK;
use opencv::prelude::*;

use crate::config::DetectorOptions;
use crate::error::{Error, Result};
use crate::matrix::{DescriptorMatrix, Matrix};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl From<&KeyPoint> for Keypoint {
    fn from(kp: &KeyPoint) -> Self {
        let pt = kp.pt();
        Self { x: pt.x, y: pt.y }
    }
}

/// 单张图片的检测结果，特征点与描述符矩阵的行一一对应
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Features {
    keypoints: Vec<Keypoint>,
    descriptors: DescriptorMatrix,
}

impl Features {
    pub fn new(keypoints: Vec<Keypoint>, descriptors: DescriptorMatrix) -> Result<Self> {
        if keypoints.len() != descriptors.height() {
            return Err(Error::KeypointMismatch {
                keypoints: keypoints.len(),
                rows: descriptors.height(),
            });
        }
        Ok(Self { keypoints, descriptors })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &DescriptorMatrix {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn into_parts(self) -> (Vec<Keypoint>, DescriptorMatrix) {
        (self.keypoints, self.descriptors)
    }
}

/// 特征检测器，输入单通道灰度图
pub trait Detector {
    fn detect(&mut self, image: &Mat) -> Result<Features>;
}

/// 为每个工作线程创建独立的检测器
pub trait DetectorFactory: Sync {
    type Detector: Detector;

    fn create(&self) -> Result<Self::Detector>;
}

impl<D, F> DetectorFactory for F
where
    D: Detector,
    F: Fn() -> Result<D> + Sync,
{
    type Detector = D;

    fn create(&self) -> Result<D> {
        self()
    }
}

impl DetectorFactory for DetectorOptions {
    type Detector = BriskDetector;

    fn create(&self) -> Result<BriskDetector> {
        BriskDetector::create(self)
    }
}

pub struct BriskDetector {
    brisk: Ptr<BRISK>,
}

impl BriskDetector {
    pub fn create(opts: &DetectorOptions) -> Result<Self> {
        let brisk = BRISK::create(opts.threshold, opts.octaves, opts.pattern_scale)?;
        Ok(Self { brisk })
    }

    /// 只检测特征点，保留 OpenCV 的完整信息，用于绘制
    pub fn detect_keypoints(&mut self, image: &Mat) -> Result<Vector<KeyPoint>> {
        let mask = Mat::default();
        let mut keypoints = Vector::<KeyPoint>::new();
        self.brisk.detect(image, &mut keypoints, &mask)?;
        Ok(keypoints)
    }
}

impl Detector for BriskDetector {
    fn detect(&mut self, image: &Mat) -> Result<Features> {
        let mask = Mat::default();
        let mut keypoints = Vector::<KeyPoint>::new();
        let mut descriptors = Mat::default();
        self.brisk.detect_and_compute(image, &mask, &mut keypoints, &mut descriptors, false)?;

        let keypoints = keypoints.iter().map(|kp| Keypoint::from(&kp)).collect::<Vec<_>>();
        let descriptors = if keypoints.is_empty() {
            DescriptorMatrix::default()
        } else {
            DescriptorMatrix::from_mat(&descriptors)?
        };
        Features::new(keypoints, descriptors)
    }
}
