#![allow(dead_code)]

use std::path::Path;

use opencv::core::{CV_8UC1, Scalar, Vector};
use opencv::imgcodecs;
use opencv::prelude::*;

/// 写入一张纯色灰度图
pub fn write_flat(path: &Path, rows: i32, cols: i32, value: u8) {
    let mat = Mat::new_rows_cols_with_default(rows, cols, CV_8UC1, Scalar::all(value as f64))
        .unwrap();
    write(path, &mat);
}

/// 黑底上的 3x3 个白色方块，BRISK 能在方块的角上检测到特征点
pub fn write_squares(path: &Path) {
    let mut mat = Mat::new_rows_cols_with_default(320, 320, CV_8UC1, Scalar::all(0.)).unwrap();
    for r in 60..260 {
        for c in 60..260 {
            if (r - 60) % 80 < 40 && (c - 60) % 80 < 40 {
                *mat.at_2d_mut::<u8>(r, c).unwrap() = 255;
            }
        }
    }
    write(path, &mat);
}

fn write(path: &Path, mat: &Mat) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    assert!(imgcodecs::imwrite(path.to_str().unwrap(), mat, &Vector::new()).unwrap());
}
