use indicatif::ProgressStyle;
use opencv::core::{KeyPoint, Scalar, Vector};
use opencv::features2d;
use opencv::prelude::*;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

pub fn draw_keypoints(image: &Mat, keypoints: &Vector<KeyPoint>) -> opencv::Result<Mat> {
    let mut output = Mat::default();
    features2d::draw_keypoints(
        image,
        keypoints,
        &mut output,
        Scalar::all(-1.0),
        features2d::DrawMatchesFlags::DRAW_RICH_KEYPOINTS,
    )?;
    Ok(output)
}
