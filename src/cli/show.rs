use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{DetectorOptions, Opts};
use crate::detector::BriskDetector;
use crate::{image, utils};

#[derive(Parser, Debug, Clone)]
pub struct ShowCommand {
    #[command(flatten)]
    pub detector: DetectorOptions,
    /// 图片路径
    pub image: PathBuf,
    /// 输出图片路径，默认为 `<图片名>.keypoints.png`
    pub output: Option<PathBuf>,
}

impl SubCommandExtend for ShowCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let image = image::imread(&self.image)?;

        let mut brisk = BriskDetector::create(&self.detector)?;
        let kps = brisk.detect_keypoints(&image)?;
        let output = utils::draw_keypoints(&image, &kps)?;

        let path = self.output.clone().unwrap_or_else(|| keypoints_path(&self.image));
        image::imwrite(&path, &output)?;
        info!("检测到 {} 个特征点，已保存到 {}", kps.len(), path.display());
        Ok(())
    }
}

fn keypoints_path(image: &Path) -> PathBuf {
    let stem = image.file_stem().unwrap_or_default().to_string_lossy();
    image.with_file_name(format!("{}.keypoints.png", stem))
}
