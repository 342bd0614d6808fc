use std::io;
use std::path::Path;

use opencv::imgcodecs;
use opencv::prelude::*;

use crate::error::{Error, Result};

/// 以单通道灰度图读取图片
pub fn imread(path: &Path) -> Result<Mat> {
    let load_error =
        |reason: &str| Error::ImageLoad { path: path.to_path_buf(), reason: reason.to_owned() };

    if !path.is_file() {
        return Err(load_error("文件不存在"));
    }
    let filename = path.to_str().ok_or_else(|| load_error("路径不是合法的 UTF-8"))?;
    let image = imgcodecs::imread(filename, imgcodecs::IMREAD_GRAYSCALE)
        .map_err(|e| load_error(&e.message))?;
    // OpenCV 读取失败时不会报错，而是返回空矩阵
    if image.empty() {
        return Err(load_error("无法解码或不支持的图片格式"));
    }
    Ok(image)
}

/// 写入图片，格式由扩展名决定
pub fn imwrite(path: &Path, image: &impl opencv::core::ToInputArray) -> Result<()> {
    let invalid = |msg: &str| {
        Error::Io(io::Error::new(io::ErrorKind::InvalidInput, format!("{}: {}", msg, path.display())))
    };

    let filename = path.to_str().ok_or_else(|| invalid("路径不是合法的 UTF-8"))?;
    let flags = opencv::core::Vector::<i32>::new();
    if !imgcodecs::imwrite(filename, image, &flags)? {
        return Err(invalid("写入图片失败"));
    }
    Ok(())
}
