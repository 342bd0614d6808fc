use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    /// 源 CSV 中某一行不足两个字段
    #[error("第 {line} 行：需要图片路径和至少一个对象键字段，实际只有 {fields} 个字段")]
    MalformedRow { line: usize, fields: usize },

    #[error("第 {line} 行：引号未闭合")]
    UnterminatedQuote { line: usize },

    #[error("无法读取图片 {}：{reason}", path.display())]
    ImageLoad { path: PathBuf, reason: String },

    #[error("检测特征点失败：{}", path.display())]
    Detection {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("无法创建特征检测器")]
    DetectorInit(#[source] Box<Error>),

    #[error("特征点数量 {keypoints} 与描述符行数 {rows} 不一致")]
    KeypointMismatch { keypoints: usize, rows: usize },

    /// 合并同名对象时描述符宽度不一致
    #[error("对象 {title}：描述符宽度 {found} 与 {expected} 不一致")]
    WidthMismatch { title: String, expected: usize, found: usize },

    /// 字段超出 u16 的表示范围
    #[error("对象 {title}：{field} = {value} 超出 u16 范围")]
    Serialization { title: String, field: &'static str, value: usize },

    #[error("数据库第 {entry} 个条目不完整")]
    TruncatedEntry { entry: usize },

    #[error("数据库第 {entry} 个条目的标题不是合法的 UTF-8")]
    InvalidTitle { entry: usize },

    #[error("汇总线程在收集完所有结果之前退出")]
    Aggregation,

    #[error("无法创建线程池")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    OpenCv(#[from] opencv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
