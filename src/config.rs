use clap::{Parser, Subcommand, ValueEnum};

use crate::cli::*;

#[derive(Parser, Debug, Clone, PartialEq)]
pub struct DetectorOptions {
    /// BRISK AGAST 角点检测阈值
    #[arg(long, value_name = "THRESHOLD", default_value_t = 30)]
    pub threshold: i32,
    /// BRISK 检测的金字塔组数，0 表示只使用单一尺度
    #[arg(long, value_name = "N", default_value_t = 3, value_parser = clap::value_parser!(i32).range(0..))]
    pub octaves: i32,
    /// BRISK 采样模式的缩放系数
    #[arg(long, value_name = "SCALE", default_value_t = 1.0, value_parser = parse_positive_f32)]
    pub pattern_scale: f32,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self { threshold: 30, octaves: 3, pattern_scale: 1.0 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "briskdb", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 根据 CSV 计算所有图片的特征点并生成对象数据库
    Build(BuildCommand),
    /// 列出数据库中的所有条目
    Inspect(InspectCommand),
    /// 在图片上绘制检测到的特征点
    Show(ShowCommand),
}

/// 多行 CSV 指向同一个对象时的处理方式
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionPolicy {
    /// 保留 CSV 中最后一行的结果
    #[default]
    Last,
    /// 按 CSV 顺序拼接所有行的特征点
    Merge,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

fn parse_positive_f32(s: &str) -> Result<f32, String> {
    let v: f32 = s.parse().map_err(|_| format!("无效的数值: {}", s))?;
    if v.is_finite() && v > 0. { Ok(v) } else { Err(format!("必须为正数: {}", s)) }
}
