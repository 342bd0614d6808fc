use std::ffi::OsString;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::ProgressBar;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{CollisionPolicy, DetectorOptions, Opts};
use crate::pipeline::Coordinator;
use crate::source::SourceIndex;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct BuildCommand {
    #[command(flatten)]
    pub detector: DetectorOptions,
    /// CSV 文件，每行格式为「图片路径,对象字段1,对象字段2,...」，没有表头
    pub csv: PathBuf,
    /// 图片所在的根目录，CSV 中的路径相对于该目录
    pub objects: PathBuf,
    /// 工作线程数量，默认为 CPU 核心数
    #[arg(short = 'j', long, value_name = "N", value_parser = clap::value_parser!(u32).range(1..))]
    pub threads: Option<u32>,
    /// 输出文件，默认将 CSV 文件的 .csv 后缀替换为 .db
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
    /// 多行指向同一对象时的处理方式
    #[arg(long, value_enum, default_value_t = CollisionPolicy::Last)]
    pub collision: CollisionPolicy,
    /// 不显示进度条
    #[arg(short, long)]
    pub quiet: bool,
}

impl BuildCommand {
    pub fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| default_output(&self.csv))
    }
}

impl SubCommandExtend for BuildCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let file = File::open(&self.csv)
            .with_context(|| format!("无法打开 CSV 文件: {}", self.csv.display()))?;
        let index = SourceIndex::parse(BufReader::new(file))
            .with_context(|| format!("解析 CSV 失败: {}", self.csv.display()))?;
        info!("读取 {} 行，共 {} 个对象", index.len(), index.by_object().len());

        let pb = if self.quiet {
            ProgressBar::hidden()
        } else {
            ProgressBar::no_length().with_style(pb_style())
        };
        let mut coordinator = Coordinator::new(self.detector.clone(), &self.objects)
            .collision(self.collision)
            .progress(pb);
        if let Some(n) = self.threads {
            coordinator = coordinator.concurrency(n as usize);
        }
        let database = coordinator.run(&index)?;

        // 流水线成功后才创建输出文件
        let output = self.output_path();
        let file = File::create(&output)
            .with_context(|| format!("无法创建输出文件: {}", output.display()))?;
        let mut writer = BufWriter::new(file);
        database
            .write_to(&mut writer)
            .with_context(|| format!("写入数据库失败，{} 已损坏", output.display()))?;

        info!("已写入 {} 个对象到 {}", database.len(), output.display());
        Ok(())
    }
}

/// `objects.csv` -> `objects.db`，其他文件名直接追加 `.db`
pub fn default_output(csv: &Path) -> PathBuf {
    if csv.extension().is_some_and(|ext| ext == "csv") {
        return csv.with_extension("db");
    }
    let mut name = csv.file_name().map(OsString::from).unwrap_or_default();
    name.push(".db");
    csv.with_file_name(name)
}
