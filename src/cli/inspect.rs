use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use crate::cli::SubCommandExtend;
use crate::config::{Opts, OutputFormat};
use crate::database::{ObjectRecord, read_database};

#[derive(Parser, Debug, Clone)]
pub struct InspectCommand {
    /// 数据库文件路径
    pub database: PathBuf,
    /// 输出格式
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl SubCommandExtend for InspectCommand {
    fn run(&self, _opts: &Opts) -> Result<()> {
        let file = File::open(&self.database)
            .with_context(|| format!("无法打开数据库: {}", self.database.display()))?;
        let records = read_database(BufReader::new(file))
            .with_context(|| format!("读取数据库失败: {}", self.database.display()))?;
        print_records(&records, self.format)
    }
}

fn print_records(records: &[ObjectRecord], format: OutputFormat) -> Result<()> {
    let summaries = records.iter().map(ObjectRecord::summary).collect::<Vec<_>>();
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&summaries)?)
        }
        OutputFormat::Table => {
            for s in summaries {
                println!("{}\t{}\t{}", s.keypoints, s.descriptor_width, s.title);
            }
        }
    }
    Ok(())
}
