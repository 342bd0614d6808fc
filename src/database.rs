//! 对象数据库的二进制格式
//!
//! 文件由若干条目直接拼接而成，没有文件头、条目数、校验和或版本号，
//! 读取时需要顺序解析直到文件结束。每个条目的布局（整数均为大端序）：
//!
//! ```text
//! u16     title_len
//! u8      title[title_len]            UTF-8，无结尾符
//! u16     n_keypoints
//! f32     keypoints[n_keypoints][2]   x, y
//! u16     descriptor_width            没有特征点时为 0
//! u8      descriptors[n_keypoints * descriptor_width]   行优先
//! ```

use std::collections::HashMap;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;

use crate::detector::{Features, Keypoint};
use crate::error::{Error, Result};
use crate::matrix::{DescriptorMatrix, Matrix};
use crate::source::ObjectKey;

/// 数据库中的一个条目
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectRecord {
    pub title: String,
    features: Features,
}

impl ObjectRecord {
    pub fn new(title: impl Into<String>, features: Features) -> Self {
        Self { title: title.into(), features }
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        self.features.keypoints()
    }

    pub fn descriptors(&self) -> &DescriptorMatrix {
        self.features.descriptors()
    }

    /// 写入时使用的描述符宽度，没有特征点时为 0
    pub fn descriptor_width(&self) -> usize {
        if self.features.is_empty() { 0 } else { self.descriptors().width() }
    }

    pub fn summary(&self) -> RecordSummary<'_> {
        RecordSummary {
            title: &self.title,
            keypoints: self.keypoints().len(),
            descriptor_width: self.descriptor_width(),
        }
    }

    /// 写入单个条目，所有长度字段在写入任何字节之前检查
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let title = self.title.as_bytes();
        let title_len = self.checked_u16("title_len", title.len())?;
        let n_keypoints = self.checked_u16("n_keypoints", self.keypoints().len())?;
        let width = self.checked_u16("descriptor_width", self.descriptor_width())?;

        w.write_u16::<BigEndian>(title_len)?;
        w.write_all(title)?;
        w.write_u16::<BigEndian>(n_keypoints)?;
        for kp in self.keypoints() {
            w.write_f32::<BigEndian>(kp.x)?;
            w.write_f32::<BigEndian>(kp.y)?;
        }
        w.write_u16::<BigEndian>(width)?;
        if width > 0 {
            w.write_all(self.descriptors().as_bytes())?;
        }
        Ok(())
    }

    fn checked_u16(&self, field: &'static str, value: usize) -> Result<u16> {
        u16::try_from(value).map_err(|_| Error::Serialization {
            title: self.title.clone(),
            field,
            value,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct RecordSummary<'a> {
    pub title: &'a str,
    pub keypoints: usize,
    pub descriptor_width: usize,
}

/// 按顺序写入所有条目
///
/// 出错时已经写入的条目不会回滚，输出应视为无效。
pub fn write_database<'a, W, I>(w: &mut W, records: I) -> Result<()>
where
    W: Write,
    I: IntoIterator<Item = &'a ObjectRecord>,
{
    for record in records {
        record.write_to(w)?;
    }
    w.flush()?;
    Ok(())
}

/// 顺序读取数据库条目，在条目边界遇到文件结束时停止
pub struct DatabaseReader<R> {
    reader: R,
    entry: usize,
    done: bool,
}

impl<R: Read> DatabaseReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, entry: 0, done: false }
    }

    fn read_entry(&mut self) -> Result<Option<ObjectRecord>> {
        let mut len = [0u8; 2];
        if !self.read_or_eof(&mut len)? {
            return Ok(None);
        }
        let title_len = u16::from_be_bytes(len) as usize;

        let mut title = vec![0u8; title_len];
        self.read_exact(&mut title)?;
        let title =
            String::from_utf8(title).map_err(|_| Error::InvalidTitle { entry: self.entry })?;

        let n_keypoints = self.truncated(|r| r.read_u16::<BigEndian>())? as usize;
        let mut keypoints = Vec::with_capacity(n_keypoints);
        for _ in 0..n_keypoints {
            let x = self.truncated(|r| r.read_f32::<BigEndian>())?;
            let y = self.truncated(|r| r.read_f32::<BigEndian>())?;
            keypoints.push(Keypoint { x, y });
        }

        let width = self.truncated(|r| r.read_u16::<BigEndian>())? as usize;
        // 按实际读到的字节增长缓冲区，不信任头部给出的长度
        let len = n_keypoints * width;
        let mut data = Vec::new();
        let read = self.truncated(|r| r.take(len as u64).read_to_end(&mut data))?;
        if read < len {
            return Err(Error::TruncatedEntry { entry: self.entry });
        }

        let descriptors = if n_keypoints == 0 {
            DescriptorMatrix::default()
        } else {
            DescriptorMatrix::from_raw(n_keypoints, width, data)
                .ok_or(Error::TruncatedEntry { entry: self.entry })?
        };
        let features = Features::new(keypoints, descriptors)?;
        Ok(Some(ObjectRecord::new(title, features)))
    }

    /// 读满缓冲区返回 true；一个字节都没有读到时返回 false
    fn read_or_eof(&mut self, buf: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(Error::TruncatedEntry { entry: self.entry }),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.truncated(|r| r.read_exact(buf))
    }

    fn truncated<T>(&mut self, f: impl FnOnce(&mut R) -> io::Result<T>) -> Result<T> {
        f(&mut self.reader).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedEntry { entry: self.entry },
            _ => e.into(),
        })
    }
}

impl<R: Read> Iterator for DatabaseReader<R> {
    type Item = Result<ObjectRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self.read_entry().transpose();
        match &result {
            Some(Ok(_)) => self.entry += 1,
            _ => self.done = true,
        }
        result
    }
}

/// 读取完整的数据库
pub fn read_database<R: Read>(reader: R) -> Result<Vec<ObjectRecord>> {
    DatabaseReader::new(reader).collect()
}

/// 流水线的结果：每个对象键对应一个条目
///
/// 条目按照对象键在 CSV 中首次出现的顺序排列，读取方不应依赖这一顺序。
#[derive(Debug, Default)]
pub struct Database {
    records: Vec<ObjectRecord>,
    index: HashMap<ObjectKey, usize>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入条目，已存在的键会被替换并保持原有位置
    pub fn insert(&mut self, key: ObjectKey, record: ObjectRecord) {
        match self.index.get(&key) {
            Some(&i) => self.records[i] = record,
            None => {
                self.index.insert(key, self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, key: &ObjectKey) -> Option<&ObjectRecord> {
        self.index.get(key).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[ObjectRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_database(w, &self.records)
    }
}
