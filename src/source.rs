//! 源索引：解析「图片路径,键字段...」格式的 CSV

use std::collections::HashMap;
use std::fmt;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// 标题中键字段之间的分隔符
pub const TITLE_SEPARATOR: &str = ":";

/// 对象键，由若干有序字段组成，按完整序列比较
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey(Vec<String>);

impl ObjectKey {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    pub fn fields(&self) -> &[String] {
        &self.0
    }

    /// 数据库条目的标题
    pub fn title(&self) -> String {
        self.0.join(TITLE_SEPARATOR)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    /// CSV 中的行号，从 1 开始
    pub line: usize,
    pub path: PathBuf,
    pub key: ObjectKey,
}

/// 按文件顺序保存的所有源行
#[derive(Debug, Default)]
pub struct SourceIndex {
    rows: Vec<SourceRow>,
}

impl SourceIndex {
    /// 解析 CSV，没有表头，空行会被跳过
    pub fn parse<R: BufRead>(reader: R) -> Result<Self> {
        let mut rows = vec![];
        for (i, line) in reader.lines().enumerate() {
            let line_no = i + 1;
            let line = line?;
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if line.is_empty() {
                continue;
            }

            let mut fields = split_fields(line, line_no)?;
            if fields.len() < 2 {
                return Err(Error::MalformedRow { line: line_no, fields: fields.len() });
            }
            let key = ObjectKey(fields.split_off(1));
            let path = PathBuf::from(fields.swap_remove(0));
            rows.push(SourceRow { line: line_no, path, key });
        }
        Ok(Self { rows })
    }

    pub fn rows(&self) -> &[SourceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 对象键到图片路径的映射，同一个键的路径按文件顺序排列
    pub fn by_object(&self) -> HashMap<&ObjectKey, Vec<&Path>> {
        let mut map: HashMap<_, Vec<_>> = HashMap::new();
        for row in &self.rows {
            map.entry(&row.key).or_default().push(row.path.as_path());
        }
        map
    }
}

/// 按逗号拆分一行，支持双引号包裹的字段以及 `""` 转义
fn split_fields(line: &str, line_no: usize) -> Result<Vec<String>> {
    let mut fields = vec![];
    let mut field = String::new();
    let mut chars = line.chars().peekable();
    let mut quoted = false;

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    quoted = false;
                }
            }
            '"' if field.is_empty() => quoted = true,
            ',' if !quoted => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    if quoted {
        return Err(Error::UnterminatedQuote { line: line_no });
    }
    fields.push(field);
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<SourceIndex> {
        SourceIndex::parse(s.as_bytes())
    }

    #[test]
    fn parse_rows_in_order() {
        let index = parse("img1.png,widget\nimg2.png,widget\nimg3.png,gizmo,blue\n").unwrap();
        let rows = index.rows();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].path, PathBuf::from("img1.png"));
        assert_eq!(rows[0].key, ObjectKey::new(["widget"]));
        assert_eq!(rows[2].key, ObjectKey::new(["gizmo", "blue"]));
        assert_eq!(rows[2].line, 3);
    }

    #[test]
    fn group_by_full_key() {
        let index = parse("a.png,x,1\nb.png,x,2\nc.png,x,1\n").unwrap();
        let map = index.by_object();

        assert_eq!(map.len(), 2);
        assert_eq!(
            map[&ObjectKey::new(["x", "1"])],
            vec![Path::new("a.png"), Path::new("c.png")]
        );
        assert_eq!(map[&ObjectKey::new(["x", "2"])], vec![Path::new("b.png")]);
    }

    #[test]
    fn row_without_key_is_malformed() {
        let err = parse("a.png,widget\nlonely.png\n").unwrap_err();
        assert!(matches!(err, Error::MalformedRow { line: 2, fields: 1 }));
    }

    #[test]
    fn quoted_fields() {
        let index = parse("\"dir,with,commas/a.png\",\"say \"\"hi\"\"\",x\r\n").unwrap();
        let row = &index.rows()[0];

        assert_eq!(row.path, PathBuf::from("dir,with,commas/a.png"));
        assert_eq!(row.key.fields(), &["say \"hi\"".to_string(), "x".to_string()]);
    }

    #[test]
    fn unterminated_quote() {
        let err = parse("\"a.png,widget\n").unwrap_err();
        assert!(matches!(err, Error::UnterminatedQuote { line: 1 }));
    }

    #[test]
    fn blank_lines_are_skipped() {
        let index = parse("\na.png,widget\n\r\n\nb.png,gizmo").unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.rows()[1].line, 5);
    }

    #[test]
    fn empty_key_field_is_still_a_field() {
        let index = parse("a.png,\n").unwrap();
        assert_eq!(index.rows()[0].key.title(), "");
    }

    #[test]
    fn title_joins_fields() {
        assert_eq!(ObjectKey::new(["书", "第二版"]).title(), "书:第二版");
    }
}
