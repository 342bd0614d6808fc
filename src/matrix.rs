use opencv::prelude::*;

use crate::error::Result;

/// An abstraction of 2d u8 array
pub trait Matrix {
    /// Return matrix width
    fn width(&self) -> usize;
    /// Return matrix height
    fn height(&self) -> usize;
    /// Get specific line
    fn line(&self, n: usize) -> &[u8];
    /// Iterate over lines
    fn iter_lines(&self) -> MatrixLineIterator<'_>
    where
        Self: Sized,
    {
        MatrixLineIterator { matrix: self, current_line: 0 }
    }
}

pub struct MatrixLineIterator<'a> {
    matrix: &'a dyn Matrix,
    current_line: usize,
}

impl<'a> Iterator for MatrixLineIterator<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_line < self.matrix.height() {
            self.current_line += 1;
            Some(self.matrix.line(self.current_line - 1))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.matrix.height() - self.current_line;
        (rest, Some(rest))
    }
}

impl ExactSizeIterator for MatrixLineIterator<'_> {}

/// 行优先存储的描述符矩阵，每行对应一个特征点
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DescriptorMatrix {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl DescriptorMatrix {
    pub fn new(width: usize) -> Self {
        Self { width, height: 0, data: vec![] }
    }

    /// 从行优先的原始字节构造，`data.len()` 必须等于 `height * width`
    ///
    /// 宽度为 0 时仍然保留行数，以便与特征点一一对应
    pub fn from_raw(height: usize, width: usize, data: Vec<u8>) -> Option<Self> {
        (height.checked_mul(width)? == data.len()).then_some(Self { width, height, data })
    }

    /// 复制 OpenCV 检测器输出的描述符矩阵，空矩阵得到 0x0 的结果
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        if mat.empty() {
            return Ok(Self::default());
        }
        let data = if mat.is_continuous() {
            mat.data_typed::<u8>()?.to_vec()
        } else {
            mat.try_clone()?.data_typed::<u8>()?.to_vec()
        };
        Ok(Self { width: mat.cols() as usize, height: mat.rows() as usize, data })
    }

    pub fn push(&mut self, v: &[u8]) {
        assert_eq!(self.width, v.len());
        self.height += 1;
        self.data.extend_from_slice(v);
    }

    /// 追加另一个矩阵的所有行，宽度必须一致
    pub fn append(&mut self, other: &DescriptorMatrix) {
        assert_eq!(self.width, other.width);
        self.height += other.height;
        self.data.extend_from_slice(&other.data);
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl Matrix for DescriptorMatrix {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn line(&self, n: usize) -> &[u8] {
        &self.data[n * self.width..(n + 1) * self.width]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::prelude::*;

    #[test]
    fn from_mat_keeps_row_major_order() {
        let mat = Mat::from_slice_2d(&[[1u8, 2, 3], [4, 5, 6]]).unwrap();
        let des = DescriptorMatrix::from_mat(&mat).unwrap();

        assert_eq!(des.width(), 3);
        assert_eq!(des.height(), 2);
        assert_eq!(des.as_bytes(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn from_empty_mat() {
        let des = DescriptorMatrix::from_mat(&Mat::default()).unwrap();
        assert_eq!(des, DescriptorMatrix::default());
        assert_eq!(des.width(), 0);
        assert!(des.is_empty());
    }

    #[test]
    fn from_raw_checks_length() {
        assert!(DescriptorMatrix::from_raw(2, 4, vec![0; 6]).is_none());
        assert!(DescriptorMatrix::from_raw(1, 0, vec![1]).is_none());
        assert_eq!(DescriptorMatrix::from_raw(3, 2, vec![0; 6]).unwrap().height(), 3);
    }

    #[test]
    fn zero_width_keeps_rows() {
        let des = DescriptorMatrix::from_raw(2, 0, vec![]).unwrap();
        assert_eq!(des.height(), 2);
        assert_eq!(des.iter_lines().collect::<Vec<_>>(), vec![&[] as &[u8]; 2]);

        let mut pushed = DescriptorMatrix::new(0);
        pushed.push(&[]);
        pushed.push(&[]);
        assert_eq!(des, pushed);
    }

    #[test]
    fn append_rows() {
        let mut a = DescriptorMatrix::new(2);
        a.push(&[1, 2]);
        let mut b = DescriptorMatrix::new(2);
        b.push(&[3, 4]);
        b.push(&[5, 6]);
        a.append(&b);

        assert_eq!(a.height(), 3);
        assert_eq!(a.iter_lines().collect::<Vec<_>>(), vec![&[1, 2][..], &[3, 4], &[5, 6]]);
    }
}
