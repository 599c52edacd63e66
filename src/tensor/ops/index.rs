use crate::tensor::Tensor;
use std::ops::{Index, IndexMut};

// 形如`tensor[[b, c, h, w]]`的逐元素索引，越界时panic（与ndarray一致）
impl<const N: usize> Index<[usize; N]> for Tensor {
    type Output = f32;

    fn index(&self, index: [usize; N]) -> &f32 {
        &self.data[&index[..]]
    }
}

impl<const N: usize> IndexMut<[usize; N]> for Tensor {
    fn index_mut(&mut self, index: [usize; N]) -> &mut f32 {
        &mut self.data[&index[..]]
    }
}
