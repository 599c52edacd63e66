use crate::tensor::Tensor;
use approx::AbsDiffEq;

impl Tensor {
    /// 所有元素之和
    pub fn sum(&self) -> f32 {
        self.data.sum()
    }

    /// 所有元素的均值，空张量返回0
    pub fn mean(&self) -> f32 {
        if self.size() == 0 {
            0.0
        } else {
            self.sum() / self.size() as f32
        }
    }

    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    pub fn min_value(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }

    /// 对[rows, cols]矩阵按列求和，得到[1, cols]（用于偏置梯度）
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.shape().last().copied().unwrap_or(1);
        let rows = self.size() / cols.max(1);
        let mut out = vec![0.0f32; cols];
        for row in self.data_as_slice().chunks(cols.max(1)).take(rows) {
            for (acc, v) in out.iter_mut().zip(row) {
                *acc += v;
            }
        }
        Tensor::new(&out, &[1, cols])
    }

    pub fn is_all_finite(&self) -> bool {
        self.data.iter().all(|v| v.is_finite())
    }
}

impl AbsDiffEq for Tensor {
    type Epsilon = f32;

    fn default_epsilon() -> f32 {
        f32::EPSILON
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f32) -> bool {
        self.is_same_shape(other)
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.abs_diff_eq(b, epsilon))
    }
}
