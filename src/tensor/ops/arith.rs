/*
 * @Date         : 2026-10-16
 * @Description  : 张量的逐元素四则运算。两个张量参与运算时形状必须严格一致，否则panic；
 *                 张量与纯数（f32）运算时纯数广播到每个元素。
 *                 注意：这里的乘法是哈达玛积（Hadamard product），矩阵乘法见各层的实现。
 */

use crate::tensor::Tensor;
use std::ops::{Add, AddAssign, Mul, MulAssign, Sub, SubAssign};

fn assert_same_shape(a: &Tensor, b: &Tensor, op: &str) {
    assert!(
        a.is_same_shape(b),
        "形状不一致，故无法{op}：第一个张量的形状为{:?}，第二个张量的形状为{:?}",
        a.shape(),
        b.shape()
    );
}

impl Add for &Tensor {
    type Output = Tensor;

    fn add(self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "相加");
        Tensor::from_array(&self.data + &other.data)
    }
}

impl Sub for &Tensor {
    type Output = Tensor;

    fn sub(self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "相减");
        Tensor::from_array(&self.data - &other.data)
    }
}

impl Mul for &Tensor {
    type Output = Tensor;

    fn mul(self, other: &Tensor) -> Tensor {
        assert_same_shape(self, other, "相乘");
        Tensor::from_array(&self.data * &other.data)
    }
}

impl Mul<f32> for &Tensor {
    type Output = Tensor;

    fn mul(self, scalar: f32) -> Tensor {
        Tensor::from_array(&self.data * scalar)
    }
}

impl Mul<f32> for Tensor {
    type Output = Tensor;

    fn mul(mut self, scalar: f32) -> Tensor {
        self.data *= scalar;
        self
    }
}

impl AddAssign<&Tensor> for Tensor {
    fn add_assign(&mut self, other: &Tensor) {
        assert_same_shape(self, other, "自相加");
        self.data += &other.data;
    }
}

impl SubAssign<&Tensor> for Tensor {
    fn sub_assign(&mut self, other: &Tensor) {
        assert_same_shape(self, other, "自相减");
        self.data -= &other.data;
    }
}

impl MulAssign<f32> for Tensor {
    fn mul_assign(&mut self, scalar: f32) {
        self.data *= scalar;
    }
}

impl Tensor {
    /// 逐元素映射，返回新张量
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Tensor {
        Tensor::from_array(self.data.mapv(f))
    }

    /// 逐元素原地映射
    pub fn map_inplace(&mut self, f: impl Fn(f32) -> f32) {
        self.data.mapv_inplace(f);
    }

    /// 两个同形张量逐元素组合
    pub fn zip_map(&self, other: &Tensor, f: impl Fn(f32, f32) -> f32) -> Tensor {
        assert_same_shape(self, other, "逐元素组合");
        let data = self
            .data_as_slice()
            .iter()
            .zip(other.data_as_slice())
            .map(|(&a, &b)| f(a, b))
            .collect();
        Tensor {
            data: ndarray::Array::from_shape_vec(self.data.raw_dim(), data)
                .expect("同形张量的元素数一致"),
        }
    }
}
