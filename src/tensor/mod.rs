/*
 * @Date         : 2026-10-16
 * @Description  : 张量：基于`ndarray`的f32多维数组，统一采用 Batch-First 布局，
 *                 特征图为[batch, C, H, W]，全连接阶段为[batch, features]。
 *                 所有构造路径都保证数据为标准（行优先）连续布局，
 *                 因此各算子可以直接以切片方式读写底层数据。
 */

use ndarray::{Array, ArrayD, ArrayViewD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::TensorError;

mod ops {
    pub mod arith;
    pub mod index;
    pub mod reduce;
}
mod shape;


/// 定义张量的结构体。其可以是标量、向量、矩阵或更高维度的数组。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    data: ArrayD<f32>,
}

impl Tensor {
    /// 创建一个张量。`data`的长度必须和`shape`中所有元素的乘积相等，否则panic；
    /// 需要可恢复的错误时请用[`Tensor::from_vec`]。
    pub fn new(data: &[f32], shape: &[usize]) -> Tensor {
        match Self::from_vec(data.to_vec(), shape) {
            Ok(tensor) => tensor,
            Err(e) => panic!("{e}"),
        }
    }

    /// 由数据和形状创建张量，长度不符时返回错误
    pub fn from_vec(data: Vec<f32>, shape: &[usize]) -> Result<Tensor, TensorError> {
        let len = data.len();
        Array::from_shape_vec(IxDyn(shape), data)
            .map(|data| Tensor { data })
            .map_err(|_| TensorError::IncompatibleShape {
                from: vec![len],
                to: shape.to_vec(),
            })
    }

    /// 由任意布局的`ndarray`数组创建张量（内部会转为标准布局）
    pub fn from_array(array: ArrayD<f32>) -> Tensor {
        let data = if array.is_standard_layout() {
            array
        } else {
            array.as_standard_layout().into_owned()
        };
        Tensor { data }
    }

    pub fn zeros(shape: &[usize]) -> Tensor {
        Tensor {
            data: ArrayD::zeros(IxDyn(shape)),
        }
    }

    pub fn filled(value: f32, shape: &[usize]) -> Tensor {
        Tensor {
            data: ArrayD::from_elem(IxDyn(shape), value),
        }
    }

    /// 创建一个服从正态分布的随机张量（Box-Muller 变换），由调用方提供随机数生成器，
    /// 便于用种子复现同一组初始权重。
    pub fn new_normal<R: Rng + ?Sized>(mean: f32, std_dev: f32, shape: &[usize], rng: &mut R) -> Tensor {
        let data_len = shape.iter().product::<usize>();
        let mut data = Vec::with_capacity(data_len);

        while data.len() < data_len {
            // u1 取 (0, 1]，避免 ln(0)
            let u1: f32 = 1.0 - rng.r#gen::<f32>();
            let u2: f32 = rng.r#gen();
            let r = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f32::consts::PI * u2;
            let z0 = mean + std_dev * r * theta.cos();
            let z1 = mean + std_dev * r * theta.sin();

            if z0.is_finite() {
                data.push(z0);
            }
            if data.len() < data_len && z1.is_finite() {
                data.push(z1);
            }
        }

        Tensor::new(&data, shape)
    }

    pub fn view(&self) -> ArrayViewD<'_, f32> {
        self.data.view()
    }

    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// 以行优先切片形式读取全部数据
    pub fn data_as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("张量数据应始终为标准连续布局")
    }

    pub fn data_as_mut_slice(&mut self) -> &mut [f32] {
        self.data
            .as_slice_mut()
            .expect("张量数据应始终为标准连续布局")
    }

    pub fn into_vec(self) -> Vec<f32> {
        self.data.into_raw_vec()
    }
}
