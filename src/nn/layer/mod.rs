/*
 * @Date         : 2026-10-16
 * @Description  : Layer 模块 - 带显式前向/反向传播的网络层与算子
 *
 * 每个层只保存参数，前向所需的中间结果由调用方保留并在反向传播时传回，
 * 因此层本身无内部状态，可在多次前向调用间安全共享。
 */

mod activation;
mod conv2d;
mod linear;
mod loss;
mod max_pool2d;

pub use activation::{relu, relu_backward, sigmoid, sigmoid_backward, softmax};
pub use conv2d::{
    Conv2d, Conv2dGrads, conv_output_size, conv_transpose2d, conv2d, conv2d_weight_grad,
    transposed_output_size,
};
pub use linear::{Linear, LinearGrads};
pub use loss::{SoftmaxCrossEntropy, accuracy};
pub use max_pool2d::{PoolSpec, PoolingMode, SwitchMap, max_pool2d, max_unpool2d};

use crate::tensor::Tensor;
use rand::Rng;

/// 参数初始化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Init {
    /// N(0, 1/fan_in)
    LeCunNormal,
    Zeros,
}

impl Init {
    /// 卷积核[out, in, kH, kW]的 fan_in 为 in*kH*kW；全连接权重[in, out]的 fan_in 为 in
    pub fn tensor<R: Rng + ?Sized>(&self, shape: &[usize], rng: &mut R) -> Tensor {
        match self {
            Self::Zeros => Tensor::zeros(shape),
            Self::LeCunNormal => {
                let fan_in = match shape {
                    [_, rest @ ..] if shape.len() == 4 => rest.iter().product(),
                    [fan_in, ..] => *fan_in,
                    [] => 1,
                };
                let std_dev = (1.0 / fan_in.max(1) as f32).sqrt();
                Tensor::new_normal(0.0, std_dev, shape, rng)
            }
        }
    }
}
