/*
 * @Date         : 2026-10-16
 * @Description  : 激活函数及其反向传播
 *
 * - relu(x) = max(0, x)，反向：上游梯度乘以 x>0 的掩码
 * - sigmoid(x) = 1 / (1 + e^(-x))，反向：s * (1 - s)
 * - softmax 按行计算，先减去行最大值保证数值稳定
 */

use crate::errors::TensorError;
use crate::tensor::Tensor;

pub fn relu(x: &Tensor) -> Tensor {
    x.map(|v| v.max(0.0))
}

/// `activated`为前向 ReLU 的输出（与输入同号，可直接作为掩码）
pub fn relu_backward(activated: &Tensor, upstream: &Tensor) -> Tensor {
    upstream.zip_map(activated, |g, a| if a > 0.0 { g } else { 0.0 })
}

/// 数值稳定的 sigmoid：对负输入改写为 e^x / (1 + e^x)，避免 e^(-x) 溢出
pub fn sigmoid(x: &Tensor) -> Tensor {
    x.map(|v| {
        if v >= 0.0 {
            1.0 / (1.0 + (-v).exp())
        } else {
            let e = v.exp();
            e / (1.0 + e)
        }
    })
}

/// `activated`为前向 sigmoid 的输出
pub fn sigmoid_backward(activated: &Tensor, upstream: &Tensor) -> Tensor {
    upstream.zip_map(activated, |g, s| g * s * (1.0 - s))
}

/// 对[batch, num_classes]按行计算 softmax
pub fn softmax(logits: &Tensor) -> Result<Tensor, TensorError> {
    let (batch_size, num_classes) = logits.dims2("softmax")?;
    let mut out = logits.data_as_slice().to_vec();
    for row in out.chunks_mut(num_classes.max(1)).take(batch_size) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        for v in row.iter_mut() {
            *v /= sum;
        }
    }
    Tensor::from_vec(out, &[batch_size, num_classes])
}
