/*
 * @Date         : 2026-10-16
 * @Description  : Softmax + CrossEntropy 融合损失，以及 top-1 准确率
 *
 * 标签以类别下标给出（而非 one-hot），损失为 batch 均值：
 * ```text
 * L = -1/N Σ_n log(softmax(x_n)[t_n])
 * ∂L/∂x_n = (softmax(x_n) - onehot(t_n)) / N
 * ```
 */

use super::activation::softmax;
use crate::errors::TensorError;
use crate::tensor::Tensor;

/// 融合损失的前向结果，缓存 softmax 供反向传播使用
#[derive(Debug, Clone)]
pub struct SoftmaxCrossEntropy {
    probabilities: Tensor,
    targets: Vec<usize>,
    loss: f32,
}

impl SoftmaxCrossEntropy {
    /// 调用方需保证`targets`中的每个标签都小于类别数
    pub fn forward(logits: &Tensor, targets: &[usize]) -> Result<Self, TensorError> {
        let (batch_size, num_classes) = logits.dims2("SoftmaxCrossEntropy")?;
        if targets.len() != batch_size {
            return Err(TensorError::shape_mismatch(
                &[batch_size],
                &[targets.len()],
                "标签数量须与 batch 大小一致",
            ));
        }
        if let Some(&bad) = targets.iter().find(|&&t| t >= num_classes) {
            return Err(TensorError::shape_mismatch(
                &[num_classes],
                &[bad],
                "标签超出类别数",
            ));
        }

        let probabilities = softmax(logits)?;
        let p = probabilities.data_as_slice();
        let total: f32 = targets
            .iter()
            .enumerate()
            .map(|(n, &t)| -(p[n * num_classes + t].max(f32::MIN_POSITIVE)).ln())
            .sum();

        Ok(Self {
            probabilities,
            targets: targets.to_vec(),
            loss: total / batch_size.max(1) as f32,
        })
    }

    pub const fn loss(&self) -> f32 {
        self.loss
    }

    pub fn probabilities(&self) -> &Tensor {
        &self.probabilities
    }

    /// top-1 准确率
    pub fn accuracy(&self) -> f32 {
        accuracy(&self.probabilities, &self.targets).unwrap_or(0.0)
    }

    /// ∂L/∂logits
    pub fn backward(&self) -> Tensor {
        let mut grad = self.probabilities.clone();
        let (batch_size, num_classes) = (grad.shape()[0], grad.shape()[1]);
        let scale = 1.0 / batch_size.max(1) as f32;
        let g = grad.data_as_mut_slice();
        for (n, &t) in self.targets.iter().enumerate() {
            g[n * num_classes + t] -= 1.0;
        }
        grad * scale
    }
}

/// 预测（任意打分矩阵[batch, classes]）的 top-1 准确率
pub fn accuracy(scores: &Tensor, targets: &[usize]) -> Result<f32, TensorError> {
    let predicted = scores.argmax_rows()?;
    if predicted.len() != targets.len() {
        return Err(TensorError::shape_mismatch(
            &[predicted.len()],
            &[targets.len()],
            "标签数量须与 batch 大小一致",
        ));
    }
    if targets.is_empty() {
        return Ok(0.0);
    }
    let hits = predicted.iter().zip(targets).filter(|(p, t)| p == t).count();
    Ok(hits as f32 / targets.len() as f32)
}
