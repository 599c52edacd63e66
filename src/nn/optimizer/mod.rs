/*
 * @Date         : 2026-10-16
 * @Description  : 优化器模块：按`Gradients`更新`AttentionDeconvNet`的参数
 */

mod adam;

pub use adam::{Adam, WeightDecay};

use super::ModelError;
use super::model::{AttentionDeconvNet, Gradients};

/// 优化器核心 trait
///
/// 训练循环：
/// ```ignore
/// let (loss, grads) = model.backward_with_attention(&x, &aux, &labels, scope)?;
/// optimizer.step(&mut model, &grads)?; // 只更新参数，不做前向/反向
/// ```
pub trait Optimizer {
    /// 用已算好的梯度更新参数；`grads`中没有的参数保持不变
    fn step(&mut self, model: &mut AttentionDeconvNet, grads: &Gradients) -> Result<(), ModelError>;

    /// 重置累积状态
    fn reset(&mut self);

    fn learning_rate(&self) -> f32;

    fn set_learning_rate(&mut self, lr: f32);
}
