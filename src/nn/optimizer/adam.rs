/*
 * @Date         : 2026-10-16
 * @Description  : Adam优化器实现（带权重衰减钩子）
 *
 * Adam: Adaptive Moment Estimation
 * - g = g + λθ（权重衰减钩子，λ 为 0 时不生效）
 * - m = β1 * m + (1 - β1) * g
 * - v = β2 * v + (1 - β2) * g²
 * - θ = θ - α * m_hat / (√v_hat + ε)
 */

use super::Optimizer;
use crate::nn::ModelError;
use crate::nn::checkpoint::{read_checkpoint, write_checkpoint};
use crate::nn::model::{AttentionDeconvNet, Gradients, ParamId};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// 更新前把 rate·θ 加到梯度上
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightDecay(pub f32);

impl Default for WeightDecay {
    fn default() -> Self {
        Self(0.0005)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adam {
    /// 学习率 α
    lr: f32,
    /// β1 (一阶矩衰减)
    beta1: f32,
    /// β2 (二阶矩衰减)
    beta2: f32,
    /// 数值稳定项
    epsilon: f32,
    weight_decay: Option<WeightDecay>,
    /// 一阶矩估计
    m: BTreeMap<ParamId, Tensor>,
    /// 二阶矩估计
    v: BTreeMap<ParamId, Tensor>,
    /// 时间步
    t: usize,
}

impl Default for Adam {
    fn default() -> Self {
        Self::new(0.001)
    }
}

impl Adam {
    const MAGIC: &'static [u8; 4] = b"ADOP";

    /// β1 = 0.9，β2 = 0.999，ε = 1e-8，不带权重衰减
    pub fn new(lr: f32) -> Self {
        Self::new_with_config(lr, 0.9, 0.999, 1e-8)
    }

    pub fn new_with_config(lr: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            lr,
            beta1,
            beta2,
            epsilon,
            weight_decay: None,
            m: BTreeMap::new(),
            v: BTreeMap::new(),
            t: 0,
        }
    }

    pub fn with_weight_decay(mut self, hook: WeightDecay) -> Self {
        self.weight_decay = Some(hook);
        self
    }

    pub const fn weight_decay(&self) -> Option<WeightDecay> {
        self.weight_decay
    }

    pub fn get_momentum(&self, id: ParamId) -> Option<&Tensor> {
        self.m.get(&id)
    }

    pub fn get_velocity(&self, id: ParamId) -> Option<&Tensor> {
        self.v.get(&id)
    }

    pub const fn timestep(&self) -> usize {
        self.t
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        write_checkpoint(path, Self::MAGIC, self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        read_checkpoint(path, Self::MAGIC)
    }
}

impl Optimizer for Adam {
    fn step(&mut self, model: &mut AttentionDeconvNet, grads: &Gradients) -> Result<(), ModelError> {
        // 先整体校验，任何一项不符都不改动模型与优化器状态
        for (id, grad) in grads.iter() {
            let param = model
                .param(id)
                .ok_or_else(|| ModelError::MissingState(format!("模型中没有参数 {id}")))?;
            let moments = [self.m.get(&id), self.v.get(&id)];
            for expected in std::iter::once(grad).chain(moments.into_iter().flatten()) {
                if !param.is_same_shape(expected) {
                    return Err(crate::errors::TensorError::shape_mismatch(
                        param.shape(),
                        expected.shape(),
                        format!("参数 {id} 的梯度或动量形状不符"),
                    )
                    .into());
                }
            }
        }

        self.t += 1;
        let bias1 = 1.0 - self.beta1.powi(self.t as i32);
        let bias2 = 1.0 - self.beta2.powi(self.t as i32);

        for (id, grad) in grads.iter() {
            let param = model
                .param_mut(id)
                .ok_or_else(|| ModelError::MissingState(format!("模型中没有参数 {id}")))?;

            let mut g = grad.clone();
            if let Some(WeightDecay(rate)) = self.weight_decay {
                if rate != 0.0 {
                    g += &(&*param * rate);
                }
            }

            // m = β1 * m + (1 - β1) * g
            let m = self.m.entry(id).or_insert_with(|| Tensor::zeros(g.shape()));
            *m *= self.beta1;
            *m += &(&g * (1.0 - self.beta1));

            // v = β2 * v + (1 - β2) * g²
            let v = self.v.entry(id).or_insert_with(|| Tensor::zeros(g.shape()));
            *v *= self.beta2;
            *v += &(&(&g * &g) * (1.0 - self.beta2));

            let (lr, eps) = (self.lr, self.epsilon);
            let update = m.zip_map(v, |m, v| lr * (m / bias1) / ((v / bias2).sqrt() + eps));
            *param -= &update;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.m.clear();
        self.v.clear();
        self.t = 0;
    }

    fn learning_rate(&self) -> f32 {
        self.lr
    }

    fn set_learning_rate(&mut self, lr: f32) {
        self.lr = lr;
    }
}
