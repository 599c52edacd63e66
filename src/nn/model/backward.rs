/*
 * @Date         : 2026-10-16
 * @Description  : 带注意力门的损失的反向传播
 *
 * 记 f 为展平后的特征，g = sigmoid(aux·Wₐ + bₐ)，z = (f ⊙ g)·W_h + b_h：
 * ```text
 * ∂L/∂z  = (softmax(z) - onehot(t)) / N
 * ∂L/∂(f⊙g) = ∂L/∂z · W_hᵀ
 * ∂L/∂g  = ∂L/∂(f⊙g) ⊙ f
 * ∂L/∂f  = ∂L/∂(f⊙g) ⊙ g          （仅 TrainScope::Full）
 * ```
 * 池化的反向为按本次前向私有的开关反池化，卷积的反向见`Conv2d::backward`。
 */

use super::{AttentionDeconvNet, LossOutput, ParamId};
use crate::nn::ModelError;
use crate::nn::layer::{PoolingMode, SoftmaxCrossEntropy, sigmoid_backward};
use crate::tensor::Tensor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 需要求梯度的参数范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrainScope {
    /// 仅注意力投影（Wₐ, bₐ），其余权重冻结
    #[default]
    Attention,
    /// 全部参数
    Full,
}

/// 参数梯度，按`ParamId`排序
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gradients {
    grads: BTreeMap<ParamId, Tensor>,
}

impl Gradients {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: ParamId) -> Option<&Tensor> {
        self.grads.get(&id)
    }

    pub fn insert(&mut self, id: ParamId, grad: Tensor) {
        self.grads.insert(id, grad);
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &Tensor)> {
        self.grads.iter().map(|(&id, g)| (id, g))
    }

    pub fn len(&self) -> usize {
        self.grads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grads.is_empty()
    }
}

impl AttentionDeconvNet {
    /// 计算带注意力门的损失，并对`scope`内的参数求梯度
    pub fn backward_with_attention(
        &self,
        x: &Tensor,
        aux: &Tensor,
        targets: &[usize],
        scope: TrainScope,
    ) -> Result<(LossOutput, Gradients), ModelError> {
        self.check_aux(x, aux)?;
        self.check_targets(x, targets)?;

        let full = scope == TrainScope::Full;
        let pass = self.extractor.run(x, None, PoolingMode::Plain, full)?;
        let features = pass.output;
        let flat = self.flatten(&features)?;
        let gate = self.attention_gate(aux)?;
        let gated = &flat * &gate;
        let logits = self.head.forward(&gated)?;
        let ce = SoftmaxCrossEntropy::forward(&logits, targets)?;
        let output = LossOutput {
            loss: ce.loss(),
            accuracy: ce.accuracy(),
        };

        let mut grads = Gradients::new();
        let head_grads = self.head.backward(&gated, &ce.backward())?;
        let d_gated = head_grads.input;

        let d_gate = &d_gated * &flat;
        let att_grads = self.attention.backward(aux, &sigmoid_backward(&gate, &d_gate))?;
        grads.insert(ParamId::AttentionWeight, att_grads.weight);
        if let Some(b) = att_grads.bias {
            grads.insert(ParamId::AttentionBias, b);
        }

        if full {
            grads.insert(ParamId::HeadWeight, head_grads.weight);
            if let Some(b) = head_grads.bias {
                grads.insert(ParamId::HeadBias, b);
            }
            let d_features = (&d_gated * &gate).reshape(features.shape())?;
            for (id, conv_grads) in self.extractor.backward(&pass.tapes, d_features)? {
                grads.insert(ParamId::ConvWeight(id), conv_grads.weight);
                if let Some(b) = conv_grads.bias {
                    grads.insert(ParamId::ConvBias(id), b);
                }
            }
        }
        Ok((output, grads))
    }
}
