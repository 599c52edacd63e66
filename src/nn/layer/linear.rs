/*
 * @Date         : 2026-10-16
 * @Description  : Linear (全连接) 层：`output = x @ W + b`
 *
 * 输入/输出形状：
 * - 输入：[batch_size, in_features]
 * - 输出：[batch_size, out_features]
 */

use super::Init;
use crate::errors::TensorError;
use crate::tensor::Tensor;
use ndarray::Axis;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    /// 权重参数 [in_features, out_features]
    weight: Tensor,
    /// 偏置参数 [1, out_features]（可选）
    bias: Option<Tensor>,
}

/// Linear 反向传播的结果
#[derive(Debug, Clone)]
pub struct LinearGrads {
    pub input: Tensor,
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    pub fn new<R: Rng + ?Sized>(in_features: usize, out_features: usize, use_bias: bool, rng: &mut R) -> Self {
        let weight = Init::LeCunNormal.tensor(&[in_features, out_features], rng);
        let bias = use_bias.then(|| Init::Zeros.tensor(&[1, out_features], rng));
        Self { weight, bias }
    }

    pub fn from_weight(weight: Tensor, bias: Option<Tensor>) -> Result<Self, TensorError> {
        let (_, out_features) = weight.dims2("Linear 权重")?;
        if let Some(b) = &bias {
            if b.shape() != [1, out_features] {
                return Err(TensorError::shape_mismatch(
                    &[1, out_features],
                    b.shape(),
                    "全连接偏置须为[1, out_features]",
                ));
            }
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut()
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, TensorError> {
        let (_, in_features) = x.dims2("Linear 输入")?;
        if in_features != self.in_features() {
            return Err(TensorError::shape_mismatch(
                &[self.in_features()],
                &[in_features],
                "全连接层输入特征维度不匹配",
            ));
        }
        let mut out = x.as_matrix("Linear 输入")?.dot(&self.weight.as_matrix("Linear 权重")?);
        if let Some(b) = &self.bias {
            out += &b.as_matrix("Linear 偏置")?.index_axis(Axis(0), 0);
        }
        Ok(Tensor::from_array(out.into_dyn()))
    }

    /// 对于 Y = X @ W + b：dX = dY @ Wᵀ，dW = Xᵀ @ dY，db = Σ_batch dY
    pub fn backward(&self, input: &Tensor, upstream: &Tensor) -> Result<LinearGrads, TensorError> {
        let x = input.as_matrix("Linear 反向传播输入")?;
        let g = upstream.as_matrix("Linear 上游梯度")?;
        if g.nrows() != x.nrows() || g.ncols() != self.out_features() {
            return Err(TensorError::shape_mismatch(
                &[x.nrows(), self.out_features()],
                upstream.shape(),
                "上游梯度形状与全连接输出不一致",
            ));
        }
        let w = self.weight.as_matrix("Linear 权重")?;
        Ok(LinearGrads {
            input: Tensor::from_array(g.dot(&w.t()).into_dyn()),
            weight: Tensor::from_array(x.t().dot(&g).into_dyn()),
            bias: self.bias.as_ref().map(|_| upstream.sum_rows()),
        })
    }
}
