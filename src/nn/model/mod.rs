/*
 * @Date         : 2026-10-16
 * @Description  : 带注意力门的卷积分类网络
 *
 * 结构：
 * ```text
 * x ──► FeatureExtractor ──► flatten ──► ⊙ gate ──► head(Linear) ──► softmax
 *                                           ▲
 * aux ──► attention(Linear) ──► sigmoid ────┘
 * ```
 * 可视化时，注意力阶段（或任一 block）的输出可沿反卷积路径回放到输入空间，见`deconv`。
 */

mod backward;
mod config;
mod deconv;
mod extractor;

pub use backward::{Gradients, TrainScope};
pub use config::{LayerId, ModelConfig, ParamId, StopLayer};
pub use deconv::{DeconvLayer, DeconvStack};
pub use extractor::{ConvBlock, FeatureExtractor, ForwardTrace, PoolRecord};

use super::checkpoint::{read_checkpoint, write_checkpoint};
use super::layer::{Linear, PoolingMode, SoftmaxCrossEntropy, sigmoid, softmax};
use super::{Device, ModelError};
use crate::errors::TensorError;
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// 一次训练前向的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossOutput {
    /// batch 平均交叉熵
    pub loss: f32,
    /// top-1 准确率
    pub accuracy: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttentionDeconvNet {
    config: ModelConfig,
    extractor: FeatureExtractor,
    /// [aux_dim, flat_size]
    attention: Linear,
    /// [flat_size, num_classes]
    head: Linear,
    #[serde(skip)]
    device: Device,
    /// 首次可视化时才创建，不写入检查点
    #[serde(skip)]
    deconv: Option<DeconvStack>,
}

impl AttentionDeconvNet {
    const MAGIC: &'static [u8; 4] = b"ADMD";

    pub fn new(config: ModelConfig, device: Device) -> Result<Self, ModelError> {
        let device = device.ensure_supported()?;
        let flat_size = config.flat_size()?;
        let mut rng = config.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);

        let extractor = FeatureExtractor::new(&config, &mut rng);
        let attention = Linear::new(config.aux_dim, flat_size, true, &mut rng);
        let head = Linear::new(flat_size, config.num_classes, true, &mut rng);
        tracing::debug!(
            "创建模型：{}个 block，flat_size = {}，设备 {}",
            config.block_count(),
            flat_size,
            device
        );
        Ok(Self {
            config,
            extractor,
            attention,
            head,
            device,
            deconv: None,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub const fn device(&self) -> Device {
        self.device
    }

    pub fn extractor(&self) -> &FeatureExtractor {
        &self.extractor
    }

    pub fn flat_size(&self) -> usize {
        self.attention.out_features()
    }

    /// 仅特征提取部分的前向，见[`FeatureExtractor::forward`]
    pub fn forward(
        &self,
        x: &Tensor,
        stop_block: Option<usize>,
        mode: PoolingMode,
    ) -> Result<(Tensor, ForwardTrace), ModelError> {
        self.check_input(x)?;
        self.extractor.forward(x, stop_block, mode)
    }

    /// 不经注意力门的预测，返回[batch, num_classes]的概率
    pub fn predict(&self, x: &Tensor) -> Result<Tensor, ModelError> {
        let (features, _) = self.forward(x, None, PoolingMode::Plain)?;
        let flat = self.flatten(&features)?;
        Ok(softmax(&self.head.forward(&flat)?)?)
    }

    /// 注意力门：sigmoid(aux · W + b)，形状[batch, flat_size]，取值在(0, 1)
    pub fn attention_gate(&self, aux: &Tensor) -> Result<Tensor, ModelError> {
        let (_, aux_dim) = aux.dims2("注意力信号")?;
        if aux_dim != self.config.aux_dim {
            return Err(TensorError::shape_mismatch(
                &[aux.batch_size(), self.config.aux_dim],
                aux.shape(),
                "注意力信号维度不匹配",
            )
            .into());
        }
        Ok(sigmoid(&self.attention.forward(aux)?))
    }

    /// 带注意力门的前向。
    ///
    /// - `Some(StopLayer::Block(n))`：返回第 n 个 block 的输出（不经注意力门）
    /// - `Some(StopLayer::Attention)`：返回乘上门之后、还原为最后一个 block 形状的特征图
    /// - `None`：返回分类概率
    pub fn forward_with_attention(
        &self,
        x: &Tensor,
        aux: &Tensor,
        stop: Option<StopLayer>,
        mode: PoolingMode,
    ) -> Result<(Tensor, ForwardTrace), ModelError> {
        self.check_aux(x, aux)?;
        if let Some(StopLayer::Block(n)) = stop {
            return self.extractor.forward(x, Some(n), mode);
        }

        let (features, trace) = self.extractor.forward(x, None, mode)?;
        let gated = &self.flatten(&features)? * &self.attention_gate(aux)?;
        let out = match stop {
            Some(StopLayer::Attention) => gated.reshape(features.shape())?,
            _ => softmax(&self.head.forward(&gated)?)?,
        };
        Ok((out, trace))
    }

    /// 训练用：带注意力门的交叉熵损失与准确率
    pub fn loss_with_attention(&self, x: &Tensor, aux: &Tensor, targets: &[usize]) -> Result<LossOutput, ModelError> {
        self.check_targets(x, targets)?;
        let logits = self.fused_logits(x, aux)?;
        let ce = SoftmaxCrossEntropy::forward(&logits, targets)?;
        Ok(LossOutput {
            loss: ce.loss(),
            accuracy: ce.accuracy(),
        })
    }

    /// 所有可训练参数的标识
    pub fn param_ids(&self) -> Vec<ParamId> {
        let mut ids = Vec::new();
        for id in self.extractor.layer_ids() {
            ids.push(ParamId::ConvWeight(id));
            if self.extractor.conv(id).is_some_and(|c| c.bias().is_some()) {
                ids.push(ParamId::ConvBias(id));
            }
        }
        ids.extend([
            ParamId::AttentionWeight,
            ParamId::AttentionBias,
            ParamId::HeadWeight,
            ParamId::HeadBias,
        ]);
        ids
    }

    pub fn param(&self, id: ParamId) -> Option<&Tensor> {
        match id {
            ParamId::ConvWeight(l) => self.extractor.conv(l).map(|c| c.weight()),
            ParamId::ConvBias(l) => self.extractor.conv(l).and_then(|c| c.bias()),
            ParamId::AttentionWeight => Some(self.attention.weight()),
            ParamId::AttentionBias => self.attention.bias(),
            ParamId::HeadWeight => Some(self.head.weight()),
            ParamId::HeadBias => self.head.bias(),
        }
    }

    pub fn param_mut(&mut self, id: ParamId) -> Option<&mut Tensor> {
        match id {
            ParamId::ConvWeight(l) => self.extractor.conv_mut(l).map(|c| c.weight_mut()),
            ParamId::ConvBias(l) => self.extractor.conv_mut(l).and_then(|c| c.bias_mut()),
            ParamId::AttentionWeight => Some(self.attention.weight_mut()),
            ParamId::AttentionBias => self.attention.bias_mut(),
            ParamId::HeadWeight => Some(self.head.weight_mut()),
            ParamId::HeadBias => self.head.bias_mut(),
        }
    }

    /// 保存配置与全部权重（反卷积层不保存，加载后按需重建）
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        write_checkpoint(path.as_ref(), Self::MAGIC, self)?;
        tracing::debug!("模型已保存到 {}", path.as_ref().display());
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P, device: Device) -> Result<Self, ModelError> {
        let mut model: Self = read_checkpoint(path.as_ref(), Self::MAGIC)?;
        model.device = device.ensure_supported()?;
        let flat_size = model.config.flat_size()?;
        if model.attention.out_features() != flat_size || model.head.in_features() != flat_size {
            return Err(ModelError::InvalidCheckpoint(format!(
                "权重宽度与配置的 flat_size = {flat_size} 不一致"
            )));
        }
        Ok(model)
    }

    fn check_input(&self, x: &Tensor) -> Result<(), ModelError> {
        let (_, c, h, w) = x.dims4("模型输入")?;
        if c != self.config.input_channels {
            return Err(TensorError::shape_mismatch(
                &[x.batch_size(), self.config.input_channels, h, w],
                x.shape(),
                "输入通道数与模型配置不符",
            )
            .into());
        }
        Ok(())
    }

    fn check_aux(&self, x: &Tensor, aux: &Tensor) -> Result<(), ModelError> {
        self.check_input(x)?;
        let (aux_batch, aux_dim) = aux.dims2("注意力信号")?;
        if aux_batch != x.batch_size() || aux_dim != self.config.aux_dim {
            return Err(TensorError::shape_mismatch(
                &[x.batch_size(), self.config.aux_dim],
                aux.shape(),
                "注意力信号须为[batch, aux_dim]且与图像 batch 一致",
            )
            .into());
        }
        Ok(())
    }

    fn check_targets(&self, x: &Tensor, targets: &[usize]) -> Result<(), ModelError> {
        if targets.len() != x.batch_size() {
            return Err(TensorError::shape_mismatch(
                &[x.batch_size()],
                &[targets.len()],
                "标签数量须与 batch 大小一致",
            )
            .into());
        }
        if let Some(&label) = targets.iter().find(|&&t| t >= self.config.num_classes) {
            return Err(ModelError::InvalidLabel {
                label,
                num_classes: self.config.num_classes,
            });
        }
        Ok(())
    }

    /// [batch, C, H, W] -> [batch, flat_size]
    fn flatten(&self, features: &Tensor) -> Result<Tensor, ModelError> {
        let batch_size = features.batch_size();
        let flat = features.size() / batch_size.max(1);
        if flat != self.flat_size() {
            return Err(TensorError::shape_mismatch(
                &[batch_size, self.flat_size()],
                &[batch_size, flat],
                "特征图展平后的长度与 flat_size 不符",
            )
            .into());
        }
        Ok(features.reshape(&[batch_size, flat])?)
    }

    fn fused_logits(&self, x: &Tensor, aux: &Tensor) -> Result<Tensor, ModelError> {
        self.check_aux(x, aux)?;
        let (features, _) = self.extractor.forward(x, None, PoolingMode::Plain)?;
        let gated = &self.flatten(&features)? * &self.attention_gate(aux)?;
        Ok(self.head.forward(&gated)?)
    }
}
