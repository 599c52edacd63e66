/*
 * @Date         : 2026-10-16
 * @Description  : 反卷积重建路径
 *
 * 每个前向卷积对应一个镜像的转置卷积（`DeconvLayer`），以前向层的`LayerId`为键。
 * 反卷积层不持有权重副本，回放时读取前向卷积的当前权重，因此两者始终绑定。
 *
 * 回放顺序与前向相反：对第 b..=1 个 block，先按该 block 的开关反池化，
 * 再按 block 内相反顺序依次做 ReLU → 转置卷积，最终回到输入空间。
 */

use super::{AttentionDeconvNet, ForwardTrace, LayerId, StopLayer};
use crate::errors::TensorError;
use crate::nn::ModelError;
use crate::nn::layer::{PoolingMode, conv_transpose2d, max_unpool2d, relu, transposed_output_size};
use crate::tensor::Tensor;
use rayon::prelude::*;
use std::collections::BTreeMap;

/// 镜像某个前向卷积的转置卷积
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeconvLayer {
    mirrors: LayerId,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
}

impl DeconvLayer {
    /// 被镜像的前向卷积
    pub const fn mirrors(&self) -> LayerId {
        self.mirrors
    }

    pub const fn kernel(&self) -> (usize, usize) {
        self.kernel
    }

    pub const fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub const fn padding(&self) -> (usize, usize) {
        self.padding
    }

    /// 用（前向卷积的）`weight`把`signal`映射回该卷积的输入空间；
    /// `weight`的卷积核尺寸须与创建时记录的一致
    pub fn apply(&self, signal: &Tensor, weight: &Tensor) -> Result<Tensor, ModelError> {
        let (_, _, h, w) = signal.dims4("反卷积输入")?;
        let (out_c, in_c, k_h, k_w) = weight.dims4("反卷积权重")?;
        if (k_h, k_w) != self.kernel {
            return Err(TensorError::shape_mismatch(
                &[out_c, in_c, self.kernel.0, self.kernel.1],
                weight.shape(),
                format!("{} 的权重与反卷积层的卷积核尺寸不符", self.mirrors),
            )
            .into());
        }
        let out_size = transposed_output_size((h, w), self.kernel, self.stride, self.padding)?;
        Ok(conv_transpose2d(signal, weight, self.stride, self.padding, out_size)?)
    }
}

/// `LayerId → DeconvLayer`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeconvStack {
    layers: BTreeMap<LayerId, DeconvLayer>,
}

impl DeconvStack {
    pub fn get(&self, id: LayerId) -> Option<&DeconvLayer> {
        self.layers.get(&id)
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeconvLayer> {
        self.layers.values()
    }
}

impl AttentionDeconvNet {
    /// 为每个前向卷积创建一个反卷积层；已创建时什么也不做
    pub fn ensure_deconv_layers(&mut self) -> &DeconvStack {
        let extractor = &self.extractor;
        self.deconv.get_or_insert_with(|| {
            let layers = extractor
                .layer_ids()
                .into_iter()
                .filter_map(|id| {
                    extractor.conv(id).map(|conv| {
                        let layer = DeconvLayer {
                            mirrors: id,
                            kernel: conv.kernel_size(),
                            stride: conv.stride(),
                            padding: conv.padding(),
                        };
                        (id, layer)
                    })
                })
                .collect();
            tracing::debug!("已创建反卷积层");
            DeconvStack { layers }
        })
    }

    pub fn deconv_layers(&self) -> Option<&DeconvStack> {
        self.deconv.as_ref()
    }

    /// 把`signal`（第`from_block`个 block 的输出空间）沿反卷积路径回放到输入空间
    ///
    /// # 错误
    /// - 尚未创建反卷积层，或`trace`缺少所需 block 的开关：`MissingState`
    /// - `from_block`为0或超出 block 数：`InvalidStopLayer`
    /// - `signal`与记录的开关形状不符：`Tensor(ShapeMismatch)`
    pub fn replay(&self, signal: &Tensor, trace: &ForwardTrace, from_block: usize) -> Result<Tensor, ModelError> {
        let stack = self.deconv.as_ref().ok_or_else(|| {
            ModelError::MissingState("反卷积层尚未创建，需先调用 ensure_deconv_layers".to_string())
        })?;
        let block_count = self.extractor.block_count();
        if from_block == 0 || from_block > block_count {
            return Err(ModelError::InvalidStopLayer {
                requested: from_block,
                available: block_count,
            });
        }

        let pool = self.extractor.pool();
        let mut h = signal.clone();
        for b in (1..=from_block).rev() {
            let record = trace.record(b).ok_or_else(|| {
                ModelError::MissingState(format!(
                    "缺少 block {b} 的池化开关，需先以 SwitchRecording 模式完成一次前向"
                ))
            })?;
            h = max_unpool2d(&h, &record.switches, pool, record.pre_pool_size)?;

            let convs = self.extractor.blocks()[b - 1].convs();
            for i in (1..=convs.len()).rev() {
                let id = LayerId::new(b, i);
                let deconv = stack.get(id).ok_or(ModelError::UnknownLayer(id))?;
                h = deconv.apply(&relu(&h), convs[i - 1].weight())?;
            }
        }
        Ok(h)
    }

    /// 从注意力阶段重建输入空间的激活，返回[1, input_channels, H, W]
    pub fn reconstruct_from_attention(&mut self, x: &Tensor, aux: &Tensor) -> Result<Tensor, ModelError> {
        Self::require_single(x, "reconstruct_from_attention")?;
        self.ensure_deconv_layers();
        let (gated, trace) =
            self.forward_with_attention(x, aux, Some(StopLayer::Attention), PoolingMode::SwitchRecording)?;
        self.replay(&gated, &trace, self.extractor.block_count())
    }

    /// 对第`layer`个 block 输出的每个通道分别重建（其余通道置零），
    /// 结果在最前面多出一个通道维：[channels_of_layer, input_channels, H, W]
    pub fn reconstruct_per_feature_map(&mut self, x: &Tensor, layer: usize) -> Result<Tensor, ModelError> {
        Self::require_single(x, "reconstruct_per_feature_map")?;
        self.ensure_deconv_layers();
        let (features, trace) = self.forward(x, Some(layer), PoolingMode::SwitchRecording)?;
        let (_, channels, _, _) = features.dims4("特征图")?;

        let this = &*self;
        let maps = (0..channels)
            .into_par_iter()
            .map(|fm| -> Result<Tensor, ModelError> {
                tracing::debug!("重建 block {layer} 的第{fm}个特征图");
                let single = features.keep_channel(fm)?;
                Ok(this.replay(&single, &trace, layer)?.squeeze_batch()?)
            })
            .collect::<Result<Vec<_>, ModelError>>()?;
        let refs: Vec<&Tensor> = maps.iter().collect();
        Ok(Tensor::stack(&refs, true)?)
    }

    fn require_single(x: &Tensor, op: &'static str) -> Result<(), ModelError> {
        x.dims4("重建输入")?;
        if x.batch_size() != 1 {
            return Err(ModelError::UnsupportedBatchSize {
                op,
                expected: 1,
                got: x.batch_size(),
            });
        }
        Ok(())
    }
}
