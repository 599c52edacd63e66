/*
 * @Date         : 2026-10-16
 * @Description  : 分块卷积特征提取器
 *
 * 每个 block 为若干个 conv → ReLU，最后接一次最大池化。
 * 每次前向都返回一份独立的`ForwardTrace`：
 * - `PoolingMode::Plain`：trace 为空
 * - `PoolingMode::SwitchRecording`：每个已完成的 block 记录一份开关及池化前尺寸，
 *   供反卷积重建按相反顺序回放
 */

use super::config::{LayerId, ModelConfig};
use crate::nn::ModelError;
use crate::nn::layer::{
    Conv2d, Conv2dGrads, PoolSpec, PoolingMode, SwitchMap, max_pool2d, max_unpool2d, relu,
    relu_backward,
};
use crate::tensor::Tensor;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// 一个 block 的池化记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolRecord {
    pub switches: SwitchMap,
    /// 池化输入的 (H, W)，奇数尺寸也能借此精确还原
    pub pre_pool_size: (usize, usize),
}

/// 一次前向的开关记录，按 block 顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForwardTrace {
    records: Vec<PoolRecord>,
}

impl ForwardTrace {
    /// 第`block`个 block 的记录（从1开始）
    pub fn record(&self, block: usize) -> Option<&PoolRecord> {
        block.checked_sub(1).and_then(|i| self.records.get(i))
    }

    pub fn records(&self) -> &[PoolRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvBlock {
    convs: Vec<Conv2d>,
}

impl ConvBlock {
    pub fn convs(&self) -> &[Conv2d] {
        &self.convs
    }

    pub fn out_channels(&self) -> usize {
        self.convs.last().map_or(0, Conv2d::out_channels)
    }
}

/// 反向传播所需的单个 block 中间结果
#[derive(Debug, Clone)]
pub(crate) struct BlockTape {
    conv_inputs: Vec<Tensor>,
    activations: Vec<Tensor>,
    record: PoolRecord,
}

pub(crate) struct ExtractorPass {
    pub output: Tensor,
    pub trace: ForwardTrace,
    pub tapes: Vec<BlockTape>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureExtractor {
    blocks: Vec<ConvBlock>,
    pool: PoolSpec,
}

impl FeatureExtractor {
    pub fn new<R: Rng + ?Sized>(config: &ModelConfig, rng: &mut R) -> Self {
        let kernel = (config.kernel_size, config.kernel_size);
        let padding = (config.padding, config.padding);
        let mut in_channels = config.input_channels;
        let blocks = config
            .blocks
            .iter()
            .map(|widths| {
                let convs = widths
                    .iter()
                    .map(|&out_channels| {
                        let conv = Conv2d::new(
                            in_channels,
                            out_channels,
                            kernel,
                            (1, 1),
                            padding,
                            config.conv_bias,
                            rng,
                        );
                        in_channels = out_channels;
                        conv
                    })
                    .collect();
                ConvBlock { convs }
            })
            .collect();
        Self {
            blocks,
            pool: config.pool,
        }
    }

    pub fn blocks(&self) -> &[ConvBlock] {
        &self.blocks
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub const fn pool(&self) -> PoolSpec {
        self.pool
    }

    pub fn conv(&self, id: LayerId) -> Option<&Conv2d> {
        let block = self.blocks.get(id.block.checked_sub(1)?)?;
        block.convs.get(id.index.checked_sub(1)?)
    }

    pub fn conv_mut(&mut self, id: LayerId) -> Option<&mut Conv2d> {
        let block = self.blocks.get_mut(id.block.checked_sub(1)?)?;
        block.convs.get_mut(id.index.checked_sub(1)?)
    }

    /// 按前向顺序列出所有卷积层
    pub fn layer_ids(&self) -> Vec<LayerId> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, block)| (0..block.convs.len()).map(move |i| LayerId::new(b + 1, i + 1)))
            .collect()
    }

    /// 依次执行各 block；`stop_block`为刚完成的 block 序号（从1开始）时提前返回其池化输出
    pub fn forward(
        &self,
        x: &Tensor,
        stop_block: Option<usize>,
        mode: PoolingMode,
    ) -> Result<(Tensor, ForwardTrace), ModelError> {
        let pass = self.run(x, stop_block, mode, false)?;
        Ok((pass.output, pass.trace))
    }

    pub(crate) fn run(
        &self,
        x: &Tensor,
        stop_block: Option<usize>,
        mode: PoolingMode,
        keep_tape: bool,
    ) -> Result<ExtractorPass, ModelError> {
        if let Some(stop) = stop_block {
            if stop == 0 || stop > self.blocks.len() {
                return Err(ModelError::InvalidStopLayer {
                    requested: stop,
                    available: self.blocks.len(),
                });
            }
        }
        x.dims4("特征提取器输入")?;

        let mut h = x.clone();
        let mut trace = ForwardTrace::default();
        let mut tapes = Vec::new();
        for (b, block) in self.blocks.iter().enumerate() {
            let (pooled, tape) = self.run_block(block, h, keep_tape)?;
            h = pooled;
            if mode.records_switches() {
                trace.records.push(tape.record.clone());
            }
            if keep_tape {
                tapes.push(tape);
            }
            if stop_block == Some(b + 1) {
                break;
            }
        }
        Ok(ExtractorPass {
            output: h,
            trace,
            tapes,
        })
    }

    fn run_block(&self, block: &ConvBlock, x: Tensor, keep_tape: bool) -> Result<(Tensor, BlockTape), ModelError> {
        let mut conv_inputs = Vec::new();
        let mut activations = Vec::new();
        let mut h = x;
        for conv in &block.convs {
            let a = relu(&conv.forward(&h)?);
            if keep_tape {
                conv_inputs.push(h);
                activations.push(a.clone());
            }
            h = a;
        }
        let (_, _, pre_h, pre_w) = h.dims4("池化输入")?;
        let (pooled, switches) = max_pool2d(&h, self.pool)?;
        let tape = BlockTape {
            conv_inputs,
            activations,
            record: PoolRecord {
                switches,
                pre_pool_size: (pre_h, pre_w),
            },
        };
        Ok((pooled, tape))
    }

    /// 由提取器输出的梯度反推各卷积层的参数梯度（池化的反向即按私有开关反池化）
    pub(crate) fn backward(
        &self,
        tapes: &[BlockTape],
        upstream: Tensor,
    ) -> Result<Vec<(LayerId, Conv2dGrads)>, ModelError> {
        let mut grads = Vec::new();
        let mut g = upstream;
        for (b, (block, tape)) in self.blocks.iter().zip(tapes).enumerate().rev() {
            g = max_unpool2d(&g, &tape.record.switches, self.pool, tape.record.pre_pool_size)?;
            for (i, conv) in block.convs.iter().enumerate().rev() {
                let g_pre = relu_backward(&tape.activations[i], &g);
                let conv_grads = conv.backward(&tape.conv_inputs[i], &g_pre)?;
                g = conv_grads.input.clone();
                grads.push((LayerId::new(b + 1, i + 1), conv_grads));
            }
        }
        Ok(grads)
    }
}
