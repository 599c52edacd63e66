/*
 * @Date         : 2026-10-16
 * @Description  : 模型配置与层/参数标识
 */

use crate::errors::TensorError;
use crate::nn::layer::{PoolSpec, conv_output_size};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// 网络结构配置，可由 JSON 加载
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_channels: usize,
    /// 输入图像的 (H, W)
    pub input_size: (usize, usize),
    /// 每个 block 内各卷积层的输出通道数
    pub blocks: Vec<Vec<usize>>,
    pub kernel_size: usize,
    pub padding: usize,
    pub pool: PoolSpec,
    /// 辅助（注意力）信号的维度
    pub aux_dim: usize,
    pub num_classes: usize,
    pub conv_bias: bool,
    /// 初始化权重的随机种子；为空时使用系统熵
    pub seed: Option<u64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            input_channels: 3,
            input_size: (128, 128),
            blocks: vec![vec![64, 64], vec![64, 64], vec![64, 64]],
            kernel_size: 3,
            padding: 1,
            pool: PoolSpec::square(2),
            aux_dim: 2,
            num_classes: 2,
            conv_bias: false,
            seed: None,
        }
    }
}

impl ModelConfig {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(std::io::Error::other)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// 各 block 结束（池化后）的 (C, H, W)
    pub fn block_output_shapes(&self) -> Result<Vec<(usize, usize, usize)>, TensorError> {
        let kernel = (self.kernel_size, self.kernel_size);
        let padding = (self.padding, self.padding);
        let mut size = self.input_size;
        let mut channels = self.input_channels;
        let mut shapes = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            for &out in block {
                size = conv_output_size(size, kernel, (1, 1), padding)?;
                channels = out;
            }
            size = self.pool.output_size(size)?;
            shapes.push((channels, size.0, size.1));
        }
        Ok(shapes)
    }

    /// 最后一个 block 输出展平后的长度，即注意力门与分类头的宽度
    pub fn flat_size(&self) -> Result<usize, TensorError> {
        let shapes = self.block_output_shapes()?;
        let (c, h, w) = shapes.last().copied().ok_or(TensorError::EmptyList)?;
        Ok(c * h * w)
    }
}

/// 卷积层标识：block 与 block 内序号均从1开始，显示为`conv{block}_{index}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LayerId {
    pub block: usize,
    pub index: usize,
}

impl LayerId {
    pub const fn new(block: usize, index: usize) -> Self {
        Self { block, index }
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conv{}_{}", self.block, self.index)
    }
}

/// 前向提前结束的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopLayer {
    /// 第 n 个 block 池化后（从1开始）
    Block(usize),
    /// 乘上注意力门之后，形状还原为最后一个 block 的输出
    Attention,
}

/// 可训练参数的标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ParamId {
    ConvWeight(LayerId),
    ConvBias(LayerId),
    AttentionWeight,
    AttentionBias,
    HeadWeight,
    HeadBias,
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConvWeight(id) => write!(f, "{id}.W"),
            Self::ConvBias(id) => write!(f, "{id}.b"),
            Self::AttentionWeight => write!(f, "attention.W"),
            Self::AttentionBias => write!(f, "attention.b"),
            Self::HeadWeight => write!(f, "fc.W"),
            Self::HeadBias => write!(f, "fc.b"),
        }
    }
}
