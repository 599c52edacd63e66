/*
 * @Date         : 2026-10-16
 * @Description  : 模型层面的错误类型
 */

use super::model::LayerId;
use crate::errors::TensorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Tensor(#[from] TensorError),
    #[error("{op}仅支持 batch 大小为{expected}，得到{got}")]
    UnsupportedBatchSize {
        op: &'static str,
        expected: usize,
        got: usize,
    },
    /// 在未具备所需状态时调用（如尚未记录开关就做重建）
    #[error("缺少必要状态：{0}")]
    MissingState(String),
    #[error("无效的停止层：block {requested}（模型共有{available}个 block）")]
    InvalidStopLayer { requested: usize, available: usize },
    #[error("标签{label}超出类别数{num_classes}")]
    InvalidLabel { label: usize, num_classes: usize },
    #[error("不支持的设备：{0}（仅有 CPU 后端）")]
    UnsupportedDevice(String),
    #[error("未知的卷积层：{0}")]
    UnknownLayer(LayerId),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("序列化错误: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("无效的检查点文件：{0}")]
    InvalidCheckpoint(String),
}
