/*
 * @Date         : 2026-10-16
 * @Description  : 训练循环与验证
 *
 * - [`Trainer`]: 按 epoch 打乱、分 batch、带注意力信号训练，记录 loss.txt 并定期保存检查点
 * - [`Validator`]: 随机抽查、整体准确率、单图预测与注意力自反馈模拟
 */

mod trainer;
mod validate;

#[cfg(test)]
mod tests;

pub use trainer::{EpochStats, LossLog, TrainConfig, Trainer};
pub use validate::{SIMULATION_STEPS, Validator, write_simulation_csv};

use crate::data::DataError;
use crate::nn::ModelError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TrainError {
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Data(#[from] DataError),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON 序列化错误: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}为空")]
    EmptyDataset(&'static str),
    #[error("训练被中断")]
    Interrupted,
}
