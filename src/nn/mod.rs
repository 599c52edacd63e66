/*
 * @Date         : 2026-10-16
 * @Description  : 负责神经网络（neural network）的构建、训练所需的梯度与优化，以及反卷积可视化
 */

mod checkpoint;
mod device;
mod error;
pub mod layer;
pub mod model;
pub mod optimizer;

pub use device::Device;
pub use error::ModelError;
pub use layer::{PoolSpec, PoolingMode, SwitchMap, max_pool2d, max_unpool2d};
pub use model::{
    AttentionDeconvNet, DeconvLayer, DeconvStack, ForwardTrace, Gradients, LayerId, LossOutput,
    ModelConfig, ParamId, PoolRecord, StopLayer, TrainScope,
};
pub use optimizer::{Adam, Optimizer, WeightDecay};

#[cfg(test)]
mod tests;
