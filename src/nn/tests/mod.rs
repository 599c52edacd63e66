use crate::nn::{ModelConfig, PoolSpec};

mod backward;
mod deconv;
mod optimizer;

/// 测试用的小模型：输入[2, 8, 8]，两个 block（3,3 / 4），flat_size = 4*2*2 = 16
fn tiny_config() -> ModelConfig {
    ModelConfig {
        input_channels: 2,
        input_size: (8, 8),
        blocks: vec![vec![3, 3], vec![4]],
        kernel_size: 3,
        padding: 1,
        pool: PoolSpec::square(2),
        aux_dim: 2,
        num_classes: 2,
        conv_bias: false,
        seed: Some(42),
    }
}
