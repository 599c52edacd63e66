use crate::data::InMemoryDataset;
use crate::nn::{ModelConfig, PoolSpec};
use crate::tensor::Tensor;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;


fn tiny_config() -> ModelConfig {
    ModelConfig {
        input_channels: 2,
        input_size: (8, 8),
        blocks: vec![vec![3], vec![4]],
        kernel_size: 3,
        padding: 1,
        pool: PoolSpec::square(2),
        aux_dim: 2,
        num_classes: 2,
        conv_bias: false,
        seed: Some(7),
    }
}

/// 4 个训练样本、2 个测试样本，标签交替
fn tiny_dataset(train_labels: Vec<usize>) -> InMemoryDataset {
    let mut rng = StdRng::seed_from_u64(17);
    let n = train_labels.len();
    InMemoryDataset::new(
        Tensor::new_normal(0.5, 0.3, &[n, 2, 8, 8], &mut rng),
        train_labels,
        Tensor::new_normal(0.5, 0.3, &[2, 2, 8, 8], &mut rng),
        vec![0, 1],
    )
    .unwrap()
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("attn_deconv_train_{name}_{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}
