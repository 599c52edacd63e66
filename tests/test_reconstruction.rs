/*
 * @Date         : 2026-10-16
 * @Description  : 反卷积重建的集成测试：从图像文件读入，重建各 block 与注意力阶段，导出 png/npy
 */

use attn_deconv::data::load_image;
use attn_deconv::nn::{
    AttentionDeconvNet, Device, ModelConfig, ModelError, PoolSpec, PoolingMode, max_pool2d, max_unpool2d,
};
use attn_deconv::tensor::Tensor;
use attn_deconv::vision::Vision;
use image::{Rgb, RgbImage};
use std::fs;

fn config() -> ModelConfig {
    ModelConfig {
        input_channels: 3,
        // 奇数尺寸：池化向下取整，反池化按记录的尺寸精确还原
        input_size: (13, 11),
        blocks: vec![vec![4, 4], vec![5], vec![6]],
        kernel_size: 3,
        padding: 1,
        pool: PoolSpec::square(2),
        aux_dim: 2,
        num_classes: 2,
        conv_bias: false,
        seed: Some(5),
    }
}

fn gradient_image(dir: &std::path::Path) -> Tensor {
    let path = dir.join("input.png");
    RgbImage::from_fn(11, 13, |x, y| Rgb([(x * 20) as u8, (y * 15) as u8, 128])).save(&path).unwrap();
    load_image(&path, (13, 11)).unwrap()
}

#[test]
fn test_reconstruct_every_block_and_export() {
    let dir = std::env::temp_dir().join(format!("attn_deconv_it_recon_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    let x = gradient_image(&dir);
    assert_eq!(x.shape(), &[1, 3, 13, 11]);

    let mut model = AttentionDeconvNet::new(config(), Device::Cpu).unwrap();
    assert_eq!(model.flat_size(), 6);

    let (_, trace) = model.forward(&x, None, PoolingMode::SwitchRecording).unwrap();
    let pre_pool: Vec<(usize, usize)> = trace.records().iter().map(|r| r.pre_pool_size).collect();
    assert_eq!(pre_pool, vec![(13, 11), (6, 5), (3, 2)]);

    for (layer, channels) in [(1, 4), (2, 5), (3, 6)] {
        let maps = model.reconstruct_per_feature_map(&x, layer).unwrap();
        assert_eq!(maps.shape(), &[channels, 3, 13, 11]);
        assert!(maps.is_all_finite());

        let written = Vision::save_reconstructions(&maps, &dir, &format!("block{layer}")).unwrap();
        assert_eq!(written.len(), channels + 1);
    }

    let aux = Tensor::new(&[0.0, 1.0], &[1, 2]);
    let attention = model.reconstruct_from_attention(&x, &aux).unwrap();
    assert_eq!(attention.shape(), &[1, 3, 13, 11]);
    let written = Vision::save_reconstructions(&attention, &dir, "attention1").unwrap();
    assert!(written.iter().all(|p| p.is_file()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_each_forward_has_private_switches() {
    let mut model = AttentionDeconvNet::new(config(), Device::Cpu).unwrap();
    model.ensure_deconv_layers();
    let a = Tensor::filled(1.0, &[1, 3, 13, 11]);
    let b = Tensor::new(
        &(0..3 * 13 * 11).map(|i| ((i * 37) % 101) as f32 / 101.0).collect::<Vec<_>>(),
        &[1, 3, 13, 11],
    );

    let (out_a, trace_a) = model.forward(&a, None, PoolingMode::SwitchRecording).unwrap();
    let (_, trace_b) = model.forward(&b, None, PoolingMode::SwitchRecording).unwrap();

    // 另一张图的前向不会影响先前得到的记录
    let first = model.replay(&out_a, &trace_a, 3).unwrap();
    let again = model.replay(&out_a, &trace_a, 3).unwrap();
    assert_eq!(first, again);
    assert_eq!(trace_b.len(), 3);
    assert_ne!(trace_a, trace_b);
}

#[test]
fn test_plain_forward_cannot_be_replayed() {
    let mut model = AttentionDeconvNet::new(config(), Device::Cpu).unwrap();
    model.ensure_deconv_layers();
    let x = Tensor::filled(0.5, &[1, 3, 13, 11]);
    let (out, trace) = model.forward(&x, None, PoolingMode::Plain).unwrap();
    assert!(matches!(model.replay(&out, &trace, 3), Err(ModelError::MissingState(_))));
}

#[test]
fn test_pool_unpool_public_api() {
    let x = Tensor::new(&[1.0, 4.0, 2.0, 3.0, 9.0, 0.0], &[1, 1, 2, 3]);
    let spec = PoolSpec::square(2);
    let (pooled, switches) = max_pool2d(&x, spec).unwrap();
    assert_eq!(pooled.data_as_slice(), &[9.0]);
    let restored = max_unpool2d(&pooled, &switches, spec, (2, 3)).unwrap();
    assert_eq!(restored.data_as_slice(), &[0.0, 0.0, 0.0, 0.0, 9.0, 0.0]);
}
