/*
 * @Date         : 2026-10-16
 * @Description  : 反卷积重建路径测试
 */

use super::tiny_config;
use crate::nn::{AttentionDeconvNet, Device, ForwardTrace, LayerId, ModelError, ParamId, PoolingMode};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn tiny_model() -> AttentionDeconvNet {
    AttentionDeconvNet::new(tiny_config(), Device::Cpu).unwrap()
}

fn image(batch: usize, seed: u64) -> Tensor {
    let mut rng = StdRng::seed_from_u64(seed);
    Tensor::new_normal(0.5, 0.3, &[batch, 2, 8, 8], &mut rng)
}

fn snapshot(model: &AttentionDeconvNet) -> Vec<Tensor> {
    model.param_ids().into_iter().filter_map(|id| model.param(id).cloned()).collect()
}

#[test]
fn test_ensure_deconv_layers_is_idempotent() {
    let mut model = tiny_model();
    assert!(model.deconv_layers().is_none());

    let first = model.ensure_deconv_layers().clone();
    assert_eq!(first.len(), 3);
    let conv12 = first.get(LayerId::new(1, 2)).unwrap();
    assert_eq!(conv12.mirrors(), LayerId::new(1, 2));
    assert_eq!(conv12.kernel(), (3, 3));
    assert_eq!(conv12.stride(), (1, 1));
    assert_eq!(conv12.padding(), (1, 1));

    let second = model.ensure_deconv_layers().clone();
    assert_eq!(first, second);
    assert_eq!(model.deconv_layers(), Some(&first));
}

#[test]
fn test_replay_requires_deconv_layers() {
    let model = tiny_model();
    let (out, trace) = model.forward(&image(1, 1), None, PoolingMode::SwitchRecording).unwrap();
    assert!(matches!(model.replay(&out, &trace, 2), Err(ModelError::MissingState(_))));
}

#[test]
fn test_replay_requires_recorded_switches() {
    let mut model = tiny_model();
    model.ensure_deconv_layers();
    let (out, trace) = model.forward(&image(1, 2), None, PoolingMode::Plain).unwrap();
    assert!(matches!(model.replay(&out, &trace, 2), Err(ModelError::MissingState(_))));
    assert!(matches!(
        model.replay(&out, &ForwardTrace::default(), 2),
        Err(ModelError::MissingState(_))
    ));
}

#[test]
fn test_replay_invalid_block() {
    let mut model = tiny_model();
    model.ensure_deconv_layers();
    let (out, trace) = model.forward(&image(1, 3), None, PoolingMode::SwitchRecording).unwrap();
    assert!(matches!(
        model.replay(&out, &trace, 3),
        Err(ModelError::InvalidStopLayer { requested: 3, available: 2 })
    ));
}

#[test]
fn test_replay_of_zero_signal_is_zero() {
    let mut model = tiny_model();
    model.ensure_deconv_layers();
    let (out, trace) = model.forward(&image(1, 4), None, PoolingMode::SwitchRecording).unwrap();
    let back = model.replay(&Tensor::zeros(out.shape()), &trace, 2).unwrap();
    assert_eq!(back.shape(), &[1, 2, 8, 8]);
    assert_eq!(back.max_value(), 0.0);
    assert_eq!(back.min_value(), 0.0);
}

#[test]
fn test_reconstruct_per_feature_map_shapes() {
    let mut model = tiny_model();
    let x = image(1, 5);

    let block1 = model.reconstruct_per_feature_map(&x, 1).unwrap();
    assert_eq!(block1.shape(), &[3, 2, 8, 8]);
    let block2 = model.reconstruct_per_feature_map(&x, 2).unwrap();
    assert_eq!(block2.shape(), &[4, 2, 8, 8]);
    assert!(block2.is_all_finite());
}

#[test]
fn test_reconstruct_per_feature_map_matches_single_replay() {
    let mut model = tiny_model();
    let x = image(1, 6);
    let maps = model.reconstruct_per_feature_map(&x, 2).unwrap();

    let (features, trace) = model.forward(&x, Some(2), PoolingMode::SwitchRecording).unwrap();
    let single = model.replay(&features.keep_channel(1).unwrap(), &trace, 2).unwrap();
    let from_stack = maps.batch_item(1).unwrap();
    assert_abs_diff_eq!(from_stack, single, epsilon = 1e-6);
}

#[test]
fn test_reconstruct_from_attention_shape() {
    let mut model = tiny_model();
    let aux = Tensor::new(&[1.0, 0.0], &[1, 2]);
    let out = model.reconstruct_from_attention(&image(1, 7), &aux).unwrap();
    assert_eq!(out.shape(), &[1, 2, 8, 8]);
    assert!(out.is_all_finite());
    assert!(model.deconv_layers().is_some());
}

#[test]
fn test_reconstruction_requires_single_image() {
    let mut model = tiny_model();
    let x = image(2, 8);
    assert!(matches!(
        model.reconstruct_per_feature_map(&x, 1),
        Err(ModelError::UnsupportedBatchSize { expected: 1, got: 2, .. })
    ));
    let aux = Tensor::zeros(&[2, 2]);
    assert!(matches!(
        model.reconstruct_from_attention(&x, &aux),
        Err(ModelError::UnsupportedBatchSize { expected: 1, got: 2, .. })
    ));
}

#[test]
fn test_failed_reconstruction_leaves_weights_unchanged() {
    let mut model = tiny_model();
    let before = snapshot(&model);

    assert!(model.reconstruct_per_feature_map(&image(2, 9), 1).is_err());
    assert!(matches!(
        model.reconstruct_per_feature_map(&image(1, 9), 5),
        Err(ModelError::InvalidStopLayer { .. })
    ));
    assert_eq!(snapshot(&model), before);
}

/// 反卷积读取前向卷积的当前权重：conv1_1 是回放的最后一步，放大其卷积核会同比例放大重建结果
#[test]
fn test_deconv_weights_are_tied_to_forward_convs() {
    let mut model = tiny_model();
    model.ensure_deconv_layers();
    let (out, trace) = model.forward(&image(1, 10), None, PoolingMode::SwitchRecording).unwrap();
    let before = model.replay(&out, &trace, 2).unwrap();

    let weight = model.param_mut(ParamId::ConvWeight(LayerId::new(1, 1))).unwrap();
    *weight *= 2.0;
    let after = model.replay(&out, &trace, 2).unwrap();

    assert_abs_diff_eq!(after, &before * 2.0, epsilon = 1e-5);
}

#[test]
fn test_replay_rejects_weight_with_other_kernel_size() {
    let mut model = tiny_model();
    model.ensure_deconv_layers();
    let (out, trace) = model.forward(&image(1, 12), None, PoolingMode::SwitchRecording).unwrap();

    let id = LayerId::new(1, 2);
    *model.param_mut(ParamId::ConvWeight(id)).unwrap() = Tensor::zeros(&[3, 3, 1, 1]);
    assert!(matches!(model.replay(&out, &trace, 2), Err(ModelError::Tensor(_))));

    let layer = *model.deconv_layers().unwrap().get(id).unwrap();
    let signal = Tensor::zeros(&[1, 3, 8, 8]);
    assert!(layer.apply(&signal, &Tensor::zeros(&[3, 3, 5, 5])).is_err());
    assert!(layer.apply(&signal, &Tensor::zeros(&[3, 3, 3, 3])).is_ok());
}
