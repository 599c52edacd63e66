/*
 * @Date         : 2026-10-16
 * @Description  : Adam 优化器测试
 */

use super::tiny_config;
use crate::nn::{
    Adam, AttentionDeconvNet, Device, Gradients, ModelError, Optimizer, ParamId, TrainScope, WeightDecay,
};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;

fn setup() -> (AttentionDeconvNet, Tensor, Tensor, Vec<usize>) {
    let model = AttentionDeconvNet::new(tiny_config(), Device::Cpu).unwrap();
    let mut rng = StdRng::seed_from_u64(31);
    let x = Tensor::new_normal(0.5, 0.3, &[2, 2, 8, 8], &mut rng);
    let aux = Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]);
    (model, x, aux, vec![0, 1])
}

#[test]
fn test_adam_defaults() {
    let adam = Adam::default();
    assert_abs_diff_eq!(adam.learning_rate(), 0.001);
    assert_eq!(adam.weight_decay(), None);
    assert_eq!(adam.timestep(), 0);
    assert_eq!(WeightDecay::default(), WeightDecay(0.0005));
}

#[test]
fn test_adam_first_step_moves_by_lr() {
    let (mut model, _, _, _) = setup();
    let before = model.param(ParamId::HeadBias).unwrap().clone();
    let mut grads = Gradients::new();
    grads.insert(ParamId::HeadBias, Tensor::new(&[3.0, -0.5], &[1, 2]));

    let mut adam = Adam::new(0.1);
    adam.step(&mut model, &grads).unwrap();

    // 首步经偏差修正后 m_hat/√v_hat = sign(g)
    let after = model.param(ParamId::HeadBias).unwrap();
    assert_abs_diff_eq!(after[[0, 0]], before[[0, 0]] - 0.1, epsilon = 1e-5);
    assert_abs_diff_eq!(after[[0, 1]], before[[0, 1]] + 0.1, epsilon = 1e-5);
    assert_eq!(adam.timestep(), 1);
    assert!(adam.get_momentum(ParamId::HeadBias).is_some());
    assert!(adam.get_velocity(ParamId::HeadWeight).is_none());
}

#[test]
fn test_adam_leaves_params_without_grads() {
    let (mut model, x, aux, targets) = setup();
    let head = model.param(ParamId::HeadWeight).unwrap().clone();
    let attention = model.param(ParamId::AttentionWeight).unwrap().clone();

    let (_, grads) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    Adam::new(0.01).step(&mut model, &grads).unwrap();

    assert_eq!(model.param(ParamId::HeadWeight).unwrap(), &head);
    assert_ne!(model.param(ParamId::AttentionWeight).unwrap(), &attention);
}

#[test]
fn test_adam_lowers_loss() {
    let (mut model, x, aux, targets) = setup();
    let mut adam = Adam::new(0.01).with_weight_decay(WeightDecay::default());
    let initial = model.loss_with_attention(&x, &aux, &targets).unwrap().loss;
    for _ in 0..20 {
        let (_, grads) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
        adam.step(&mut model, &grads).unwrap();
    }
    let last = model.loss_with_attention(&x, &aux, &targets).unwrap().loss;
    assert!(last < initial, "{last} >= {initial}");
}

#[test]
fn test_weight_decay_shrinks_params_with_zero_grad() {
    let (mut model, _, _, _) = setup();
    *model.param_mut(ParamId::HeadBias).unwrap() = Tensor::new(&[1.0, -1.0], &[1, 2]);
    let mut grads = Gradients::new();
    grads.insert(ParamId::HeadBias, Tensor::zeros(&[1, 2]));

    // 无衰减：零梯度不改变参数
    Adam::new(0.1).step(&mut model, &grads).unwrap();
    assert_eq!(model.param(ParamId::HeadBias).unwrap().data_as_slice(), &[1.0, -1.0]);

    // 有衰减：参数向零收缩
    let mut adam = Adam::new(0.1).with_weight_decay(WeightDecay(0.5));
    adam.step(&mut model, &grads).unwrap();
    let after = model.param(ParamId::HeadBias).unwrap();
    assert!(after[[0, 0]] < 1.0 && after[[0, 0]] > 0.0);
    assert!(after[[0, 1]] > -1.0 && after[[0, 1]] < 0.0);
}

#[test]
fn test_adam_rejects_mismatched_grad() {
    let (mut model, _, _, _) = setup();
    let before = model.clone();
    let mut grads = Gradients::new();
    grads.insert(ParamId::AttentionWeight, Tensor::filled(1.0, &[2, 16]));
    grads.insert(ParamId::HeadBias, Tensor::zeros(&[1, 3]));

    let mut adam = Adam::default();
    assert!(matches!(adam.step(&mut model, &grads), Err(ModelError::Tensor(_))));

    // 出错时不留下部分更新
    assert_eq!(adam.timestep(), 0);
    assert!(adam.get_momentum(ParamId::AttentionWeight).is_none());
    for id in model.param_ids() {
        assert_eq!(model.param(id), before.param(id), "{id}");
    }
}

#[test]
fn test_adam_rejects_moments_of_other_shape() {
    let (mut model, _, _, _) = setup();
    let mut grads = Gradients::new();
    grads.insert(ParamId::HeadBias, Tensor::filled(1.0, &[1, 2]));
    let mut adam = Adam::new(0.1);
    adam.step(&mut model, &grads).unwrap();

    // 换成另一种形状的模型后，旧动量不能继续使用
    let mut other_config = tiny_config();
    other_config.num_classes = 3;
    let mut other = AttentionDeconvNet::new(other_config, Device::Cpu).unwrap();
    let before = other.param(ParamId::HeadBias).unwrap().clone();
    let mut grads = Gradients::new();
    grads.insert(ParamId::HeadBias, Tensor::filled(1.0, &[1, 3]));
    assert!(adam.step(&mut other, &grads).is_err());
    assert_eq!(adam.timestep(), 1);
    assert_eq!(other.param(ParamId::HeadBias).unwrap(), &before);
}

#[test]
fn test_adam_reset_and_learning_rate() {
    let (mut model, x, aux, targets) = setup();
    let (_, grads) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    let mut adam = Adam::new(0.01);
    adam.step(&mut model, &grads).unwrap();
    adam.set_learning_rate(0.5);
    assert_abs_diff_eq!(adam.learning_rate(), 0.5);

    adam.reset();
    assert_eq!(adam.timestep(), 0);
    assert!(adam.get_momentum(ParamId::AttentionWeight).is_none());
}

#[test]
fn test_adam_save_load_roundtrip() {
    let (mut model, x, aux, targets) = setup();
    let (_, grads) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
    let mut adam = Adam::new(0.01).with_weight_decay(WeightDecay::default());
    adam.step(&mut model, &grads).unwrap();

    let path = std::env::temp_dir().join("attn_deconv_adam_roundtrip.bin");
    adam.save(&path).unwrap();
    let loaded = Adam::load(&path);
    fs::remove_file(&path).ok();
    assert_eq!(loaded.unwrap(), adam);
}

#[test]
fn test_adam_load_rejects_model_checkpoint() {
    let (model, _, _, _) = setup();
    let path = std::env::temp_dir().join("attn_deconv_adam_wrong_magic.bin");
    model.save(&path).unwrap();
    let result = Adam::load(&path);
    fs::remove_file(&path).ok();
    assert!(matches!(result, Err(ModelError::InvalidCheckpoint(_))));
}
