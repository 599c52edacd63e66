/*
 * @Date         : 2026-10-16
 * @Description  : 带注意力门损失的反向传播测试（与数值差分对照）
 */

use super::tiny_config;
use crate::nn::{AttentionDeconvNet, Device, LayerId, ModelError, ParamId, TrainScope};
use crate::tensor::Tensor;
use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

fn setup() -> (AttentionDeconvNet, Tensor, Tensor, Vec<usize>) {
    let model = AttentionDeconvNet::new(tiny_config(), Device::Cpu).unwrap();
    let mut rng = StdRng::seed_from_u64(21);
    let x = Tensor::new_normal(0.5, 0.3, &[2, 2, 8, 8], &mut rng);
    let aux = Tensor::new(&[1.0, 0.0, 0.0, 1.0], &[2, 2]);
    (model, x, aux, vec![0, 1])
}

fn numeric_grad(
    model: &AttentionDeconvNet,
    x: &Tensor,
    aux: &Tensor,
    targets: &[usize],
    id: ParamId,
    index: [usize; 2],
) -> f32 {
    let h = 1e-2;
    let mut plus = model.clone();
    plus.param_mut(id).unwrap()[index] += h;
    let mut minus = model.clone();
    minus.param_mut(id).unwrap()[index] -= h;
    let lp = plus.loss_with_attention(x, aux, targets).unwrap().loss;
    let lm = minus.loss_with_attention(x, aux, targets).unwrap().loss;
    (lp - lm) / (2.0 * h)
}

#[test]
fn test_attention_scope_only_touches_attention() {
    let (model, x, aux, targets) = setup();
    let (_, grads) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    let ids: Vec<ParamId> = grads.iter().map(|(id, _)| id).collect();
    assert_eq!(ids, vec![ParamId::AttentionWeight, ParamId::AttentionBias]);
    assert_eq!(grads.get(ParamId::AttentionWeight).unwrap().shape(), &[2, 16]);
    assert_eq!(grads.get(ParamId::AttentionBias).unwrap().shape(), &[1, 16]);
}

#[test]
fn test_full_scope_covers_every_param() {
    let (model, x, aux, targets) = setup();
    let (_, grads) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
    assert_eq!(grads.len(), model.param_ids().len());
    for id in model.param_ids() {
        let g = grads.get(id).unwrap();
        assert_eq!(g.shape(), model.param(id).unwrap().shape(), "{id}");
        assert!(g.is_all_finite(), "{id}");
    }
}

#[test]
fn test_loss_matches_forward() {
    let (model, x, aux, targets) = setup();
    let (out, _) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    let forward = model.loss_with_attention(&x, &aux, &targets).unwrap();
    assert_abs_diff_eq!(out.loss, forward.loss, epsilon = 1e-6);
    assert_abs_diff_eq!(out.accuracy, forward.accuracy);
}

#[test]
fn test_scopes_agree_on_attention_grads() {
    let (model, x, aux, targets) = setup();
    let (_, partial) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    let (_, full) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
    for id in [ParamId::AttentionWeight, ParamId::AttentionBias] {
        assert_abs_diff_eq!(partial.get(id).unwrap(), full.get(id).unwrap(), epsilon = 1e-6);
    }
}

#[test]
fn test_attention_weight_grad_matches_finite_difference() {
    let (model, x, aux, targets) = setup();
    let (_, grads) = model
        .backward_with_attention(&x, &aux, &targets, TrainScope::Attention)
        .unwrap();
    let analytic = grads.get(ParamId::AttentionWeight).unwrap();
    for index in [[0, 0], [0, 7], [1, 3], [1, 15]] {
        let numeric = numeric_grad(&model, &x, &aux, &targets, ParamId::AttentionWeight, index);
        assert_abs_diff_eq!(analytic[index], numeric, epsilon = 1e-3);
    }
    let bias = grads.get(ParamId::AttentionBias).unwrap();
    let numeric = numeric_grad(&model, &x, &aux, &targets, ParamId::AttentionBias, [0, 5]);
    assert_abs_diff_eq!(bias[[0, 5]], numeric, epsilon = 1e-3);
}

#[test]
fn test_head_grad_matches_finite_difference() {
    let (model, x, aux, targets) = setup();
    let (_, grads) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
    let analytic = grads.get(ParamId::HeadWeight).unwrap();
    for index in [[0, 0], [5, 1], [15, 0]] {
        let numeric = numeric_grad(&model, &x, &aux, &targets, ParamId::HeadWeight, index);
        assert_abs_diff_eq!(analytic[index], numeric, epsilon = 1e-3);
    }
}

/// 卷积权重经过 ReLU 与池化，不宜逐点差分；改为验证沿负梯度走一小步会降低损失
#[test]
fn test_conv_grads_descend() {
    let (model, x, aux, targets) = setup();
    let (out, grads) = model.backward_with_attention(&x, &aux, &targets, TrainScope::Full).unwrap();
    let id = ParamId::ConvWeight(LayerId::new(1, 1));
    let g = grads.get(id).unwrap();
    assert!(g.map(f32::abs).max_value() > 0.0);

    let mut stepped = model.clone();
    *stepped.param_mut(id).unwrap() -= &(g * 1e-2);
    let after = stepped.loss_with_attention(&x, &aux, &targets).unwrap();
    assert!(after.loss < out.loss);
}

#[test]
fn test_backward_rejects_bad_labels() {
    let (model, x, aux, _) = setup();
    assert!(matches!(
        model.backward_with_attention(&x, &aux, &[0, 3], TrainScope::Attention),
        Err(ModelError::InvalidLabel { label: 3, .. })
    ));
    assert!(model.backward_with_attention(&x, &aux, &[0], TrainScope::Attention).is_err());
}
