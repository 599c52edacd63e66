/*
 * @Date         : 2026-10-16
 * @Description  : Conv2d (2D 卷积) 层，以及与之共用内核的转置卷积（反卷积）
 *
 * 输入/输出形状：
 * - 输入：[batch_size, in_channels, H, W]
 * - 卷积核：[out_channels, in_channels, kH, kW]
 * - 输出：[batch_size, out_channels, H', W']
 *
 * 输出尺寸计算：
 * H' = (H + 2*padding_h - kernel_h) / stride_h + 1
 * W' = (W + 2*padding_w - kernel_w) / stride_w + 1
 *
 * 转置卷积使用同一个卷积核，把 out_channels 映射回 in_channels：
 * H = (H' - 1)*stride_h - 2*padding_h + kernel_h
 * 它既是卷积对输入的梯度，也是可视化时镜像该卷积的“反卷积层”。
 *
 * 填充不做显式拷贝，而是在内核中跳过落在填充区的位置。
 * 使用 Rayon 在输出平面（batch × 通道）维度上并行。
 */

use super::Init;
use crate::errors::TensorError;
use crate::tensor::Tensor;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Conv2d (2D 卷积) 层：`output = conv2d(x, K) + b`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conv2d {
    /// 卷积核参数 [out_channels, in_channels, kernel_h, kernel_w]
    weight: Tensor,
    /// 偏置参数 [1, out_channels]（可选）
    bias: Option<Tensor>,
    /// 步长 (stride_h, stride_w)
    stride: (usize, usize),
    /// 填充 (padding_h, padding_w)
    padding: (usize, usize),
}

/// Conv2d 反向传播的结果
#[derive(Debug, Clone)]
pub struct Conv2dGrads {
    pub input: Tensor,
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Conv2d {
    /// 创建新的 Conv2d 层，卷积核按 LeCun 正态分布初始化，偏置初始化为零
    pub fn new<R: Rng + ?Sized>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: (usize, usize),
        stride: (usize, usize),
        padding: (usize, usize),
        use_bias: bool,
        rng: &mut R,
    ) -> Self {
        let (k_h, k_w) = kernel_size;
        let weight = Init::LeCunNormal.tensor(&[out_channels, in_channels, k_h, k_w], rng);
        let bias = use_bias.then(|| Init::Zeros.tensor(&[1, out_channels], rng));
        Self {
            weight,
            bias,
            stride,
            padding,
        }
    }

    /// 由已有卷积核（与可选偏置）创建
    pub fn from_weight(
        weight: Tensor,
        bias: Option<Tensor>,
        stride: (usize, usize),
        padding: (usize, usize),
    ) -> Result<Self, TensorError> {
        let (out_channels, _, _, _) = weight.dims4("Conv2d 卷积核")?;
        if let Some(b) = &bias {
            if b.shape() != [1, out_channels] {
                return Err(TensorError::shape_mismatch(
                    &[1, out_channels],
                    b.shape(),
                    "卷积偏置须为[1, out_channels]",
                ));
            }
        }
        Ok(Self {
            weight,
            bias,
            stride,
            padding,
        })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn weight_mut(&mut self) -> &mut Tensor {
        &mut self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    pub fn bias_mut(&mut self) -> Option<&mut Tensor> {
        self.bias.as_mut()
    }

    pub fn out_channels(&self) -> usize {
        self.weight.shape()[0]
    }

    pub fn in_channels(&self) -> usize {
        self.weight.shape()[1]
    }

    pub fn kernel_size(&self) -> (usize, usize) {
        (self.weight.shape()[2], self.weight.shape()[3])
    }

    pub const fn stride(&self) -> (usize, usize) {
        self.stride
    }

    pub const fn padding(&self) -> (usize, usize) {
        self.padding
    }

    pub fn output_size(&self, input: (usize, usize)) -> Result<(usize, usize), TensorError> {
        conv_output_size(input, self.kernel_size(), self.stride, self.padding)
    }

    pub fn forward(&self, x: &Tensor) -> Result<Tensor, TensorError> {
        conv2d(x, &self.weight, self.bias.as_ref(), self.stride, self.padding)
    }

    /// 对于 Y = conv(X, K) + b：
    /// - dL/dX：转置卷积
    /// - dL/dK：输入与上游梯度的相关运算
    /// - dL/db：上游梯度在 batch 与空间维度上求和
    pub fn backward(&self, input: &Tensor, upstream: &Tensor) -> Result<Conv2dGrads, TensorError> {
        let (_, _, in_h, in_w) = input.dims4("Conv2d 反向传播")?;
        let grad_input = conv_transpose2d(upstream, &self.weight, self.stride, self.padding, (in_h, in_w))?;
        let grad_weight = conv2d_weight_grad(input, upstream, self.kernel_size(), self.stride, self.padding)?;
        let grad_bias = match self.bias {
            Some(_) => Some(channel_sums(upstream)?),
            None => None,
        };
        Ok(Conv2dGrads {
            input: grad_input,
            weight: grad_weight,
            bias: grad_bias,
        })
    }
}

/// 卷积输出尺寸
pub fn conv_output_size(
    input: (usize, usize),
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<(usize, usize), TensorError> {
    let padded = (input.0 + 2 * padding.0, input.1 + 2 * padding.1);
    if kernel.0 > padded.0 || kernel.1 > padded.1 {
        return Err(TensorError::WindowTooLarge {
            window: kernel,
            input: padded,
        });
    }
    Ok((
        (padded.0 - kernel.0) / stride.0 + 1,
        (padded.1 - kernel.1) / stride.1 + 1,
    ))
}

/// 转置卷积的默认输出尺寸：(H - 1)*stride - 2*padding + kernel
pub fn transposed_output_size(
    input: (usize, usize),
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<(usize, usize), TensorError> {
    let full = (
        input.0.saturating_sub(1) * stride.0 + kernel.0,
        input.1.saturating_sub(1) * stride.1 + kernel.1,
    );
    if full.0 <= 2 * padding.0 || full.1 <= 2 * padding.1 {
        return Err(TensorError::shape_mismatch(
            &[2 * padding.0 + 1, 2 * padding.1 + 1],
            &[full.0, full.1],
            "转置卷积输出尺寸不足以扣除填充",
        ));
    }
    Ok((full.0 - 2 * padding.0, full.1 - 2 * padding.1))
}

/// 执行卷积运算
pub fn conv2d(
    input: &Tensor,
    weight: &Tensor,
    bias: Option<&Tensor>,
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<Tensor, TensorError> {
    let (batch_size, in_c, in_h, in_w) = input.dims4("Conv2d 输入")?;
    let (out_c, k_in_c, k_h, k_w) = weight.dims4("Conv2d 卷积核")?;
    if in_c != k_in_c {
        return Err(TensorError::shape_mismatch(
            &[k_in_c],
            &[in_c],
            format!("输入通道数 {in_c} 与卷积核输入通道数 {k_in_c} 不匹配"),
        ));
    }
    let (out_h, out_w) = conv_output_size((in_h, in_w), (k_h, k_w), stride, padding)?;
    let (s_h, s_w) = stride;
    let (p_h, p_w) = padding;

    let x = input.data_as_slice();
    let k = weight.data_as_slice();
    let b = bias.map(Tensor::data_as_slice);
    let in_plane = in_h * in_w;
    let k_plane = k_h * k_w;

    let mut output = vec![0.0f32; batch_size * out_c * out_h * out_w];
    output
        .par_chunks_mut(out_h * out_w)
        .enumerate()
        .for_each(|(p, out)| {
            let (bi, oc) = (p / out_c, p % out_c);
            let bias_val = b.map_or(0.0, |b| b[oc]);
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut sum = bias_val;
                    for ic in 0..in_c {
                        let x_plane = &x[(bi * in_c + ic) * in_plane..][..in_plane];
                        let k_base = (oc * in_c + ic) * k_plane;
                        for kh in 0..k_h {
                            let ih = oh * s_h + kh;
                            if ih < p_h || ih - p_h >= in_h {
                                continue;
                            }
                            let row = (ih - p_h) * in_w;
                            for kw in 0..k_w {
                                let iw = ow * s_w + kw;
                                if iw < p_w || iw - p_w >= in_w {
                                    continue;
                                }
                                sum += x_plane[row + iw - p_w] * k[k_base + kh * k_w + kw];
                            }
                        }
                    }
                    out[oh * out_w + ow] = sum;
                }
            }
        });

    Tensor::from_vec(output, &[batch_size, out_c, out_h, out_w])
}

/// 转置卷积：输入[batch, out_channels, H', W']，卷积核[out_channels, in_channels, kH, kW]，
/// 输出[batch, in_channels, out_size.0, out_size.1]。
///
/// `out_size`用于消除步长带来的歧义：落在`out_size`之外的贡献被丢弃，
/// 这与前向卷积因向下取整而未覆盖到的输入区域相对应。
pub fn conv_transpose2d(
    input: &Tensor,
    weight: &Tensor,
    stride: (usize, usize),
    padding: (usize, usize),
    out_size: (usize, usize),
) -> Result<Tensor, TensorError> {
    let (batch_size, in_c, in_h, in_w) = input.dims4("转置卷积输入")?;
    let (k_out_c, out_c, k_h, k_w) = weight.dims4("转置卷积的卷积核")?;
    if in_c != k_out_c {
        return Err(TensorError::shape_mismatch(
            &[k_out_c],
            &[in_c],
            format!("转置卷积输入通道数 {in_c} 与卷积核输出通道数 {k_out_c} 不匹配"),
        ));
    }
    let expected = conv_output_size(out_size, (k_h, k_w), stride, padding)?;
    if expected != (in_h, in_w) {
        return Err(TensorError::shape_mismatch(
            &[expected.0, expected.1],
            &[in_h, in_w],
            format!("目标尺寸{out_size:?}与转置卷积输入的空间尺寸不对应"),
        ));
    }

    let (out_h, out_w) = out_size;
    let (s_h, s_w) = stride;
    let (p_h, p_w) = padding;
    let x = input.data_as_slice();
    let k = weight.data_as_slice();
    let in_plane = in_h * in_w;
    let k_plane = k_h * k_w;

    let mut output = vec![0.0f32; batch_size * out_c * out_h * out_w];
    output
        .par_chunks_mut(out_h * out_w)
        .enumerate()
        .for_each(|(p, out)| {
            let (bi, oc) = (p / out_c, p % out_c);
            for ic in 0..in_c {
                let x_plane = &x[(bi * in_c + ic) * in_plane..][..in_plane];
                let k_base = (ic * out_c + oc) * k_plane;
                for ih in 0..in_h {
                    for iw in 0..in_w {
                        let val = x_plane[ih * in_w + iw];
                        if val == 0.0 {
                            continue;
                        }
                        for kh in 0..k_h {
                            let oh = ih * s_h + kh;
                            if oh < p_h || oh - p_h >= out_h {
                                continue;
                            }
                            let row = (oh - p_h) * out_w;
                            for kw in 0..k_w {
                                let ow = iw * s_w + kw;
                                if ow < p_w || ow - p_w >= out_w {
                                    continue;
                                }
                                out[row + ow - p_w] += val * k[k_base + kh * k_w + kw];
                            }
                        }
                    }
                }
            }
        });

    Tensor::from_vec(output, &[batch_size, out_c, out_h, out_w])
}

/// 卷积核梯度：dK[oc, ic, kh, kw] = Σ_{b, oh, ow} dY[b, oc, oh, ow] · X[b, ic, oh*s+kh-p, ow*s+kw-p]
pub fn conv2d_weight_grad(
    input: &Tensor,
    upstream: &Tensor,
    kernel_size: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<Tensor, TensorError> {
    let (batch_size, in_c, in_h, in_w) = input.dims4("卷积核梯度的输入")?;
    let (g_batch, out_c, out_h, out_w) = upstream.dims4("卷积核梯度的上游梯度")?;
    let expected = conv_output_size((in_h, in_w), kernel_size, stride, padding)?;
    if g_batch != batch_size || expected != (out_h, out_w) {
        return Err(TensorError::shape_mismatch(
            &[batch_size, out_c, expected.0, expected.1],
            upstream.shape(),
            "上游梯度形状与卷积输出不一致",
        ));
    }

    let (k_h, k_w) = kernel_size;
    let (s_h, s_w) = stride;
    let (p_h, p_w) = padding;
    let x = input.data_as_slice();
    let g = upstream.data_as_slice();
    let in_plane = in_h * in_w;
    let out_plane = out_h * out_w;

    let mut grad = vec![0.0f32; out_c * in_c * k_h * k_w];
    grad.par_chunks_mut(in_c * k_h * k_w)
        .enumerate()
        .for_each(|(oc, dk)| {
            for bi in 0..batch_size {
                let g_plane = &g[(bi * out_c + oc) * out_plane..][..out_plane];
                for ic in 0..in_c {
                    let x_plane = &x[(bi * in_c + ic) * in_plane..][..in_plane];
                    for kh in 0..k_h {
                        for kw in 0..k_w {
                            let mut sum = 0.0f32;
                            for oh in 0..out_h {
                                let ih = oh * s_h + kh;
                                if ih < p_h || ih - p_h >= in_h {
                                    continue;
                                }
                                for ow in 0..out_w {
                                    let iw = ow * s_w + kw;
                                    if iw < p_w || iw - p_w >= in_w {
                                        continue;
                                    }
                                    sum += g_plane[oh * out_w + ow] * x_plane[(ih - p_h) * in_w + iw - p_w];
                                }
                            }
                            dk[(ic * k_h + kh) * k_w + kw] += sum;
                        }
                    }
                }
            }
        });

    Tensor::from_vec(grad, &[out_c, in_c, k_h, k_w])
}

/// 在 batch 与空间维度上对每个通道求和，得到[1, C]
fn channel_sums(t: &Tensor) -> Result<Tensor, TensorError> {
    let (batch_size, c, h, w) = t.dims4("通道求和")?;
    let data = t.data_as_slice();
    let mut sums = vec![0.0f32; c];
    for bi in 0..batch_size {
        for (ci, acc) in sums.iter_mut().enumerate() {
            *acc += data[(bi * c + ci) * h * w..][..h * w].iter().sum::<f32>();
        }
    }
    Tensor::from_vec(sums, &[1, c])
}
