/*
 * @Date         : 2026-10-16
 * @Description  : 带开关（switch）记录的 2D 最大池化，以及与之配对的反池化（unpooling）
 *
 * 设计决策：
 * - Batch-First 格式：输入必须是 4D [batch, C, H, W]，输出 [batch, C, H', W']
 * - 开关记录的是最大值在“池化窗口内”的展平偏移 kh * kW + kw，取值范围 [0, kH*kW)
 * - 窗口内按行优先顺序扫描，只有严格更大的值才会替换已选中的元素，
 *   即并列最大值时取扫描顺序中的第一个，保证可视化重建结果确定
 * - 反池化是池化在固定开关下的转置：训练时作为池化的反向传播，
 *   可视化时则把任意“虚拟”信号按前向记录的开关路由回输入空间
 * - 使用 Rayon 在 (batch, channel) 平面维度上并行
 */

use crate::errors::TensorError;
use crate::tensor::Tensor;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// 池化窗口与步长
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSpec {
    /// 池化窗口大小 (kH, kW)
    pub window: (usize, usize),
    /// 步长 (sH, sW)
    pub stride: (usize, usize),
}

impl Default for PoolSpec {
    fn default() -> Self {
        Self::square(2)
    }
}

impl PoolSpec {
    pub const fn new(window: (usize, usize), stride: (usize, usize)) -> Self {
        Self { window, stride }
    }

    /// 窗口与步长均为`k`（不重叠池化）
    pub const fn square(k: usize) -> Self {
        Self {
            window: (k, k),
            stride: (k, k),
        }
    }

    /// 输出尺寸：H' = (H - kH) / sH + 1（向下取整），W' 同理
    pub fn output_size(&self, input: (usize, usize)) -> Result<(usize, usize), TensorError> {
        let (k_h, k_w) = self.window;
        let (s_h, s_w) = self.stride;
        if k_h == 0 || k_w == 0 || s_h == 0 || s_w == 0 {
            return Err(TensorError::shape_mismatch(
                &[1, 1],
                &[k_h.min(s_h), k_w.min(s_w)],
                "池化窗口与步长必须为正",
            ));
        }
        if k_h > input.0 || k_w > input.1 {
            return Err(TensorError::WindowTooLarge {
                window: self.window,
                input,
            });
        }
        Ok(((input.0 - k_h) / s_h + 1, (input.1 - k_w) / s_w + 1))
    }
}

/// 一次池化的开关记录：形状与池化输出相同
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchMap {
    shape: [usize; 4],
    window: (usize, usize),
    indices: Vec<u32>,
}

impl SwitchMap {
    /// 与池化输出一致的形状 [batch, C, H', W']
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub const fn window(&self) -> (usize, usize) {
        self.window
    }

    /// 某个输出位置上被选中元素的窗口内偏移
    pub fn get(&self, index: [usize; 4]) -> usize {
        let [_, c, h, w] = self.shape;
        let [bi, ci, hi, wi] = index;
        self.indices[((bi * c + ci) * h + hi) * w + wi] as usize
    }

    /// 行优先展平的全部开关
    pub fn indices(&self) -> &[u32] {
        &self.indices
    }
}

/// 池化方式：由调用方显式选择，而不是由模型内部状态决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolingMode {
    /// 普通最大池化，不向调用方暴露开关（训练与普通推理）
    #[default]
    Plain,
    /// 记录开关与池化前尺寸，供反卷积重建使用
    SwitchRecording,
}

impl PoolingMode {
    pub const fn records_switches(self) -> bool {
        matches!(self, Self::SwitchRecording)
    }
}

/// 2D 最大池化，返回池化结果和开关记录
///
/// # 错误
/// - 输入不是 4D：`DimensionMismatch`
/// - 池化窗口大于输入空间尺寸：`WindowTooLarge`
pub fn max_pool2d(input: &Tensor, spec: PoolSpec) -> Result<(Tensor, SwitchMap), TensorError> {
    let (batch_size, channels, in_h, in_w) = input.dims4("max_pool2d")?;
    let (out_h, out_w) = spec.output_size((in_h, in_w))?;
    let (k_h, k_w) = spec.window;
    let (s_h, s_w) = spec.stride;

    let in_plane = in_h * in_w;
    let out_plane = out_h * out_w;
    let planes = batch_size * channels;
    let x = input.data_as_slice();

    let mut output = vec![0.0f32; planes * out_plane];
    let mut indices = vec![0u32; planes * out_plane];

    output
        .par_chunks_mut(out_plane)
        .zip(indices.par_chunks_mut(out_plane))
        .enumerate()
        .for_each(|(p, (out, idx))| {
            let plane = &x[p * in_plane..(p + 1) * in_plane];
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let h_start = oh * s_h;
                    let w_start = ow * s_w;

                    let mut max_val = f32::NEG_INFINITY;
                    let mut max_idx = 0usize;
                    let mut seen = false;

                    for kh in 0..k_h {
                        for kw in 0..k_w {
                            let val = plane[(h_start + kh) * in_w + w_start + kw];
                            // 严格大于：并列时保留扫描顺序中的第一个；
                            // 窗口内出现 NaN 时输出 NaN，开关指向第一个 NaN
                            if !seen || val > max_val || (val.is_nan() && !max_val.is_nan()) {
                                max_val = val;
                                max_idx = kh * k_w + kw;
                                seen = true;
                            }
                        }
                    }

                    out[oh * out_w + ow] = max_val;
                    idx[oh * out_w + ow] = max_idx as u32;
                }
            }
        });

    let shape = [batch_size, channels, out_h, out_w];
    Ok((
        Tensor::from_vec(output, &shape)?,
        SwitchMap {
            shape,
            window: spec.window,
            indices,
        },
    ))
}

/// 2D 反池化：输出形状为[batch, C, out_h, out_w]，
/// 除开关所指位置接收`values`中对应的值外，其余位置均为零（窗口重叠时累加）
///
/// `out_size`必须显式给出（通常是前向记录的池化前尺寸），
/// 因为步长整除不尽时无法由输出尺寸反推输入尺寸。
///
/// # 错误
/// - `values`与开关形状不一致：`ShapeMismatch`
/// - `out_size`按`spec`池化后得不到开关的空间尺寸：`ShapeMismatch`（不做隐式裁剪或填充）
pub fn max_unpool2d(
    values: &Tensor,
    switches: &SwitchMap,
    spec: PoolSpec,
    out_size: (usize, usize),
) -> Result<Tensor, TensorError> {
    if values.shape() != switches.shape() {
        return Err(TensorError::shape_mismatch(
            switches.shape(),
            values.shape(),
            "反池化的输入须与开关记录形状一致",
        ));
    }
    if spec.window != switches.window() {
        return Err(TensorError::shape_mismatch(
            &[switches.window().0, switches.window().1],
            &[spec.window.0, spec.window.1],
            "反池化窗口须与记录开关时的池化窗口一致",
        ));
    }

    let [batch_size, channels, pooled_h, pooled_w] = switches.shape;
    let implied = spec.output_size(out_size)?;
    if implied != (pooled_h, pooled_w) {
        return Err(TensorError::shape_mismatch(
            &[pooled_h, pooled_w],
            &[implied.0, implied.1],
            &format!("目标尺寸{out_size:?}池化后与开关记录的空间尺寸不符"),
        ));
    }

    let (out_h, out_w) = out_size;
    let (_, k_w) = spec.window;
    let (s_h, s_w) = spec.stride;
    let out_plane = out_h * out_w;
    let pooled_plane = pooled_h * pooled_w;
    let v = values.data_as_slice();
    let idx = switches.indices();

    let mut output = vec![0.0f32; batch_size * channels * out_plane];
    output
        .par_chunks_mut(out_plane)
        .enumerate()
        .for_each(|(p, out)| {
            let v_plane = &v[p * pooled_plane..(p + 1) * pooled_plane];
            let i_plane = &idx[p * pooled_plane..(p + 1) * pooled_plane];
            for ph in 0..pooled_h {
                for pw in 0..pooled_w {
                    let offset = i_plane[ph * pooled_w + pw] as usize;
                    let ih = ph * s_h + offset / k_w;
                    let iw = pw * s_w + offset % k_w;
                    out[ih * out_w + iw] += v_plane[ph * pooled_w + pw];
                }
            }
        });

    Tensor::from_vec(output, &[batch_size, channels, out_h, out_w])
}
