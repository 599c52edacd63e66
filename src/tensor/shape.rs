use super::Tensor;
use crate::errors::TensorError;
use ndarray::{ArrayView2, Axis, Ix2};

impl Tensor {
    /// 特征图为[batch, C, H, W]；全连接阶段为[batch, features]
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// 张量的维（dim）数、阶（rank）数
    pub fn dims(&self) -> usize {
        self.data.ndim()
    }

    /// 张量中所有元素的数量
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 判断两个张量的形状是否严格一致。如：形状为 [1, 4]，[1, 4]和[4]是不一致的，会返回false
    pub fn is_same_shape(&self, other: &Self) -> bool {
        self.shape() == other.shape()
    }

    /// 首维（batch）大小；标量返回1
    pub fn batch_size(&self) -> usize {
        self.shape().first().copied().unwrap_or(1)
    }

    pub fn reshape(&self, shape: &[usize]) -> Result<Self, TensorError> {
        let new_total_elements: usize = shape.iter().product();
        if self.size() != new_total_elements {
            return Err(TensorError::IncompatibleShape {
                from: self.shape().to_vec(),
                to: shape.to_vec(),
            });
        }
        Self::from_vec(self.data_as_slice().to_vec(), shape)
    }

    /// 按4D[batch, C, H, W]解析形状，`op`用于错误信息
    pub fn dims4(&self, op: &'static str) -> Result<(usize, usize, usize, usize), TensorError> {
        match *self.shape() {
            [b, c, h, w] => Ok((b, c, h, w)),
            _ => Err(TensorError::DimensionMismatch {
                op,
                expected: 4,
                got: self.dims(),
            }),
        }
    }

    /// 按2D[rows, cols]解析形状，`op`用于错误信息
    pub fn dims2(&self, op: &'static str) -> Result<(usize, usize), TensorError> {
        match *self.shape() {
            [r, c] => Ok((r, c)),
            _ => Err(TensorError::DimensionMismatch {
                op,
                expected: 2,
                got: self.dims(),
            }),
        }
    }

    pub(crate) fn as_matrix(&self, op: &'static str) -> Result<ArrayView2<'_, f32>, TensorError> {
        self.data
            .view()
            .into_dimensionality::<Ix2>()
            .map_err(|_| TensorError::DimensionMismatch {
                op,
                expected: 2,
                got: self.dims(),
            })
    }

    /// 取出第`index`个样本，保留长度为1的 batch 维
    pub fn batch_item(&self, index: usize) -> Result<Tensor, TensorError> {
        if index >= self.batch_size() || self.dims() == 0 {
            return Err(TensorError::ShapeMismatch {
                expected: vec![index + 1],
                got: self.shape().to_vec(),
                message: format!("样本索引{index}越界"),
            });
        }
        let item = self.data.index_axis(Axis(0), index).insert_axis(Axis(0));
        Ok(Tensor::from_array(item.to_owned()))
    }

    /// 将多个张量堆叠起来。
    /// * `new_dim` 为`true`时，所有张量形状必须一致，结果在最前面多出一个长度为`tensors.len()`的维度；
    /// * `new_dim` 为`false`时，沿首维拼接，除首维外其余维度必须一致。
    pub fn stack(tensors: &[&Self], new_dim: bool) -> Result<Self, TensorError> {
        let first = tensors.first().ok_or(TensorError::EmptyList)?;
        let first_shape = first.shape();
        let skip = usize::from(!new_dim);

        for t in tensors {
            let compatible = t.dims() == first.dims()
                && t.shape().iter().skip(skip).eq(first_shape.iter().skip(skip));
            if !compatible {
                return Err(TensorError::shape_mismatch(
                    first_shape,
                    t.shape(),
                    "堆叠的张量形状不一致",
                ));
            }
        }

        let data: Vec<f32> = tensors
            .iter()
            .flat_map(|t| t.data_as_slice().iter().copied())
            .collect();

        let mut shape = first_shape.to_vec();
        if new_dim {
            shape.insert(0, tensors.len());
        } else if let Some(leading) = shape.first_mut() {
            *leading = tensors.iter().map(|t| t.shape()[0]).sum();
        }
        Self::from_vec(data, &shape)
    }

    /// 仅保留第`channel`个通道，其余通道置零（形状不变）
    pub fn keep_channel(&self, channel: usize) -> Result<Tensor, TensorError> {
        let (_, channels, _, _) = self.dims4("keep_channel")?;
        if channel >= channels {
            return Err(TensorError::ShapeMismatch {
                expected: vec![channel + 1],
                got: vec![channels],
                message: format!("通道索引{channel}越界"),
            });
        }
        let mut data = self.data.clone();
        for (c, mut lane) in data.axis_iter_mut(Axis(1)).enumerate() {
            if c != channel {
                lane.fill(0.0);
            }
        }
        Ok(Tensor::from_array(data))
    }

    /// 对[batch, n]张量的每一行取最大值下标（相等时取首个）
    pub fn argmax_rows(&self) -> Result<Vec<usize>, TensorError> {
        let matrix = self.as_matrix("argmax_rows")?;
        Ok(matrix
            .rows()
            .into_iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
                        if v > best_v { (i, v) } else { (best_i, best_v) }
                    })
                    .0
            })
            .collect())
    }

    /// 去掉首维（要求 batch 为1），如[1, C, H, W] -> [C, H, W]
    pub fn squeeze_batch(&self) -> Result<Tensor, TensorError> {
        if self.dims() == 0 || self.shape()[0] != 1 {
            return Err(TensorError::shape_mismatch(&[1], self.shape(), "仅能去掉长度为1的 batch 维"));
        }
        Self::from_vec(self.data_as_slice().to_vec(), &self.shape()[1..])
    }
}
