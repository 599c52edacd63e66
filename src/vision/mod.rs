/*
 * @Date         : 2026-10-16
 * @Description  : 本模块把重建结果导出为图像与 .npy 数组。
 *                 在本模块中，不严谨地说：
 *                 1. 所谓的image/图像是指[C, H, W]（C 为1或3）的张量；
 *                 2. 重建结果的取值范围任意，导出前按整张图的最小/最大值线性拉伸到0~255。
 */

use crate::tensor::Tensor;
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray_npy::write_npy;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[cfg(test)]
mod tests;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("图像编码失败: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
    #[error("写入 npy 失败: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
    #[error("无法作为图像导出的形状 {0:?}（需为[C, H, W]且 C 为1或3）")]
    Shape(Vec<usize>),
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum ImageType {
    Gray, // 单通道
    RGB,  // 3通道
}

pub struct Vision;

impl Vision {
    pub fn image_type(tensor: &Tensor) -> Result<ImageType, VisionError> {
        match tensor.shape() {
            [1, _, _] => Ok(ImageType::Gray),
            [3, _, _] => Ok(ImageType::RGB),
            shape => Err(VisionError::Shape(shape.to_vec())),
        }
    }

    /// 把[C, H, W]张量按 min-max 拉伸后保存为 PNG（或由扩展名决定的格式）
    pub fn save_image<P: AsRef<Path>>(tensor: &Tensor, path: P) -> Result<(), VisionError> {
        let image_type = Self::image_type(tensor)?;
        let (h, w) = (tensor.shape()[1], tensor.shape()[2]);
        let pixels = Self::stretch_to_u8(tensor);
        let plane = h * w;

        match image_type {
            ImageType::Gray => {
                let imgbuf = GrayImage::from_fn(w as u32, h as u32, |x, y| {
                    Luma([pixels[y as usize * w + x as usize]])
                });
                imgbuf.save(path)?;
            }
            ImageType::RGB => {
                let imgbuf = RgbImage::from_fn(w as u32, h as u32, |x, y| {
                    let offset = y as usize * w + x as usize;
                    Rgb([pixels[offset], pixels[plane + offset], pixels[2 * plane + offset]])
                });
                imgbuf.save(path)?;
            }
        }
        Ok(())
    }

    pub fn save_npy<P: AsRef<Path>>(tensor: &Tensor, path: P) -> Result<(), VisionError> {
        write_npy(path, tensor.data())?;
        Ok(())
    }

    /// 导出[N, C, H, W]的一组重建：`{prefix}_{i}.png`（i 从0开始）以及整组的`{prefix}.npy`。
    /// 返回写出的全部文件路径
    pub fn save_reconstructions<P: AsRef<Path>>(
        stack: &Tensor,
        dir: P,
        prefix: &str,
    ) -> Result<Vec<PathBuf>, VisionError> {
        let dir = dir.as_ref();
        if stack.dims() != 4 {
            return Err(VisionError::Shape(stack.shape().to_vec()));
        }
        fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(stack.shape()[0] + 1);
        for i in 0..stack.shape()[0] {
            let item = stack
                .batch_item(i)
                .and_then(|t| t.squeeze_batch())
                .map_err(|_| VisionError::Shape(stack.shape().to_vec()))?;
            let path = dir.join(format!("{prefix}_{i}.png"));
            Self::save_image(&item, &path)?;
            written.push(path);
        }
        let npy = dir.join(format!("{prefix}.npy"));
        Self::save_npy(stack, &npy)?;
        written.push(npy);
        tracing::info!("已导出{}个文件到 {}", written.len(), dir.display());
        Ok(written)
    }

    /// 线性拉伸到0~255；整张图为常数时输出全0
    fn stretch_to_u8(tensor: &Tensor) -> Vec<u8> {
        let (min, max) = (tensor.min_value(), tensor.max_value());
        let range = max - min;
        tensor
            .data_as_slice()
            .iter()
            .map(|&v| {
                if range > 0.0 && range.is_finite() {
                    ((v - min) / range * 255.0).round().clamp(0.0, 255.0) as u8
                } else {
                    0
                }
            })
            .collect()
    }
}
