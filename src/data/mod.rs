//! 数据加载模块
//!
//! 提供图像数据集读取与变换。
//!
//! # 主要组件
//!
//! - [`ImageDataset`]: 训练与验证依赖的数据集接口
//! - [`ImageFolderDataset`]: 按目录结构读取的图像分类数据集
//! - [`InMemoryDataset`]: 直接持有张量的数据集
//! - [`transforms`]: 数据变换函数（one-hot、图像转张量等）
//! - [`DataError`]: 数据加载错误类型
//!
//! # 使用示例
//!
//! ```ignore
//! use attn_deconv::data::{ImageDataset, ImageFolderDataset, one_hot};
//!
//! let data = ImageFolderDataset::open("data/", (128, 128))?;
//! let (x, labels) = data.get(&[0, 1, 2], false)?;
//! let aux = one_hot(&labels, 2)?;
//! ```

mod dataset;
pub mod error;
pub mod transforms;

#[cfg(test)]
mod tests;

pub use dataset::{ImageDataset, ImageFolderDataset, InMemoryDataset};
pub use error::DataError;
pub use transforms::{image_to_tensor, load_image, one_hot};
