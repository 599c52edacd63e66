//! 图像分类数据集
//!
//! - [`ImageDataset`]: 训练循环与验证器依赖的统一接口
//! - [`ImageFolderDataset`]: 按`root/{train,test}/<类别>/*`目录结构读取的图像集
//! - [`InMemoryDataset`]: 直接持有张量的数据集（测试与小实验）

use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::data::error::DataError;
use crate::data::transforms::load_image;
use crate::tensor::Tensor;

/// 图像分类数据集
///
/// `get`返回的图像为[B, C, H, W]，取值[0, 1]；标签为类别下标
pub trait ImageDataset {
    /// 训练集样本数
    fn count(&self) -> usize;

    /// 测试集样本数
    fn test_count(&self) -> usize;

    fn get(&self, indices: &[usize], test: bool) -> Result<(Tensor, Vec<usize>), DataError>;

    fn len_of(&self, test: bool) -> usize {
        if test { self.test_count() } else { self.count() }
    }
}

/// 按目录读取的图像集，图像在`get`时才解码并缩放
#[derive(Debug, Clone)]
pub struct ImageFolderDataset {
    root: PathBuf,
    classes: Vec<String>,
    train: Vec<(PathBuf, usize)>,
    test: Vec<(PathBuf, usize)>,
    size: (usize, usize),
}

impl ImageFolderDataset {
    /// 扫描`root/train`与`root/test`；类别按训练集子目录名排序后的位置编号
    pub fn open<P: AsRef<Path>>(root: P, size: (usize, usize)) -> Result<Self, DataError> {
        let root = root.as_ref().to_path_buf();
        let train_dir = root.join("train");
        let test_dir = root.join("test");
        for dir in [&train_dir, &test_dir] {
            if !dir.is_dir() {
                return Err(DataError::FileNotFound(dir.clone()));
            }
        }

        let classes = Self::class_names(&train_dir)?;
        if classes.is_empty() {
            return Err(DataError::FormatError(format!(
                "{} 下没有类别子目录",
                train_dir.display()
            )));
        }
        let train = Self::scan(&train_dir, &classes)?;
        let test = Self::scan(&test_dir, &classes)?;
        tracing::info!(
            "数据集 {}：{}个类别，训练 {} 张，测试 {} 张",
            root.display(),
            classes.len(),
            train.len(),
            test.len()
        );
        Ok(Self {
            root,
            classes,
            train,
            test,
            size,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub const fn image_size(&self) -> (usize, usize) {
        self.size
    }

    fn class_names(dir: &Path) -> Result<Vec<String>, DataError> {
        let mut names = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn scan(dir: &Path, classes: &[String]) -> Result<Vec<(PathBuf, usize)>, DataError> {
        let mut items = Vec::new();
        for (label, class) in classes.iter().enumerate() {
            let class_dir = dir.join(class);
            if !class_dir.is_dir() {
                continue;
            }
            let mut files: Vec<PathBuf> = fs::read_dir(&class_dir)?
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .filter(|p| {
                    // 只收录`image`能解码的格式，按扩展名判断
                    let readable = image::ImageFormat::from_path(p).is_ok_and(|f| f.reading_enabled());
                    if !readable {
                        tracing::debug!("跳过非图像文件 {}", p.display());
                    }
                    readable
                })
                .collect();
            files.sort();
            items.extend(files.into_iter().map(|p| (p, label)));
        }
        Ok(items)
    }
}

impl ImageDataset for ImageFolderDataset {
    fn count(&self) -> usize {
        self.train.len()
    }

    fn test_count(&self) -> usize {
        self.test.len()
    }

    fn get(&self, indices: &[usize], test: bool) -> Result<(Tensor, Vec<usize>), DataError> {
        let items = if test { &self.test } else { &self.train };
        let picked = indices
            .iter()
            .map(|&i| {
                items.get(i).ok_or(DataError::IndexOutOfBounds {
                    index: i,
                    len: items.len(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let images = picked
            .par_iter()
            .map(|(path, _)| load_image(path, self.size))
            .collect::<Result<Vec<_>, _>>()?;
        let refs: Vec<&Tensor> = images.iter().collect();
        let batch = Tensor::stack(&refs, false).map_err(|e| DataError::FormatError(e.to_string()))?;
        Ok((batch, picked.iter().map(|(_, label)| *label).collect()))
    }
}

/// 直接持有张量的数据集
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    train: (Tensor, Vec<usize>),
    test: (Tensor, Vec<usize>),
}

impl InMemoryDataset {
    /// 图像须为[N, C, H, W]，标签数须为 N
    pub fn new(
        train_images: Tensor,
        train_labels: Vec<usize>,
        test_images: Tensor,
        test_labels: Vec<usize>,
    ) -> Result<Self, DataError> {
        for (images, labels) in [(&train_images, &train_labels), (&test_images, &test_labels)] {
            let shape = images.shape();
            if shape.len() != 4 || shape[0] != labels.len() {
                return Err(DataError::ShapeMismatch {
                    expected: vec![labels.len(), 0, 0, 0],
                    got: shape.to_vec(),
                });
            }
        }
        Ok(Self {
            train: (train_images, train_labels),
            test: (test_images, test_labels),
        })
    }
}

impl ImageDataset for InMemoryDataset {
    fn count(&self) -> usize {
        self.train.1.len()
    }

    fn test_count(&self) -> usize {
        self.test.1.len()
    }

    fn get(&self, indices: &[usize], test: bool) -> Result<(Tensor, Vec<usize>), DataError> {
        let (images, labels) = if test { &self.test } else { &self.train };
        let mut items = Vec::with_capacity(indices.len());
        let mut picked = Vec::with_capacity(indices.len());
        for &i in indices {
            if i >= labels.len() {
                return Err(DataError::IndexOutOfBounds {
                    index: i,
                    len: labels.len(),
                });
            }
            items.push(
                images
                    .batch_item(i)
                    .map_err(|e| DataError::FormatError(e.to_string()))?,
            );
            picked.push(labels[i]);
        }
        let refs: Vec<&Tensor> = items.iter().collect();
        let batch = Tensor::stack(&refs, false).map_err(|e| DataError::FormatError(e.to_string()))?;
        Ok((batch, picked))
    }
}
