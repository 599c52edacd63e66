//! 数据变换函数
//!
//! 图像读入后统一转为[1, 3, H, W]、取值[0, 1]的张量，标签转为 one-hot 注意力信号。

use std::path::Path;

use image::DynamicImage;
use image::imageops::FilterType;

use crate::data::error::DataError;
use crate::tensor::Tensor;

/// 将类别索引转换为 one-hot 编码，即`eye(num_classes)[labels]`
///
/// # 返回
/// one-hot 编码 Tensor，形状 [N, num_classes]
///
/// # 示例
/// ```ignore
/// let a = one_hot(&[0, 1, 1], 2)?;
/// // 结果: [[1,0], [0,1], [0,1]]
/// ```
pub fn one_hot(labels: &[usize], num_classes: usize) -> Result<Tensor, DataError> {
    let n = labels.len();
    let mut data = vec![0.0; n * num_classes];
    for (i, &class_idx) in labels.iter().enumerate() {
        if class_idx >= num_classes {
            return Err(DataError::IndexOutOfBounds {
                index: class_idx,
                len: num_classes,
            });
        }
        data[i * num_classes + class_idx] = 1.0;
    }
    Ok(Tensor::new(&data, &[n, num_classes]))
}

/// 把图像缩放到`size`=(H, W)，转为 RGB，并归一化到[0, 1]，返回[1, 3, H, W]
pub fn image_to_tensor(image: &DynamicImage, size: (usize, usize)) -> Tensor {
    let (h, w) = size;
    let rgb = image.resize_exact(w as u32, h as u32, FilterType::Triangle).to_rgb8();
    let plane = h * w;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let offset = y as usize * w + x as usize;
        for c in 0..3 {
            data[c * plane + offset] = f32::from(pixel[c]) / 255.0;
        }
    }
    Tensor::new(&data, &[1, 3, h, w])
}

/// 读取单张图像，返回[1, 3, H, W]
pub fn load_image<P: AsRef<Path>>(path: P, size: (usize, usize)) -> Result<Tensor, DataError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(DataError::FileNotFound(path.to_path_buf()));
    }
    let image = image::open(path).map_err(|source| DataError::Image {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(image_to_tensor(&image, size))
}
