use crate::tensor::Tensor;
use crate::vision::{ImageType, Vision, VisionError};
use std::fs;
use std::path::PathBuf;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("attn_deconv_vision_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    dir
}

#[test]
fn test_image_type() {
    assert_eq!(Vision::image_type(&Tensor::zeros(&[1, 4, 4])).unwrap(), ImageType::Gray);
    assert_eq!(Vision::image_type(&Tensor::zeros(&[3, 4, 4])).unwrap(), ImageType::RGB);
    assert!(matches!(
        Vision::image_type(&Tensor::zeros(&[2, 4, 4])),
        Err(VisionError::Shape(s)) if s == vec![2, 4, 4]
    ));
}

#[test]
fn test_save_image_stretches_to_full_range() {
    let dir = scratch_dir("stretch");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("gray.png");
    let t = Tensor::new(&[-2.0, 0.0, 2.0, 2.0], &[1, 2, 2]);
    Vision::save_image(&t, &path).unwrap();

    let img = image::open(&path).unwrap().to_luma8();
    fs::remove_dir_all(&dir).ok();
    assert_eq!(img.dimensions(), (2, 2));
    assert_eq!(img.get_pixel(0, 0)[0], 0);
    assert_eq!(img.get_pixel(1, 0)[0], 128);
    assert_eq!(img.get_pixel(0, 1)[0], 255);
}

#[test]
fn test_save_image_constant_is_black() {
    let dir = scratch_dir("constant");
    fs::create_dir_all(&dir).unwrap();
    let path = dir.join("rgb.png");
    Vision::save_image(&Tensor::filled(0.3, &[3, 3, 5]), &path).unwrap();

    let img = image::open(&path).unwrap().to_rgb8();
    fs::remove_dir_all(&dir).ok();
    assert_eq!(img.dimensions(), (5, 3));
    assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
}

#[test]
fn test_save_reconstructions() {
    let dir = scratch_dir("stack");
    let stack = Tensor::new(&(0..2 * 3 * 4 * 4).map(|i| i as f32).collect::<Vec<_>>(), &[2, 3, 4, 4]);
    let written = Vision::save_reconstructions(&stack, &dir, "block1").unwrap();

    assert_eq!(
        written,
        vec![dir.join("block1_0.png"), dir.join("block1_1.png"), dir.join("block1.npy")]
    );
    assert!(written.iter().all(|p| p.is_file()));

    let restored: ndarray::ArrayD<f32> = ndarray_npy::read_npy(dir.join("block1.npy")).unwrap();
    fs::remove_dir_all(&dir).ok();
    assert_eq!(restored.shape(), &[2, 3, 4, 4]);
    assert_eq!(&restored, stack.data());
}

#[test]
fn test_save_reconstructions_rejects_bad_shapes() {
    let dir = scratch_dir("bad_shape");
    assert!(matches!(
        Vision::save_reconstructions(&Tensor::zeros(&[3, 4, 4]), &dir, "x"),
        Err(VisionError::Shape(_))
    ));
    // 2 通道无法作为图像导出
    assert!(matches!(
        Vision::save_reconstructions(&Tensor::zeros(&[1, 2, 4, 4]), &dir, "x"),
        Err(VisionError::Shape(_))
    ));
    fs::remove_dir_all(&dir).ok();
}
