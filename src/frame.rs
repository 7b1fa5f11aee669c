// 该文件是 Xinjing （心镜） 项目的一部分。
// src/frame.rs - NCHW 张量定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::{DynamicImage, imageops::FilterType};

const RGB_CHANNELS: usize = 3;

// ViT 预处理参数：像素缩放到 [0, 1] 后按 0.5 均值/方差归一化
const PIXEL_MEAN: [f32; RGB_CHANNELS] = [0.5, 0.5, 0.5];
const PIXEL_STD: [f32; RGB_CHANNELS] = [0.5, 0.5, 0.5];

/// 归一化后的 RGB 浮点张量，布局为 [1, C, H, W]
#[derive(Debug, Clone)]
pub struct RgbNchwTensor<const W: u32, const H: u32> {
  data: Box<[f32]>,
}

impl<const W: u32, const H: u32> Default for RgbNchwTensor<W, H> {
  fn default() -> Self {
    let size = RGB_CHANNELS * (W as usize) * (H as usize);
    let data = vec![0f32; size].into_boxed_slice();
    Self { data }
  }
}

impl<const W: u32, const H: u32> RgbNchwTensor<W, H> {
  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, H as usize, W as usize]
  }

  pub fn into_vec(self) -> Vec<f32> {
    self.data.into_vec()
  }
}

impl<const W: u32, const H: u32> AsRef<[f32]> for RgbNchwTensor<W, H> {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

impl<const W: u32, const H: u32> From<&DynamicImage> for RgbNchwTensor<W, H> {
  fn from(image: &DynamicImage) -> Self {
    let image = image.resize_exact(W, H, FilterType::Triangle).to_rgb8();
    let mut frame = Self::default();

    let channels = frame.channels();
    let height = frame.height();
    let width = frame.width();

    for c in 0..channels {
      for h in 0..height {
        for w in 0..width {
          let pixel = image.get_pixel(w as u32, h as u32);
          let value = pixel[c] as f32 / 255.0;
          let index = c * height * width + h * width + w;
          frame.data[index] = (value - PIXEL_MEAN[c]) / PIXEL_STD[c];
        }
      }
    }
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{Rgb, RgbImage};

  #[test]
  fn normalizes_into_unit_range() {
    let mut image = RgbImage::new(4, 4);
    for pixel in image.pixels_mut() {
      *pixel = Rgb([255, 0, 255]);
    }
    let tensor = RgbNchwTensor::<4, 4>::from(&DynamicImage::ImageRgb8(image));

    assert_eq!(tensor.shape(), [1, 3, 4, 4]);
    let data = tensor.as_ref();
    // 平面布局：先 R 平面，再 G 平面，最后 B 平面
    assert!(data[..16].iter().all(|v| (*v - 1.0).abs() < 1e-2));
    assert!(data[16..32].iter().all(|v| (*v + 1.0).abs() < 1e-2));
    assert!(data[32..].iter().all(|v| (*v - 1.0).abs() < 1e-2));
  }

  #[test]
  fn resizes_to_target_shape() {
    let image = DynamicImage::new_rgb8(31, 17);
    let tensor = RgbNchwTensor::<8, 6>::from(&image);
    assert_eq!(tensor.shape(), [1, 3, 6, 8]);
    assert_eq!(tensor.into_vec().len(), 3 * 6 * 8);
  }
}
