// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input.rs - 图像上传输入
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

use std::sync::Arc;

use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, warn};

use crate::utils::encode_data_url;

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, sniff_mime};

pub const IMAGE_MIME_PREFIX: &str = "image/";

/// 用户上传的文件：原始字节 + MIME 类型 + 文件名
#[derive(Debug, Clone)]
pub struct UploadedImage {
  name: String,
  mime: String,
  data: Arc<[u8]>,
}

impl UploadedImage {
  pub fn new(name: impl Into<String>, mime: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
    Self {
      name: name.into(),
      mime: mime.into(),
      data: data.into(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn mime(&self) -> &str {
    &self.mime
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn shared_data(&self) -> Arc<[u8]> {
    self.data.clone()
  }

  pub fn is_image(&self) -> bool {
    self.mime.starts_with(IMAGE_MIME_PREFIX)
  }

  /// 带 MIME 前缀的 base64 表示，用于预览和远端传输
  pub fn to_data_url(&self) -> String {
    encode_data_url(&self.mime, &self.data)
  }

  pub fn decode(&self) -> Result<DynamicImage, image::ImageError> {
    image::load_from_memory(&self.data)
  }
}

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("Invalid file type: {name} ({mime}), please upload an image file")]
  InvalidFileType { name: String, mime: String },
}

/// 上传区：持有当前选择的文件及其预览
#[derive(Debug, Default)]
pub struct UploadSurface {
  current: Option<UploadedImage>,
  preview: Option<String>,
}

impl UploadSurface {
  pub fn new() -> Self {
    Self::default()
  }

  /// 校验并接受文件；非图像文件被拒绝且不改变任何状态
  pub fn submit(&mut self, file: UploadedImage) -> Result<UploadedImage, UploadError> {
    if !file.is_image() {
      warn!("拒绝非图像文件: {} ({})", file.name(), file.mime());
      return Err(UploadError::InvalidFileType {
        name: file.name,
        mime: file.mime,
      });
    }

    debug!("接受上传文件: {} ({}, {} 字节)", file.name(), file.mime(), file.data().len());
    self.preview = Some(file.to_data_url());
    self.current = Some(file.clone());
    Ok(file)
  }

  /// 清除当前选择，不影响已经发出的评分请求
  pub fn clear(&mut self) {
    self.current = None;
    self.preview = None;
  }

  pub fn current(&self) -> Option<&UploadedImage> {
    self.current.as_ref()
  }

  pub fn preview(&self) -> Option<&str> {
    self.preview.as_deref()
  }
}
