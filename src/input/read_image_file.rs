// 该文件是 Xinjing （心镜） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, input::UploadedImage};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

const FALLBACK_MIME: &str = "application/octet-stream";

/// 判断文件的 MIME 类型：优先按内容识别，其次按扩展名
pub fn sniff_mime(name: &str, data: &[u8]) -> String {
  if let Some(kind) = infer::get(data) {
    return kind.mime_type().to_string();
  }

  let lower = name.to_lowercase();
  let mime = match lower.rsplit_once('.').map(|(_, ext)| ext) {
    Some("jpg") | Some("jpeg") => "image/jpeg",
    Some("png") => "image/png",
    Some("bmp") => "image/bmp",
    Some("gif") => "image/gif",
    Some("webp") => "image/webp",
    Some("pdf") => "application/pdf",
    _ => FALLBACK_MIME,
  };
  mime.to_string()
}

/// 从本地文件读取的一次性输入
pub struct ImageFileInput {
  image: Option<UploadedImage>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    Self::open(url.path())
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let data = std::fs::read(path)?;
    let name = path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default();
    let mime = sniff_mime(&name, &data);
    debug!("读取文件 {} ({}, {} 字节)", path.display(), mime, data.len());

    Ok(ImageFileInput {
      image: Some(UploadedImage::new(name, mime, data)),
    })
  }
}

impl Iterator for ImageFileInput {
  type Item = UploadedImage;

  fn next(&mut self) -> Option<Self::Item> {
    self.image.take()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn png_bytes() -> Vec<u8> {
    let image = image::DynamicImage::new_rgb8(2, 2);
    let mut buffer = Cursor::new(Vec::new());
    image
      .write_to(&mut buffer, image::ImageFormat::Png)
      .unwrap();
    buffer.into_inner()
  }

  #[test]
  fn sniffs_content_before_extension() {
    assert_eq!(sniff_mime("renamed.pdf", &png_bytes()), "image/png");
    assert_eq!(sniff_mime("document.pdf", b"%PDF-1.7\n"), "application/pdf");
    assert_eq!(sniff_mime("scan.JPEG", b""), "image/jpeg");
    assert_eq!(sniff_mime("notes", b"plain"), FALLBACK_MIME);
  }

  #[test]
  fn reads_file_from_image_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("photo.png");
    std::fs::write(&path, png_bytes()).unwrap();

    let url = Url::from_file_path(&path).unwrap();
    let url = Url::parse(&url.as_str().replacen("file:", "image:", 1)).unwrap();
    let mut input = ImageFileInput::from_url(&url).unwrap();

    let image = input.next().unwrap();
    assert_eq!(image.name(), "photo.png");
    assert_eq!(image.mime(), "image/png");
    assert!(input.next().is_none());
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("file:///tmp/photo.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
