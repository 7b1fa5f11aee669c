// 该文件是 Xinjing （心镜） 项目的一部分。
// src/asset.rs - 三维模型资源获取与解压
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

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};
use url::Url;
use zip::ZipArchive;

use crate::FromUrl;

pub const MODEL_EXTENSION: &str = ".glb";
pub const MODEL_MIME: &str = "model/gltf-binary";
pub const DEFAULT_ASSET_PATH: &str = "public/models/heart.zip";

#[derive(Error, Debug)]
pub enum AssetLoadError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("无效的文件路径: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("网络错误: {0}")]
  Network(#[from] reqwest::Error),
  #[error("资源服务返回 HTTP {0}")]
  Status(u16),
  #[error("压缩包错误: {0}")]
  Archive(#[from] zip::result::ZipError),
  #[error("压缩包中没有 {0} 文件")]
  MissingModel(&'static str),
  #[error("解压任务异常终止: {0}")]
  Join(#[from] tokio::task::JoinError),
}

/// 模型压缩包的来源
#[derive(Debug, Clone)]
pub enum AssetSource {
  File(PathBuf),
  Http { url: Url, client: reqwest::Client },
}

impl FromUrl for AssetSource {
  type Error = AssetLoadError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "file" => url
        .to_file_path()
        .map(AssetSource::File)
        .map_err(|_| AssetLoadError::InvalidPath(url.to_string())),
      "http" | "https" => Ok(AssetSource::Http {
        url: url.clone(),
        client: reqwest::Client::new(),
      }),
      _ => Err(AssetLoadError::SchemeMismatch),
    }
  }
}

impl AssetSource {
  /// 读取压缩包的全部字节
  pub async fn fetch(&self) -> Result<Vec<u8>, AssetLoadError> {
    match self {
      AssetSource::File(path) => {
        debug!("读取模型压缩包: {}", path.display());
        Ok(tokio::fs::read(path).await?)
      }
      AssetSource::Http { url, client } => {
        debug!("下载模型压缩包: {}", url);
        let response = client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
          return Err(AssetLoadError::Status(status.as_u16()));
        }
        Ok(response.bytes().await?.to_vec())
      }
    }
  }
}

impl std::fmt::Display for AssetSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      AssetSource::File(path) => write!(f, "{}", path.display()),
      AssetSource::Http { url, .. } => write!(f, "{}", url),
    }
  }
}

/// 从压缩包中解出的 GLB 模型
#[derive(Debug, Clone)]
pub struct ModelAsset {
  name: String,
  data: Arc<[u8]>,
}

impl ModelAsset {
  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn shared_data(&self) -> Arc<[u8]> {
    self.data.clone()
  }

  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  /// 以指定文件名写入目录，返回写入的路径
  pub async fn save_to(&self, dir: &Path, file_name: &str) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(file_name);
    tokio::fs::write(&path, &self.data).await?;
    Ok(path)
  }
}

/// 取压缩包中第一个扩展名为 `.glb` 的条目（不区分大小写）
pub fn extract_model(archive: &[u8]) -> Result<ModelAsset, AssetLoadError> {
  let mut archive = ZipArchive::new(Cursor::new(archive))?;

  for index in 0..archive.len() {
    let mut entry = archive.by_index(index)?;
    if entry.is_dir() || !entry.name().to_lowercase().ends_with(MODEL_EXTENSION) {
      continue;
    }

    let name = entry.name().to_string();
    let mut data = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut data)?;
    debug!("解压模型 {} ({} 字节)", name, data.len());
    return Ok(ModelAsset {
      name,
      data: data.into(),
    });
  }

  Err(AssetLoadError::MissingModel(MODEL_EXTENSION))
}

pub async fn load_model_asset(source: &AssetSource) -> Result<ModelAsset, AssetLoadError> {
  let archive = source.fetch().await?;
  let asset = tokio::task::spawn_blocking(move || extract_model(&archive)).await??;
  info!("模型资源已加载: {} ({} 字节)", asset.name(), asset.len());
  Ok(asset)
}
