// 该文件是 Xinjing （心镜） 项目的一部分。
// src/viewer.rs - 三维模型查看器
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

use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::asset::{AssetSource, MODEL_MIME, ModelAsset, load_model_asset};
use crate::handle::{ObjectUrl, ObjectUrlRegistry};

pub const SAVE_FILE_NAME: &str = "heart_model.glb";

#[derive(Error, Debug)]
pub enum SaveError {
  #[error("保存模型失败: {0}")]
  Io(#[from] std::io::Error),
}

#[derive(Debug)]
pub enum ViewerState {
  Ready { asset: ModelAsset, url: ObjectUrl },
  Failed(String),
}

/// 已挂载的查看器。析构时释放模型句柄。
#[derive(Debug)]
pub struct ModelViewer {
  state: ViewerState,
}

impl ModelViewer {
  /// 获取并解压模型；失败时进入 `Failed` 状态，不重试
  pub async fn mount(source: &AssetSource, handles: &ObjectUrlRegistry) -> Self {
    let state = match load_model_asset(source).await {
      Ok(asset) => {
        let url = handles.create(MODEL_MIME, asset.shared_data());
        info!("模型查看器就绪: {}", url);
        ViewerState::Ready { asset, url }
      }
      Err(e) => {
        error!("模型资源加载失败 {}: {}", source, e);
        ViewerState::Failed(e.to_string())
      }
    };
    Self { state }
  }

  /// 重新挂载，旧句柄随旧状态一起释放
  pub async fn reload(&mut self, source: &AssetSource, handles: &ObjectUrlRegistry) {
    *self = Self::mount(source, handles).await;
  }

  pub fn state(&self) -> &ViewerState {
    &self.state
  }

  pub fn is_ready(&self) -> bool {
    matches!(self.state, ViewerState::Ready { .. })
  }

  pub fn can_save(&self) -> bool {
    self.is_ready()
  }

  pub fn asset(&self) -> Option<&ModelAsset> {
    match &self.state {
      ViewerState::Ready { asset, .. } => Some(asset),
      ViewerState::Failed(_) => None,
    }
  }

  pub fn object_url(&self) -> Option<&ObjectUrl> {
    match &self.state {
      ViewerState::Ready { url, .. } => Some(url),
      ViewerState::Failed(_) => None,
    }
  }

  pub fn failure(&self) -> Option<&str> {
    match &self.state {
      ViewerState::Failed(message) => Some(message),
      ViewerState::Ready { .. } => None,
    }
  }

  /// 保存模型文件；没有可用模型时什么也不做
  pub async fn save(&self, dir: &Path) -> Result<Option<PathBuf>, SaveError> {
    match self.asset() {
      Some(asset) => save_asset(asset, dir).await.map(Some),
      None => {
        warn!("没有可保存的模型");
        Ok(None)
      }
    }
  }

  pub fn view(&self) -> ViewerView {
    match &self.state {
      ViewerState::Ready { asset, url } => ViewerView::Ready {
        url: url.to_string(),
        file_name: SAVE_FILE_NAME.to_string(),
        size: asset.len(),
      },
      ViewerState::Failed(message) => ViewerView::Failed {
        message: message.clone(),
      },
    }
  }
}

pub(crate) async fn save_asset(asset: &ModelAsset, dir: &Path) -> Result<PathBuf, SaveError> {
  let path = asset.save_to(dir, SAVE_FILE_NAME).await?;
  info!("模型已保存到 {}", path.display());
  Ok(path)
}

/// 查看器在页面上的呈现
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ViewerView {
  Loading,
  Ready {
    url: String,
    file_name: String,
    size: usize,
  },
  Failed {
    message: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::{Cursor, Write};
  use zip::write::SimpleFileOptions;

  fn heart_zip(dir: &Path) -> AssetSource {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer.start_file("heart.glb", SimpleFileOptions::default()).unwrap();
    writer.write_all(b"glTF-heart").unwrap();
    let bytes = writer.finish().unwrap().into_inner();

    let path = dir.join("heart.zip");
    std::fs::write(&path, bytes).unwrap();
    AssetSource::File(path)
  }

  #[tokio::test]
  async fn mounted_viewer_exposes_handle_and_saves() {
    let dir = tempfile::tempdir().unwrap();
    let handles = ObjectUrlRegistry::new();
    let viewer = ModelViewer::mount(&heart_zip(dir.path()), &handles).await;

    assert!(viewer.can_save());
    let url = viewer.object_url().unwrap().to_string();
    let (mime, data) = handles.resolve(&url).unwrap();
    assert_eq!(mime, MODEL_MIME);
    assert_eq!(&*data, b"glTF-heart");

    let saved = viewer.save(&dir.path().join("downloads")).await.unwrap().unwrap();
    assert_eq!(saved.file_name().unwrap(), SAVE_FILE_NAME);
    assert_eq!(std::fs::read(saved).unwrap(), b"glTF-heart");

    drop(viewer);
    assert!(handles.resolve(&url).is_none());
    assert_eq!(handles.live_count(), 0);
  }

  #[tokio::test]
  async fn failed_mount_disables_save() {
    let dir = tempfile::tempdir().unwrap();
    let handles = ObjectUrlRegistry::new();
    let source = AssetSource::File(dir.path().join("missing.zip"));
    let viewer = ModelViewer::mount(&source, &handles).await;

    assert!(!viewer.can_save());
    assert!(viewer.failure().is_some());
    assert!(matches!(viewer.view(), ViewerView::Failed { .. }));
    assert_eq!(viewer.save(dir.path()).await.unwrap(), None);
    assert_eq!(handles.live_count(), 0);
  }

  #[tokio::test]
  async fn reload_replaces_handle() {
    let dir = tempfile::tempdir().unwrap();
    let handles = ObjectUrlRegistry::new();
    let source = heart_zip(dir.path());
    let mut viewer = ModelViewer::mount(&source, &handles).await;
    let first = viewer.object_url().unwrap().to_string();

    viewer.reload(&source, &handles).await;
    assert_ne!(viewer.object_url().unwrap().to_string(), first);
    assert_eq!(handles.live_count(), 1);
  }
}
