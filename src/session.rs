// 该文件是 Xinjing （心镜） 项目的一部分。
// src/session.rs - 页面会话编排
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

//! 页面会话：上传 → 评分 → 阈值判定 → 模型查看器。
//!
//! 每次上传都会递增代数（generation），评分返回时代数已过期的结果会被丢弃，
//! 因此先发出、后返回的请求不会覆盖较新的结果。

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::asset::AssetSource;
use crate::gate::{Verdict, is_high_confidence};
use crate::handle::ObjectUrlRegistry;
use crate::input::{UploadError, UploadSurface, UploadedImage};
use crate::model::{AnalysisError, Score, Scorer};
use crate::toast::{Toast, ToastReceiver, Toaster};
use crate::viewer::{ModelViewer, SaveError, ViewerView, save_asset};

pub const IDLE_NOTE: &str = "Upload an image for AI-powered analysis with confidence scoring";

#[derive(Debug, Default)]
struct PageState {
  upload: UploadSurface,
  confidence: Option<Score>,
  is_processing: bool,
  generation: u64,
  viewer: Option<ModelViewer>,
  viewer_loading: bool,
}

struct SessionInner {
  scorer: Arc<dyn Scorer>,
  asset_source: AssetSource,
  handles: ObjectUrlRegistry,
  toaster: Toaster,
  state: Mutex<PageState>,
}

/// 一次上传的结果
#[derive(Debug)]
pub enum UploadOutcome {
  Scored(Score),
  Failed(AnalysisError),
  /// 评分期间有更新的上传，结果已丢弃
  Superseded,
}

#[derive(Clone)]
pub struct AnalysisSession {
  inner: Arc<SessionInner>,
}

impl AnalysisSession {
  pub fn new(scorer: Arc<dyn Scorer>, asset_source: AssetSource) -> (Self, ToastReceiver) {
    let (toaster, toasts) = Toaster::channel();
    let inner = SessionInner {
      scorer,
      asset_source,
      handles: ObjectUrlRegistry::new(),
      toaster,
      state: Mutex::new(PageState::default()),
    };
    (
      Self {
        inner: Arc::new(inner),
      },
      toasts,
    )
  }

  fn state(&self) -> MutexGuard<'_, PageState> {
    self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub async fn handle_upload(&self, file: UploadedImage) -> Result<UploadOutcome, UploadError> {
    let (image, generation) = {
      let mut state = self.state();
      let image = match state.upload.submit(file) {
        Ok(image) => image,
        Err(UploadError::InvalidFileType { name, mime }) => {
          drop(state);
          self.inner.toaster.show(Toast::InvalidFileType {
            name: name.clone(),
            mime: mime.clone(),
          });
          return Err(UploadError::InvalidFileType { name, mime });
        }
      };
      state.generation += 1;
      state.is_processing = true;
      state.confidence = None;
      state.viewer = None;
      state.viewer_loading = false;
      (image, state.generation)
    };

    info!(
      "开始分析 {} (第 {} 次上传, 评分器 {})",
      image.name(),
      generation,
      self.inner.scorer.name()
    );
    let result = self.inner.scorer.analyze(&image).await;

    let score = {
      let mut state = self.state();
      if state.generation != generation {
        debug!("丢弃过期的评分结果 (第 {} 次上传)", generation);
        return Ok(UploadOutcome::Superseded);
      }
      state.is_processing = false;
      match result {
        Ok(score) => {
          state.confidence = Some(score);
          state.viewer_loading = is_high_confidence(Some(score));
          score
        }
        Err(e) => {
          state.confidence = None;
          drop(state);
          warn!("分析失败: {}", e);
          self.inner.toaster.show(Toast::AnalysisFailed {
            reason: e.to_string(),
          });
          return Ok(UploadOutcome::Failed(e));
        }
      }
    };

    self
      .inner
      .toaster
      .show(Toast::AnalysisSucceeded { confidence: score });

    if is_high_confidence(Some(score)) {
      self.mount_viewer(generation).await;
    }
    Ok(UploadOutcome::Scored(score))
  }

  async fn mount_viewer(&self, generation: u64) {
    let viewer = ModelViewer::mount(&self.inner.asset_source, &self.inner.handles).await;
    let ready = viewer.is_ready();

    {
      let mut state = self.state();
      if state.generation != generation || !is_high_confidence(state.confidence) {
        debug!("查看器挂载时页面已变化，放弃 (第 {} 次上传)", generation);
        return;
      }
      state.viewer = Some(viewer);
      state.viewer_loading = false;
    }

    if ready {
      self.inner.toaster.show(Toast::ModelLoaded);
    }
  }

  /// 清除上传区的选择，不影响正在进行的评分
  pub fn clear_selection(&self) {
    self.state().upload.clear();
  }

  /// 保存当前模型；没有模型时为空操作
  pub async fn save_model(&self, dir: &Path) -> Result<Option<PathBuf>, SaveError> {
    let asset = self
      .state()
      .viewer
      .as_ref()
      .and_then(|viewer| viewer.asset().cloned());

    let Some(asset) = asset else {
      warn!("没有可保存的模型");
      return Ok(None);
    };

    let path = save_asset(&asset, dir).await?;
    self
      .inner
      .toaster
      .show(Toast::DownloadStarted { path: path.clone() });
    Ok(Some(path))
  }

  pub fn confidence(&self) -> Option<Score> {
    self.state().confidence
  }

  pub fn is_processing(&self) -> bool {
    self.state().is_processing
  }

  pub fn preview(&self) -> Option<String> {
    self.state().upload.preview().map(str::to_string)
  }

  pub fn selected(&self) -> Option<UploadedImage> {
    self.state().upload.current().cloned()
  }

  pub fn handles(&self) -> &ObjectUrlRegistry {
    &self.inner.handles
  }

  pub fn scorer_name(&self) -> &'static str {
    self.inner.scorer.name()
  }

  /// 当前页面的呈现；阈值判定每次都由 confidence 重新计算
  pub fn view(&self) -> PageView {
    let state = self.state();

    let status = match (state.is_processing, state.confidence) {
      (true, _) => StatusView::Processing,
      (false, Some(confidence)) => {
        let verdict = Verdict::of(confidence);
        StatusView::Scored {
          confidence,
          verdict,
          icon: verdict.icon(),
          message: verdict.message(),
        }
      }
      (false, None) => StatusView::Idle { note: IDLE_NOTE },
    };

    let show_viewer = is_high_confidence(state.confidence);
    let viewer = if !show_viewer {
      None
    } else if let Some(viewer) = state.viewer.as_ref() {
      Some(viewer.view())
    } else if state.viewer_loading {
      Some(ViewerView::Loading)
    } else {
      None
    };

    PageView {
      scorer: self.inner.scorer.name(),
      selected: state.upload.current().map(|image| image.name().to_string()),
      status,
      show_viewer,
      viewer,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StatusView {
  Idle {
    note: &'static str,
  },
  Processing,
  Scored {
    confidence: Score,
    verdict: Verdict,
    icon: &'static str,
    message: &'static str,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageView {
  pub scorer: &'static str,
  pub selected: Option<String>,
  pub status: StatusView,
  pub show_viewer: bool,
  pub viewer: Option<ViewerView>,
}
