// 该文件是 Xinjing （心镜） 项目的一部分。
// src/toast.rs - 用户提示消息
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

use std::path::PathBuf;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::model::Score;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Toast {
  ModelLoaded,
  DownloadStarted { path: PathBuf },
  InvalidFileType { name: String, mime: String },
  AnalysisFailed { reason: String },
  AnalysisSucceeded { confidence: Score },
}

impl Toast {
  pub fn title(&self) -> &'static str {
    match self {
      Toast::ModelLoaded => "Model loaded",
      Toast::DownloadStarted { .. } => "Download initiated",
      Toast::InvalidFileType { .. } => "Invalid file type",
      Toast::AnalysisFailed { .. } => "Analysis failed",
      Toast::AnalysisSucceeded { .. } => "Analysis complete",
    }
  }

  pub fn description(&self) -> String {
    match self {
      Toast::ModelLoaded => "3D heart model is ready".to_string(),
      Toast::DownloadStarted { path } => {
        format!("3D model file is being saved to {}", path.display())
      }
      Toast::InvalidFileType { .. } => "Please upload an image file".to_string(),
      Toast::AnalysisFailed { reason } => reason.clone(),
      Toast::AnalysisSucceeded { confidence } => format!("Confidence: {}", confidence),
    }
  }

  pub fn is_destructive(&self) -> bool {
    matches!(self, Toast::InvalidFileType { .. } | Toast::AnalysisFailed { .. })
  }
}

pub type ToastReceiver = mpsc::UnboundedReceiver<Toast>;

/// 提示消息发送端，接收端关闭后消息只写日志
#[derive(Debug, Clone)]
pub struct Toaster {
  tx: mpsc::UnboundedSender<Toast>,
}

impl Toaster {
  pub fn channel() -> (Self, ToastReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  pub fn show(&self, toast: Toast) {
    if toast.is_destructive() {
      warn!("{}: {}", toast.title(), toast.description());
    } else {
      info!("{}: {}", toast.title(), toast.description());
    }
    let _ = self.tx.send(toast);
  }
}
