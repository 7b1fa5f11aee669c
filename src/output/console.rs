// 该文件是 Xinjing （心镜） 项目的一部分。
// src/output/console.rs - 控制台输出
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

use std::io::Write;

use thiserror::Error;

use crate::{
  FromUrl, FromUrlWithScheme,
  input::UploadedImage,
  output::Render,
  session::{PageView, StatusView},
  viewer::ViewerView,
};

#[derive(Error, Debug)]
pub enum ConsoleOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 以文本形式打印页面状态；`console://?quiet` 只打印置信度
pub struct ConsoleOutput {
  quiet: bool,
}

impl FromUrlWithScheme for ConsoleOutput {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(ConsoleOutputError::SchemeMismatch);
    }

    let quiet = uri.query_pairs().any(|(k, _)| k == "quiet");
    Ok(ConsoleOutput { quiet })
  }
}

impl ConsoleOutput {
  pub fn format(&self, image: &UploadedImage, view: &PageView) -> String {
    let mut lines = Vec::new();

    match &view.status {
      StatusView::Idle { note } => lines.push(note.to_string()),
      StatusView::Processing => lines.push("Analyzing...".to_string()),
      StatusView::Scored {
        confidence,
        icon,
        message,
        ..
      } => {
        if self.quiet {
          return confidence.to_string();
        }
        lines.push(format!("{} ({}, {})", image.name(), image.mime(), view.scorer));
        lines.push(format!("Confidence: {}", confidence));
        lines.push(format!("{} {}", icon, message));
      }
    }

    if let Some(viewer) = &view.viewer {
      match viewer {
        ViewerView::Loading => lines.push("3D model: loading".to_string()),
        ViewerView::Ready { url, size, .. } => {
          lines.push(format!("3D model: {} ({} bytes)", url, size))
        }
        ViewerView::Failed { message } => lines.push(format!("3D model failed: {}", message)),
      }
    }

    lines.join("\n")
  }
}

impl Render<UploadedImage, PageView> for ConsoleOutput {
  type Error = ConsoleOutputError;

  fn render_result(&self, frame: &UploadedImage, result: &PageView) -> Result<(), Self::Error> {
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", self.format(frame, result))?;
    Ok(())
  }
}
