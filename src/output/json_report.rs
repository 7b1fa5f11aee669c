// 该文件是 Xinjing （心镜） 项目的一部分。
// src/output/json_report.rs - JSON 报告输出
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

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::{FromUrl, FromUrlWithScheme, input::UploadedImage, output::Render, session::PageView};

#[derive(Error, Debug)]
pub enum JsonReportOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("缺少报告文件路径")]
  MissingPath,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerdeError(#[from] serde_json::Error),
}

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
  pub timestamp: DateTime<Utc>,
  pub image: &'a str,
  pub mime: &'a str,
  pub size: usize,
  pub page: &'a PageView,
}

/// 写入 JSON 报告文件；`?append` 时每次追加一行
pub struct JsonReportOutput {
  path: PathBuf,
  append: bool,
}

impl FromUrlWithScheme for JsonReportOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonReportOutput {
  type Error = JsonReportOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonReportOutputError::SchemeMismatch);
    }
    if uri.path().is_empty() || uri.path() == "/" {
      return Err(JsonReportOutputError::MissingPath);
    }

    let append = uri.query_pairs().any(|(k, _)| k == "append");
    Ok(JsonReportOutput {
      path: PathBuf::from(uri.path()),
      append,
    })
  }
}

impl JsonReportOutput {
  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<UploadedImage, PageView> for JsonReportOutput {
  type Error = JsonReportOutputError;

  fn render_result(&self, frame: &UploadedImage, result: &PageView) -> Result<(), Self::Error> {
    let report = JsonReport {
      timestamp: Utc::now(),
      image: frame.name(),
      mime: frame.mime(),
      size: frame.data().len(),
      page: result,
    };

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    if self.append {
      let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&self.path)?;
      serde_json::to_writer(&mut file, &report)?;
      writeln!(file)?;
    } else {
      let file = std::fs::File::create(&self.path)?;
      serde_json::to_writer_pretty(file, &report)?;
    }

    info!("报告已写入 {}", self.path.display());
    Ok(())
  }
}
