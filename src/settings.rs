// 该文件是 Xinjing （心镜） 项目的一部分。
// src/settings.rs - 运行配置
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

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::asset::DEFAULT_ASSET_PATH;

#[derive(Error, Debug)]
pub enum SettingsError {
  #[error("读取配置文件失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("配置文件格式错误: {0}")]
  Parse(#[from] toml::de::Error),
}

/// 各组件的 URL 配置，可由 TOML 文件提供，命令行参数优先
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
  pub scorer: Url,
  pub asset: Url,
  pub output: Url,
  pub save_dir: Option<PathBuf>,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      scorer: fixed_url("simulated://"),
      asset: default_asset_url(),
      output: fixed_url("console://"),
      save_dir: None,
    }
  }
}

fn fixed_url(raw: &str) -> Url {
  Url::parse(raw).unwrap_or_else(|e| panic!("内置 URL {} 无效: {}", raw, e))
}

/// 当前目录下的 `public/models/heart.zip`
pub fn default_asset_url() -> Url {
  let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
  Url::from_file_path(base.join(DEFAULT_ASSET_PATH))
    .unwrap_or_else(|_| fixed_url("file:///public/models/heart.zip"))
}

impl Settings {
  pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
    Ok(toml::from_str(content)?)
  }

  pub fn from_toml_file(path: &Path) -> Result<Self, SettingsError> {
    debug!("读取配置文件: {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Self::from_toml_str(&content)
  }

  /// 配置文件可选；未指定时使用默认值
  pub fn load(path: Option<&Path>) -> Result<Self, SettingsError> {
    match path {
      Some(path) => Self::from_toml_file(path),
      None => Ok(Self::default()),
    }
  }

  pub fn with_overrides(
    mut self,
    scorer: Option<Url>,
    asset: Option<Url>,
    output: Option<Url>,
  ) -> Self {
    if let Some(scorer) = scorer {
      self.scorer = scorer;
    }
    if let Some(asset) = asset {
      self.asset = asset;
    }
    if let Some(output) = output {
      self.output = output;
    }
    self
  }
}
