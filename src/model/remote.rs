// 该文件是 Xinjing （心镜） 项目的一部分。
// src/model/remote.rs - 远端推理评分
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

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl,
  input::UploadedImage,
  model::{AnalysisError, Score, Scorer, ScorerError},
};

const USER_AGENT: &str = concat!("xinjing/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 远端推理请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
  /// `data:<mime>;base64,<payload>`
  pub image_data: String,
}

/// 远端推理成功响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
  pub confidence: f64,
}

/// 远端推理错误响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeErrorBody {
  pub error: String,
}

/// 远端评分：一次 POST，不重试
pub struct RemoteScorer {
  endpoint: Url,
  client: reqwest::Client,
}

impl RemoteScorer {
  pub fn new(endpoint: Url) -> Result<Self, ScorerError> {
    let client = reqwest::Client::builder()
      .user_agent(USER_AGENT)
      .timeout(REQUEST_TIMEOUT)
      .build()?;
    Ok(Self { endpoint, client })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

impl FromUrl for RemoteScorer {
  type Error = ScorerError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => RemoteScorer::new(url.clone()),
      _ => Err(ScorerError::SchemeMismatch),
    }
  }
}

#[async_trait]
impl Scorer for RemoteScorer {
  fn name(&self) -> &'static str {
    "remote"
  }

  async fn analyze(&self, image: &UploadedImage) -> Result<Score, AnalysisError> {
    let request = AnalyzeRequest {
      image_data: image.to_data_url(),
    };
    debug!("请求远端推理 {}: {}", self.endpoint, image.name());

    let response = self
      .client
      .post(self.endpoint.clone())
      .json(&request)
      .send()
      .await?;

    let status = response.status();
    let body = response.bytes().await?;

    if !status.is_success() {
      let message = serde_json::from_slice::<AnalyzeErrorBody>(&body)
        .map(|b| b.error)
        .unwrap_or_else(|_| String::from_utf8_lossy(&body).into_owned());
      error!("远端推理失败 {}: {}", status, message);
      return Err(AnalysisError::Remote {
        status: status.as_u16(),
        message,
      });
    }

    let parsed: AnalyzeResponse =
      serde_json::from_slice(&body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;
    let score = Score::from_percentage(parsed.confidence).ok_or_else(|| {
      AnalysisError::Malformed(format!("置信度超出范围: {}", parsed.confidence))
    })?;

    info!("远端推理置信度: {}", score);
    Ok(score)
  }
}
