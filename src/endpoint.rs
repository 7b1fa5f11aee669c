// 该文件是 Xinjing （心镜） 项目的一部分。
// src/endpoint.rs - 推理服务端
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

//! 远端评分协议的服务端：`POST /analyze`，请求体 `{ "imageData": ... }`，
//! 成功返回 `{ "confidence": n }`，失败返回 `{ "error": ... }`。

use std::sync::Arc;

use axum::{
  Json, Router,
  body::Bytes,
  extract::{DefaultBodyLimit, State, rejection::BytesRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
};
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
  input::{IMAGE_MIME_PREFIX, UploadedImage},
  model::{AnalyzeErrorBody, AnalyzeRequest, AnalyzeResponse, Scorer},
  utils::decode_data_url,
};

/// 请求体上限：base64 编码后约 24 MiB 的原始图像
pub const MAX_REQUEST_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
struct EndpointState {
  scorer: Arc<dyn Scorer>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
  status: &'static str,
  scorer: &'static str,
  version: &'static str,
}

fn failure(status: StatusCode, message: impl Into<String>) -> Response {
  let body = AnalyzeErrorBody {
    error: message.into(),
  };
  (status, Json(body)).into_response()
}

async fn health(State(state): State<EndpointState>) -> Json<HealthResponse> {
  Json(HealthResponse {
    status: "ok",
    scorer: state.scorer.name(),
    version: env!("CARGO_PKG_VERSION"),
  })
}

/// 请求体手动解析，使所有错误都以 `{ "error": ... }` 返回
async fn analyze(
  State(state): State<EndpointState>,
  body: Result<Bytes, BytesRejection>,
) -> Response {
  let body = match body {
    Ok(body) => body,
    Err(rejection) => {
      warn!("请求体读取失败: {}", rejection.body_text());
      return failure(rejection.status(), rejection.body_text());
    }
  };

  let request: AnalyzeRequest = match serde_json::from_slice(&body) {
    Ok(request) => request,
    Err(e) => {
      warn!("请求体无法解析: {}", e);
      return failure(StatusCode::BAD_REQUEST, format!("invalid request body: {}", e));
    }
  };

  let (mime, data) = match decode_data_url(&request.image_data) {
    Ok(decoded) => decoded,
    Err(e) => {
      warn!("图像数据无法解码: {}", e);
      return failure(StatusCode::BAD_REQUEST, format!("invalid imageData: {}", e));
    }
  };

  if !mime.starts_with(IMAGE_MIME_PREFIX) {
    warn!("拒绝非图像数据: {}", mime);
    return failure(StatusCode::BAD_REQUEST, format!("not an image: {}", mime));
  }

  let image = UploadedImage::new("upload", mime, data);
  match state.scorer.analyze(&image).await {
    Ok(score) => {
      info!("评分完成: {}", score);
      Json(AnalyzeResponse {
        confidence: score.value() as f64,
      })
      .into_response()
    }
    Err(e) => {
      error!("评分失败: {}", e);
      failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
    }
  }
}

pub fn build_router(scorer: Arc<dyn Scorer>) -> Router {
  Router::new()
    .route("/analyze", post(analyze))
    .route("/health", get(health))
    .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
    .with_state(EndpointState { scorer })
}

pub async fn serve(listener: TcpListener, scorer: Arc<dyn Scorer>) -> std::io::Result<()> {
  info!("推理服务监听于 {}", listener.local_addr()?);
  axum::serve(listener, build_router(scorer)).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{AnalysisError, Score, SimulatedScorer};
  use crate::utils::encode_data_url;
  use async_trait::async_trait;
  use axum::body::Body;
  use axum::http::Request;
  use http_body_util::BodyExt;
  use tower::ServiceExt;

  struct Broken;

  #[async_trait]
  impl Scorer for Broken {
    fn name(&self) -> &'static str {
      "broken"
    }

    async fn analyze(&self, _image: &UploadedImage) -> Result<Score, AnalysisError> {
      Err(AnalysisError::Malformed("model exploded".into()))
    }
  }

  async fn post_analyze(router: Router, body: String) -> (StatusCode, serde_json::Value) {
    let response = router
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/analyze")
          .header("content-type", "application/json")
          .body(Body::from(body))
          .unwrap(),
      )
      .await
      .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  fn simulated() -> Router {
    build_router(Arc::new(SimulatedScorer::immediate().with_seed(5)))
  }

  #[tokio::test]
  async fn scores_image_payload() {
    let body = serde_json::json!({ "imageData": encode_data_url("image/png", &[1, 2, 3]) });
    let (status, json) = post_analyze(simulated(), body.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    let confidence = json["confidence"].as_f64().unwrap();
    assert!((40.0..=94.0).contains(&confidence));
  }

  #[tokio::test]
  async fn rejects_bad_payloads() {
    let (status, json) = post_analyze(simulated(), "{".into()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());

    let body = serde_json::json!({ "imageData": "not a data url" });
    let (status, _) = post_analyze(simulated(), body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = serde_json::json!({ "imageData": encode_data_url("application/pdf", b"%PDF") });
    let (status, json) = post_analyze(simulated(), body.to_string()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "not an image: application/pdf");
  }

  #[tokio::test]
  async fn scorer_failure_is_server_error() {
    let body = serde_json::json!({ "imageData": encode_data_url("image/png", &[0]) });
    let (status, json) = post_analyze(build_router(Arc::new(Broken)), body.to_string()).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(json["error"].as_str().unwrap().contains("model exploded"));
  }

  #[tokio::test]
  async fn oversized_body_is_json_413() {
    let body = "x".repeat(MAX_REQUEST_BYTES + 1);
    let (status, json) = post_analyze(simulated(), body).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["error"].as_str().unwrap().contains("length limit"));
  }

  #[tokio::test]
  async fn health_reports_scorer() {
    let response = simulated()
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["scorer"], "simulated");
  }
}
