// 该文件是 Xinjing （心镜） 项目的一部分。
// src/utils.rs - 通用工具
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

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

/// 初始化日志，默认级别为 info，可通过 RUST_LOG 覆盖
pub fn init_tracing() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[derive(Error, Debug)]
pub enum DataUrlError {
  #[error("不是 data URL")]
  NotDataUrl,
  #[error("仅支持 base64 编码的 data URL")]
  NotBase64,
  #[error("base64 解码错误: {0}")]
  Decode(#[from] base64::DecodeError),
}

/// 编码为 `data:<mime>;base64,<payload>` 形式
pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
  format!("data:{};base64,{}", mime, STANDARD.encode(data))
}

/// 解码 data URL，返回 (MIME 类型, 原始字节)
pub fn decode_data_url(data_url: &str) -> Result<(String, Vec<u8>), DataUrlError> {
  let rest = data_url
    .strip_prefix("data:")
    .ok_or(DataUrlError::NotDataUrl)?;
  let (meta, payload) = rest.split_once(',').ok_or(DataUrlError::NotDataUrl)?;
  let mime = meta
    .strip_suffix(";base64")
    .ok_or(DataUrlError::NotBase64)?;
  let data = STANDARD.decode(payload.trim())?;
  Ok((mime.to_string(), data))
}

/// 读取 URL 查询参数
pub(crate) fn query_param(url: &Url, key: &str) -> Option<String> {
  url
    .query_pairs()
    .find(|(k, _)| k == key)
    .map(|(_, v)| v.into_owned())
}
