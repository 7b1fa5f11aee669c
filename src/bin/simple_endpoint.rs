// 该文件是 Xinjing （心镜） 项目的一部分。
// src/bin/simple_endpoint.rs - 推理服务
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
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use url::Url;

use xinjing::{FromUrl, endpoint, model::ScorerWrapper, settings::Settings, utils::init_tracing};

/// Xinjing 推理服务
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 监听地址
  #[arg(long, default_value = "127.0.0.1:8787", value_name = "ADDR")]
  pub listen: String,
  /// 服务端使用的评分器，不能是 http(s)
  #[arg(long, env = "XINJING_SCORER", value_name = "SCORER")]
  pub scorer: Option<Url>,
  /// TOML 配置文件
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  init_tracing();

  let args = Args::parse();
  let settings = Settings::load(args.config.as_deref())?.with_overrides(args.scorer, None, None);
  if matches!(settings.scorer.scheme(), "http" | "https") {
    anyhow::bail!("服务端不能把请求转发给另一个远端评分器: {}", settings.scorer);
  }

  info!("评分器: {}", settings.scorer);
  let scorer = ScorerWrapper::from_url(&settings.scorer)?;
  let listener = TcpListener::bind(&args.listen).await?;
  endpoint::serve(listener, Arc::new(scorer)).await?;

  Ok(())
}
