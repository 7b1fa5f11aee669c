// 该文件是 Xinjing （心镜） 项目的一部分。
// src/handle.rs - 可撤销的对象句柄
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

//! 对象句柄注册表。
//!
//! 预览图与三维模型都通过 `blob:xinjing/<uuid>` 形式的句柄对外暴露。
//! 句柄 [`ObjectUrl`] 在析构时自动撤销，注册表中不会残留已释放的数据。

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

const OBJECT_URL_PREFIX: &str = "blob:xinjing/";

#[derive(Debug, Clone)]
struct Entry {
  mime: String,
  data: Arc<[u8]>,
}

#[derive(Debug, Clone, Default)]
pub struct ObjectUrlRegistry {
  entries: Arc<Mutex<HashMap<Uuid, Entry>>>,
}

impl ObjectUrlRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// 注册一段数据并返回其句柄
  pub fn create(&self, mime: impl Into<String>, data: Arc<[u8]>) -> ObjectUrl {
    let id = Uuid::new_v4();
    let mime = mime.into();
    debug!("创建对象句柄 {}{} ({}, {} 字节)", OBJECT_URL_PREFIX, id, mime, data.len());
    self.entries().insert(id, Entry { mime, data });
    ObjectUrl {
      id,
      url: format!("{}{}", OBJECT_URL_PREFIX, id),
      registry: self.clone(),
    }
  }

  /// 按句柄查找数据，返回 (MIME 类型, 数据)
  pub fn resolve(&self, url: &str) -> Option<(String, Arc<[u8]>)> {
    let id = url.strip_prefix(OBJECT_URL_PREFIX)?;
    let id = Uuid::parse_str(id).ok()?;
    self
      .entries()
      .get(&id)
      .map(|entry| (entry.mime.clone(), entry.data.clone()))
  }

  /// 当前存活的句柄数量
  pub fn live_count(&self) -> usize {
    self.entries().len()
  }

  fn revoke(&self, id: Uuid) {
    if self.entries().remove(&id).is_some() {
      debug!("撤销对象句柄 {}{}", OBJECT_URL_PREFIX, id);
    }
  }
}

/// 作用域内有效的对象句柄，析构时撤销
pub struct ObjectUrl {
  id: Uuid,
  url: String,
  registry: ObjectUrlRegistry,
}

impl ObjectUrl {
  pub fn as_str(&self) -> &str {
    &self.url
  }
}

impl fmt::Display for ObjectUrl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url)
  }
}

impl fmt::Debug for ObjectUrl {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("ObjectUrl").field(&self.url).finish()
  }
}

impl Drop for ObjectUrl {
  fn drop(&mut self) {
    self.registry.revoke(self.id);
  }
}
