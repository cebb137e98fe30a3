//! 远端状态表
//!
//! 获取阶段由多个 worker 并发写入，比较阶段逐项移除已匹配的条目，
//! 比较结束后剩余的条目即为待删除集合。

use crate::storage::RemoteObject;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct RemoteStateMap {
    inner: Arc<RwLock<HashMap<String, RemoteObject>>>,
}

impl RemoteStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以对象自身的相对路径为键插入，返回被覆盖的旧值
    pub async fn insert(&self, object: RemoteObject) -> Option<RemoteObject> {
        let mut map = self.inner.write().await;
        map.insert(object.relative_path.clone(), object)
    }

    /// 取出并移除已匹配的条目
    pub async fn take(&self, relative_path: &str) -> Option<RemoteObject> {
        self.inner.write().await.remove(relative_path)
    }

    pub async fn contains(&self, relative_path: &str) -> bool {
        self.inner.read().await.contains_key(relative_path)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// 清空并返回剩余条目，按路径排序
    pub async fn drain_sorted(&self) -> Vec<RemoteObject> {
        let map = std::mem::take(&mut *self.inner.write().await);
        let mut objects: Vec<_> = map.into_values().collect();
        objects.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        objects
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

impl From<Vec<RemoteObject>> for RemoteStateMap {
    fn from(objects: Vec<RemoteObject>) -> Self {
        let map = objects
            .into_iter()
            .map(|o| (o.relative_path.clone(), o))
            .collect();
        Self {
            inner: Arc::new(RwLock::new(map)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_take_removes_entry() {
        let map = RemoteStateMap::from(vec![
            RemoteObject::file("a.txt", 2, "aa"),
            RemoteObject::file("c.txt", 3, "cc"),
        ]);

        assert!(map.take("a.txt").await.is_some());
        assert!(map.take("a.txt").await.is_none());
        assert!(!map.contains("a.txt").await);
        assert_eq!(map.len().await, 1);
    }

    #[tokio::test]
    async fn test_drain_sorted_empties_map() {
        let map = RemoteStateMap::new();
        map.insert(RemoteObject::file("b", 1, "")).await;
        map.insert(RemoteObject::file("a", 1, "")).await;

        let drained = map.drain_sorted().await;
        let paths: Vec<_> = drained.iter().map(|o| o.relative_path.as_str()).collect();
        assert_eq!(paths, ["a", "b"]);
        assert!(map.is_empty().await);
    }

    #[tokio::test]
    async fn test_concurrent_inserts() {
        let map = RemoteStateMap::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let map = map.clone();
            handles.push(tokio::spawn(async move {
                map.insert(RemoteObject::file(format!("f{}", i), i, "")).await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(map.len().await, 32);
    }
}
