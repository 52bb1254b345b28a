use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::pose::landmark::LandmarkFrame;

/// キャッシュキー。ソース識別子と論理フレームインデックスの組。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_id: String,
    pub frame_index: usize,
}

impl CacheKey {
    pub fn new(source_id: &str, frame_index: usize) -> Self {
        Self {
            source_id: source_id.to_string(),
            frame_index,
        }
    }

    fn file_name(&self) -> String {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        format!("{:016x}.json", hasher.finish())
    }
}

/// 1フレームペア分のキャッシュ値（両アングルのランドマーク）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFrame {
    pub dtl: Option<LandmarkFrame>,
    pub face: Option<LandmarkFrame>,
}

/// ヒット率の観測値スナップショット
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheInner {
    entries: HashMap<CacheKey, CachedFrame>,
    /// 先頭がLRU、末尾がMRU
    recency: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// 厳密LRUのランドマークキャッシュ
///
/// 容量到達時は最も昔に参照されたエントリを追い出す。getはヒット時に
/// 参照順を更新する。内部はMutexで直列化されるのでスレッド間で共有できる。
///
/// ディスク層はベストエフォート: 書き込み・読み込みの失敗は警告ログに
/// 落とすだけで、メモリ層の動作には影響しない。
pub struct FrameCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    disk_dir: Option<PathBuf>,
}

impl FrameCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
            disk_dir: None,
        }
    }

    /// ディスク層を有効にする。ディレクトリ作成に失敗したら無効のまま。
    pub fn with_disk_dir(mut self, dir: PathBuf) -> Self {
        match std::fs::create_dir_all(&dir) {
            Ok(()) => self.disk_dir = Some(dir),
            Err(err) => {
                warn!(dir = %dir.display(), %err, "cache dir creation failed, disk layer disabled");
            }
        }
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 参照。ヒットでエントリをMRUに昇格させる。
    /// メモリ層ミス時はディスク層を試し、見つかればメモリ層に戻す。
    pub fn get(&self, key: &CacheKey) -> Option<CachedFrame> {
        {
            let mut inner = self.inner.lock().expect("cache lock poisoned");
            if let Some(value) = inner.entries.get(key).cloned() {
                inner.hits += 1;
                Self::promote(&mut inner.recency, key);
                return Some(value);
            }
            inner.misses += 1;
        }

        if let Some(value) = self.read_disk(key) {
            self.insert_memory(key.clone(), value.clone());
            return Some(value);
        }
        None
    }

    /// 挿入。容量超過時はLRUエントリを追い出す。
    pub fn insert(&self, key: CacheKey, value: CachedFrame) {
        self.write_disk(&key, &value);
        self.insert_memory(key, value);
    }

    fn insert_memory(&self, key: CacheKey, value: CachedFrame) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        if inner.entries.contains_key(&key) {
            Self::promote(&mut inner.recency, &key);
            inner.entries.insert(key, value);
            return;
        }
        if inner.entries.len() >= self.capacity {
            if let Some(evicted) = inner.recency.pop_front() {
                inner.entries.remove(&evicted);
                debug!(source = %evicted.source_id, index = evicted.frame_index, "evicted lru entry");
            }
        }
        inner.recency.push_back(key.clone());
        inner.entries.insert(key, value);
    }

    fn promote(recency: &mut VecDeque<CacheKey>, key: &CacheKey) {
        if let Some(pos) = recency.iter().position(|k| k == key) {
            let key = recency.remove(pos).expect("position just found");
            recency.push_back(key);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().expect("cache lock poisoned");
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            len: inner.entries.len(),
            capacity: self.capacity,
        }
    }

    /// メモリ層を空にする。統計は維持する。ディスク層には触れない。
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache lock poisoned");
        inner.entries.clear();
        inner.recency.clear();
    }

    fn write_disk(&self, key: &CacheKey, value: &CachedFrame) {
        let Some(dir) = &self.disk_dir else { return };
        let path = dir.join(key.file_name());
        let result = serde_json::to_vec(value)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| std::fs::write(&path, bytes).map_err(anyhow::Error::from));
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "disk cache write failed");
        }
    }

    fn read_disk(&self, key: &CacheKey) -> Option<CachedFrame> {
        let dir = self.disk_dir.as_ref()?;
        let path = dir.join(key.file_name());
        if !path.exists() {
            return None;
        }
        match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(err) => {
                    warn!(path = %path.display(), %err, "disk cache entry corrupt, ignoring");
                    None
                }
            },
            Err(err) => {
                warn!(path = %path.display(), %err, "disk cache read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value() -> CachedFrame {
        CachedFrame {
            dtl: Some(LandmarkFrame::default()),
            face: Some(LandmarkFrame::default()),
        }
    }

    #[test]
    fn test_hit_and_miss_counting() {
        let cache = FrameCache::new(4);
        let key = CacheKey::new("swing.mp4", 0);
        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), value());
        assert!(cache.get(&key).is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_strict_lru_eviction() {
        let cache = FrameCache::new(2);
        let a = CacheKey::new("v", 0);
        let b = CacheKey::new("v", 1);
        let c = CacheKey::new("v", 2);
        cache.insert(a.clone(), value());
        cache.insert(b.clone(), value());
        // aを参照してMRUに昇格させると、次の追い出し対象はb
        assert!(cache.get(&a).is_some());
        cache.insert(c.clone(), value());
        assert!(cache.get(&b).is_none());
        assert!(cache.get(&a).is_some());
        assert!(cache.get(&c).is_some());
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_reinsert_updates_value_without_eviction() {
        let cache = FrameCache::new(2);
        let a = CacheKey::new("v", 0);
        let b = CacheKey::new("v", 1);
        cache.insert(a.clone(), value());
        cache.insert(b.clone(), value());
        let updated = CachedFrame {
            dtl: None,
            face: Some(LandmarkFrame::default()),
        };
        cache.insert(a.clone(), updated.clone());
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&a), Some(updated));
        assert!(cache.get(&b).is_some());
    }

    #[test]
    fn test_clear_keeps_stats() {
        let cache = FrameCache::new(4);
        let key = CacheKey::new("v", 0);
        cache.insert(key.clone(), value());
        cache.get(&key);
        cache.clear();
        assert!(cache.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.len, 0);
    }

    #[test]
    fn test_distinct_sources_do_not_collide() {
        let cache = FrameCache::new(4);
        cache.insert(CacheKey::new("a.mp4", 0), value());
        assert!(cache.get(&CacheKey::new("b.mp4", 0)).is_none());
        assert!(cache.get(&CacheKey::new("a.mp4", 0)).is_some());
    }

    #[test]
    fn test_disk_layer_round_trip() {
        let dir = std::env::temp_dir().join(format!("swingsight-cache-{}", std::process::id()));
        let cache = FrameCache::new(2).with_disk_dir(dir.clone());
        let a = CacheKey::new("v", 0);
        cache.insert(a.clone(), value());
        // メモリ層から追い出してもディスク層から復元できる
        cache.insert(CacheKey::new("v", 1), value());
        cache.insert(CacheKey::new("v", 2), value());
        assert_eq!(cache.get(&a), Some(value()));
        let _ = std::fs::remove_dir_all(dir);
    }
}
