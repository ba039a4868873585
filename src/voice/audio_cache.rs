//! Synthesized clips waiting for Twilio to `<Play>` them

use super::AudioClip;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const DEFAULT_AUDIO_CACHE_CAPACITY: usize = 256;

/// Bounded in-memory store; the oldest clip is evicted first
pub struct AudioCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

#[derive(Default)]
struct CacheInner {
    clips: HashMap<String, Arc<AudioClip>>,
    order: VecDeque<String>,
}

impl AudioCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Store a clip and return the id it is served under
    pub async fn insert(&self, clip: AudioClip) -> String {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.inner.write().await;
        while inner.order.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.clips.remove(&oldest);
                }
                None => break,
            }
        }
        inner.clips.insert(id.clone(), Arc::new(clip));
        inner.order.push_back(id.clone());
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<AudioClip>> {
        self.inner.read().await.clips.get(id).cloned()
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.inner.read().await.clips.len()
    }
}

impl Default for AudioCache {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIO_CACHE_CAPACITY)
    }
}
