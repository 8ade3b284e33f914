//! Redis cache backend.
//!
//! Shares one inventory between several processes. Each category maps to two
//! keys:
//!
//! - `imgstock:{category}:scores`: sorted set of ids scored by usage,
//! - `imgstock:{category}:items`: hash of id to JSON record snapshot.
//!
//! The sorted set gives logarithmic rank queries and `ZRANDMEMBER` random
//! picks (Redis 6.2+). Reads that increment go through a Lua script so that
//! the existence check and the `ZINCRBY` are a single atomic step.

use crate::CacheBackend;
use crate::error::{ErrorKind, Result};
use async_trait::async_trait;
use exn::{OptionExt, ResultExt};
use imgstock_record::ImgInfo;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

const NAMESPACE: &str = "imgstock";

/// Fetch a record body and its score, bumping the score by `ARGV[2]` first
/// when that is positive. Returns nil when the id isn't cached.
const GET_SCRIPT: &str = r#"
local body = redis.call('HGET', KEYS[1], ARGV[1])
if not body then
    return false
end
local score
if tonumber(ARGV[2]) > 0 then
    score = redis.call('ZINCRBY', KEYS[2], ARGV[2], ARGV[1])
else
    score = redis.call('ZSCORE', KEYS[2], ARGV[1])
end
return {body, score}
"#;

/// Redis cache backend.
///
/// The [`ConnectionManager`] reconnects transparently and is cheap to clone,
/// so every call works on its own clone without locking.
///
/// # Examples
///
/// ```no_run
/// use imgstock_cache::backend::RedisCache;
///
/// # async fn example() -> imgstock_cache::error::Result<()> {
/// let cache = RedisCache::connect("127.0.0.1:6379", 2).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisCache {
    name: String,
    connection: ConnectionManager,
    get_script: Script,
}

impl RedisCache {
    /// Connect to the Redis server at `address` (`host:port`), using logical
    /// database `db`.
    pub async fn connect(address: &str, db: i64) -> Result<Self> {
        let url = format!("redis://{address}/{db}");
        let client = Client::open(url.as_str()).or_raise(|| ErrorKind::Connection)?;
        let connection = ConnectionManager::new(client).await.or_raise(|| ErrorKind::Connection)?;
        Ok(Self {
            name: format!("redis({address}/{db})"),
            connection,
            get_script: Script::new(GET_SCRIPT),
        })
    }

    fn scores_key(&self, category: &str) -> String {
        format!("{NAMESPACE}:{category}:scores")
    }

    fn items_key(&self, category: &str) -> String {
        format!("{NAMESPACE}:{category}:items")
    }

    fn command_error(command: &'static str) -> impl FnOnce() -> ErrorKind {
        move || ErrorKind::Backend(command.to_string())
    }

    fn decode(body: &str, score: Option<f64>) -> Result<ImgInfo> {
        let mut img: ImgInfo = serde_json::from_str(body).or_raise(|| ErrorKind::InvalidData)?;
        if let Some(score) = score {
            img.uses = score_to_uses(score);
        }
        Ok(img)
    }
}

/// Sorted set scores are doubles; usage counters never go negative.
fn score_to_uses(score: f64) -> u64 {
    score.max(0.0) as u64
}

#[async_trait]
impl CacheBackend for RedisCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn actual_id(&self, category: &str) -> Result<String> {
        let mut conn = self.connection.clone();
        let ids: Vec<String> = redis::cmd("ZRANGE")
            .arg(self.scores_key(category))
            .arg(0)
            .arg(0)
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("ZRANGE"))?;
        ids.into_iter().next().ok_or_raise(|| ErrorKind::EmptyCategory(category.to_string()))
    }

    async fn random_id(&self, category: &str) -> Result<String> {
        let mut conn = self.connection.clone();
        let id: Option<String> = redis::cmd("ZRANDMEMBER")
            .arg(self.scores_key(category))
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("ZRANDMEMBER"))?;
        id.ok_or_raise(|| ErrorKind::EmptyCategory(category.to_string()))
    }

    async fn get(&self, category: &str, id: &str, increment: bool) -> Result<ImgInfo> {
        let mut conn = self.connection.clone();
        let found: Option<(String, Option<f64>)> = self
            .get_script
            .key(self.items_key(category))
            .key(self.scores_key(category))
            .arg(id)
            .arg(u8::from(increment))
            .invoke_async(&mut conn)
            .await
            .or_raise(Self::command_error("EVALSHA"))?;
        let (body, score) = found.ok_or_raise(|| ErrorKind::not_found(category, id))?;
        Self::decode(&body, score)
    }

    async fn all_ids(&self, category: &str) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("ZRANGE")
            .arg(self.scores_key(category))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("ZRANGE"))
    }

    async fn score(&self, category: &str, id: &str) -> Result<u64> {
        let mut conn = self.connection.clone();
        let score: Option<f64> = redis::cmd("ZSCORE")
            .arg(self.scores_key(category))
            .arg(id)
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("ZSCORE"))?;
        score.map(score_to_uses).ok_or_raise(|| ErrorKind::not_found(category, id))
    }

    async fn ids_in_range(&self, category: &str, lo: u64, hi: u64) -> Result<Vec<String>> {
        let mut conn = self.connection.clone();
        redis::cmd("ZRANGEBYSCORE")
            .arg(self.scores_key(category))
            .arg(lo)
            .arg(hi)
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("ZRANGEBYSCORE"))
    }

    async fn set(&self, category: &str, img: &ImgInfo) -> Result<()> {
        let mut img = img.clone();
        img.category = category.to_string();
        let body = serde_json::to_string(&img).or_raise(|| ErrorKind::InvalidData)?;
        let mut conn = self.connection.clone();
        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(self.items_key(category))
            .arg(&img.id)
            .arg(body)
            .ignore()
            .cmd("ZADD")
            .arg(self.scores_key(category))
            .arg(img.uses)
            .arg(&img.id)
            .ignore()
            .query_async(&mut conn)
            .await
            .or_raise(Self::command_error("MULTI"))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0.0, 0)]
    #[case(3.0, 3)]
    #[case(-1.0, 0)]
    fn test_score_to_uses(#[case] score: f64, #[case] expected: u64) {
        assert_eq!(score_to_uses(score), expected);
    }

    #[test]
    fn test_decode_prefers_live_score() {
        let img = ImgInfo::new("cats", "https://example.com/cat.jpg", 1, 1).with_uses(2);
        let body = serde_json::to_string(&img).unwrap();
        assert_eq!(RedisCache::decode(&body, Some(5.0)).unwrap().uses, 5);
        assert_eq!(RedisCache::decode(&body, None).unwrap().uses, 2);
        assert!(matches!(&*RedisCache::decode("{", None).unwrap_err(), ErrorKind::InvalidData));
    }
}
