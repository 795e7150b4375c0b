use crate::error::ConfigError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Application-only OAuth credentials for the Reddit API.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    /// Value of the `t` query parameter on listing endpoints.
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

impl fmt::Display for TimeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeFilter {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hour" => Ok(TimeFilter::Hour),
            "day" => Ok(TimeFilter::Day),
            "week" => Ok(TimeFilter::Week),
            "month" => Ok(TimeFilter::Month),
            "year" => Ok(TimeFilter::Year),
            "all" => Ok(TimeFilter::All),
            _ => Err(ConfigError::InvalidValue {
                field: "time_filter".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub subreddit: String,
    pub time_filter: TimeFilter,
    pub limit: Option<u32>,
}

impl FetchRequest {
    pub fn new(
        subreddit: &str,
        time_filter: TimeFilter,
        limit: Option<u32>,
    ) -> Result<Self, ConfigError> {
        let trimmed = subreddit.trim();
        let name = trimmed
            .strip_prefix("r/")
            .or_else(|| trimmed.strip_prefix("/r/"))
            .unwrap_or(trimmed);

        if name.is_empty() {
            return Err(ConfigError::MissingField {
                field: "subreddit".to_string(),
            });
        }
        if name.len() > 21 || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(ConfigError::InvalidValue {
                field: "subreddit".to_string(),
                value: subreddit.to_string(),
            });
        }
        if limit == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "limit".to_string(),
                value: "0".to_string(),
            });
        }

        Ok(Self {
            subreddit: name.to_string(),
            time_filter,
            limit,
        })
    }
}

/// A listing child exactly as Reddit returned it. Field presence and types
/// are not trusted until the post is normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawPost(serde_json::Value);

impl RawPost {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    pub fn field(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name).filter(|v| !v.is_null())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// A normalized post record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub author: String,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub permalink: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_comments: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Ordered posts produced by one run. Ids are unique; the first occurrence
/// of an id wins.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Batch {
    posts: Vec<Post>,
}

impl Batch {
    pub fn new(posts: Vec<Post>) -> Self {
        let mut seen = HashSet::with_capacity(posts.len());
        let posts = posts
            .into_iter()
            .filter(|post| seen.insert(post.id.clone()))
            .collect();
        Self { posts }
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Post> {
        self.posts.iter()
    }

    pub fn into_posts(self) -> Vec<Post> {
        self.posts
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Post;
    type IntoIter = std::slice::Iter<'a, Post>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts.iter()
    }
}

/// Idempotency key of a scheduled run; also names its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunId(String);

impl RunId {
    pub fn new(output_name: &str) -> Result<Self, ConfigError> {
        let name = output_name.trim();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

        if !valid {
            return Err(ConfigError::InvalidValue {
                field: "output_name".to_string(),
                value: output_name.to_string(),
            });
        }
        Ok(Self(name.to_string()))
    }

    /// `reddit_YYYYMMDD`, the daily job's naming scheme.
    pub fn for_date(date: NaiveDate) -> Self {
        Self(format!("reddit_{}", date.format("%Y%m%d")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn post(id: &str) -> Post {
        Post {
            id: id.to_string(),
            title: format!("Post {}", id),
            author: "someone".to_string(),
            score: 1,
            created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            permalink: format!("https://www.reddit.com/r/test/comments/{}/", id),
            num_comments: None,
            url: None,
        }
    }

    #[test]
    fn test_time_filter_parsing() {
        assert_eq!("day".parse::<TimeFilter>().unwrap(), TimeFilter::Day);
        assert_eq!("WEEK".parse::<TimeFilter>().unwrap(), TimeFilter::Week);
        assert_eq!(" all ".parse::<TimeFilter>().unwrap(), TimeFilter::All);
        assert!("decade".parse::<TimeFilter>().is_err());
        assert_eq!(TimeFilter::Month.to_string(), "month");
    }

    #[test]
    fn test_fetch_request_validation() {
        let request = FetchRequest::new("r/dataengineering", TimeFilter::Day, Some(100)).unwrap();
        assert_eq!(request.subreddit, "dataengineering");
        assert_eq!(request.limit, Some(100));

        assert!(matches!(
            FetchRequest::new("  ", TimeFilter::Day, None),
            Err(ConfigError::MissingField { .. })
        ));
        assert!(matches!(
            FetchRequest::new("data engineering", TimeFilter::Day, None),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(
            FetchRequest::new("rust", TimeFilter::Day, Some(0)),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_batch_keeps_first_occurrence() {
        let mut duplicate = post("a");
        duplicate.title = "Later copy".to_string();

        let batch = Batch::new(vec![post("a"), post("b"), duplicate, post("c")]);
        let ids: Vec<&str> = batch.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(batch.posts()[0].title, "Post a");
    }

    #[test]
    fn test_run_id_validation() {
        assert_eq!(RunId::new("reddit_20250608").unwrap().as_str(), "reddit_20250608");
        assert!(RunId::new("").is_err());
        assert!(RunId::new("../escape").is_err());
        assert!(RunId::new(".hidden").is_err());
        assert!(RunId::new("a/b").is_err());

        let date = NaiveDate::from_ymd_opt(2025, 6, 8).unwrap();
        assert_eq!(RunId::for_date(date).as_str(), "reddit_20250608");
    }

    #[test]
    fn test_credentials_debug_hides_secret() {
        let credentials = Credentials {
            client_id: "id".to_string(),
            client_secret: "hunter2".to_string(),
            user_agent: "agent".to_string(),
        };
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("id"));
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_raw_post_treats_null_as_missing() {
        let raw = RawPost::new(serde_json::json!({"id": "x", "author": null}));
        assert!(raw.field("id").is_some());
        assert!(raw.field("author").is_none());
        assert!(raw.field("title").is_none());
    }
}
