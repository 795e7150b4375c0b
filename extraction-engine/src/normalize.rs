use chrono::{TimeZone, Utc};
use etl_core::{NormalizeError, Post, RawPost};
use serde_json::Value;

const REDDIT_WEB_BASE: &str = "https://www.reddit.com";

/// Turn a raw listing item into a [`Post`], or explain why it cannot be one.
pub fn normalize(raw: &RawPost) -> Result<Post, NormalizeError> {
    let id = required_str(raw, "id")?;
    if id.trim().is_empty() {
        return Err(NormalizeError::InvalidValue {
            field: "id",
            value: id.to_string(),
        });
    }

    let score_value = required(raw, "score")?;
    let score = integer(score_value).ok_or_else(|| invalid("score", score_value))?;
    if score < 0 {
        return Err(NormalizeError::InvalidValue {
            field: "score",
            value: score.to_string(),
        });
    }

    let created = required(raw, "created_utc")?;
    let created_at = created
        .as_f64()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .and_then(|secs| {
            let whole = secs.trunc();
            let nanos = ((secs - whole) * 1e9) as u32;
            Utc.timestamp_opt(whole as i64, nanos).single()
        })
        .ok_or_else(|| invalid("created_utc", created))?;

    let permalink = required_str(raw, "permalink")?;
    if permalink.trim().is_empty() {
        return Err(NormalizeError::InvalidValue {
            field: "permalink",
            value: permalink.to_string(),
        });
    }

    Ok(Post {
        id: id.trim().to_string(),
        title: required_str(raw, "title")?.to_string(),
        author: required_str(raw, "author")?.to_string(),
        score,
        created_at,
        permalink: absolute_permalink(permalink),
        num_comments: raw.field("num_comments").and_then(Value::as_u64),
        url: raw
            .field("url")
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string),
    })
}

fn required<'a>(raw: &'a RawPost, field: &'static str) -> Result<&'a Value, NormalizeError> {
    raw.field(field)
        .ok_or(NormalizeError::MissingField { field })
}

fn required_str<'a>(raw: &'a RawPost, field: &'static str) -> Result<&'a str, NormalizeError> {
    let value = required(raw, field)?;
    value.as_str().ok_or_else(|| invalid(field, value))
}

/// Scores arrive as integers, occasionally as whole floats.
fn integer(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as i64)
    })
}

fn invalid(field: &'static str, value: &Value) -> NormalizeError {
    NormalizeError::InvalidValue {
        field,
        value: value.to_string(),
    }
}

fn absolute_permalink(permalink: &str) -> String {
    let permalink = permalink.trim();
    if permalink.starts_with('/') {
        format!("{}{}", REDDIT_WEB_BASE, permalink)
    } else {
        permalink.to_string()
    }
}
