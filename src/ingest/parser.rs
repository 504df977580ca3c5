//! Newline-delimited batch decoding

use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;
use tracing::debug;

use crate::models::AnalyticsPost;
use crate::KnowRagError;
use crate::Result;

/// A line that could not be decoded into a post
#[derive(Debug, Clone)]
pub struct MalformedLine {
    /// 1-based line number in the batch file
    pub line: usize,
    /// Record ID when the line was valid JSON carrying one
    pub record_id: Option<String>,
    pub error: String,
    /// The line as JSON if it parsed as JSON at all, else as a string
    pub raw: Value,
}

impl MalformedLine {
    /// Identifier used in reports for a line without a usable record ID
    pub fn report_id(&self) -> String {
        self.record_id
            .clone()
            .unwrap_or_else(|| format!("line:{}", self.line))
    }

    pub fn to_error(&self) -> KnowRagError {
        KnowRagError::Parse {
            line: self.line,
            message: self.error.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedBatch {
    pub posts: Vec<AnalyticsPost>,
    pub malformed: Vec<MalformedLine>,
}

impl ParsedBatch {
    /// Non-blank lines seen
    pub fn total(&self) -> usize {
        self.posts.len() + self.malformed.len()
    }
}

/// Stream a batch line by line; blank lines are ignored, undecodable lines
/// (bad UTF-8 included) are collected instead of aborting the batch
pub async fn parse_batch<R>(mut reader: R) -> Result<ParsedBatch>
where
    R: AsyncBufRead + Unpin,
{
    let mut batch = ParsedBatch::default();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        line_no += 1;

        let text = match std::str::from_utf8(&buf) {
            Ok(text) => text,
            Err(e) => {
                debug!("Line {} is not valid UTF-8: {}", line_no, e);
                let lossy = String::from_utf8_lossy(&buf);
                batch.malformed.push(MalformedLine {
                    line: line_no,
                    record_id: None,
                    error: format!("invalid UTF-8: {e}"),
                    raw: Value::String(lossy.trim().to_string()),
                });
                continue;
            }
        };

        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        match serde_json::from_str::<AnalyticsPost>(trimmed) {
            Ok(post) => batch.posts.push(post),
            Err(e) => {
                let raw = serde_json::from_str::<Value>(trimmed)
                    .unwrap_or_else(|_| Value::String(trimmed.to_string()));
                let record_id = raw.get("id").and_then(Value::as_str).map(str::to_string);
                debug!("Malformed record at line {}: {}", line_no, e);
                batch.malformed.push(MalformedLine {
                    line: line_no,
                    record_id,
                    error: e.to_string(),
                    raw,
                });
            }
        }
    }

    Ok(batch)
}
