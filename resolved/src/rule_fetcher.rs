//! Subscription-list rule fetcher (spec §4.9), grounded on
//! `examples/original_source/fetcher/fetcher.go`'s `FetchAndMergeRules`:
//! read a text file of subscription URLs, GET each one, de-duplicate
//! non-comment non-blank lines into a set, and write the merged set back
//! out. A failed URL logs a warning and does not abort the batch — this
//! workspace keeps that per-URL degrade policy but returns the count of
//! failures to the caller instead of only printing it, so the supervisor
//! can decide whether to log at `warn` (spec §7: this is a start-up
//! Degrade, not a Fatal, path).

use std::collections::BTreeSet;
use std::fmt;

use tokio::fs;

/// Read subscription URLs (one per line, `#` comments, spec §6), fetch each,
/// merge all non-comment non-blank response lines into a de-duplicated,
/// sorted set, and write them to `output_path`. Returns the number of rules
/// written and the number of URLs that failed to fetch.
pub async fn fetch_and_merge(
    client: &reqwest::Client,
    subscription_path: &str,
    output_path: &str,
) -> Result<FetchSummary, Error> {
    let urls = read_subscription_urls(subscription_path).await?;

    let mut rules = BTreeSet::new();
    let mut failed = 0usize;
    for url in &urls {
        match fetch_one(client, url).await {
            Ok(lines) => rules.extend(lines),
            Err(err) => {
                tracing::warn!(%url, error = %err, "failed to fetch subscription");
                failed += 1;
            }
        }
    }

    let mut body = String::new();
    for rule in &rules {
        body.push_str(rule);
        body.push('\n');
    }
    fs::write(output_path, body)
        .await
        .map_err(|source| Error::Write {
            path: output_path.to_string(),
            source,
        })?;

    Ok(FetchSummary {
        rule_count: rules.len(),
        failed_urls: failed,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSummary {
    pub rule_count: usize,
    pub failed_urls: usize,
}

async fn read_subscription_urls(path: &str) -> Result<Vec<String>, Error> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|source| Error::Read {
            path: path.to_string(),
            source,
        })?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<Vec<String>, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| FetchError::Http(source.to_string()))?;
    let body = response
        .text()
        .await
        .map_err(|source| FetchError::Http(source.to_string()))?;

    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[derive(Debug)]
enum FetchError {
    Http(String),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for FetchError {}

#[derive(Debug)]
pub enum Error {
    Read { path: String, source: std::io::Error },
    Write { path: String, source: std::io::Error },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Read { path, source } => {
                write!(f, "could not read subscription file {path}: {source}")
            }
            Error::Write { path, source } => {
                write!(f, "could not write merged rule file {path}: {source}")
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Read { source, .. } | Error::Write { source, .. } => Some(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_urls_skipping_comments_and_blanks() {
        let dir = std::env::temp_dir().join(format!(
            "resolved-rule-fetcher-test-{:?}",
            std::thread::current().id()
        ));
        fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("subscriptions.txt");
        fs::write(&path, "# comment\n\nhttps://example.com/rules.list\n")
            .await
            .unwrap();

        let urls = read_subscription_urls(path.to_str().unwrap()).await.unwrap();
        assert_eq!(vec!["https://example.com/rules.list".to_string()], urls);
    }

    #[tokio::test]
    async fn missing_subscription_file_is_an_error() {
        let err = read_subscription_urls("/nonexistent/subscriptions.txt")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Read { .. }));
    }
}
