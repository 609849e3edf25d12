//! External progress report target (a pull-request comment).

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use serde::Serialize;
use tracing::{debug, instrument};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("spec-runner/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Replaces the body of an existing comment.
pub trait CommentTarget {
    fn update_comment(&self, comment_id: &str, body: &str) -> Result<()>;
}

impl<T: CommentTarget + ?Sized> CommentTarget for Arc<T> {
    fn update_comment(&self, comment_id: &str, body: &str) -> Result<()> {
        (**self).update_comment(comment_id, body)
    }
}

/// Used when reporting is disabled; accepts and drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopComments;

impl CommentTarget for NoopComments {
    fn update_comment(&self, _comment_id: &str, _body: &str) -> Result<()> {
        Ok(())
    }
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

/// GitHub issue-comment API client.
pub struct GithubComments {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
}

impl std::fmt::Debug for GithubComments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubComments")
            .field("api_url", &self.api_url)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

impl GithubComments {
    pub fn new(api_url: &str, repository: &str, token: &str) -> Result<Self> {
        if repository.trim().is_empty() {
            return Err(anyhow!("repository (owner/repo) is required for PR comments"));
        }
        if token.trim().is_empty() {
            return Err(anyhow!("a GitHub token is required for PR comments"));
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .context("build http client")?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            repository: repository.trim().to_string(),
            token: token.trim().to_string(),
        })
    }

    pub fn comment_url(&self, comment_id: &str) -> String {
        format!(
            "{}/repos/{}/issues/comments/{}",
            self.api_url, self.repository, comment_id
        )
    }
}

impl CommentTarget for GithubComments {
    #[instrument(skip_all, fields(comment_id))]
    fn update_comment(&self, comment_id: &str, body: &str) -> Result<()> {
        let url = self.comment_url(comment_id);
        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&CommentBody { body })
            .send()
            .with_context(|| format!("PATCH {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "PATCH {url} returned {status}: {}",
                text.chars().take(500).collect::<String>()
            ));
        }
        debug!(%status, bytes = body.len(), "comment updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// The blocking client owns its own runtime, so it runs off the test's.
    async fn update_off_runtime(base: String, id: &'static str, body: &'static str) -> Result<()> {
        tokio::task::spawn_blocking(move || {
            GithubComments::new(&base, "acme/widgets", "secret")?.update_comment(id, body)
        })
        .await
        .expect("blocking task")
    }

    #[test]
    fn url_joins_api_repository_and_id() {
        let comments =
            GithubComments::new("https://api.github.com/", "acme/widgets", "t0k").expect("client");
        assert_eq!(
            comments.comment_url("42"),
            "https://api.github.com/repos/acme/widgets/issues/comments/42"
        );
        assert!(!format!("{comments:?}").contains("t0k"));
    }

    #[test]
    fn missing_token_is_rejected() {
        assert!(GithubComments::new(DEFAULT_API_URL, "acme/widgets", " ").is_err());
        assert!(GithubComments::new(DEFAULT_API_URL, "", "tok").is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn patches_comment_body_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/repos/acme/widgets/issues/comments/7"))
            .and(header("authorization", "Bearer secret"))
            .and(header("x-github-api-version", "2022-11-28"))
            .and(body_json(serde_json::json!({ "body": "## report" })))
            .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
            .expect(1)
            .mount(&server)
            .await;

        update_off_runtime(server.uri(), "7", "## report")
            .await
            .expect("update");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .expect(1)
            .mount(&server)
            .await;

        let err = update_off_runtime(server.uri(), "7", "x")
            .await
            .expect_err("404");
        let msg = format!("{err:#}");
        assert!(msg.contains("404"), "{msg}");
        assert!(msg.contains("Not Found"), "{msg}");
    }
}
