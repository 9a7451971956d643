//! Orchestrator pass against the remote analysis backend.
//!
//! One [`sync_once`] call drains the title batch through `POST /analyze`,
//! folds the result into the stored profile, acknowledges exactly the titles
//! that were analyzed, and asks `POST /recommend` for one archive piece.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thyself_shared::{ArchivePiece, ProfileHistogram, Result, ThyselfError, TitleBatchEntry};
use tracing::{debug, info, instrument};
use url::Url;

use crate::router::Action;
use crate::sanitizer::MAX_TITLE_CHARS;
use crate::transport::Transport;

/// User agent for backend requests.
const USER_AGENT: &str = concat!("thyself/", env!("CARGO_PKG_VERSION"));

/// Most titles the backend accepts per analysis.
pub const MAX_ANALYZE_TITLES: usize = 500;

/// The backend wants exactly this many sub-topic tags.
pub const RECOMMEND_TAGS: usize = 3;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    user_id: &'a str,
    titles: Vec<String>,
}

/// Topic histograms for one batch of titles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyzeResponse {
    #[serde(default)]
    pub user_id: String,
    pub total_titles: u64,
    /// `{parent: {total, children: {child: n}}}`; passed through untouched.
    #[serde(default)]
    pub tags_histogram: Value,
    /// `"Parent > Child"` → count.
    #[serde(default)]
    pub flat_subfield_histogram: BTreeMap<String, u64>,
    #[serde(default)]
    pub t0_ranked: Vec<(String, u64)>,
    #[serde(default)]
    pub t1_ranked: Vec<(String, u64)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecommendRequest {
    pub user_id: String,
    pub tags: Vec<String>,
    pub limit: u32,
    pub need_backups: bool,
    pub use_profile: bool,
}

impl RecommendRequest {
    pub fn new(user_id: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            user_id: user_id.into(),
            tags,
            limit: 1,
            need_backups: false,
            use_profile: false,
        }
    }
}

/// A recommended piece as returned by the backend.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecommendedPiece {
    #[serde(default)]
    pub user_id: Option<String>,
    pub title: String,
    pub source: String,
    pub url: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl From<RecommendedPiece> for ArchivePiece {
    fn from(piece: RecommendedPiece) -> Self {
        Self {
            date: piece.date,
            title: piece.title,
            source: piece.source,
            url: piece.url,
            image_url: piece.image_url.unwrap_or_default(),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

pub struct BackendClient {
    client: Client,
    base: Url,
}

impl BackendClient {
    pub fn new(base: &Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ThyselfError::Network(format!("failed to build HTTP client: {e}")))?;

        // `join` replaces the last path segment unless the base ends in '/'.
        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `GET /healthz`.
    pub async fn health(&self) -> Result<bool> {
        #[derive(Deserialize)]
        struct Health {
            ok: bool,
        }
        let url = self.endpoint("healthz")?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| ThyselfError::Network(format!("{url}: {e}")))?;
        let health: Health = read_json(&url, response).await?;
        Ok(health.ok)
    }

    /// `POST /analyze`. Titles beyond the backend limit are not sent; each
    /// title is clamped to the backend's length limit.
    pub async fn analyze(&self, user_id: &str, titles: &[String]) -> Result<AnalyzeResponse> {
        if titles.is_empty() {
            return Err(ThyselfError::validation("nothing to analyze"));
        }
        let body = AnalyzeRequest {
            user_id,
            titles: titles
                .iter()
                .take(MAX_ANALYZE_TITLES)
                .map(|t| t.chars().take(MAX_TITLE_CHARS).collect())
                .collect(),
        };
        self.post("analyze", &body).await
    }

    /// `POST /recommend`.
    pub async fn recommend(&self, request: &RecommendRequest) -> Result<RecommendedPiece> {
        if request.tags.len() != RECOMMEND_TAGS {
            return Err(ThyselfError::validation(format!(
                "recommend needs exactly {RECOMMEND_TAGS} tags, got {}",
                request.tags.len()
            )));
        }
        self.post("recommend", request).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let url = self.endpoint(path)?;
        debug!(%url, "backend request");
        let response = self
            .client
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| ThyselfError::Network(format!("{url}: {e}")))?;
        read_json(&url, response).await
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ThyselfError::config(format!("invalid backend endpoint '{path}': {e}")))
    }
}

async fn read_json<T: DeserializeOwned>(url: &Url, response: reqwest::Response) -> Result<T> {
    let status = response.status();
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(ThyselfError::Network(format!(
            "{url}: HTTP {status} {}",
            detail.trim()
        )));
    }
    response
        .json()
        .await
        .map_err(|e| ThyselfError::parse(format!("{url}: invalid response body: {e}")))
}

// ---------------------------------------------------------------------------
// Orchestration
// ---------------------------------------------------------------------------

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Titles sent for analysis.
    pub analyzed: usize,
    /// Title entries removed from the batch.
    pub acknowledged: usize,
    /// Tags used for the recommendation, if one was requested.
    pub tags: Vec<String>,
    /// Piece appended to the archive.
    pub piece: Option<ArchivePiece>,
}

/// Run one orchestrator pass over `transport`.
///
/// Returns early (with an empty report) when there are no titles, and skips
/// the recommendation while the profile has fewer than three sub-topics.
#[instrument(skip_all, fields(backend = %client.base_url(), %user_id))]
pub async fn sync_once<T: Transport>(
    transport: &T,
    client: &BackendClient,
    user_id: &str,
) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    let batch: Vec<TitleBatchEntry> = call(transport, Action::GetTitles, Value::Null).await?;
    if batch.is_empty() {
        info!("no titles waiting, nothing to sync");
        return Ok(report);
    }
    let batch: Vec<TitleBatchEntry> = batch.into_iter().take(MAX_ANALYZE_TITLES).collect();
    let titles: Vec<String> = batch.iter().map(|e| e.title.clone()).collect();

    let analysis = client.analyze(user_id, &titles).await?;
    report.analyzed = titles.len();
    info!(
        titles = titles.len(),
        t0 = analysis.t0_ranked.len(),
        t1 = analysis.flat_subfield_histogram.len(),
        "titles analyzed"
    );

    let mut profile: ProfileHistogram = call::<Option<ProfileHistogram>>(
        transport,
        Action::GetProfile,
        Value::Null,
    )
    .await?
    .unwrap_or_default();
    let t0: BTreeMap<String, u64> = analysis.t0_ranked.iter().cloned().collect();
    profile.merge_counts(&t0, &analysis.flat_subfield_histogram);
    profile.updated_at = None;
    call::<Value>(transport, Action::SetProfile, json!({ "profile": profile })).await?;

    let ids: Vec<String> = batch.iter().map(|e| e.id.clone()).collect();
    call::<Value>(transport, Action::AckTitles, json!({ "ids": ids })).await?;
    report.acknowledged = ids.len();

    let tags = top_tags(&profile.t1, RECOMMEND_TAGS);
    if tags.len() < RECOMMEND_TAGS {
        info!(tags = tags.len(), "not enough sub-topics yet, skipping recommendation");
        return Ok(report);
    }

    let piece: ArchivePiece = client
        .recommend(&RecommendRequest::new(user_id, tags.clone()))
        .await?
        .into();
    call::<Value>(transport, Action::AppendPiece, json!({ "piece": piece })).await?;
    info!(title = %piece.title, source = %piece.source, "piece archived");

    report.tags = tags;
    report.piece = Some(piece);
    Ok(report)
}

/// Highest-count sub-topics (count desc, then name), as child labels with
/// duplicates removed.
pub fn top_tags(t1: &BTreeMap<String, u64>, n: usize) -> Vec<String> {
    let mut ranked: Vec<(&String, &u64)> = t1.iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut tags: Vec<String> = Vec::with_capacity(n);
    for (label, _) in ranked {
        let child = label
            .split_once(" > ")
            .map_or(label.as_str(), |(_, child)| child)
            .trim();
        if child.is_empty() || tags.iter().any(|t| t == child) {
            continue;
        }
        tags.push(child.to_string());
        if tags.len() == n {
            break;
        }
    }
    tags
}

async fn call<T: DeserializeOwned>(
    transport: &impl Transport,
    action: Action,
    payload: Value,
) -> Result<T> {
    transport
        .request(action.as_str(), payload)
        .await
        .ok_or_else(|| ThyselfError::Protocol(format!("no answer to {action}")))?
        .into_data()
}
