//! Concurrent download orchestration.
//!
//! Each install request becomes one session that streams the video (and an
//! optional thumbnail) to temp files, following redirects itself, then hands
//! the result to the [`Installer`]. Session bookkeeping lives in a single
//! dispatch loop; callers observe progress only through a [`ProgressSink`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::StreamExt;
use reqwest::{header, redirect, Client, Url};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{download_endpoint, USER_AGENT};
use crate::config::Config;
use crate::error::FetchError;
use crate::install::Installer;
use crate::types::{CatalogItem, InstallReport};

/// Redirect hop limit per fetch.
const MAX_REDIRECTS: usize = 10;

/// Capacity of the orchestrator command queue.
const COMMAND_QUEUE: usize = 64;

/// Receiver of progress and completion notifications.
///
/// Implemented by the call site (CLI, GUI, test harness). Implementations
/// must swallow delivery failures: a listener that has gone away never
/// propagates an error back into the engine.
pub trait ProgressSink: Send + Sync {
    /// Called after each received chunk once the response declares a total
    /// length; `percent` is floored to 0..=100.
    fn on_progress(&self, item_id: &str, percent: u8);

    /// Called exactly once per session, on success and failure alike.
    fn on_done(&self, item_id: &str, report: InstallReport);
}

/// Lifecycle of one download session. Redirect hops stay within the
/// fetching states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Requested,
    FetchingVideo,
    WritingVideo,
    FetchingThumbnail,
    WritingThumbnail,
    Committing,
    Done,
    Errored,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Errored)
    }
}

/// Commands processed by the orchestrator's dispatch loop.
enum OrchestratorCommand {
    /// Start a download session for `item`, unless one is already active.
    Install {
        item: CatalogItem,
        reply_tx: oneshot::Sender<bool>,
    },
    /// A session reached a terminal state; drop its handle.
    Finished { item_id: String },
    /// Snapshot the active sessions.
    Active {
        reply_tx: oneshot::Sender<Vec<(String, SessionState)>>,
    },
}

struct SessionHandle {
    state_rx: watch::Receiver<SessionState>,
}

/// Owns the set of concurrent download sessions.
///
/// The map of active sessions is mutated only inside the dispatch loop, so
/// the at-most-one-session-per-item invariant needs no shared locking.
#[derive(Clone)]
pub struct Orchestrator {
    cmd_tx: mpsc::Sender<OrchestratorCommand>,
}

impl Orchestrator {
    /// Start the orchestrator; spawns the dispatch loop.
    pub fn start(config: &Config, installer: Installer, sink: Arc<dyn ProgressSink>) -> Self {
        // Redirects are followed by the session state machine, not reqwest.
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(redirect::Policy::none())
            .connect_timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_QUEUE);
        let loop_tx = cmd_tx.clone();
        let base_url = config.base_url.clone();
        tokio::spawn(run_loop(cmd_rx, loop_tx, client, base_url, installer, sink));

        Self { cmd_tx }
    }

    /// Request an install for `item`.
    ///
    /// Returns `true` when a new session was started, `false` when one is
    /// already in flight for the same item id (the request is then a no-op).
    pub async fn request_install(&self, item: CatalogItem) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(OrchestratorCommand::Install { item, reply_tx })
            .await
            .is_err()
        {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }

    /// Snapshot of `(item_id, state)` for every live session.
    pub async fn active_sessions(&self) -> Vec<(String, SessionState)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self
            .cmd_tx
            .send(OrchestratorCommand::Active { reply_tx })
            .await
            .is_err()
        {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }
}

async fn run_loop(
    mut cmd_rx: mpsc::Receiver<OrchestratorCommand>,
    cmd_tx: mpsc::Sender<OrchestratorCommand>,
    client: Client,
    base_url: String,
    installer: Installer,
    sink: Arc<dyn ProgressSink>,
) {
    let mut sessions: HashMap<String, SessionHandle> = HashMap::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            OrchestratorCommand::Install { item, reply_tx } => {
                if sessions.contains_key(&item.id) {
                    debug!(item_id = %item.id, "download already in flight; ignoring request");
                    let _ = reply_tx.send(false);
                    continue;
                }

                let (state_tx, state_rx) = watch::channel(SessionState::Requested);
                sessions.insert(item.id.clone(), SessionHandle { state_rx });
                let _ = reply_tx.send(true);

                let session = Session {
                    client: client.clone(),
                    base_url: base_url.clone(),
                    installer: installer.clone(),
                    sink: Arc::clone(&sink),
                    state_tx,
                };
                let done_tx = cmd_tx.clone();
                tokio::spawn(async move {
                    let item_id = item.id.clone();
                    session.run(item).await;
                    let _ = done_tx
                        .send(OrchestratorCommand::Finished { item_id })
                        .await;
                });
            }

            OrchestratorCommand::Finished { item_id } => {
                sessions.remove(&item_id);
            }

            OrchestratorCommand::Active { reply_tx } => {
                let snapshot = sessions
                    .iter()
                    .map(|(id, handle)| (id.clone(), *handle.state_rx.borrow()))
                    .collect();
                let _ = reply_tx.send(snapshot);
            }
        }
    }
}

/// One in-flight download, driven to a terminal state by [`Session::run`].
struct Session {
    client: Client,
    base_url: String,
    installer: Installer,
    sink: Arc<dyn ProgressSink>,
    state_tx: watch::Sender<SessionState>,
}

impl Session {
    fn set_state(&self, state: SessionState) {
        let _ = self.state_tx.send(state);
    }

    async fn run(self, item: CatalogItem) {
        let item_id = item.id.clone();
        let video_tmp = temp_path("webm");

        self.set_state(SessionState::FetchingVideo);
        let video_url = download_endpoint(&self.base_url, &item_id);
        if let Err(e) = self
            .fetch_to_file(
                &video_url,
                &video_tmp,
                Some(&item_id),
                SessionState::WritingVideo,
            )
            .await
        {
            warn!(item_id = %item_id, error = %e, "video download failed");
            self.set_state(SessionState::Errored);
            remove_temp(&video_tmp);
            self.sink
                .on_done(&item_id, InstallReport::fail(format!("Download failed: {e}")));
            return;
        }

        // The thumbnail never starts before the video body is complete, and
        // its failure is not fatal to the session.
        let thumb_tmp = match item.thumbnail_url.as_deref() {
            Some(url) => {
                self.set_state(SessionState::FetchingThumbnail);
                let path = temp_path("jpg");
                match self
                    .fetch_to_file(url, &path, None, SessionState::WritingThumbnail)
                    .await
                {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!(item_id = %item_id, error = %e, "thumbnail download failed; continuing without it");
                        remove_temp(&path);
                        None
                    }
                }
            }
            None => None,
        };

        self.set_state(SessionState::Committing);
        let installer = self.installer.clone();
        let install_item = item.clone();
        let video = video_tmp.clone();
        let thumb = thumb_tmp.clone();
        let report = match tokio::task::spawn_blocking(move || {
            installer.install(&install_item, &video, thumb.as_deref())
        })
        .await
        {
            Ok(report) => report,
            Err(e) => {
                remove_temp(&video_tmp);
                if let Some(thumb) = &thumb_tmp {
                    remove_temp(thumb);
                }
                InstallReport::fail(format!("Install task failed: {e}"))
            }
        };

        if report.success {
            info!(item_id = %item_id, "install complete");
            self.set_state(SessionState::Done);
        } else {
            warn!(item_id = %item_id, message = %report.message, "install failed");
            self.set_state(SessionState::Errored);
        }
        self.sink.on_done(&item_id, report);
    }

    /// GET `url` and stream the final response body to `dest`, following up
    /// to [`MAX_REDIRECTS`] redirects. Redirect bodies are never written;
    /// `bytes_received` carries across hops. Progress is reported only when
    /// `item_id` is given and the response declares a total length.
    async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        item_id: Option<&str>,
        writing_state: SessionState,
    ) -> Result<(), FetchError> {
        let mut url = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_owned()))?;
        let mut file = tokio::fs::File::create(dest).await?;
        let mut received: u64 = 0;
        let mut redirects = 0usize;

        loop {
            let resp = self.client.get(url.clone()).send().await?;

            if resp.status().is_redirection() {
                redirects += 1;
                if redirects > MAX_REDIRECTS {
                    return Err(FetchError::TooManyRedirects {
                        url: url.to_string(),
                        limit: MAX_REDIRECTS,
                    });
                }
                let location = resp
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .ok_or_else(|| FetchError::InvalidRedirect {
                        url: url.to_string(),
                    })?;
                // Relative locations resolve against the current URL.
                url = url.join(location).map_err(|_| FetchError::InvalidRedirect {
                    url: url.to_string(),
                })?;
                debug!(target_url = %url, hop = redirects, "following redirect");
                continue;
            }

            let resp = resp.error_for_status()?;
            self.set_state(writing_state);
            let total = resp.content_length().unwrap_or(0);

            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                received += chunk.len() as u64;
                if total > 0 {
                    if let Some(id) = item_id {
                        let percent = (received.min(total) * 100 / total) as u8;
                        self.sink.on_progress(id, percent);
                    }
                }
            }
            file.flush().await?;
            return Ok(());
        }
    }
}

fn temp_path(ext: &str) -> PathBuf {
    std::env::temp_dir().join(format!("deckrepo-{}.{ext}", Uuid::new_v4()))
}

fn remove_temp(path: &Path) {
    if path.exists() {
        let _ = std::fs::remove_file(path);
    }
}
