//! Asynchronous surface over the blocking PBS service.
//!
//! Every call runs the synchronous service on tokio's blocking pool.
//! Handles are moved into the task and handed back with the result, so a
//! handle is never shared between an in-flight task and the caller.
//!
//! All methods must be called from within a tokio runtime.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{self, JoinHandle};

use crate::config::QlinkConfig;
use crate::error::{SchedError, SchedResult};
use crate::id::JobId;
use crate::job::{JobDescription, JobHandle, JobInfo};
use crate::pbs::PbsJobService;

/// An operation running on the blocking pool.
///
/// Resolves to the operation's result; a panic inside the operation
/// surfaces as [`SchedError::Internal`].
#[must_use = "a JobTask does nothing unless awaited"]
#[derive(Debug)]
pub struct JobTask<T> {
    inner: JoinHandle<SchedResult<T>>,
}

impl<T: Send + 'static> JobTask<T> {
    fn spawn<F>(f: F) -> Self
    where
        F: FnOnce() -> SchedResult<T> + Send + 'static,
    {
        Self {
            inner: task::spawn_blocking(f),
        }
    }
}

impl<T> JobTask<T> {
    /// Check if the operation has completed.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

impl<T> Future for JobTask<T> {
    type Output = SchedResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|joined| joined.map_err(SchedError::from).and_then(|result| result))
    }
}

/// Async job service operations.
#[async_trait]
pub trait JobService: Send + Sync {
    /// Submit a job.
    async fn submit(&self, jd: &JobDescription) -> SchedResult<JobHandle>;

    /// Refresh a handle from the scheduler.
    async fn poll(&self, handle: &mut JobHandle) -> SchedResult<JobInfo>;

    /// Cancel a job.
    async fn cancel(&self, handle: &mut JobHandle) -> SchedResult<()>;

    /// Wait for a job to reach a terminal state.
    async fn wait(&self, handle: &mut JobHandle, timeout: Option<Duration>) -> SchedResult<bool>;

    /// List the calling user's jobs.
    async fn list(&self) -> SchedResult<Vec<JobId>>;
}

/// [`PbsJobService`] on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct AsyncPbsJobService {
    inner: Arc<PbsJobService>,
}

impl AsyncPbsJobService {
    /// Wrap a connected service.
    pub fn new(service: PbsJobService) -> Self {
        Self {
            inner: Arc::new(service),
        }
    }

    /// Connect to the resource manager at `url`.
    pub async fn connect(url: &str) -> SchedResult<Self> {
        let url = url.to_string();
        let service = task::spawn_blocking(move || PbsJobService::connect(&url)).await??;
        Ok(Self::new(service))
    }

    /// Connect using a loaded configuration.
    pub async fn from_config(config: QlinkConfig) -> SchedResult<Self> {
        let service = task::spawn_blocking(move || PbsJobService::from_config(&config)).await??;
        Ok(Self::new(service))
    }

    /// The synchronous service underneath.
    pub fn service(&self) -> &PbsJobService {
        &self.inner
    }

    /// Submit `jd` in the background.
    pub fn submit_task(&self, jd: JobDescription) -> JobTask<JobHandle> {
        let inner = Arc::clone(&self.inner);
        JobTask::spawn(move || inner.submit(&jd))
    }

    /// Poll `handle` in the background.
    pub fn poll_task(&self, mut handle: JobHandle) -> JobTask<(JobHandle, JobInfo)> {
        let inner = Arc::clone(&self.inner);
        JobTask::spawn(move || {
            let info = inner.poll(&mut handle)?;
            Ok((handle, info))
        })
    }

    /// Cancel `handle` in the background.
    pub fn cancel_task(&self, mut handle: JobHandle) -> JobTask<JobHandle> {
        let inner = Arc::clone(&self.inner);
        JobTask::spawn(move || {
            inner.cancel(&mut handle)?;
            Ok(handle)
        })
    }

    /// Wait for `handle` in the background.
    pub fn wait_task(
        &self,
        mut handle: JobHandle,
        timeout: Option<Duration>,
    ) -> JobTask<(JobHandle, bool)> {
        let inner = Arc::clone(&self.inner);
        JobTask::spawn(move || {
            let done = inner.wait(&mut handle, timeout)?;
            Ok((handle, done))
        })
    }

    /// List jobs in the background.
    pub fn list_task(&self) -> JobTask<Vec<JobId>> {
        let inner = Arc::clone(&self.inner);
        JobTask::spawn(move || inner.list())
    }
}

#[async_trait]
impl JobService for AsyncPbsJobService {
    async fn submit(&self, jd: &JobDescription) -> SchedResult<JobHandle> {
        self.submit_task(jd.clone()).await
    }

    async fn poll(&self, handle: &mut JobHandle) -> SchedResult<JobInfo> {
        let (updated, info) = self.poll_task(handle.clone()).await?;
        *handle = updated;
        Ok(info)
    }

    async fn cancel(&self, handle: &mut JobHandle) -> SchedResult<()> {
        *handle = self.cancel_task(handle.clone()).await?;
        Ok(())
    }

    async fn wait(&self, handle: &mut JobHandle, timeout: Option<Duration>) -> SchedResult<bool> {
        let (updated, done) = self.wait_task(handle.clone(), timeout).await?;
        *handle = updated;
        Ok(done)
    }

    async fn list(&self) -> SchedResult<Vec<JobId>> {
        self.list_task().await
    }
}
