//! 调度器：单消费者轮询循环
//!
//! 每个周期认领全系统最早的 pending 请求，在独立任务中执行到终态后才进入下一周期，
//! 因此同一时刻至多一个请求处于执行中。执行任务 panic 时请求被终结为 error；
//! 任何错误都只记日志，轮询不中断。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::RequestRunner;
use crate::core::InceptError;
use crate::request::{LogLevel, RequestId, RequestLifecycle, RequestStatus};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// 没有 pending 请求
    Idle,
    /// 另一个周期仍在执行
    Busy,
    Processed {
        request_id: RequestId,
        status: RequestStatus,
    },
}

pub struct Dispatcher {
    lifecycle: RequestLifecycle,
    runner: RequestRunner,
    interval: Duration,
    busy: Arc<AtomicBool>,
}

/// 离开作用域时释放忙碌标记
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Dispatcher {
    pub fn new(runner: RequestRunner, interval: Duration) -> Self {
        Self {
            lifecycle: runner.lifecycle().clone(),
            runner,
            interval,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 一个周期：认领并执行至多一个请求
    pub async fn tick(&self) -> Result<TickOutcome, InceptError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(TickOutcome::Busy);
        }
        let _guard = BusyGuard(&self.busy);

        let Some(request) = self.lifecycle.claim_next()? else {
            return Ok(TickOutcome::Idle);
        };
        let request_id = request.id;
        let runner = self.runner.clone();
        let status = match tokio::spawn(async move { runner.process(request).await }).await {
            Ok(status) => status,
            Err(join_err) => self.contain_crash(request_id, InceptError::Worker(join_err.to_string())),
        };
        Ok(TickOutcome::Processed { request_id, status })
    }

    /// 轮询直到关闭 token 被取消；执行中的请求会先跑完
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Dispatcher started");
        while !shutdown.is_cancelled() {
            match self.tick().await {
                Ok(TickOutcome::Processed { request_id, status }) => {
                    let (input_tokens, output_tokens, total_tokens) = self.runner.token_usage();
                    tracing::info!(
                        request_id,
                        status = %status,
                        input_tokens,
                        output_tokens,
                        total_tokens,
                        "Dispatcher processed request"
                    );
                }
                Ok(TickOutcome::Idle) | Ok(TickOutcome::Busy) => {}
                Err(e) => tracing::error!(error = %e, "Dispatcher tick failed"),
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        tracing::info!("Dispatcher stopped");
    }

    fn contain_crash(&self, request_id: RequestId, error: InceptError) -> RequestStatus {
        let msg = format!("Error: {}", error);
        tracing::error!(request_id, "{}", msg);
        if let Err(e) = self.lifecycle.log(request_id, LogLevel::Error, &msg) {
            tracing::warn!(request_id, error = %e, "Failed to persist request log");
        }
        match self.lifecycle.finalize(request_id, RequestStatus::Error, &msg) {
            Ok(()) => RequestStatus::Error,
            Err(_) => self
                .lifecycle
                .get(request_id)
                .ok()
                .flatten()
                .map(|r| r.status)
                .unwrap_or(RequestStatus::Error),
        }
    }
}
