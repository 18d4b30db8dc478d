//! 소스 워커 -- DataSource 하나에 파이프라인 생명주기를 입히는 서비스
//!
//! 시작하면 설정된 루트 도메인을 순회하며 소스를 질의하고, 추출된
//! 이름을 (source, name) 중복 필터를 거쳐 NEWNAME으로 발행합니다.
//! 바이트를 성공적으로 처리할 때마다 활동을 표시하고, 그 외에는
//! 유휴로 남습니다 (컨트롤러의 정지 판정에 사용).

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use ironsight_core::bus::EventBus;
use ironsight_core::error::{IronsightError, ServiceError};
use ironsight_core::event::EnumRequest;
use ironsight_core::filter::DataSourceFilter;
use ironsight_core::metrics as m;
use ironsight_core::scope::ScopeMatcher;
use ironsight_core::service::{HealthStatus, Service, ServiceControl};

use crate::http;
use crate::source::DataSource;

/// 워커 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum WorkerState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 데이터 소스 하나를 구동하는 서비스
pub struct SourceService {
    control: Arc<ServiceControl>,
    source: Arc<dyn DataSource>,
    client: reqwest::Client,
    scope: Arc<ScopeMatcher>,
    bus: Arc<EventBus>,
    dedup: Arc<DataSourceFilter>,
    state: WorkerState,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl SourceService {
    /// 소스와 공유 자원으로 서비스를 만듭니다.
    pub fn new(
        source: Arc<dyn DataSource>,
        client: reqwest::Client,
        scope: Arc<ScopeMatcher>,
        bus: Arc<EventBus>,
        dedup: Arc<DataSourceFilter>,
    ) -> Self {
        let control = Arc::new(ServiceControl::new(source.name()));
        Self {
            control,
            source,
            client,
            scope,
            bus,
            dedup,
            state: WorkerState::Initialized,
            task: None,
        }
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            WorkerState::Initialized => "initialized",
            WorkerState::Running => "running",
            WorkerState::Stopped => "stopped",
        }
    }
}

impl Service for SourceService {
    fn control(&self) -> &ServiceControl {
        &self.control
    }

    async fn start(&mut self) -> Result<(), IronsightError> {
        if self.state == WorkerState::Running {
            return Err(ServiceError::AlreadyRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        let source = Arc::clone(&self.source);
        let client = self.client.clone();
        let scope = Arc::clone(&self.scope);
        let bus = Arc::clone(&self.bus);
        let dedup = Arc::clone(&self.dedup);
        let control = Arc::clone(&self.control);
        let paused_rx = self.control.paused_rx();
        let quit = self.control.quit_token();

        self.task = Some(tokio::spawn(async move {
            run_source(source, client, scope, bus, dedup, control, paused_rx, quit).await;
        }));

        self.state = WorkerState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronsightError> {
        if self.state != WorkerState::Running {
            return Err(ServiceError::NotRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        self.control.quit();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = WorkerState::Stopped;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            WorkerState::Running => HealthStatus::Healthy,
            WorkerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            WorkerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_source(
    source: Arc<dyn DataSource>,
    client: reqwest::Client,
    scope: Arc<ScopeMatcher>,
    bus: Arc<EventBus>,
    dedup: Arc<DataSourceFilter>,
    control: Arc<ServiceControl>,
    mut paused_rx: watch::Receiver<bool>,
    quit: CancellationToken,
) {
    let domains: Vec<String> = scope.domains().to_vec();
    for domain in domains {
        if !control.pause_point(&mut paused_rx).await {
            return;
        }
        if quit.is_cancelled() {
            return;
        }

        let url = source.url(&domain);
        let body = tokio::select! {
            _ = quit.cancelled() => return,
            result = http::fetch_page(&client, source.name(), &url) => match result {
                Ok(body) => body,
                Err(e) => {
                    tracing::warn!(source = source.name(), error = %e, "fetch failed");
                    metrics::counter!(
                        m::SOURCE_FETCH_FAILURES_TOTAL,
                        "source" => source.name().to_owned()
                    )
                    .increment(1);
                    continue;
                }
            },
        };

        control.mark_active();

        let names = source.extract(&domain, &scope, &body);
        tracing::debug!(
            source = source.name(),
            domain = %domain,
            extracted = names.len(),
            "processed response body"
        );

        for name in names {
            if dedup.duplicate(source.name(), &name) {
                continue;
            }
            metrics::counter!(
                m::SOURCE_NAMES_PUBLISHED_TOTAL,
                "source" => source.name().to_owned()
            )
            .increment(1);
            bus.publish_new_name(EnumRequest::name(
                name,
                domain.clone(),
                source.tag(),
                source.name(),
            ))
            .await;
        }
    }

    tracing::debug!(source = source.name(), "finished all root domains");
}
