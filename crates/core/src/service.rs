//! 서비스 생명주기 -- 공유 제어 베이스, Service trait, 레지스트리
//!
//! 파이프라인의 모든 서비스(소스 워커, 리졸버, Data Manager)는 동일한
//! 능력 집합을 가집니다: start, stop, pause, resume, 활동 표시,
//! 헬스 체크. [`ServiceControl`]이 생명주기 랑데부를 제공하는 공유
//! 베이스이고, [`Service`] trait이 서비스별 변형을 표현합니다.
//!
//! # 생명주기
//! ```text
//! Initialized -> start() -> Running -> stop() -> Stopped
//!                              |  pause()/resume()
//! ```
//!
//! 취소는 협조적입니다: 서비스 태스크는 모든 suspension point에서
//! quit 토큰을 확인합니다.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{IronsightError, ServiceError};

/// dyn-compatible Future 타입 별칭
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 서비스 헬스 상태
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 성능 저하 또는 부분적 장애 (서비스는 계속 동작)
    Degraded(String),
    /// 비정상 -- 서비스 불가 상태
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 비정상 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 모든 서비스가 내장하는 공유 제어 베이스
///
/// quit 신호(취소 토큰), pause 랑데부(watch 채널), 활동 플래그를
/// 한 곳에 모읍니다. 컨트롤러는 1초 주기로 [`ServiceControl::take_active`]를
/// 샘플링해 정지(quiescence) 판정에 사용합니다.
#[derive(Debug)]
pub struct ServiceControl {
    name: String,
    quit: CancellationToken,
    paused: watch::Sender<bool>,
    active: AtomicBool,
    last_active_ms: AtomicU64,
    anchor: Instant,
}

impl ServiceControl {
    /// 이름을 가진 제어 베이스를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            name: name.into(),
            quit: CancellationToken::new(),
            paused,
            active: AtomicBool::new(false),
            last_active_ms: AtomicU64::new(0),
            anchor: Instant::now(),
        }
    }

    /// 서비스명을 반환합니다.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 유의미한 작업을 처리했음을 표시합니다.
    ///
    /// 컨트롤러의 다음 샘플링 틱까지 "활동 있음"으로 보고됩니다.
    pub fn mark_active(&self) {
        self.active.store(true, Ordering::SeqCst);
        let elapsed = u64::try_from(self.anchor.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.last_active_ms.store(elapsed, Ordering::SeqCst);
    }

    /// 활동 플래그를 읽고 동시에 내립니다.
    ///
    /// 마지막 호출 이후 활동이 있었으면 `true`입니다.
    pub fn take_active(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }

    /// 마지막 활동 이후 경과 시간을 반환합니다.
    ///
    /// 한 번도 활동하지 않았으면 생성 시점부터의 경과 시간입니다.
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_active_ms.load(Ordering::SeqCst));
        self.anchor.elapsed().saturating_sub(last)
    }

    /// 서비스를 일시정지합니다.
    ///
    /// 진행 중인 작업은 완료되고, 새 소비는 resume까지 블록됩니다.
    pub fn pause(&self) {
        self.paused.send_replace(true);
    }

    /// 일시정지를 해제합니다.
    pub fn resume(&self) {
        self.paused.send_replace(false);
    }

    /// 현재 일시정지 상태인지 확인합니다.
    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// pause 상태 감시 채널을 구독합니다 (서비스 태스크용).
    pub fn paused_rx(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    /// quit 신호를 보냅니다.
    pub fn quit(&self) {
        self.quit.cancel();
    }

    /// quit 신호가 이미 발생했는지 확인합니다.
    pub fn is_quit(&self) -> bool {
        self.quit.is_cancelled()
    }

    /// 서비스 태스크에 넘길 quit 토큰을 복제합니다.
    pub fn quit_token(&self) -> CancellationToken {
        self.quit.clone()
    }

    /// pause 랑데부 지점
    ///
    /// 일시정지 상태면 resume 또는 quit까지 대기합니다.
    /// quit으로 깨어났으면 `false`를 반환합니다 (루프 탈출 신호).
    pub async fn pause_point(&self, rx: &mut watch::Receiver<bool>) -> bool {
        while *rx.borrow() {
            tokio::select! {
                _ = self.quit.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
        !self.quit.is_cancelled()
    }
}

/// 모든 파이프라인 서비스가 구현하는 생명주기 trait
///
/// pause/resume과 활동 추적은 [`ServiceControl`]이 제공하므로
/// 서비스는 start/stop/health_check만 구현합니다.
///
/// # 구현 예시
/// ```ignore
/// struct ResolverService { control: Arc<ServiceControl>, /* ... */ }
///
/// impl Service for ResolverService {
///     fn control(&self) -> &ServiceControl { &self.control }
///
///     async fn start(&mut self) -> Result<(), IronsightError> {
///         // 구독 확보, 워커 태스크 스폰
///         Ok(())
///     }
///
///     async fn stop(&mut self) -> Result<(), IronsightError> {
///         // quit 전파, 태스크 join
///         Ok(())
///     }
///
///     async fn health_check(&self) -> HealthStatus {
///         HealthStatus::Healthy
///     }
/// }
/// ```
pub trait Service: Send + Sync {
    /// 공유 제어 베이스를 반환합니다.
    fn control(&self) -> &ServiceControl;

    /// 서비스를 시작합니다.
    ///
    /// 이미 실행 중이면 `ServiceError::AlreadyRunning`을 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), IronsightError>> + Send;

    /// 서비스를 정지합니다.
    ///
    /// 큐를 드레인하거나 버리고 구독을 해지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), IronsightError>> + Send;

    /// 서비스의 현재 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 서비스 trait
///
/// `Service`는 RPITIT를 사용하므로 `dyn Service`가 불가합니다.
/// `DynService`는 `BoxFuture`를 반환하여 레지스트리가
/// `Vec<Box<dyn DynService>>`로 서비스를 관리할 수 있게 합니다.
pub trait DynService: Send + Sync {
    /// 공유 제어 베이스를 반환합니다.
    fn control(&self) -> &ServiceControl;

    /// 서비스를 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), IronsightError>>;

    /// 서비스를 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), IronsightError>>;

    /// 서비스의 현재 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

impl<T: Service> DynService for T {
    fn control(&self) -> &ServiceControl {
        Service::control(self)
    }

    fn start(&mut self) -> BoxFuture<'_, Result<(), IronsightError>> {
        Box::pin(Service::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), IronsightError>> {
        Box::pin(Service::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Service::health_check(self))
    }
}

/// 서비스 레지스트리
///
/// 등록 순서가 보존되며 시작과 정지 모두 이 순서를 따릅니다.
/// 구독은 각 서비스의 `start()`에서 만들어지므로, 소비자를 먼저 등록해
/// 생산자의 첫 발행이 구독자를 놓치지 않게 합니다.
pub struct ServiceRegistry {
    services: Vec<Box<dyn DynService>>,
}

impl ServiceRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            services: Vec::new(),
        }
    }

    /// 서비스를 등록합니다.
    ///
    /// 동일한 이름이 이미 등록되어 있으면 에러를 반환합니다.
    pub fn register(&mut self, service: Box<dyn DynService>) -> Result<(), IronsightError> {
        let name = service.control().name().to_owned();
        if self.services.iter().any(|s| s.control().name() == name) {
            return Err(ServiceError::AlreadyRegistered { name }.into());
        }
        self.services.push(service);
        Ok(())
    }

    /// 이름으로 서비스를 조회합니다.
    pub fn get(&self, name: &str) -> Option<&dyn DynService> {
        self.services
            .iter()
            .find(|s| s.control().name() == name)
            .map(|s| s.as_ref())
    }

    /// 등록된 서비스 수를 반환합니다.
    pub fn count(&self) -> usize {
        self.services.len()
    }

    /// 등록된 서비스명 목록을 반환합니다.
    pub fn names(&self) -> Vec<&str> {
        self.services.iter().map(|s| s.control().name()).collect()
    }

    /// 모든 서비스를 등록 순서대로 시작합니다 (fail-fast).
    pub async fn start_all(&mut self) -> Result<(), IronsightError> {
        for service in &mut self.services {
            tracing::info!(service = service.control().name(), "starting service");
            service.start().await?;
        }
        Ok(())
    }

    /// 모든 서비스를 등록 순서대로 정지합니다.
    ///
    /// 개별 정지 실패 시에도 나머지 서비스의 정지를 계속하고,
    /// 모든 에러를 수집하여 반환합니다.
    pub async fn stop_all(&mut self) -> Result<(), IronsightError> {
        let mut errors = Vec::new();
        for service in &mut self.services {
            let name = service.control().name().to_owned();
            if let Err(e) = service.stop().await {
                errors.push(format!("{name}: {e}"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::StopFailed(errors.join("; ")).into())
        }
    }

    /// 모든 서비스를 일시정지합니다.
    pub fn pause_all(&self) {
        for service in &self.services {
            service.control().pause();
        }
    }

    /// 모든 서비스의 일시정지를 해제합니다.
    pub fn resume_all(&self) {
        for service in &self.services {
            service.control().resume();
        }
    }

    /// 마지막 호출 이후 하나라도 활동한 서비스가 있는지 확인합니다.
    ///
    /// 각 서비스의 활동 플래그를 읽으면서 내립니다 (정지 판정용 샘플링).
    pub fn any_activity(&self) -> bool {
        let mut any = false;
        for service in &self.services {
            if service.control().take_active() {
                any = true;
            }
        }
        any
    }

    /// 모든 서비스의 헬스 상태를 조회합니다.
    pub async fn health_check_all(&self) -> Vec<(String, HealthStatus)> {
        let mut statuses = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let name = service.control().name().to_owned();
            let status = service.health_check().await;
            statuses.push((name, status));
        }
        statuses
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct MockService {
        control: Arc<ServiceControl>,
        running: bool,
        fail_on_start: bool,
        fail_on_stop: bool,
    }

    impl MockService {
        fn new(name: &str) -> Self {
            Self {
                control: Arc::new(ServiceControl::new(name)),
                running: false,
                fail_on_start: false,
                fail_on_stop: false,
            }
        }

        fn failing_start(mut self) -> Self {
            self.fail_on_start = true;
            self
        }

        fn failing_stop(mut self) -> Self {
            self.fail_on_stop = true;
            self
        }
    }

    impl Service for MockService {
        fn control(&self) -> &ServiceControl {
            &self.control
        }

        async fn start(&mut self) -> Result<(), IronsightError> {
            if self.fail_on_start {
                return Err(ServiceError::StartFailed {
                    name: self.control.name().to_owned(),
                    reason: "mock start failure".to_owned(),
                }
                .into());
            }
            if self.running {
                return Err(ServiceError::AlreadyRunning {
                    name: self.control.name().to_owned(),
                }
                .into());
            }
            self.running = true;
            Ok(())
        }

        async fn stop(&mut self) -> Result<(), IronsightError> {
            if self.fail_on_stop {
                return Err(ServiceError::StopFailed("mock stop failure".to_owned()).into());
            }
            if !self.running {
                return Err(ServiceError::NotRunning {
                    name: self.control.name().to_owned(),
                }
                .into());
            }
            self.running = false;
            Ok(())
        }

        async fn health_check(&self) -> HealthStatus {
            if self.running {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy("not running".to_owned())
            }
        }
    }

    #[test]
    fn health_status_display() {
        assert_eq!(HealthStatus::Healthy.to_string(), "healthy");
        assert!(HealthStatus::Degraded("slow".to_owned())
            .to_string()
            .contains("slow"));
        assert!(HealthStatus::Unhealthy("dead".to_owned()).is_unhealthy());
    }

    #[test]
    fn control_activity_flag_is_take_once() {
        let control = ServiceControl::new("test");
        assert!(!control.take_active());

        control.mark_active();
        assert!(control.take_active());
        assert!(!control.take_active());
    }

    #[test]
    fn control_idle_duration_resets_on_activity() {
        let control = ServiceControl::new("test");
        std::thread::sleep(Duration::from_millis(20));
        let before = control.idle_for();
        control.mark_active();
        let after = control.idle_for();
        assert!(after < before);
    }

    #[test]
    fn control_pause_resume() {
        let control = ServiceControl::new("test");
        assert!(!control.is_paused());
        control.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!control.is_paused());
    }

    #[tokio::test]
    async fn pause_point_passes_through_when_not_paused() {
        let control = ServiceControl::new("test");
        let mut rx = control.paused_rx();
        assert!(control.pause_point(&mut rx).await);
    }

    #[tokio::test]
    async fn pause_point_blocks_until_resume() {
        let control = Arc::new(ServiceControl::new("test"));
        control.pause();

        let control2 = Arc::clone(&control);
        let waiter = tokio::spawn(async move {
            let mut rx = control2.paused_rx();
            control2.pause_point(&mut rx).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        control.resume();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn pause_point_exits_on_quit() {
        let control = Arc::new(ServiceControl::new("test"));
        control.pause();

        let control2 = Arc::clone(&control);
        let waiter = tokio::spawn(async move {
            let mut rx = control2.paused_rx();
            control2.pause_point(&mut rx).await
        });

        control.quit();
        assert!(!waiter.await.unwrap());
    }

    #[tokio::test]
    async fn registry_rejects_duplicate_names() {
        let mut registry = ServiceRegistry::new();
        registry.register(Box::new(MockService::new("dup"))).unwrap();
        let err = registry
            .register(Box::new(MockService::new("dup")))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.count(), 1);
    }

    #[tokio::test]
    async fn registry_full_lifecycle() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(Box::new(MockService::new("crtsh")))
            .unwrap();
        registry
            .register(Box::new(MockService::new("resolver")))
            .unwrap();
        registry
            .register(Box::new(MockService::new("data-manager")))
            .unwrap();

        registry.start_all().await.unwrap();
        let statuses = registry.health_check_all().await;
        assert!(statuses.iter().all(|(_, h)| h.is_healthy()));

        registry.stop_all().await.unwrap();
        let statuses = registry.health_check_all().await;
        assert!(statuses.iter().all(|(_, h)| h.is_unhealthy()));
    }

    #[tokio::test]
    async fn registry_start_all_fails_fast() {
        let mut registry = ServiceRegistry::new();
        registry.register(Box::new(MockService::new("ok"))).unwrap();
        registry
            .register(Box::new(MockService::new("fail").failing_start()))
            .unwrap();
        registry
            .register(Box::new(MockService::new("skipped")))
            .unwrap();

        assert!(registry.start_all().await.is_err());
        // 첫 서비스는 시작됨, 세 번째는 시작되지 않음
        assert!(registry
            .get("ok")
            .unwrap()
            .health_check()
            .await
            .is_healthy());
        assert!(registry
            .get("skipped")
            .unwrap()
            .health_check()
            .await
            .is_unhealthy());
    }

    #[tokio::test]
    async fn registry_stop_all_continues_on_error() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(Box::new(MockService::new("fail").failing_stop()))
            .unwrap();
        registry.register(Box::new(MockService::new("ok"))).unwrap();

        registry.start_all().await.unwrap();
        let result = registry.stop_all().await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("fail"));

        assert!(registry
            .get("ok")
            .unwrap()
            .health_check()
            .await
            .is_unhealthy());
    }

    #[tokio::test]
    async fn registry_any_activity_samples_and_clears() {
        let mut registry = ServiceRegistry::new();
        registry.register(Box::new(MockService::new("a"))).unwrap();
        registry.register(Box::new(MockService::new("b"))).unwrap();

        assert!(!registry.any_activity());

        registry.get("a").unwrap().control().mark_active();
        assert!(registry.any_activity());
        assert!(!registry.any_activity());
    }

    #[tokio::test]
    async fn registry_pause_all_and_resume_all() {
        let mut registry = ServiceRegistry::new();
        registry.register(Box::new(MockService::new("a"))).unwrap();
        registry.register(Box::new(MockService::new("b"))).unwrap();

        registry.pause_all();
        assert!(registry.get("a").unwrap().control().is_paused());
        assert!(registry.get("b").unwrap().control().is_paused());

        registry.resume_all();
        assert!(!registry.get("a").unwrap().control().is_paused());
    }

    #[tokio::test]
    async fn dyn_service_can_be_boxed() {
        let mut service: Box<dyn DynService> = Box::new(MockService::new("boxed"));
        assert_eq!(service.control().name(), "boxed");
        service.start().await.unwrap();
        assert!(service.health_check().await.is_healthy());
        service.stop().await.unwrap();
    }
}
