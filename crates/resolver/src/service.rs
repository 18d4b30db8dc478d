//! 리졸버 서비스 -- NEWNAME 소비, 이름당 한 번의 검증, RESOLVED 발행
//!
//! 파이프라인의 순환(CNAME 루프, PTR 재발견)은 여기서 끊어집니다:
//! in-flight-or-completed 필터가 각 고유 이름을 정확히 한 번만
//! 백엔드로 보냅니다. 범위 내 고유 이름의 집합은 유한하므로
//! 재발행 루프는 반드시 종료합니다.

use std::sync::Arc;

use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use ironsight_core::bus::{EventBus, Subscription};
use ironsight_core::config::ResolverConfig;
use ironsight_core::error::{IronsightError, ServiceError};
use ironsight_core::event::{EnumRequest, Topic, SERVICE_RESOLVER};
use ironsight_core::filter::StringFilter;
use ironsight_core::metrics as m;
use ironsight_core::scope::canonicalize;
use ironsight_core::service::{HealthStatus, Service, ServiceControl};
use ironsight_core::types::{TYPE_A, TYPE_AAAA, TYPE_CNAME, TYPE_MX, TYPE_NS, TYPE_PTR, TYPE_SPF, TYPE_SRV, TYPE_TXT};

use crate::client::{reverse_query_name, DnsClient};

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ResolverState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 이름의 모양에 따라 질의할 레코드 타입을 고릅니다.
///
/// 기본 타입은 항상 질의하고, 주소 모양이면 PTR을,
/// 서비스 모양(`_` 레이블 선행)이면 SRV를 추가합니다.
pub fn query_plan(name: &str) -> Vec<u16> {
    let mut plan = vec![
        TYPE_A,
        TYPE_AAAA,
        TYPE_CNAME,
        TYPE_MX,
        TYPE_NS,
        TYPE_TXT,
        TYPE_SPF,
    ];
    if is_address_shaped(name) {
        plan.push(TYPE_PTR);
    }
    if name.starts_with('_') {
        plan.push(TYPE_SRV);
    }
    plan
}

fn is_address_shaped(name: &str) -> bool {
    name.parse::<std::net::IpAddr>().is_ok()
        || name.ends_with(".in-addr.arpa")
        || name.ends_with(".ip6.arpa")
}

/// PTR 질의에 사용할 이름을 만듭니다.
///
/// IP 리터럴은 역방향 arpa 형태로 바꾸고, 이미 arpa 형태면 그대로 씁니다.
fn ptr_query_name(name: &str) -> String {
    match name.parse::<std::net::IpAddr>() {
        Ok(addr) => reverse_query_name(addr),
        Err(_) => name.to_owned(),
    }
}

/// NEWNAME을 검증하는 리졸버 서비스
pub struct ResolverService {
    control: Arc<ServiceControl>,
    client: Arc<dyn DnsClient>,
    bus: Arc<EventBus>,
    filter: Arc<StringFilter>,
    max_concurrent: usize,
    state: ResolverState,
    task: Option<tokio::task::JoinHandle<()>>,
    sub_id: Option<u64>,
}

impl ResolverService {
    /// 백엔드와 공유 자원으로 서비스를 만듭니다.
    pub fn new(client: Arc<dyn DnsClient>, bus: Arc<EventBus>, config: &ResolverConfig) -> Self {
        Self {
            control: Arc::new(ServiceControl::new(SERVICE_RESOLVER)),
            client,
            bus,
            filter: Arc::new(StringFilter::new()),
            max_concurrent: config.max_concurrent,
            state: ResolverState::Initialized,
            task: None,
            sub_id: None,
        }
    }

    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ResolverState::Initialized => "initialized",
            ResolverState::Running => "running",
            ResolverState::Stopped => "stopped",
        }
    }

    /// 지금까지 본 고유 이름 수를 반환합니다.
    pub fn seen_count(&self) -> usize {
        self.filter.len()
    }
}

impl Service for ResolverService {
    fn control(&self) -> &ServiceControl {
        &self.control
    }

    async fn start(&mut self) -> Result<(), IronsightError> {
        if self.state == ResolverState::Running {
            return Err(ServiceError::AlreadyRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        let sub = self.bus.subscribe_new_name();
        self.sub_id = Some(sub.id());

        let client = Arc::clone(&self.client);
        let bus = Arc::clone(&self.bus);
        let filter = Arc::clone(&self.filter);
        let control = Arc::clone(&self.control);
        let paused_rx = self.control.paused_rx();
        let quit = self.control.quit_token();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));

        self.task = Some(tokio::spawn(async move {
            run_resolver(client, bus, filter, semaphore, control, paused_rx, quit, sub).await;
        }));

        self.state = ResolverState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronsightError> {
        if self.state != ResolverState::Running {
            return Err(ServiceError::NotRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        self.control.quit();
        if let Some(id) = self.sub_id.take() {
            let _ = self.bus.unsubscribe(Topic::NewName, id);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = ResolverState::Stopped;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ResolverState::Running => HealthStatus::Healthy,
            ResolverState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ResolverState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_resolver(
    client: Arc<dyn DnsClient>,
    bus: Arc<EventBus>,
    filter: Arc<StringFilter>,
    semaphore: Arc<Semaphore>,
    control: Arc<ServiceControl>,
    mut paused_rx: watch::Receiver<bool>,
    quit: CancellationToken,
    mut sub: Subscription<EnumRequest>,
) {
    loop {
        if !control.pause_point(&mut paused_rx).await {
            break;
        }

        let req = tokio::select! {
            _ = quit.cancelled() => break,
            msg = sub.recv() => match msg {
                Some(req) => req,
                None => break,
            },
        };

        let Some(name) = canonicalize(&req.name) else {
            continue;
        };
        // 이름당 한 번만 해석: 이 test-and-add가 CNAME 순환의 상한이다
        if filter.duplicate(&name) {
            metrics::counter!(m::RESOLVER_NAMES_DROPPED_TOTAL).increment(1);
            continue;
        }

        let permit = tokio::select! {
            _ = quit.cancelled() => break,
            permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let client = Arc::clone(&client);
        let bus = Arc::clone(&bus);
        let control = Arc::clone(&control);
        let req = EnumRequest::clone(&req);
        tokio::spawn(async move {
            resolve_name(client, bus, control, req, name).await;
            drop(permit);
        });
    }

    tracing::debug!("resolver loop exited");
}

async fn resolve_name(
    client: Arc<dyn DnsClient>,
    bus: Arc<EventBus>,
    control: Arc<ServiceControl>,
    req: EnumRequest,
    name: String,
) {
    let mut records = Vec::new();
    for rr_type in query_plan(&name) {
        let qname = if rr_type == TYPE_PTR {
            ptr_query_name(&name)
        } else {
            name.clone()
        };
        match client.query(&qname, rr_type).await {
            Ok(mut found) => records.append(&mut found),
            Err(e) => {
                tracing::debug!(name = %name, rr_type, error = %e, "query failed");
            }
        }
    }

    if records.is_empty() {
        metrics::counter!(m::RESOLVER_NAMES_DROPPED_TOTAL).increment(1);
        return;
    }

    control.mark_active();
    metrics::counter!(m::RESOLVER_NAMES_RESOLVED_TOTAL).increment(1);

    bus.publish_resolved(EnumRequest {
        name,
        domain: req.domain,
        address: String::new(),
        records,
        tag: req.tag,
        source: req.source,
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use ironsight_core::service::BoxFuture;
    use ironsight_core::types::{DnsRecord, Tag};

    use crate::error::ResolverError;

    /// 스크립트된 응답을 주고 질의를 기록하는 목 백엔드
    #[derive(Default)]
    struct MockDnsClient {
        answers: HashMap<(String, u16), Vec<DnsRecord>>,
        queries: Mutex<Vec<(String, u16)>>,
    }

    impl MockDnsClient {
        fn answer(mut self, name: &str, rr_type: u16, data: &str) -> Self {
            self.answers
                .entry((name.to_owned(), rr_type))
                .or_default()
                .push(DnsRecord::new(name, rr_type, 300, data));
            self
        }

        fn queried(&self) -> Vec<(String, u16)> {
            self.queries.lock().unwrap().clone()
        }
    }

    impl DnsClient for MockDnsClient {
        fn query<'a>(
            &'a self,
            name: &'a str,
            rr_type: u16,
        ) -> BoxFuture<'a, Result<Vec<DnsRecord>, ResolverError>> {
            Box::pin(async move {
                self.queries
                    .lock()
                    .unwrap()
                    .push((name.to_owned(), rr_type));
                Ok(self
                    .answers
                    .get(&(name.to_owned(), rr_type))
                    .cloned()
                    .unwrap_or_default())
            })
        }
    }

    fn new_name(name: &str) -> EnumRequest {
        EnumRequest::name(name, "example.com", Tag::Cert, "Crtsh")
    }

    async fn start_service(
        client: Arc<MockDnsClient>,
        bus: Arc<EventBus>,
    ) -> ResolverService {
        let mut svc = ResolverService::new(client, bus, &ResolverConfig::default());
        svc.start().await.unwrap();
        svc
    }

    #[test]
    fn query_plan_for_plain_names() {
        let plan = query_plan("www.example.com");
        assert_eq!(
            plan,
            vec![TYPE_A, TYPE_AAAA, TYPE_CNAME, TYPE_MX, TYPE_NS, TYPE_TXT, TYPE_SPF]
        );
    }

    #[test]
    fn query_plan_adds_ptr_for_address_shapes() {
        assert!(query_plan("93.184.216.34").contains(&TYPE_PTR));
        assert!(query_plan("34.216.184.93.in-addr.arpa").contains(&TYPE_PTR));
        assert!(!query_plan("www.example.com").contains(&TYPE_PTR));
    }

    #[test]
    fn query_plan_adds_srv_for_service_shapes() {
        assert!(query_plan("_sip._tcp.example.com").contains(&TYPE_SRV));
        assert!(!query_plan("sip.example.com").contains(&TYPE_SRV));
    }

    #[test]
    fn ptr_query_name_rewrites_literals() {
        assert_eq!(ptr_query_name("93.184.216.34"), "34.216.184.93.in-addr.arpa");
        assert_eq!(
            ptr_query_name("34.216.184.93.in-addr.arpa"),
            "34.216.184.93.in-addr.arpa"
        );
    }

    #[tokio::test]
    async fn aggregates_all_records_into_one_resolved_event() {
        let client = Arc::new(
            MockDnsClient::default()
                .answer("a.example.com", TYPE_A, "93.184.216.34")
                .answer("a.example.com", TYPE_TXT, "v=spf1 -all"),
        );
        let bus = Arc::new(EventBus::new());
        let mut resolved = bus.subscribe_resolved();

        let mut svc = start_service(Arc::clone(&client), Arc::clone(&bus)).await;
        bus.publish_new_name(new_name("A.Example.COM.")).await;

        let event = resolved.recv().await.unwrap();
        assert_eq!(event.name, "a.example.com");
        assert_eq!(event.records.len(), 2);
        assert_eq!(event.tag, Tag::Cert);
        assert_eq!(event.source, "Crtsh");

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn each_name_is_resolved_at_most_once() {
        let client = Arc::new(
            MockDnsClient::default().answer("a.example.com", TYPE_A, "93.184.216.34"),
        );
        let bus = Arc::new(EventBus::new());
        let mut resolved = bus.subscribe_resolved();

        let mut svc = start_service(Arc::clone(&client), Arc::clone(&bus)).await;
        for _ in 0..5 {
            bus.publish_new_name(new_name("a.example.com")).await;
        }

        resolved.recv().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(resolved.try_recv().is_none());

        let a_queries = client
            .queried()
            .iter()
            .filter(|(n, t)| n == "a.example.com" && *t == TYPE_A)
            .count();
        assert_eq!(a_queries, 1);

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unresolved_names_are_dropped() {
        let client = Arc::new(MockDnsClient::default());
        let bus = Arc::new(EventBus::new());
        let mut resolved = bus.subscribe_resolved();

        let mut svc = start_service(client, Arc::clone(&bus)).await;
        bus.publish_new_name(new_name("nxdomain.example.com")).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(resolved.try_recv().is_none());

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn address_inputs_are_queried_in_reverse_form() {
        let client = Arc::new(MockDnsClient::default().answer(
            "34.216.184.93.in-addr.arpa",
            TYPE_PTR,
            "a.example.com.",
        ));
        let bus = Arc::new(EventBus::new());
        let mut resolved = bus.subscribe_resolved();

        let mut svc = start_service(Arc::clone(&client), Arc::clone(&bus)).await;
        bus.publish_new_name(new_name("93.184.216.34")).await;

        let event = resolved.recv().await.unwrap();
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].data, "a.example.com.");
        assert!(client
            .queried()
            .contains(&("34.216.184.93.in-addr.arpa".to_owned(), TYPE_PTR)));

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn lifecycle_double_start_and_stop() {
        let client = Arc::new(MockDnsClient::default());
        let bus = Arc::new(EventBus::new());
        let mut svc = ResolverService::new(client, bus, &ResolverConfig::default());

        assert!(svc.health_check().await.is_unhealthy());
        svc.start().await.unwrap();
        assert!(svc.start().await.is_err());
        assert!(svc.health_check().await.is_healthy());
        svc.stop().await.unwrap();
        assert!(svc.stop().await.is_err());
    }

    #[tokio::test]
    async fn stop_unsubscribes_from_the_bus() {
        let client = Arc::new(MockDnsClient::default());
        let bus = Arc::new(EventBus::new());
        let mut svc = start_service(client, Arc::clone(&bus)).await;

        assert_eq!(bus.subscriber_count(Topic::NewName), 1);
        svc.stop().await.unwrap();
        assert_eq!(bus.subscriber_count(Topic::NewName), 0);
    }
}
