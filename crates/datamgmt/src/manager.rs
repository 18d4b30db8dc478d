//! Data Manager -- 검증된 레코드를 그래프와 새 발견으로 해석
//!
//! CHECKED 요청 하나가 0개 이상의 새 이름을 낳습니다: CNAME/NS/MX/PTR
//! 대상과 TXT/SPF 본문 속 토큰이 NEWNAME으로 재주입되고, A/AAAA 주소는
//! NEWADDR로 발행됩니다. 재주입 루프의 종료는 리졸버의 이름당 1회
//! 중복 제거가 보장합니다 (범위 내 고유 이름 집합은 유한).
//!
//! # 디스패치 흐름
//! ```text
//! CHECKED -> canonicalize -> insert_domain -> per record:
//!   A/AAAA -> sinks + infrastructure + NEWADDR
//!   CNAME/NS/MX -> sinks + insert_domain(target_domain) + NEWNAME
//!   PTR -> sinks + NEWNAME
//!   SRV -> sinks
//!   TXT/SPF -> IPv4 regex -> NEWADDR, subdomain regex -> NEWNAME
//! ```
//!
//! 모든 싱크 쓰기는 log-and-continue입니다. 한 싱크의 실패가 다른
//! 싱크나 나머지 레코드 처리를 막지 않습니다.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;

use ironsight_core::bus::{EventBus, Subscription};
use ironsight_core::error::{IronsightError, ServiceError};
use ironsight_core::event::{EnumRequest, Topic, SERVICE_DATA_MANAGER, SOURCE_FORWARD_DNS};
use ironsight_core::filter::{DataSourceFilter, StringFilter};
use ironsight_core::metrics as m;
use ironsight_core::scope::{any_subdomain_regex, canonicalize, clean_name, ipv4_regex, ScopeMatcher};
use ironsight_core::service::{HealthStatus, Service, ServiceControl};
use ironsight_core::types::{RecordKind, Tag};
use ironsight_graph::{GraphSink, MemoryGraph};

use crate::asn::IpMetadata;
use crate::error::DataMgmtError;

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ManagerState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 역방향 조회 이름을 IP 주소로 되돌립니다.
///
/// `in-addr.arpa`는 옥텟 역순, `ip6.arpa`는 니블 역순입니다.
/// 어느 형태도 아니면 `None`입니다.
pub fn arpa_to_ip(name: &str) -> Option<IpAddr> {
    if let Some(prefix) = name.strip_suffix(".in-addr.arpa") {
        let mut octets = [0u8; 4];
        let parts: Vec<&str> = prefix.split('.').collect();
        if parts.len() != 4 {
            return None;
        }
        for (i, part) in parts.iter().rev().enumerate() {
            octets[i] = part.parse().ok()?;
        }
        return Some(IpAddr::V4(Ipv4Addr::new(
            octets[0], octets[1], octets[2], octets[3],
        )));
    }

    if let Some(prefix) = name.strip_suffix(".ip6.arpa") {
        let nibbles: Vec<&str> = prefix.split('.').collect();
        if nibbles.len() != 32 {
            return None;
        }
        let mut bytes = [0u8; 16];
        for (i, chunk) in nibbles.rchunks(2).enumerate() {
            let high = u8::from_str_radix(chunk[1], 16).ok()?;
            let low = u8::from_str_radix(chunk[0], 16).ok()?;
            bytes[i] = (high << 4) | low;
        }
        return Some(IpAddr::V6(Ipv6Addr::from(bytes)));
    }

    None
}

/// CHECKED 레코드 집합을 처리하는 Data Manager 서비스
pub struct DataManager {
    control: Arc<ServiceControl>,
    worker: Arc<Worker>,
    bus: Arc<EventBus>,
    output_tick: Duration,
    state: ManagerState,
    task: Option<tokio::task::JoinHandle<()>>,
    sub_id: Option<u64>,
}

impl std::fmt::Debug for DataManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataManager")
            .field("state", &self.state)
            .field("output_tick", &self.output_tick)
            .field("sub_id", &self.sub_id)
            .finish_non_exhaustive()
    }
}

/// Data Manager 빌더
///
/// 권위 그래프는 항상 첫 번째 싱크이며, 직렬화 싱크 등은
/// `extra_sink`로 덧붙입니다.
pub struct DataManagerBuilder {
    bus: Option<Arc<EventBus>>,
    scope: Option<Arc<ScopeMatcher>>,
    graph: Option<Arc<MemoryGraph>>,
    extra_sinks: Vec<Arc<dyn GraphSink>>,
    metadata: Option<Arc<dyn IpMetadata>>,
    source_filter: Option<Arc<DataSourceFilter>>,
    output_tick: Duration,
}

impl DataManagerBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            bus: None,
            scope: None,
            graph: None,
            extra_sinks: Vec::new(),
            metadata: None,
            source_filter: None,
            output_tick: Duration::from_secs(1),
        }
    }

    /// 이벤트 버스를 지정합니다.
    pub fn bus(mut self, bus: Arc<EventBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// 범위 매칭기를 지정합니다.
    pub fn scope(mut self, scope: Arc<ScopeMatcher>) -> Self {
        self.scope = Some(scope);
        self
    }

    /// 권위 그래프 스토어를 지정합니다.
    pub fn graph(mut self, graph: Arc<MemoryGraph>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// 추가 그래프 싱크를 등록합니다.
    pub fn extra_sink(mut self, sink: Arc<dyn GraphSink>) -> Self {
        self.extra_sinks.push(sink);
        self
    }

    /// IP 메타데이터 공급자를 지정합니다 (생략 시 인프라 보강 없음).
    pub fn metadata(mut self, metadata: Arc<dyn IpMetadata>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// 컨트롤러 소유의 (source, name) 중복 필터를 지정합니다.
    pub fn source_filter(mut self, filter: Arc<DataSourceFilter>) -> Self {
        self.source_filter = Some(filter);
        self
    }

    /// 출력 드레인 주기를 지정합니다.
    pub fn output_tick(mut self, tick: Duration) -> Self {
        self.output_tick = tick;
        self
    }

    /// Data Manager를 빌드합니다.
    ///
    /// # Errors
    ///
    /// bus/scope/graph/source_filter 중 하나라도 빠지면
    /// `DataMgmtError::MissingComponent`를 반환합니다.
    pub fn build(self) -> Result<DataManager, DataMgmtError> {
        let bus = self.bus.ok_or(DataMgmtError::MissingComponent("bus"))?;
        let scope = self.scope.ok_or(DataMgmtError::MissingComponent("scope"))?;
        let graph = self.graph.ok_or(DataMgmtError::MissingComponent("graph"))?;
        let source_filter = self
            .source_filter
            .ok_or(DataMgmtError::MissingComponent("source_filter"))?;

        let mut sinks: Vec<Arc<dyn GraphSink>> = vec![Arc::clone(&graph) as Arc<dyn GraphSink>];
        sinks.extend(self.extra_sinks);

        let control = Arc::new(ServiceControl::new(SERVICE_DATA_MANAGER));
        let worker = Arc::new(Worker {
            bus: Arc::clone(&bus),
            scope,
            graph,
            sinks,
            metadata: self.metadata,
            source_filter,
            output_filter: StringFilter::new(),
            domain_filter: StringFilter::new(),
            control: Arc::clone(&control),
        });

        Ok(DataManager {
            control,
            worker,
            bus,
            output_tick: self.output_tick,
            state: ManagerState::Initialized,
            task: None,
            sub_id: None,
        })
    }
}

impl Default for DataManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManager {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ManagerState::Initialized => "initialized",
            ManagerState::Running => "running",
            ManagerState::Stopped => "stopped",
        }
    }
}

impl Service for DataManager {
    fn control(&self) -> &ServiceControl {
        &self.control
    }

    async fn start(&mut self) -> Result<(), IronsightError> {
        if self.state == ManagerState::Running {
            return Err(ServiceError::AlreadyRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        let sub = self.bus.subscribe_checked();
        self.sub_id = Some(sub.id());

        let worker = Arc::clone(&self.worker);
        let control = Arc::clone(&self.control);
        let paused_rx = self.control.paused_rx();
        let quit = self.control.quit_token();
        let tick = self.output_tick;

        self.task = Some(tokio::spawn(async move {
            run_manager(worker, control, paused_rx, quit, tick, sub).await;
        }));

        self.state = ManagerState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), IronsightError> {
        if self.state != ManagerState::Running {
            return Err(ServiceError::NotRunning {
                name: self.control.name().to_owned(),
            }
            .into());
        }

        self.control.quit();
        if let Some(id) = self.sub_id.take() {
            let _ = self.bus.unsubscribe(Topic::Checked, id);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
        self.state = ManagerState::Stopped;
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ManagerState::Running => HealthStatus::Healthy,
            ManagerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ManagerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn run_manager(
    worker: Arc<Worker>,
    control: Arc<ServiceControl>,
    mut paused_rx: watch::Receiver<bool>,
    quit: CancellationToken,
    tick: Duration,
    mut sub: Subscription<EnumRequest>,
) {
    let mut output_timer = interval(tick);
    output_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        if !control.pause_point(&mut paused_rx).await {
            break;
        }

        tokio::select! {
            _ = quit.cancelled() => break,
            _ = output_timer.tick() => worker.send_output().await,
            msg = sub.recv() => match msg {
                Some(req) => worker.manage_data(&req).await,
                None => break,
            },
        }
    }

    // 정지 전에 대기 중인 출력을 마지막으로 드레인
    worker.send_output().await;
    tracing::debug!("data manager loop exited");
}

/// 실제 해석 로직 (서비스 수명과 분리된 공유 상태)
struct Worker {
    bus: Arc<EventBus>,
    scope: Arc<ScopeMatcher>,
    graph: Arc<MemoryGraph>,
    sinks: Vec<Arc<dyn GraphSink>>,
    metadata: Option<Arc<dyn IpMetadata>>,
    source_filter: Arc<DataSourceFilter>,
    output_filter: StringFilter,
    domain_filter: StringFilter,
    control: Arc<ServiceControl>,
}

impl Worker {
    /// 싱크 전부에 쓰고, 실패는 싱크 식별자와 함께 로그 후 계속합니다.
    fn fanout<F>(&self, op: &str, write: F)
    where
        F: Fn(&dyn GraphSink) -> Result<(), ironsight_graph::StoreError>,
    {
        for sink in &self.sinks {
            if let Err(e) = write(sink.as_ref()) {
                tracing::error!(sink = sink.name(), op, error = %e, "sink write failed");
            }
        }
    }

    async fn manage_data(&self, req: &EnumRequest) {
        let Some(name) = canonicalize(&req.name) else {
            return;
        };
        let Some(domain) = canonicalize(&req.domain) else {
            return;
        };

        self.control.mark_active();
        self.insert_domain(&domain).await;

        for record in &req.records {
            let Some(kind) = record.kind() else {
                continue;
            };
            let rec_name = canonicalize(&record.name).unwrap_or_default();
            let data = record.data.trim().to_lowercase();
            if data.is_empty() {
                continue;
            }

            match kind {
                RecordKind::A => self.insert_a(&name, &domain, &data, req).await,
                RecordKind::Aaaa => self.insert_aaaa(&name, &domain, &data, req).await,
                RecordKind::Cname => self.insert_cname(&name, &domain, &data, req).await,
                RecordKind::Ptr => self.insert_ptr(&name, &rec_name, &data, req).await,
                RecordKind::Srv => self.insert_srv(&name, &domain, &rec_name, &data, req).await,
                RecordKind::Ns => self.insert_ns(&name, &domain, &data, req).await,
                RecordKind::Mx => self.insert_mx(&name, &domain, &data, req).await,
                RecordKind::Txt | RecordKind::Spf => self.insert_txt_like(&name, &data).await,
            }
        }
    }

    /// (source, name) 중복 필터를 거쳐 NEWNAME을 재발행합니다.
    async fn send_new_name(&self, req: EnumRequest) {
        if self.source_filter.duplicate(&req.source, &req.name) {
            return;
        }
        self.bus.publish_new_name(req).await;
    }

    async fn insert_domain(&self, domain: &str) {
        if domain.is_empty() || self.domain_filter.duplicate(domain) {
            return;
        }
        self.fanout("insert_domain", |sink| {
            sink.insert_domain(domain, Tag::Dns, SOURCE_FORWARD_DNS)
        });
        self.send_new_name(EnumRequest::name(
            domain,
            domain,
            Tag::Dns,
            SOURCE_FORWARD_DNS,
        ))
        .await;
    }

    async fn insert_a(&self, name: &str, domain: &str, addr: &str, req: &EnumRequest) {
        if addr.parse::<std::net::Ipv4Addr>().is_err() {
            tracing::debug!(name = %name, data = %addr, "A record with non-IPv4 data");
            return;
        }
        self.fanout("insert_a", |sink| {
            sink.insert_a(name, domain, addr, req.tag, &req.source)
        });
        self.insert_infrastructure(addr).await;
        if self.scope.is_in_scope(name) {
            self.bus
                .publish_new_addr(EnumRequest::addr(addr, domain, req.tag, req.source.clone()))
                .await;
        }
    }

    async fn insert_aaaa(&self, name: &str, domain: &str, addr: &str, req: &EnumRequest) {
        if addr.parse::<std::net::Ipv6Addr>().is_err() {
            tracing::debug!(name = %name, data = %addr, "AAAA record with non-IPv6 data");
            return;
        }
        self.fanout("insert_aaaa", |sink| {
            sink.insert_aaaa(name, domain, addr, req.tag, &req.source)
        });
        self.insert_infrastructure(addr).await;
        if self.scope.is_in_scope(name) {
            self.bus
                .publish_new_addr(EnumRequest::addr(addr, domain, req.tag, req.source.clone()))
                .await;
        }
    }

    async fn insert_cname(&self, name: &str, domain: &str, data: &str, req: &EnumRequest) {
        let Some(target) = canonicalize(data) else {
            return;
        };
        let Some(target_domain) = self.scope.subdomain_to_domain(&target) else {
            tracing::debug!(target = %target, "cname target outside configured roots");
            return;
        };
        self.insert_domain(&target_domain).await;
        self.fanout("insert_cname", |sink| {
            sink.insert_cname(name, domain, &target, &target_domain, req.tag, &req.source)
        });
        self.send_new_name(EnumRequest::name(
            target,
            target_domain,
            Tag::Dns,
            SOURCE_FORWARD_DNS,
        ))
        .await;
    }

    async fn insert_ptr(&self, name: &str, rec_name: &str, data: &str, req: &EnumRequest) {
        let Some(target) = canonicalize(data) else {
            return;
        };
        let Some(domain) = self.scope.which_domain(&target) else {
            return;
        };
        // PTR 소유자(arpa 이름 또는 IP 리터럴)에서 주소를 복원
        let addr = arpa_to_ip(rec_name)
            .or_else(|| arpa_to_ip(name))
            .or_else(|| name.parse().ok());
        let Some(addr) = addr else {
            return;
        };

        self.insert_domain(&domain).await;
        let addr_text = addr.to_string();
        self.fanout("insert_ptr", |sink| {
            sink.insert_ptr(&addr_text, &domain, &target, req.tag, &req.source)
        });
        self.send_new_name(EnumRequest::name(target, domain, Tag::Dns, req.source.clone()))
            .await;
    }

    async fn insert_srv(
        &self,
        name: &str,
        domain: &str,
        service: &str,
        data: &str,
        req: &EnumRequest,
    ) {
        let Some(target) = canonicalize(data) else {
            return;
        };
        if service.is_empty() {
            return;
        }
        self.fanout("insert_srv", |sink| {
            sink.insert_srv(name, domain, service, &target, req.tag, &req.source)
        });
    }

    async fn insert_ns(&self, name: &str, domain: &str, data: &str, req: &EnumRequest) {
        // 단일 대상과 콤마 결합 인코딩 모두 수용: 마지막 필드가 대상
        let raw_target = data.split(',').next_back().unwrap_or_default();
        let Some(target) = canonicalize(raw_target) else {
            return;
        };
        let Some(target_domain) = self.scope.subdomain_to_domain(&target) else {
            return;
        };
        self.insert_domain(&target_domain).await;
        self.fanout("insert_ns", |sink| {
            sink.insert_ns(name, domain, &target, &target_domain, req.tag, &req.source)
        });
        if target != target_domain {
            self.send_new_name(EnumRequest::name(
                target,
                target_domain,
                Tag::Dns,
                SOURCE_FORWARD_DNS,
            ))
            .await;
        }
    }

    async fn insert_mx(&self, name: &str, domain: &str, data: &str, req: &EnumRequest) {
        let Some(target) = canonicalize(data) else {
            return;
        };
        let Some(target_domain) = self.scope.subdomain_to_domain(&target) else {
            return;
        };
        self.insert_domain(&target_domain).await;
        self.fanout("insert_mx", |sink| {
            sink.insert_mx(name, domain, &target, &target_domain, req.tag, &req.source)
        });
        if target != target_domain {
            self.send_new_name(EnumRequest::name(
                target,
                target_domain,
                Tag::Dns,
                SOURCE_FORWARD_DNS,
            ))
            .await;
        }
    }

    async fn insert_txt_like(&self, name: &str, data: &str) {
        if !self.scope.is_in_scope(name) {
            return;
        }
        self.find_names_and_addresses(data).await;
    }

    async fn find_names_and_addresses(&self, data: &str) {
        for hit in ipv4_regex().find_iter(data) {
            self.bus
                .publish_new_addr(EnumRequest::addr(
                    hit.as_str(),
                    "",
                    Tag::Dns,
                    SOURCE_FORWARD_DNS,
                ))
                .await;
        }

        for hit in any_subdomain_regex().find_iter(data) {
            let Some(found) = clean_name(hit.as_str()) else {
                continue;
            };
            if !self.scope.is_in_scope(&found) {
                continue;
            }
            let Some(domain) = self.scope.which_domain(&found) else {
                continue;
            };
            self.send_new_name(EnumRequest::name(found, domain, Tag::Dns, SOURCE_FORWARD_DNS))
                .await;
        }
    }

    async fn insert_infrastructure(&self, addr: &str) {
        let Some(metadata) = &self.metadata else {
            return;
        };
        match metadata.ip_request(addr).await {
            Ok(info) => {
                self.fanout("insert_infrastructure", |sink| {
                    sink.insert_infrastructure(addr, info.asn, &info.cidr, &info.description)
                });
            }
            Err(e) => {
                tracing::warn!(address = addr, error = %e, "infrastructure lookup failed");
            }
        }
    }

    /// 그래프의 새 출력을 드레인하고 필터를 적용해 OUTPUT으로 발행합니다.
    async fn send_output(&self) {
        let out = self.graph.get_new_output();
        if out.is_empty() {
            return;
        }
        self.control.mark_active();
        for record in out {
            if self.output_filter.duplicate(&record.name) {
                continue;
            }
            if !self.scope.is_in_scope(&record.name) {
                continue;
            }
            metrics::counter!(m::DATAMGMT_NAMES_OUTPUT_TOTAL).increment(1);
            self.bus.publish_output(record).await;
        }
    }
}
