//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `ironsight_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/duration), 없음 (gauge)

// --- 레이블 키 상수 ---

/// 토픽 레이블 키 (NEWNAME, RESOLVED, CHECKED, NEWADDR, OUTPUT)
pub const LABEL_TOPIC: &str = "topic";

/// 소스 레이블 키 (crtsh, certspotter, ...)
pub const LABEL_SOURCE: &str = "source";

// --- 버스 메트릭 ---

/// 버스: 토픽별 발행 이벤트 수 (counter, label: topic)
pub const BUS_EVENTS_PUBLISHED_TOTAL: &str = "ironsight_bus_events_published_total";

// --- 파이프라인 메트릭 ---

/// 소스: HTTP 요청 실패 수 (counter, label: source)
pub const SOURCE_FETCH_FAILURES_TOTAL: &str = "ironsight_source_fetch_failures_total";

/// 소스: 발행한 후보 이름 수 (counter, label: source)
pub const SOURCE_NAMES_PUBLISHED_TOTAL: &str = "ironsight_source_names_published_total";

/// 리졸버: 검증에 성공한 이름 수 (counter)
pub const RESOLVER_NAMES_RESOLVED_TOTAL: &str = "ironsight_resolver_names_resolved_total";

/// 리졸버: 드롭된(미해석) 이름 수 (counter)
pub const RESOLVER_NAMES_DROPPED_TOTAL: &str = "ironsight_resolver_names_dropped_total";

/// Data Manager: 출력으로 발행한 이름 수 (counter)
pub const DATAMGMT_NAMES_OUTPUT_TOTAL: &str = "ironsight_datamgmt_names_output_total";

// --- 그래프 메트릭 ---

/// 그래프: 노드 수 (gauge)
pub const GRAPH_NODES: &str = "ironsight_graph_nodes";

/// 그래프: 엣지 수 (gauge)
pub const GRAPH_EDGES: &str = "ironsight_graph_edges";

// --- Daemon 메트릭 ---

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "ironsight_daemon_uptime_seconds";

/// Daemon: 등록된 서비스 수 (gauge)
pub const DAEMON_SERVICES_REGISTERED: &str = "ironsight_daemon_services_registered";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "ironsight_daemon_build_info";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `ironsight-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    describe_counter!(
        BUS_EVENTS_PUBLISHED_TOTAL,
        "Total events published on the bus, per topic"
    );
    describe_counter!(
        SOURCE_FETCH_FAILURES_TOTAL,
        "Total failed HTTP fetches, per data source"
    );
    describe_counter!(
        SOURCE_NAMES_PUBLISHED_TOTAL,
        "Total candidate names published, per data source"
    );
    describe_counter!(
        RESOLVER_NAMES_RESOLVED_TOTAL,
        "Total names with at least one validated record"
    );
    describe_counter!(
        RESOLVER_NAMES_DROPPED_TOTAL,
        "Total names dropped as unresolved or duplicate"
    );
    describe_counter!(
        DATAMGMT_NAMES_OUTPUT_TOTAL,
        "Total names emitted on the OUTPUT topic"
    );
    describe_gauge!(GRAPH_NODES, "Current number of graph nodes");
    describe_gauge!(GRAPH_EDGES, "Current number of graph edges");
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Ironsight daemon uptime in seconds");
    describe_gauge!(
        DAEMON_SERVICES_REGISTERED,
        "Number of services registered in the daemon"
    );
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        BUS_EVENTS_PUBLISHED_TOTAL,
        SOURCE_FETCH_FAILURES_TOTAL,
        SOURCE_NAMES_PUBLISHED_TOTAL,
        RESOLVER_NAMES_RESOLVED_TOTAL,
        RESOLVER_NAMES_DROPPED_TOTAL,
        DATAMGMT_NAMES_OUTPUT_TOTAL,
        GRAPH_NODES,
        GRAPH_EDGES,
        DAEMON_UPTIME_SECONDS,
        DAEMON_SERVICES_REGISTERED,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_ironsight_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("ironsight_"),
                "Metric '{}' does not start with 'ironsight_' prefix",
                name
            );
        }
    }

    #[test]
    fn describe_all_does_not_panic() {
        // describe_all() should not panic even without a recorder installed
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_TOPIC, LABEL_SOURCE] {
            assert_eq!(label.to_lowercase(), label);
        }
    }
}
