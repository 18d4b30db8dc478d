//! 에러 타입 -- 도메인별 에러 정의
//!
//! [`IronsightError`]는 최상위 에러이며, 각 모듈 크레이트는 자체 에러를
//! 정의한 뒤 `From` 구현으로 이 타입에 수렴시킵니다. 파이프라인 규칙상
//! 치명적인 것은 시작 시점의 설정/정규식 에러뿐이고, 런타임 에러는
//! 로그 후 계속 진행합니다.

/// Ironsight 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum IronsightError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 이벤트 버스 에러
    #[error("bus error: {0}")]
    Bus(#[from] BusError),

    /// 서비스 생명주기 에러
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// 그래프 스토어 에러
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    /// 데이터 소스 에러
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// DNS 리졸버 에러
    #[error("resolve error: {0}")]
    Resolve(#[from] ResolveError),

    /// Data Manager 에러
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound {
        /// 시도한 경로
        path: String,
    },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed {
        /// 파싱 실패 사유
        reason: String,
    },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 정규식 컴파일 실패 (시작 시점 치명적)
    #[error("failed to compile pattern for '{domain}': {reason}")]
    PatternFailed {
        /// 대상 루트 도메인
        domain: String,
        /// 컴파일 실패 사유
        reason: String,
    },
}

/// 이벤트 버스 에러
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    /// 구독자 큐가 닫힘 (수신측 드롭)
    #[error("subscriber queue closed on topic {topic}")]
    QueueClosed {
        /// 대상 토픽
        topic: String,
    },

    /// 구독을 찾을 수 없음
    #[error("subscription {id} not found on topic {topic}")]
    SubscriptionNotFound {
        /// 대상 토픽
        topic: String,
        /// 구독 id
        id: u64,
    },
}

/// 서비스 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// 이미 실행 중
    #[error("service already running: {name}")]
    AlreadyRunning {
        /// 서비스명
        name: String,
    },

    /// 실행 중이 아님
    #[error("service not running: {name}")]
    NotRunning {
        /// 서비스명
        name: String,
    },

    /// 시작 실패
    #[error("service start failed: {name}: {reason}")]
    StartFailed {
        /// 서비스명
        name: String,
        /// 실패 사유
        reason: String,
    },

    /// 동일 이름으로 이미 등록됨
    #[error("service already registered: {name}")]
    AlreadyRegistered {
        /// 서비스명
        name: String,
    },

    /// 레지스트리에서 찾을 수 없음
    #[error("service not found: {name}")]
    NotFound {
        /// 서비스명
        name: String,
    },

    /// 하나 이상의 서비스 정지 실패 (모두 시도한 뒤 수집)
    #[error("service stop failed: {0}")]
    StopFailed(String),
}

/// 그래프 스토어 에러
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// 싱크 쓰기 실패
    #[error("{sink} failed to write: {reason}")]
    Storage {
        /// 싱크 식별자
        sink: String,
        /// 실패 사유
        reason: String,
    },

    /// 주소 파싱 실패
    #[error("invalid address: {value}")]
    InvalidAddress {
        /// 파싱 대상 문자열
        value: String,
    },
}

/// 데이터 소스 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP 요청 실패
    #[error("{source_name}: {url}: {reason}")]
    Http {
        /// 소스명
        source_name: String,
        /// 요청 URL
        url: String,
        /// 실패 사유
        reason: String,
    },

    /// 응답 본문 디코딩 실패
    #[error("{source_name}: decode failed: {reason}")]
    Decode {
        /// 소스명
        source_name: String,
        /// 실패 사유
        reason: String,
    },
}

/// DNS 리졸버 에러
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// 질의 실패
    #[error("query failed: {name} type {rr_type}: {reason}")]
    Query {
        /// 질의 대상 이름
        name: String,
        /// 레코드 타입 코드
        rr_type: u16,
        /// 실패 사유
        reason: String,
    },

    /// 질의 타임아웃
    #[error("query timed out: {name}")]
    Timeout {
        /// 질의 대상 이름
        name: String,
    },
}

/// Data Manager 에러
#[derive(Debug, thiserror::Error)]
pub enum DataError {
    /// IP 메타데이터 조회 실패
    #[error("metadata lookup failed: {address}: {reason}")]
    Metadata {
        /// 대상 주소
        address: String,
        /// 실패 사유
        reason: String,
    },

    /// 구성 요소 누락 등 초기화 실패
    #[error("init failed: {0}")]
    Init(String),

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::InvalidValue {
            field: "scope.domains".to_owned(),
            reason: "at least one root domain required".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("scope.domains"));
        assert!(msg.contains("at least one root domain"));
    }

    #[test]
    fn config_error_converts_to_ironsight_error() {
        let err: IronsightError = ConfigError::FileNotFound {
            path: "/etc/ironsight.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, IronsightError::Config(_)));
        assert!(err.to_string().contains("/etc/ironsight.toml"));
    }

    #[test]
    fn service_error_stop_failed_collects_messages() {
        let err = ServiceError::StopFailed("crtsh: timeout; resolver: queue closed".to_owned());
        let msg = err.to_string();
        assert!(msg.contains("crtsh: timeout"));
        assert!(msg.contains("resolver: queue closed"));
    }

    #[test]
    fn graph_error_names_the_sink() {
        let err = GraphError::Storage {
            sink: "data-opts".to_owned(),
            reason: "broken pipe".to_owned(),
        };
        assert!(err.to_string().contains("data-opts"));
    }

    #[test]
    fn io_error_converts_to_ironsight_error() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: IronsightError = io.into();
        assert!(matches!(err, IronsightError::Io(_)));
    }
}
