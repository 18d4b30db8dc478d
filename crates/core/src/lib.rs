#![doc = include_str!("../README.md")]

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod metrics;
pub mod scope;
pub mod service;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    BusError, ConfigError, DataError, GraphError, IronsightError, ResolveError, ServiceError,
    SourceError,
};

// 설정
pub use config::IronsightConfig;

// 이벤트
pub use bus::{EventBus, Subscription, SUBSCRIBER_QUEUE_CAPACITY};
pub use event::{AddressInfo, EnumRequest, OutputRecord, Topic};

// 서비스 생명주기
pub use service::{DynService, HealthStatus, Service, ServiceControl, ServiceRegistry};

// 범위/필터
pub use filter::{DataSourceFilter, StringFilter};
pub use scope::ScopeMatcher;

// 도메인 타입
pub use types::{DnsRecord, RecordKind, Tag};
