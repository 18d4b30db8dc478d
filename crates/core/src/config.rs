//! 설정 관리 -- ironsight.toml 파싱 및 검증
//!
//! 설정은 시작 시 한 번 로드되고 검증됩니다. 검증 실패는 파이프라인의
//! 유일한 치명적 에러 표면입니다. 런타임에는 컨트롤러가 소유한
//! 불변 참조로만 접근합니다.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Ironsight 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IronsightConfig {
    /// 일반 설정
    pub general: GeneralConfig,
    /// 열거 범위 설정
    pub scope: ScopeConfig,
    /// 데이터 소스 설정
    pub sources: SourcesConfig,
    /// DNS 리졸버 설정
    pub resolver: ResolverConfig,
    /// 그래프 스토어 설정
    pub graph: GraphConfig,
    /// 열거 수명 설정
    pub enumeration: EnumerationConfig,
    /// 메트릭 설정
    pub metrics: MetricsConfig,
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 출력 파일 경로 (비어 있으면 stdout)
    pub output_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            output_file: String::new(),
        }
    }
}

/// 열거 범위 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// 루트 도메인 목록 (하나 이상 필수)
    pub domains: Vec<String>,
    /// 제외할 이름 목록 (항목 자신과 그 서브도메인이 제외됨)
    pub blacklist: Vec<String>,
}

/// 데이터 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// 소스 워커 활성화 여부
    pub enabled: bool,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// HTTP User-Agent
    pub user_agent: String,
    /// 사용할 소스명 목록 (비어 있으면 내장 소스 전부)
    pub names: Vec<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 30,
            user_agent: concat!("ironsight/", env!("CARGO_PKG_VERSION")).to_owned(),
            names: Vec::new(),
        }
    }
}

/// DNS 리졸버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// 동시 질의 상한
    pub max_concurrent: usize,
    /// 질의 타임아웃 (초)
    pub timeout_secs: u64,
    /// 질의 재시도 횟수
    pub attempts: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 64,
            timeout_secs: 5,
            attempts: 2,
        }
    }
}

/// 그래프 스토어 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// 그래프 연산 직렬화 싱크 경로 (비어 있으면 비활성)
    pub data_opts_path: String,
}

/// 열거 수명 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    /// 정지 판정 유예 시간 (초) -- 이 시간 동안 전 서비스가 유휴이고
    /// 모든 큐가 비어 있으면 열거를 종료
    pub quiescence_grace_secs: u64,
    /// 출력 드레인 주기 (초)
    pub output_tick_secs: u64,
    /// 정지 시 진행 중인 외부 호출에 허용하는 유예 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            quiescence_grace_secs: 10,
            output_tick_secs: 1,
            shutdown_grace_secs: 5,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 리스닝 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9465,
        }
    }
}

const MAX_TIMEOUT_SECS: u64 = 300;
const MAX_CONCURRENT_LIMIT: usize = 512;

impl IronsightConfig {
    /// 설정 파일을 읽고 파싱합니다.
    ///
    /// # Errors
    ///
    /// 파일이 없거나 TOML 파싱에 실패하면 `ConfigError`를 반환합니다.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::ParseFailed {
                    reason: e.to_string(),
                }
            }
        })?;
        let mut config: Self = toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// 환경 변수 오버라이드를 적용합니다 (`IRONSIGHT_LOG_LEVEL`).
    fn apply_env_overrides(&mut self) {
        if let Ok(level) = std::env::var("IRONSIGHT_LOG_LEVEL") {
            if !level.is_empty() {
                self.general.log_level = level;
            }
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `scope.domains`: 하나 이상 필수
    /// - `general.log_format`: json 또는 pretty
    /// - `sources.timeout_secs`: 1-300
    /// - `resolver.max_concurrent`: 1-512
    /// - `resolver.timeout_secs`: 1-300
    /// - `resolver.attempts`: 1 이상
    /// - `enumeration.output_tick_secs`: 1 이상
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scope.domains.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "scope.domains".to_owned(),
                reason: "at least one root domain is required".to_owned(),
            });
        }

        match self.general.log_format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    field: "general.log_format".to_owned(),
                    reason: format!("unknown format '{other}', expected 'json' or 'pretty'"),
                });
            }
        }

        if self.sources.timeout_secs == 0 || self.sources.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "sources.timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        if self.resolver.max_concurrent == 0 || self.resolver.max_concurrent > MAX_CONCURRENT_LIMIT
        {
            return Err(ConfigError::InvalidValue {
                field: "resolver.max_concurrent".to_owned(),
                reason: format!("must be 1-{MAX_CONCURRENT_LIMIT}"),
            });
        }

        if self.resolver.timeout_secs == 0 || self.resolver.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::InvalidValue {
                field: "resolver.timeout_secs".to_owned(),
                reason: format!("must be 1-{MAX_TIMEOUT_SECS}"),
            });
        }

        if self.resolver.attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.attempts".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        if self.enumeration.output_tick_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "enumeration.output_tick_secs".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(())
    }
}
