//! 데이터 소스 에러 타입
//!
//! 소스의 모든 실패는 일시적(transient)입니다: 로그 후 해당 도메인을
//! 건너뛰고 파이프라인은 계속 진행합니다.

use ironsight_core::error::{IronsightError, SourceError};

/// 데이터 소스 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum SourceFetchError {
    /// HTTP 전송 실패
    #[error("{source_name}: {url}: {reason}")]
    Http {
        /// 소스명
        source_name: String,
        /// 요청 URL
        url: String,
        /// 실패 사유
        reason: String,
    },

    /// 비정상 응답 코드
    #[error("{source_name}: {url}: unexpected status {status}")]
    Status {
        /// 소스명
        source_name: String,
        /// 요청 URL
        url: String,
        /// HTTP 상태 코드
        status: u16,
    },

    /// HTTP 클라이언트 구성 실패
    #[error("failed to build http client: {0}")]
    Client(String),
}

impl From<SourceFetchError> for IronsightError {
    fn from(err: SourceFetchError) -> Self {
        match err {
            SourceFetchError::Http {
                source_name,
                url,
                reason,
            } => IronsightError::Source(SourceError::Http {
                source_name,
                url,
                reason,
            }),
            SourceFetchError::Status {
                source_name,
                url,
                status,
            } => IronsightError::Source(SourceError::Http {
                source_name,
                url,
                reason: format!("unexpected status {status}"),
            }),
            SourceFetchError::Client(reason) => IronsightError::Source(SourceError::Decode {
                source_name: "http-client".to_owned(),
                reason,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_names_source_and_url() {
        let err = SourceFetchError::Http {
            source_name: "crtsh".to_owned(),
            url: "https://crt.sh/?q=%25.example.com".to_owned(),
            reason: "connection refused".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("crtsh"));
        assert!(msg.contains("crt.sh"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn status_error_converts_to_ironsight_error() {
        let err: IronsightError = SourceFetchError::Status {
            source_name: "wayback".to_owned(),
            url: "http://example".to_owned(),
            status: 503,
        }
        .into();
        assert!(err.to_string().contains("503"));
    }
}
