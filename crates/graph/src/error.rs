//! 그래프 스토어 에러 타입
//!
//! [`StoreError`]는 그래프 크레이트 내부 에러이며,
//! `From<StoreError> for IronsightError` 구현으로 상위 타입에 수렴합니다.
//! 그래프 쓰기 에러는 파이프라인을 중단시키지 않습니다 --
//! Data Manager가 싱크 식별자와 함께 로그하고 계속 진행합니다.

use ironsight_core::error::{GraphError, IronsightError};

/// 그래프 스토어 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 주소 파싱 실패 또는 레코드 타입과 주소 패밀리 불일치
    #[error("invalid address: {value}")]
    InvalidAddress {
        /// 파싱 대상 문자열
        value: String,
    },

    /// 직렬화 실패
    #[error("serialize failed: {0}")]
    Serialize(String),

    /// 싱크 I/O 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for IronsightError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidAddress { value } => {
                IronsightError::Graph(GraphError::InvalidAddress { value })
            }
            StoreError::Serialize(reason) => IronsightError::Graph(GraphError::Storage {
                sink: "data-opts".to_owned(),
                reason,
            }),
            StoreError::Io(e) => IronsightError::Graph(GraphError::Storage {
                sink: "data-opts".to_owned(),
                reason: e.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_address_display() {
        let err = StoreError::InvalidAddress {
            value: "not-an-ip".to_owned(),
        };
        assert!(err.to_string().contains("not-an-ip"));
    }

    #[test]
    fn converts_to_ironsight_error() {
        let err: IronsightError = StoreError::InvalidAddress {
            value: "x".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            IronsightError::Graph(GraphError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn io_error_carries_sink_identity() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "broken pipe");
        let err: IronsightError = StoreError::Io(io).into();
        assert!(err.to_string().contains("data-opts"));
    }
}
