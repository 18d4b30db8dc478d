//! Data Manager 에러 타입

use ironsight_core::error::{DataError, IronsightError};

/// Data Manager 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum DataMgmtError {
    /// IP 메타데이터 조회 실패 (일시적, 로그 후 계속)
    #[error("metadata lookup failed: {address}: {reason}")]
    Metadata {
        /// 대상 주소
        address: String,
        /// 실패 사유
        reason: String,
    },

    /// 빌더에 필수 구성 요소가 누락됨
    #[error("missing required component: {0}")]
    MissingComponent(&'static str),
}

impl From<DataMgmtError> for IronsightError {
    fn from(err: DataMgmtError) -> Self {
        match err {
            DataMgmtError::Metadata { address, reason } => {
                IronsightError::Data(DataError::Metadata { address, reason })
            }
            DataMgmtError::MissingComponent(name) => {
                IronsightError::Data(DataError::Init(format!("missing required component: {name}")))
            }
        }
    }
}
