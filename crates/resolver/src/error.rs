//! 리졸버 에러 타입
//!
//! 질의 실패는 일시적입니다: 해당 타입 질의만 건너뛰고 이름의 나머지
//! 질의는 계속합니다. 레코드가 하나도 없는 이름은 조용히 드롭됩니다.

use ironsight_core::error::{IronsightError, ResolveError};

/// 리졸버 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    /// 백엔드 질의 실패
    #[error("query failed: {name} type {rr_type}: {reason}")]
    QueryFailed {
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

impl From<ResolverError> for IronsightError {
    fn from(err: ResolverError) -> Self {
        match err {
            ResolverError::QueryFailed {
                name,
                rr_type,
                reason,
            } => IronsightError::Resolve(ResolveError::Query {
                name,
                rr_type,
                reason,
            }),
            ResolverError::Timeout { name } => {
                IronsightError::Resolve(ResolveError::Timeout { name })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_failed_display() {
        let err = ResolverError::QueryFailed {
            name: "a.example.com".to_owned(),
            rr_type: 1,
            reason: "SERVFAIL".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("a.example.com"));
        assert!(msg.contains("SERVFAIL"));
    }

    #[test]
    fn converts_to_ironsight_error() {
        let err: IronsightError = ResolverError::Timeout {
            name: "slow.example.com".to_owned(),
        }
        .into();
        assert!(matches!(err, IronsightError::Resolve(_)));
    }
}
