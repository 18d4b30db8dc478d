//! CertSpotter 소스 -- 인증서 투명성 모니터링 API
//!
//! 응답을 구조 파싱하지 않고 루트의 서브도메인 패턴으로 훑습니다.

use ironsight_core::types::Tag;

use crate::source::DataSource;

/// CertSpotter 인증서 투명성 소스
#[derive(Debug, Default)]
pub struct CertSpotter;

impl CertSpotter {
    /// 소스를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl DataSource for CertSpotter {
    fn name(&self) -> &str {
        "CertSpotter"
    }

    fn tag(&self) -> Tag {
        Tag::Cert
    }

    fn url(&self, domain: &str) -> String {
        format!("https://certspotter.com/api/v0/certs?domain={domain}")
    }
}
