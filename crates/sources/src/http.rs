//! HTTP 페치 헬퍼 -- 모든 소스가 공유하는 요청 경로
//!
//! 타임아웃과 User-Agent는 `[sources]` 설정에서 옵니다.
//! 전송 실패와 비정상 상태 코드는 호출한 소스명이 붙은 에러로 돌아갑니다.

use std::time::Duration;

use ironsight_core::config::SourcesConfig;

use crate::error::SourceFetchError;

/// 소스 설정으로 공유 HTTP 클라이언트를 만듭니다.
///
/// # Errors
///
/// TLS 백엔드 초기화 등 클라이언트 구성에 실패하면
/// `SourceFetchError::Client`를 반환합니다.
pub fn build_client(config: &SourcesConfig) -> Result<reqwest::Client, SourceFetchError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| SourceFetchError::Client(e.to_string()))
}

/// 페이지 하나를 받아 본문을 문자열로 반환합니다.
pub async fn fetch_page(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
) -> Result<String, SourceFetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| SourceFetchError::Http {
            source_name: source_name.to_owned(),
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceFetchError::Status {
            source_name: source_name.to_owned(),
            url: url.to_owned(),
            status: status.as_u16(),
        });
    }

    response.text().await.map_err(|e| SourceFetchError::Http {
        source_name: source_name.to_owned(),
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_client_with_default_config() {
        let config = SourcesConfig::default();
        assert!(build_client(&config).is_ok());
    }
}
