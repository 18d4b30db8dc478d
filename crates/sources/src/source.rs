//! DataSource trait -- 소스별 질의와 추출의 계약
//!
//! 소스는 루트 도메인당 URL 하나를 만들고, 응답 본문에서 후보 이름을
//! 추출합니다. 기본 추출은 루트의 서브도메인 패턴으로 본문을 훑는
//! 것이고, 구조화된 응답을 주는 소스(crt.sh)는 이를 오버라이드합니다.

use std::collections::HashSet;

use ironsight_core::scope::{clean_name, ScopeMatcher};
use ironsight_core::types::Tag;

/// 패시브 데이터 소스 하나의 계약
pub trait DataSource: Send + Sync {
    /// 소스명 (소스 레이블이자 서비스명)
    fn name(&self) -> &str;

    /// 이 소스가 발행하는 이름의 출처 태그
    fn tag(&self) -> Tag;

    /// 루트 도메인에 대한 질의 URL을 만듭니다.
    fn url(&self, domain: &str) -> String;

    /// 응답 본문에서 후보 이름을 추출합니다.
    ///
    /// 반환 목록은 정규화되고 소스 내에서 중복 제거된 상태입니다.
    fn extract(&self, domain: &str, scope: &ScopeMatcher, body: &str) -> Vec<String> {
        extract_with_domain_regex(self.name(), domain, scope, body)
    }
}

/// 루트의 서브도메인 패턴으로 본문을 훑는 기본 추출기
pub(crate) fn extract_with_domain_regex(
    source_name: &str,
    domain: &str,
    scope: &ScopeMatcher,
    body: &str,
) -> Vec<String> {
    let re = match scope.domain_regex(domain) {
        Ok(re) => re,
        Err(e) => {
            tracing::debug!(source = source_name, domain, error = %e, "no pattern for domain");
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for found in re.find_iter(body) {
        if let Some(name) = clean_name(found.as_str()) {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RegexOnly;

    impl DataSource for RegexOnly {
        fn name(&self) -> &str {
            "regex-only"
        }

        fn tag(&self) -> Tag {
            Tag::Scrape
        }

        fn url(&self, domain: &str) -> String {
            format!("https://example.invalid/?q={domain}")
        }
    }

    fn scope() -> ScopeMatcher {
        ScopeMatcher::new(&["example.com".to_owned()], &[]).unwrap()
    }

    #[test]
    fn default_extract_deduplicates_and_canonicalizes() {
        let source = RegexOnly;
        let body = "found WWW.Example.COM and www.example.com plus api.example.com here";
        let names = source.extract("example.com", &scope(), body);
        assert_eq!(names, vec!["www.example.com", "api.example.com"]);
    }

    #[test]
    fn default_extract_ignores_out_of_pattern_tokens() {
        let source = RegexOnly;
        let body = "nothing for example.net or bare example.com here";
        let names = source.extract("example.com", &scope(), body);
        assert!(names.is_empty());
    }
}
