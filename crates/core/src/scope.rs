//! 범위 및 이름 유틸리티 -- 정규화, 루트 매칭, 토큰 추출
//!
//! 파이프라인에 들어오는 모든 이름은 [`canonicalize`]를 거친 소문자
//! 무종점(no trailing dot) 형태로 저장됩니다. [`ScopeMatcher`]는 설정된
//! 루트 도메인 집합에 대한 최장 접미사 매칭과 루트별 추출 패턴 캐시를
//! 제공합니다.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;

use crate::error::ConfigError;

/// 이름을 정규 형태로 변환합니다.
///
/// 공백 제거, 끝점 하나 제거, 소문자화를 수행합니다.
/// 빈 문자열이나 (끝점 제거 후에도 점으로 끝나는) 비정상 이름은
/// `None`을 반환합니다. 결과는 항상 이 함수의 고정점입니다.
pub fn canonicalize(name: &str) -> Option<String> {
    let trimmed = name.trim();
    let trimmed = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if trimmed.is_empty() || trimmed.ends_with('.') {
        return None;
    }
    Some(trimmed.to_lowercase())
}

/// 소스 추출 결과를 다듬습니다.
///
/// 와일드카드 접두사(`*.`)와 호스트명에 올 수 없는 선행 문자를 제거한 뒤
/// 정규화합니다. 스크레이핑된 페이지에서 나온 토큰에 사용합니다.
pub fn clean_name(raw: &str) -> Option<String> {
    let mut s = raw.trim().trim_matches('"').trim_matches('\'');
    while let Some(rest) = s.strip_prefix("*.") {
        s = rest;
    }
    let start = s
        .find(|c: char| c.is_ascii_alphanumeric() || c == '_')
        .unwrap_or(s.len());
    canonicalize(&s[start..])
}

/// 임의의 DNS 형태 토큰에 매칭되는 패턴을 반환합니다.
pub fn any_subdomain_regex() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)(?:[a-z0-9_-]+\.)+[a-z]{2,}").expect("subdomain pattern is valid")
    });
    &RE
}

/// 옥텟 범위가 검증된 점분리 IPv4 패턴을 반환합니다.
pub fn ipv4_regex() -> &'static Regex {
    static RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"\b(?:(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\.){3}(?:25[0-5]|2[0-4][0-9]|1[0-9][0-9]|[1-9]?[0-9])\b",
        )
        .expect("ipv4 pattern is valid")
    });
    &RE
}

/// 루트 도메인의 서브도메인 추출 패턴 텍스트를 만듭니다.
fn domain_pattern(domain: &str) -> String {
    format!(r"(?i)(?:[a-z0-9_-]+\.)+{}", regex::escape(domain))
}

/// 설정된 루트 도메인에 대한 범위 매칭기
///
/// 루트 목록과 블랙리스트는 생성 시 정규화되며, 루트별 추출 패턴은
/// 생성 시 컴파일되어 캐시됩니다 (컴파일 실패는 시작 시점 치명적).
/// 열거 중 발견된 새 루트의 패턴은 첫 사용 시 컴파일되어 캐시에 추가됩니다.
#[derive(Debug)]
pub struct ScopeMatcher {
    domains: Vec<String>,
    blacklist: Vec<String>,
    patterns: Mutex<HashMap<String, Arc<Regex>>>,
}

impl ScopeMatcher {
    /// 루트 도메인과 블랙리스트로 매칭기를 생성합니다.
    ///
    /// # Errors
    ///
    /// 정규화할 수 없는 항목이 있거나 패턴 컴파일에 실패하면
    /// `ConfigError`를 반환합니다.
    pub fn new(domains: &[String], blacklist: &[String]) -> Result<Self, ConfigError> {
        let mut roots = Vec::with_capacity(domains.len());
        for raw in domains {
            let root = canonicalize(raw).ok_or_else(|| ConfigError::InvalidValue {
                field: "scope.domains".to_owned(),
                reason: format!("'{raw}' is not a valid domain name"),
            })?;
            if !roots.contains(&root) {
                roots.push(root);
            }
        }

        let mut denied = Vec::with_capacity(blacklist.len());
        for raw in blacklist {
            let entry = canonicalize(raw).ok_or_else(|| ConfigError::InvalidValue {
                field: "scope.blacklist".to_owned(),
                reason: format!("'{raw}' is not a valid domain name"),
            })?;
            denied.push(entry);
        }

        let mut patterns = HashMap::with_capacity(roots.len());
        for root in &roots {
            let re = compile_domain_pattern(root)?;
            patterns.insert(root.clone(), re);
        }

        Ok(Self {
            domains: roots,
            blacklist: denied,
            patterns: Mutex::new(patterns),
        })
    }

    /// 설정된 루트 도메인 목록을 반환합니다.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// `name`의 접미사 중 가장 긴 등록 루트를 반환합니다.
    ///
    /// 어떤 루트와도 일치하지 않으면 `None`입니다. 매칭은 레이블 경계에서만
    /// 일어납니다 (`notexample.com`은 `example.com`에 속하지 않습니다).
    pub fn subdomain_to_domain(&self, name: &str) -> Option<String> {
        let name = canonicalize(name)?;
        self.domains
            .iter()
            .filter(|root| name == **root || name.ends_with(&format!(".{root}")))
            .max_by_key(|root| root.len())
            .cloned()
    }

    /// [`ScopeMatcher::subdomain_to_domain`]의 별칭입니다.
    pub fn which_domain(&self, name: &str) -> Option<String> {
        self.subdomain_to_domain(name)
    }

    /// 이름이 범위 내에 있는지 확인합니다.
    pub fn is_in_scope(&self, name: &str) -> bool {
        self.subdomain_to_domain(name).is_some()
    }

    /// 이름이 블랙리스트 항목이거나 그 서브도메인인지 확인합니다.
    pub fn is_blacklisted(&self, name: &str) -> bool {
        let Some(name) = canonicalize(name) else {
            return false;
        };
        self.blacklist
            .iter()
            .any(|entry| name == *entry || name.ends_with(&format!(".{entry}")))
    }

    /// 루트 도메인의 서브도메인 추출 패턴을 반환합니다 (루트별 캐시).
    ///
    /// # Errors
    ///
    /// 처음 보는 루트의 패턴 컴파일에 실패하면 `ConfigError`를 반환합니다.
    pub fn domain_regex(&self, domain: &str) -> Result<Arc<Regex>, ConfigError> {
        let key = canonicalize(domain).ok_or_else(|| ConfigError::InvalidValue {
            field: "domain".to_owned(),
            reason: format!("'{domain}' is not a valid domain name"),
        })?;

        let mut patterns = self.patterns.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(re) = patterns.get(&key) {
            return Ok(Arc::clone(re));
        }
        let re = compile_domain_pattern(&key)?;
        patterns.insert(key, Arc::clone(&re));
        Ok(re)
    }
}

fn compile_domain_pattern(domain: &str) -> Result<Arc<Regex>, ConfigError> {
    Regex::new(&domain_pattern(domain))
        .map(Arc::new)
        .map_err(|e| ConfigError::PatternFailed {
            domain: domain.to_owned(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(domains: &[&str]) -> ScopeMatcher {
        let domains: Vec<String> = domains.iter().map(|d| (*d).to_owned()).collect();
        ScopeMatcher::new(&domains, &[]).unwrap()
    }

    #[test]
    fn canonicalize_lowercases_and_strips_trailing_dot() {
        assert_eq!(canonicalize("WWW.Example.COM."), Some("www.example.com".to_owned()));
        assert_eq!(canonicalize("example.com"), Some("example.com".to_owned()));
    }

    #[test]
    fn canonicalize_rejects_empty_and_malformed() {
        assert_eq!(canonicalize(""), None);
        assert_eq!(canonicalize("."), None);
        assert_eq!(canonicalize("example.com.."), None);
        assert_eq!(canonicalize("   "), None);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        for input in ["A.Example.Com.", "x.y.z", "_srv._tcp.example.com."] {
            let once = canonicalize(input).unwrap();
            let twice = canonicalize(&once).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn clean_name_strips_wildcards_and_junk() {
        assert_eq!(clean_name("*.Example.COM"), Some("example.com".to_owned()));
        assert_eq!(clean_name("*.*.a.example.com"), Some("a.example.com".to_owned()));
        assert_eq!(clean_name("\"www.example.com.\""), Some("www.example.com".to_owned()));
        assert_eq!(clean_name("-www.example.com"), Some("www.example.com".to_owned()));
        assert_eq!(clean_name("*."), None);
    }

    #[test]
    fn subdomain_to_domain_picks_longest_root() {
        let m = matcher(&["example.com", "sub.example.com"]);
        assert_eq!(
            m.subdomain_to_domain("a.sub.example.com"),
            Some("sub.example.com".to_owned())
        );
        assert_eq!(
            m.subdomain_to_domain("a.example.com"),
            Some("example.com".to_owned())
        );
        assert_eq!(
            m.subdomain_to_domain("example.com"),
            Some("example.com".to_owned())
        );
    }

    #[test]
    fn subdomain_to_domain_respects_label_boundaries() {
        let m = matcher(&["example.com"]);
        assert_eq!(m.subdomain_to_domain("notexample.com"), None);
        assert_eq!(m.subdomain_to_domain("example.com.evil.net"), None);
    }

    #[test]
    fn which_domain_handles_trailing_dot_and_case() {
        let m = matcher(&["example.com"]);
        assert_eq!(
            m.which_domain("WWW.EXAMPLE.COM."),
            Some("example.com".to_owned())
        );
    }

    #[test]
    fn is_in_scope_rejects_foreign_names() {
        let m = matcher(&["example.com"]);
        assert!(m.is_in_scope("cdn.example.com"));
        assert!(!m.is_in_scope("cdn.example.net"));
        assert!(!m.is_in_scope(""));
    }

    #[test]
    fn blacklist_matches_entry_and_subdomains() {
        let domains = vec!["example.com".to_owned()];
        let blacklist = vec!["internal.example.com".to_owned()];
        let m = ScopeMatcher::new(&domains, &blacklist).unwrap();
        assert!(m.is_blacklisted("internal.example.com"));
        assert!(m.is_blacklisted("db.internal.example.com"));
        assert!(!m.is_blacklisted("www.example.com"));
    }

    #[test]
    fn new_rejects_invalid_domain_entries() {
        let result = ScopeMatcher::new(&["".to_owned()], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn domain_regex_matches_subdomains_only() {
        let m = matcher(&["example.com"]);
        let re = m.domain_regex("example.com").unwrap();
        assert!(re.is_match("www.example.com"));
        assert!(re.is_match("a.b.example.com"));
        assert!(re.is_match("WWW.EXAMPLE.COM"));
        assert!(!re.is_match("example.net"));
        // the pattern requires at least one label prefix
        assert!(!re.is_match("example.com"));
    }

    #[test]
    fn domain_regex_is_cached_per_root() {
        let m = matcher(&["example.com"]);
        let first = m.domain_regex("example.com").unwrap();
        let second = m.domain_regex("EXAMPLE.COM.").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn domain_regex_extracts_from_page_body() {
        let m = matcher(&["example.com"]);
        let re = m.domain_regex("example.com").unwrap();
        let body = r#"{"name_value":"mail.example.com"},{"name_value":"*.dev.example.com"}"#;
        let found: Vec<&str> = re.find_iter(body).map(|f| f.as_str()).collect();
        assert!(found.contains(&"mail.example.com"));
        assert!(found.contains(&"dev.example.com"));
    }

    #[test]
    fn any_subdomain_regex_finds_dns_shaped_tokens() {
        let text = "v=spf1 ip4:1.2.3.4 include:mail.example.com -all";
        let found: Vec<&str> = any_subdomain_regex()
            .find_iter(text)
            .map(|f| f.as_str())
            .collect();
        assert_eq!(found, vec!["mail.example.com"]);
    }

    #[test]
    fn ipv4_regex_bounds_octets() {
        let re = ipv4_regex();
        assert!(re.is_match("93.184.216.34"));
        assert!(re.is_match("255.255.255.255"));
        assert!(!re.is_match("256.1.1.1"));
        assert!(!re.is_match("1.2.3"));
    }

    #[test]
    fn ipv4_regex_extracts_all_hits() {
        let text = "ip4:1.2.3.4 ip4:10.0.0.1 other";
        let found: Vec<&str> = ipv4_regex().find_iter(text).map(|f| f.as_str()).collect();
        assert_eq!(found, vec!["1.2.3.4", "10.0.0.1"]);
    }
}
