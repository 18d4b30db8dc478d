//! Wayback 소스 -- 웹 아카이브 CDX 인덱스 질의

use ironsight_core::types::Tag;

use crate::source::DataSource;

/// Wayback Machine CDX 인덱스 소스
#[derive(Debug, Default)]
pub struct Wayback;

impl Wayback {
    /// 소스를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl DataSource for Wayback {
    fn name(&self) -> &str {
        "Wayback"
    }

    fn tag(&self) -> Tag {
        Tag::Archive
    }

    fn url(&self, domain: &str) -> String {
        format!(
            "http://web.archive.org/cdx/search/cdx?url=*.{domain}/*&output=txt&fl=original&collapse=urlkey"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ironsight_core::scope::ScopeMatcher;

    #[test]
    fn url_collapses_by_urlkey() {
        let source = Wayback::new();
        let url = source.url("example.com");
        assert!(url.contains("url=*.example.com/*"));
        assert!(url.contains("collapse=urlkey"));
    }

    #[test]
    fn extracts_hosts_from_archived_urls() {
        let source = Wayback::new();
        let scope = ScopeMatcher::new(&["example.com".to_owned()], &[]).unwrap();
        let body = "http://blog.example.com/post/1\nhttps://shop.example.com:8443/cart\n";
        let names = source.extract("example.com", &scope, body);
        assert_eq!(names, vec!["blog.example.com", "shop.example.com"]);
    }
}
