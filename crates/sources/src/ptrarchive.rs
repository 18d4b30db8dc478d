//! PTRArchive 소스 -- 역방향 DNS 아카이브 스크레이핑

use ironsight_core::types::Tag;

use crate::source::DataSource;

/// PTRArchive 역방향 DNS 아카이브 소스
#[derive(Debug, Default)]
pub struct PtrArchive;

impl PtrArchive {
    /// 소스를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl DataSource for PtrArchive {
    fn name(&self) -> &str {
        "PTRArchive"
    }

    fn tag(&self) -> Tag {
        Tag::Scrape
    }

    fn url(&self, domain: &str) -> String {
        format!("http://ptrarchive.com/tools/search3.htm?label={domain}&date=ALL")
    }
}
