//! crt.sh 소스 -- 인증서 투명성 로그 검색
//!
//! `output=json`은 행당 JSON 오브젝트 하나를 반환하므로 행 단위로
//! 디코딩합니다. 디코딩에 실패한 행은 건너뛰고 나머지 행을 계속
//! 처리합니다. 한 건의 `name_value`에는 개행으로 구분된 이름 여러 개가
//! 들어올 수 있습니다 (JSON 문자열 안에 이스케이프되어 있어 행 구조는
//! 깨지지 않습니다).

use std::collections::HashSet;

use serde::Deserialize;

use ironsight_core::scope::{clean_name, ScopeMatcher};
use ironsight_core::types::Tag;

use crate::source::DataSource;

#[derive(Debug, Deserialize)]
struct CrtEntry {
    #[serde(rename = "name_value")]
    name_value: String,
}

/// crt.sh 인증서 투명성 소스
#[derive(Debug, Default)]
pub struct Crtsh;

impl Crtsh {
    /// 소스를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl DataSource for Crtsh {
    fn name(&self) -> &str {
        "Crtsh"
    }

    fn tag(&self) -> Tag {
        Tag::Cert
    }

    fn url(&self, domain: &str) -> String {
        format!("https://crt.sh/?q=%25.{domain}&output=json")
    }

    fn extract(&self, domain: &str, _scope: &ScopeMatcher, body: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut names = Vec::new();

        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let entry: CrtEntry = match serde_json::from_str(line) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(source = self.name(), error = %e, "skipping undecodable entry");
                    continue;
                }
            };
            for raw in entry.name_value.lines() {
                let Some(name) = clean_name(raw) else {
                    continue;
                };
                // 질의한 루트에 속하는 이름만 통과
                if name != domain && !name.ends_with(&format!(".{domain}")) {
                    continue;
                }
                if seen.insert(name.clone()) {
                    names.push(name);
                }
            }
        }
        names
    }
}
