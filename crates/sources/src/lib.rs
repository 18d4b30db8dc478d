#![doc = include_str!("../README.md")]

pub mod certspotter;
pub mod crtsh;
pub mod error;
pub mod http;
pub mod ptrarchive;
pub mod source;
pub mod wayback;
pub mod worker;

use std::sync::Arc;

pub use certspotter::CertSpotter;
pub use crtsh::Crtsh;
pub use error::SourceFetchError;
pub use ptrarchive::PtrArchive;
pub use source::DataSource;
pub use wayback::Wayback;
pub use worker::SourceService;

/// 내장 소스 인스턴스를 만듭니다.
///
/// `names`가 비어 있으면 전부, 아니면 이름(대소문자 무시)이 일치하는
/// 소스만 반환합니다. 모르는 이름은 warn 로그 후 무시합니다.
pub fn builtin_sources(names: &[String]) -> Vec<Arc<dyn DataSource>> {
    let all: Vec<Arc<dyn DataSource>> = vec![
        Arc::new(Crtsh::new()),
        Arc::new(CertSpotter::new()),
        Arc::new(PtrArchive::new()),
        Arc::new(Wayback::new()),
    ];

    if names.is_empty() {
        return all;
    }

    let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
    for name in &wanted {
        if !all.iter().any(|s| s.name().to_lowercase() == *name) {
            tracing::warn!(source = %name, "unknown source name in config, ignoring");
        }
    }
    all.into_iter()
        .filter(|s| wanted.contains(&s.name().to_lowercase()))
        .collect()
}
