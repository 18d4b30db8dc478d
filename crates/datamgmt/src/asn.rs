//! IP 메타데이터 공급자 -- 주소를 AS/CIDR 정보로 보강
//!
//! 실제 BGP/whois 질의는 이 크레이트 밖의 협력자이고, 파이프라인은
//! [`IpMetadata`] trait만 봅니다. [`CachedMetadata`]는 열거 단위
//! 메모이제이션을 제공해 같은 주소의 중복 조회를 없애고, 주소당 하나의
//! ASN 바인딩을 고정합니다. [`StaticMetadata`]는 테이블 기반 오프라인
//! 공급자입니다.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use ironsight_core::service::BoxFuture;

use crate::error::DataMgmtError;

/// 주소 하나에 대한 AS 메타데이터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsnInfo {
    /// 자율 시스템 번호
    pub asn: u32,
    /// 소속 CIDR 프리픽스
    pub cidr: String,
    /// AS 설명 문자열
    pub description: String,
}

/// IP 메타데이터 공급자의 계약
pub trait IpMetadata: Send + Sync {
    /// 주소의 (ASN, CIDR, 설명)을 조회합니다.
    fn ip_request<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<AsnInfo, DataMgmtError>>;
}

/// 열거 단위 캐시를 씌우는 공급자 래퍼
///
/// 성공한 조회만 캐시합니다. 첫 성공 응답이 그 주소의 바인딩으로
/// 고정됩니다.
pub struct CachedMetadata {
    inner: Arc<dyn IpMetadata>,
    cache: Mutex<HashMap<String, AsnInfo>>,
}

impl CachedMetadata {
    /// 공급자에 캐시를 씌웁니다.
    pub fn new(inner: Arc<dyn IpMetadata>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// 캐시된 주소 수를 반환합니다.
    pub fn cached_count(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl IpMetadata for CachedMetadata {
    fn ip_request<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<AsnInfo, DataMgmtError>> {
        Box::pin(async move {
            if let Some(hit) = self
                .cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(addr)
                .cloned()
            {
                return Ok(hit);
            }

            let info = self.inner.ip_request(addr).await?;
            self.cache
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(addr.to_owned())
                .or_insert_with(|| info.clone());
            Ok(info)
        })
    }
}

/// 고정 테이블 기반 오프라인 공급자
///
/// 테이블에 없는 주소는 조회 실패로 처리됩니다.
#[derive(Debug, Default)]
pub struct StaticMetadata {
    table: HashMap<String, AsnInfo>,
}

impl StaticMetadata {
    /// 빈 테이블로 공급자를 만듭니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테이블에 항목을 추가합니다.
    pub fn with_entry(mut self, addr: &str, asn: u32, cidr: &str, description: &str) -> Self {
        self.table.insert(
            addr.to_owned(),
            AsnInfo {
                asn,
                cidr: cidr.to_owned(),
                description: description.to_owned(),
            },
        );
        self
    }
}

impl IpMetadata for StaticMetadata {
    fn ip_request<'a>(&'a self, addr: &'a str) -> BoxFuture<'a, Result<AsnInfo, DataMgmtError>> {
        Box::pin(async move {
            self.table
                .get(addr)
                .cloned()
                .ok_or_else(|| DataMgmtError::Metadata {
                    address: addr.to_owned(),
                    reason: "address not in static table".to_owned(),
                })
        })
    }
}
