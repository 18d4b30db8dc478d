//! DnsClient trait와 hickory-resolver 백엔드
//!
//! 서비스는 백엔드를 `Arc<dyn DnsClient>`로만 봅니다. 테스트는
//! 스크립트된 목 클라이언트를 꽂습니다. NXDOMAIN과 빈 응답은 에러가
//! 아니라 빈 레코드 목록입니다.

use std::net::IpAddr;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig as HickoryConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError as HickoryError, ResolveErrorKind};
use hickory_resolver::proto::rr::{RData, Record, RecordType};
use hickory_resolver::TokioAsyncResolver;

use ironsight_core::config::ResolverConfig;
use ironsight_core::service::BoxFuture;
use ironsight_core::types::DnsRecord;

use crate::error::ResolverError;

/// DNS 질의 백엔드의 계약
///
/// `query`는 레코드 타입 하나에 대한 검증된 레코드들을 반환합니다.
/// 이름이 존재하지 않거나 해당 타입 레코드가 없으면 `Ok(vec![])`입니다.
pub trait DnsClient: Send + Sync {
    /// 이름에 대해 레코드 타입 하나를 질의합니다.
    fn query<'a>(
        &'a self,
        name: &'a str,
        rr_type: u16,
    ) -> BoxFuture<'a, Result<Vec<DnsRecord>, ResolverError>>;
}

/// IP 주소를 역방향 조회 이름으로 변환합니다.
///
/// IPv4는 옥텟 역순 + `.in-addr.arpa`, IPv6는 니블 역순 + `.ip6.arpa`입니다.
pub fn reverse_query_name(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => {
            let [a, b, c, d] = v4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(v6) => {
            let mut nibbles = Vec::with_capacity(32);
            for byte in v6.octets().iter().rev() {
                nibbles.push(format!("{:x}", byte & 0x0f));
                nibbles.push(format!("{:x}", byte >> 4));
            }
            format!("{}.ip6.arpa", nibbles.join("."))
        }
    }
}

/// hickory-resolver 기반 프로덕션 백엔드
pub struct HickoryClient {
    resolver: TokioAsyncResolver,
}

impl HickoryClient {
    /// 시스템 기본 네임서버 설정으로 클라이언트를 만듭니다.
    ///
    /// 타임아웃과 재시도 횟수는 `[resolver]` 설정에서 옵니다.
    pub fn new(config: &ResolverConfig) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = Duration::from_secs(config.timeout_secs);
        opts.attempts = config.attempts;
        Self {
            resolver: TokioAsyncResolver::tokio(HickoryConfig::default(), opts),
        }
    }
}

impl DnsClient for HickoryClient {
    fn query<'a>(
        &'a self,
        name: &'a str,
        rr_type: u16,
    ) -> BoxFuture<'a, Result<Vec<DnsRecord>, ResolverError>> {
        Box::pin(async move {
            let rtype = RecordType::from(rr_type);
            match self.resolver.lookup(name, rtype).await {
                Ok(lookup) => Ok(lookup
                    .record_iter()
                    .filter_map(record_to_wire)
                    .collect()),
                Err(e) if is_no_records(&e) => Ok(Vec::new()),
                Err(e) => Err(ResolverError::QueryFailed {
                    name: name.to_owned(),
                    rr_type,
                    reason: e.to_string(),
                }),
            }
        })
    }
}

fn is_no_records(err: &HickoryError) -> bool {
    matches!(err.kind(), ResolveErrorKind::NoRecordsFound { .. })
}

fn record_to_wire(record: &Record) -> Option<DnsRecord> {
    let rdata = record.data()?;
    let data = rdata_to_text(rdata)?;
    Some(DnsRecord {
        name: record.name().to_utf8(),
        rr_type: u16::from(record.record_type()),
        class: u16::from(record.dns_class()),
        ttl: record.ttl(),
        data,
    })
}

/// RData를 파이프라인의 텍스트 와이어 형태로 변환합니다.
///
/// 이름류 타입은 끝점이 붙은 FQDN 텍스트로 남깁니다 (정규화는
/// 다운스트림에서 수행). MX는 교환 호스트만, SRV는 대상 호스트만
/// 취합니다.
fn rdata_to_text(rdata: &RData) -> Option<String> {
    let text = match rdata {
        RData::A(a) => a.to_string(),
        RData::AAAA(aaaa) => aaaa.to_string(),
        RData::CNAME(name) => name.to_string(),
        RData::NS(name) => name.to_string(),
        RData::PTR(name) => name.to_string(),
        RData::MX(mx) => mx.exchange().to_string(),
        RData::SRV(srv) => srv.target().to_string(),
        RData::TXT(txt) => txt
            .iter()
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect::<Vec<_>>()
            .join(""),
        other => other.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}
