//! 그래프 싱크 -- 플러그 가능한 쓰기 인터페이스와 연산 로그 싱크
//!
//! Data Manager는 모든 insert 연산을 등록된 싱크 전부에 전달합니다.
//! 권위 스토어([`MemoryGraph`](crate::store::MemoryGraph))도 싱크 중
//! 하나이고, [`DataOptsWriter`]는 동일한 연산 흐름을 newline-delimited
//! JSON으로 직렬화합니다.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

use serde_json::json;

use ironsight_core::types::Tag;

use crate::error::StoreError;

/// 그래프 쓰기 연산을 받는 싱크 trait
///
/// 모든 연산은 엔티티 식별자에 대해 멱등입니다. 한 싱크의 실패가
/// 다른 싱크로의 디스패치를 막지 않습니다 (호출자가 로그 후 계속).
pub trait GraphSink: Send + Sync {
    /// 싱크 식별자 (에러 로그에 사용)
    fn name(&self) -> &str;

    /// 루트 도메인 노드와 ROOT_OF 엣지를 보장합니다.
    fn insert_domain(&self, domain: &str, tag: Tag, source: &str) -> Result<(), StoreError>;

    /// CNAME 엣지를 보장합니다. 대상 이름의 소유 도메인은 `target_domain`입니다.
    fn insert_cname(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// A 엣지를 보장합니다.
    fn insert_a(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// AAAA 엣지를 보장합니다.
    fn insert_aaaa(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// 주소에서 이름으로의 PTR 엣지를 보장합니다.
    fn insert_ptr(
        &self,
        addr: &str,
        domain: &str,
        target: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// SRV 엣지를 보장합니다. `service`는 서비스 레이블 이름입니다.
    fn insert_srv(
        &self,
        name: &str,
        domain: &str,
        service: &str,
        target: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// NS 엣지를 보장합니다.
    fn insert_ns(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// MX 엣지를 보장합니다.
    fn insert_mx(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError>;

    /// 주소의 AS/CIDR 메타데이터와 HOSTED_ON 엣지를 보장합니다.
    fn insert_infrastructure(
        &self,
        addr: &str,
        asn: u32,
        cidr: &str,
        description: &str,
    ) -> Result<(), StoreError>;
}

/// 그래프 연산을 newline-delimited JSON으로 기록하는 싱크
///
/// 각 연산이 `{"op": "insert_a", "args": {...}}` 한 줄이 됩니다.
/// 쓰기는 내부 뮤텍스로 직렬화됩니다.
pub struct DataOptsWriter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl DataOptsWriter {
    /// 임의의 쓰기 대상 위에 싱크를 만듭니다.
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    fn write_op(&self, op: &str, args: serde_json::Value) -> Result<(), StoreError> {
        let line = serde_json::to_string(&json!({ "op": op, "args": args }))
            .map_err(|e| StoreError::Serialize(e.to_string()))?;
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(writer, "{line}")?;
        Ok(())
    }
}

impl GraphSink for DataOptsWriter {
    fn name(&self) -> &str {
        "data-opts"
    }

    fn insert_domain(&self, domain: &str, tag: Tag, source: &str) -> Result<(), StoreError> {
        self.write_op(
            "insert_domain",
            json!({ "domain": domain, "tag": tag.to_string(), "source": source }),
        )
    }

    fn insert_cname(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_cname",
            json!({
                "name": name,
                "domain": domain,
                "target": target,
                "target_domain": target_domain,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_a(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_a",
            json!({
                "name": name,
                "domain": domain,
                "addr": addr,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_aaaa(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_aaaa",
            json!({
                "name": name,
                "domain": domain,
                "addr": addr,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_ptr(
        &self,
        addr: &str,
        domain: &str,
        target: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_ptr",
            json!({
                "addr": addr,
                "domain": domain,
                "target": target,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_srv(
        &self,
        name: &str,
        domain: &str,
        service: &str,
        target: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_srv",
            json!({
                "name": name,
                "domain": domain,
                "service": service,
                "target": target,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_ns(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_ns",
            json!({
                "name": name,
                "domain": domain,
                "target": target,
                "target_domain": target_domain,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_mx(
        &self,
        name: &str,
        domain: &str,
        target: &str,
        target_domain: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_mx",
            json!({
                "name": name,
                "domain": domain,
                "target": target,
                "target_domain": target_domain,
                "tag": tag.to_string(),
                "source": source,
            }),
        )
    }

    fn insert_infrastructure(
        &self,
        addr: &str,
        asn: u32,
        cidr: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        self.write_op(
            "insert_infrastructure",
            json!({
                "addr": addr,
                "asn": asn,
                "cidr": cidr,
                "description": description,
            }),
        )
    }
}
