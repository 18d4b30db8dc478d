//! 인메모리 권위 스토어 -- 엔티티, 타입드 엣지, new-output 워터마크
//!
//! 발견 그래프는 순환(CNAME <-> CNAME 등)이 자연스러운 구조이므로
//! 포인터 대신 정규 식별자를 키로 하는 테이블과 엣지 집합으로 모델링합니다.
//! 작업량의 상한은 그래프가 아니라 리졸버의 중복 제거가 보장합니다.
//!
//! # 불변 조건
//!
//! - 모든 식별자는 정규화된(소문자, 무종점) 형태로 저장됩니다.
//!   정규화는 Data Manager가 수행하며, 스토어는 받은 그대로 키로 씁니다.
//! - (엔티티, 엣지 종류, 대상) 삼중쌍당 엣지는 최대 하나이고,
//!   먼저 쓴 쪽의 출처가 유지됩니다.
//! - 주소는 한 시점에 정확히 하나의 AS에 속합니다. 이후 조회가
//!   다른 ASN을 내놓으면 warn 로그 후 기존 바인딩을 유지합니다.
//! - 그래프는 단조 증가합니다. 삭제는 없습니다.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::{Mutex, PoisonError};

use ironsight_core::event::{AddressInfo, OutputRecord};
use ironsight_core::types::Tag;

use crate::error::StoreError;
use crate::sink::GraphSink;

/// 엣지 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// 이름 -> 이름 별칭
    Cname,
    /// 이름 -> IPv4 주소
    A,
    /// 이름 -> IPv6 주소
    Aaaa,
    /// 이름 -> 메일 교환 이름
    Mx,
    /// 이름 -> 네임서버 이름
    Ns,
    /// 주소 -> 이름
    Ptr,
    /// 서비스 이름 -> 대상 이름
    Srv,
    /// 도메인 -> 루트 이름
    RootOf,
    /// 주소 -> 인프라 (ASN)
    HostedOn,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cname => write!(f, "cname"),
            Self::A => write!(f, "a"),
            Self::Aaaa => write!(f, "aaaa"),
            Self::Mx => write!(f, "mx"),
            Self::Ns => write!(f, "ns"),
            Self::Ptr => write!(f, "ptr"),
            Self::Srv => write!(f, "srv"),
            Self::RootOf => write!(f, "root_of"),
            Self::HostedOn => write!(f, "hosted_on"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Edge {
    kind: EdgeKind,
    from: String,
    to: String,
}

#[derive(Debug)]
struct NameNode {
    domain: String,
    tag: Tag,
    source: String,
}

#[derive(Debug, Default)]
struct AddressNode {
    asn: Option<u32>,
}

#[derive(Debug)]
struct InfraNode {
    cidr: String,
    description: String,
}

#[derive(Default)]
struct Inner {
    domains: HashSet<String>,
    names: HashMap<String, NameNode>,
    addresses: HashMap<String, AddressNode>,
    infrastructures: HashMap<u32, InfraNode>,
    edges: HashSet<Edge>,
    queued: Vec<String>,
    queued_set: HashSet<String>,
    emitted: HashSet<String>,
}

impl Inner {
    fn ensure_name(&mut self, name: &str, domain: &str, tag: Tag, source: &str) {
        self.names.entry(name.to_owned()).or_insert_with(|| NameNode {
            domain: domain.to_owned(),
            tag,
            source: source.to_owned(),
        });
    }

    fn ensure_address(&mut self, addr: &str) {
        self.addresses.entry(addr.to_owned()).or_default();
    }

    fn add_edge(&mut self, kind: EdgeKind, from: &str, to: &str) -> bool {
        self.edges.insert(Edge {
            kind,
            from: from.to_owned(),
            to: to.to_owned(),
        })
    }

    /// 이름을 출력 대기열에 넣습니다. 이미 발행되었거나 대기 중이면 무시합니다.
    fn queue_output(&mut self, name: &str) {
        if self.emitted.contains(name) {
            return;
        }
        if self.queued_set.insert(name.to_owned()) {
            self.queued.push(name.to_owned());
        }
    }

    fn addresses_of(&self, name: &str) -> Vec<AddressInfo> {
        let mut infos: Vec<AddressInfo> = self
            .edges
            .iter()
            .filter(|e| {
                (e.kind == EdgeKind::A || e.kind == EdgeKind::Aaaa) && e.from == name
            })
            .map(|e| {
                let asn = self.addresses.get(&e.to).and_then(|a| a.asn);
                let infra = asn.and_then(|n| self.infrastructures.get(&n));
                AddressInfo {
                    address: e.to.clone(),
                    cidr: infra.map(|i| i.cidr.clone()).unwrap_or_default(),
                    asn: asn.unwrap_or(0),
                    description: infra.map(|i| i.description.clone()).unwrap_or_default(),
                }
            })
            .collect();
        infos.sort_by(|a, b| a.address.cmp(&b.address));
        infos
    }
}

/// 인메모리 그래프 스토어
///
/// 내부적으로 동기화된 다중 쓰기를 지원합니다. 같은 (이름, 주소) 쌍에 대한
/// 동시 `insert_a`는 단일 엣지로 수렴하며 먼저 도착한 쪽의 출처가 남습니다.
pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    /// 빈 그래프를 생성합니다.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 마지막 호출 이후 출력 가능해진 이름들을 반환합니다.
    ///
    /// 출력 가능 조건: 검증된 주소가 하나 이상 있거나 루트 이름 자신.
    /// 각 이름은 열거 전체에서 최대 한 번만 반환됩니다 (워터마크).
    /// 반환 시점의 주소 집합이 레코드에 실리며, 이후 주소가 늘어도
    /// 재반환되지 않습니다.
    pub fn get_new_output(&self) -> Vec<OutputRecord> {
        let mut inner = self.lock();
        let queued = std::mem::take(&mut inner.queued);
        inner.queued_set.clear();

        let mut out = Vec::with_capacity(queued.len());
        for name in queued {
            if !inner.emitted.insert(name.clone()) {
                continue;
            }
            let Some(node) = inner.names.get(&name) else {
                continue;
            };
            let record = OutputRecord {
                name: name.clone(),
                domain: node.domain.clone(),
                addresses: inner.addresses_of(&name),
                tag: node.tag,
                source: node.source.clone(),
            };
            out.push(record);
        }
        out
    }

    /// 전체 노드 수를 반환합니다 (도메인 + 이름 + 주소 + 인프라).
    pub fn node_count(&self) -> usize {
        let inner = self.lock();
        inner.domains.len()
            + inner.names.len()
            + inner.addresses.len()
            + inner.infrastructures.len()
    }

    /// 전체 엣지 수를 반환합니다.
    pub fn edge_count(&self) -> usize {
        self.lock().edges.len()
    }

    /// 엣지 존재 여부를 확인합니다.
    pub fn has_edge(&self, kind: EdgeKind, from: &str, to: &str) -> bool {
        self.lock().edges.contains(&Edge {
            kind,
            from: from.to_owned(),
            to: to.to_owned(),
        })
    }

    /// 이름 노드 존재 여부를 확인합니다.
    pub fn has_name(&self, name: &str) -> bool {
        self.lock().names.contains_key(name)
    }

    /// 주소 노드 존재 여부를 확인합니다.
    pub fn has_address(&self, addr: &str) -> bool {
        self.lock().addresses.contains_key(addr)
    }

    /// 주소에 바인딩된 ASN을 반환합니다.
    pub fn address_asn(&self, addr: &str) -> Option<u32> {
        self.lock().addresses.get(addr).and_then(|a| a.asn)
    }
}

impl Default for MemoryGraph {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_addr(value: &str) -> Result<IpAddr, StoreError> {
    value.parse().map_err(|_| StoreError::InvalidAddress {
        value: value.to_owned(),
    })
}

impl GraphSink for MemoryGraph {
    fn name(&self) -> &str {
        "memory-graph"
    }

    fn insert_domain(&self, domain: &str, tag: Tag, source: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.domains.insert(domain.to_owned());
        inner.ensure_name(domain, domain, tag, source);
        inner.add_edge(EdgeKind::RootOf, domain, domain);
        // 루트 이름은 주소 없이도 출력 대상
        inner.queue_output(domain);
        Ok(())
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
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_name(target, target_domain, tag, source);
        inner.add_edge(EdgeKind::Cname, name, target);
        Ok(())
    }

    fn insert_a(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        let parsed = parse_addr(addr)?;
        if !parsed.is_ipv4() {
            return Err(StoreError::InvalidAddress {
                value: addr.to_owned(),
            });
        }
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_address(addr);
        inner.add_edge(EdgeKind::A, name, addr);
        inner.queue_output(name);
        Ok(())
    }

    fn insert_aaaa(
        &self,
        name: &str,
        domain: &str,
        addr: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        let parsed = parse_addr(addr)?;
        if !parsed.is_ipv6() {
            return Err(StoreError::InvalidAddress {
                value: addr.to_owned(),
            });
        }
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_address(addr);
        inner.add_edge(EdgeKind::Aaaa, name, addr);
        inner.queue_output(name);
        Ok(())
    }

    fn insert_ptr(
        &self,
        addr: &str,
        domain: &str,
        target: &str,
        tag: Tag,
        source: &str,
    ) -> Result<(), StoreError> {
        parse_addr(addr)?;
        let mut inner = self.lock();
        inner.ensure_address(addr);
        inner.ensure_name(target, domain, tag, source);
        inner.add_edge(EdgeKind::Ptr, addr, target);
        Ok(())
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
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_name(service, domain, tag, source);
        inner.ensure_name(target, domain, tag, source);
        inner.add_edge(EdgeKind::Srv, service, target);
        Ok(())
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
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_name(target, target_domain, tag, source);
        inner.add_edge(EdgeKind::Ns, name, target);
        Ok(())
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
        let mut inner = self.lock();
        inner.ensure_name(name, domain, tag, source);
        inner.ensure_name(target, target_domain, tag, source);
        inner.add_edge(EdgeKind::Mx, name, target);
        Ok(())
    }

    fn insert_infrastructure(
        &self,
        addr: &str,
        asn: u32,
        cidr: &str,
        description: &str,
    ) -> Result<(), StoreError> {
        parse_addr(addr)?;
        let mut inner = self.lock();
        let node = inner.addresses.entry(addr.to_owned()).or_default();
        match node.asn {
            Some(bound) if bound != asn => {
                tracing::warn!(
                    address = addr,
                    bound_asn = bound,
                    offered_asn = asn,
                    "address already bound to a different ASN, keeping first binding"
                );
                return Ok(());
            }
            _ => node.asn = Some(asn),
        }

        inner
            .infrastructures
            .entry(asn)
            .or_insert_with(|| InfraNode {
                cidr: cidr.to_owned(),
                description: description.to_owned(),
            });
        inner.add_edge(EdgeKind::HostedOn, addr, &asn.to_string());
        Ok(())
    }
}
