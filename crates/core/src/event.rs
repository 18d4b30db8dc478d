//! 이벤트 타입 -- 버스 토픽과 페이로드 정의
//!
//! 파이프라인의 모든 통신은 이벤트 버스의 다섯 개 토픽으로 수행됩니다.
//! [`EnumRequest`]는 NEWNAME/RESOLVED/CHECKED/NEWADDR 토픽의 공통 페이로드이며,
//! [`OutputRecord`]는 OUTPUT 토픽의 페이로드입니다.
//!
//! ```text
//! Sources -> NEWNAME -> Resolver -> RESOLVED -> (bridge) -> CHECKED
//!          -> DataManager -> {Graph, NEWNAME, NEWADDR} -> OUTPUT
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DnsRecord, Tag};

// --- 서비스명 상수 ---

/// 리졸버 서비스명
pub const SERVICE_RESOLVER: &str = "resolver";
/// Data Manager 서비스명
pub const SERVICE_DATA_MANAGER: &str = "data-manager";
/// Forward DNS 재발행 소스 레이블
pub const SOURCE_FORWARD_DNS: &str = "Forward DNS";

// --- 토픽명 상수 ---

/// 새 후보 이름 토픽
pub const TOPIC_NEWNAME: &str = "NEWNAME";
/// 검증 완료 토픽 (리졸버 발행)
pub const TOPIC_RESOLVED: &str = "RESOLVED";
/// 범위 확인 완료 토픽 (Data Manager 소비)
pub const TOPIC_CHECKED: &str = "CHECKED";
/// 새 주소 토픽
pub const TOPIC_NEWADDR: &str = "NEWADDR";
/// 최종 출력 토픽
pub const TOPIC_OUTPUT: &str = "OUTPUT";

/// 이벤트 버스 토픽
///
/// 각 토픽의 페이로드 타입은 버스의 subscribe/publish 메서드 시그니처로
/// 고정됩니다 (NEWNAME/RESOLVED/CHECKED/NEWADDR: [`EnumRequest`],
/// OUTPUT: [`OutputRecord`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// 새 후보 이름
    NewName,
    /// 검증된 레코드 집합
    Resolved,
    /// 범위 확인을 통과한 레코드 집합
    Checked,
    /// 새 주소
    NewAddr,
    /// 최종 출력
    Output,
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NewName => write!(f, "{TOPIC_NEWNAME}"),
            Self::Resolved => write!(f, "{TOPIC_RESOLVED}"),
            Self::Checked => write!(f, "{TOPIC_CHECKED}"),
            Self::NewAddr => write!(f, "{TOPIC_NEWADDR}"),
            Self::Output => write!(f, "{TOPIC_OUTPUT}"),
        }
    }
}

/// 열거 요청 -- 이름/주소 이벤트의 공통 페이로드
///
/// 토픽에 따라 채워지는 필드가 다릅니다:
/// - NEWNAME: `name`, `domain`, `tag`, `source`
/// - RESOLVED/CHECKED: 위 필드에 더해 `records`
/// - NEWADDR: `address`(필수), `domain`, `tag`, `source`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumRequest {
    /// 대상 DNS 이름 (정규화된 형태)
    pub name: String,
    /// 소유 루트 도메인
    pub domain: String,
    /// IP 주소 (NEWADDR에서만 사용)
    pub address: String,
    /// 검증된 레코드 목록 (RESOLVED/CHECKED에서만 사용)
    pub records: Vec<DnsRecord>,
    /// 출처 태그
    pub tag: Tag,
    /// 사람이 읽을 수 있는 소스 레이블
    pub source: String,
}

impl EnumRequest {
    /// 이름 발견 이벤트용 요청을 생성합니다.
    pub fn name(
        name: impl Into<String>,
        domain: impl Into<String>,
        tag: Tag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
            tag,
            source: source.into(),
            ..Self::default()
        }
    }

    /// 주소 발견 이벤트용 요청을 생성합니다.
    pub fn addr(
        address: impl Into<String>,
        domain: impl Into<String>,
        tag: Tag,
        source: impl Into<String>,
    ) -> Self {
        Self {
            address: address.into(),
            domain: domain.into(),
            tag,
            source: source.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for EnumRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.name.is_empty() {
            write!(f, "{} [{}] from {}", self.address, self.tag, self.source)
        } else {
            write!(f, "{} [{}] from {}", self.name, self.tag, self.source)
        }
    }
}

/// 출력 레코드에 첨부되는 주소 정보
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressInfo {
    /// IP 주소 (텍스트 형태)
    pub address: String,
    /// 소속 CIDR 프리픽스
    pub cidr: String,
    /// 자율 시스템 번호 (미확인 시 0)
    pub asn: u32,
    /// AS 설명 문자열
    pub description: String,
}

/// OUTPUT 토픽 페이로드 -- 범위 내에서 검증된 이름 하나
///
/// 그래프 스토어의 new-output 워터마크에서 파생되며,
/// 열거 전체에 걸쳐 이름당 최대 한 번 발행됩니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputRecord {
    /// 검증된 DNS 이름
    pub name: String,
    /// 소유 루트 도메인
    pub domain: String,
    /// 현재까지 알려진 주소 목록
    pub addresses: Vec<AddressInfo>,
    /// 출처 태그
    pub tag: Tag,
    /// 소스 레이블
    pub source: String,
}

impl fmt::Display for OutputRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let addrs: Vec<&str> = self.addresses.iter().map(|a| a.address.as_str()).collect();
        write!(f, "{} {}", self.name, addrs.join(","))
    }
}
