//! 이벤트 버스 -- 토픽 기반 타입드 publish/subscribe
//!
//! 구독자마다 자체 bounded 큐를 가지므로 느린 구독자가 다른 구독자의
//! 수신을 막지 않습니다. 대신 큐가 가득 차면 publish가 해당 구독자의
//! 자리에서 대기합니다 (blocking-publish 역압). 큐 용량은
//! [`SUBSCRIBER_QUEUE_CAPACITY`]로 고정되어 있습니다.
//!
//! # 전달 보장
//!
//! - 한 구독자 안에서는 한 발행자의 이벤트가 발행 순서대로 도착합니다.
//! - 구독자 간, 발행자 간 순서는 보장하지 않습니다.
//! - 핸들러 안에서의 재발행은 안전합니다 (구독자는 자기 큐를 자기
//!   태스크에서 드레인합니다).
//!
//! 버스는 구독별 미처리 이벤트 수를 추적하며, 컨트롤러는
//! [`EventBus::pending_events`]로 큐가 비었는지 관찰해 정지 판정에
//! 사용합니다.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::error::BusError;
use crate::event::{EnumRequest, OutputRecord, Topic};

/// 구독자별 큐 용량
///
/// 이 한도를 넘기면 publish가 해당 구독자 큐에 자리가 날 때까지 대기합니다.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

struct SubEntry<T> {
    id: u64,
    tx: mpsc::Sender<Arc<T>>,
    pending: Arc<AtomicUsize>,
}

struct TopicState<T> {
    topic: Topic,
    subs: Mutex<Vec<SubEntry<T>>>,
}

impl<T> TopicState<T> {
    fn new(topic: Topic) -> Self {
        Self {
            topic,
            subs: Mutex::new(Vec::new()),
        }
    }

    fn subscribe(&self, id: u64) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let pending = Arc::new(AtomicUsize::new(0));
        let entry = SubEntry {
            id,
            tx,
            pending: Arc::clone(&pending),
        };
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
        Subscription {
            topic: self.topic,
            id,
            rx,
            pending,
        }
    }

    fn unsubscribe(&self, id: u64) -> bool {
        let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
        let before = subs.len();
        subs.retain(|entry| entry.id != id);
        subs.len() != before
    }

    async fn publish(&self, msg: T) {
        let msg = Arc::new(msg);
        // 센더를 복제해 락을 놓은 뒤 전송 (역압 대기 중 락 보유 금지)
        let targets: Vec<(u64, mpsc::Sender<Arc<T>>, Arc<AtomicUsize>)> = {
            let subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
            subs.iter()
                .map(|e| (e.id, e.tx.clone(), Arc::clone(&e.pending)))
                .collect()
        };

        let mut closed = Vec::new();
        for (id, tx, pending) in targets {
            pending.fetch_add(1, Ordering::SeqCst);
            if tx.send(Arc::clone(&msg)).await.is_err() {
                pending.fetch_sub(1, Ordering::SeqCst);
                closed.push(id);
            }
        }

        if !closed.is_empty() {
            tracing::debug!(
                topic = %self.topic,
                dropped = closed.len(),
                "removing closed subscriptions"
            );
            let mut subs = self.subs.lock().unwrap_or_else(PoisonError::into_inner);
            subs.retain(|entry| !closed.contains(&entry.id));
        }
    }

    fn pending(&self) -> usize {
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.pending.load(Ordering::SeqCst))
            .sum()
    }

    fn subscriber_count(&self) -> usize {
        self.subs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// 토픽 구독 핸들
///
/// 드롭하면 버스가 다음 publish 때 구독을 정리합니다. 정확한 해지가
/// 필요하면 [`EventBus::unsubscribe`]에 (topic, id)를 넘깁니다.
pub struct Subscription<T> {
    topic: Topic,
    id: u64,
    rx: mpsc::Receiver<Arc<T>>,
    pending: Arc<AtomicUsize>,
}

impl<T> Subscription<T> {
    /// 구독 id를 반환합니다.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// 구독한 토픽을 반환합니다.
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// 다음 이벤트를 수신합니다.
    ///
    /// 버스에서 해지되었고 큐도 비었으면 `None`을 반환합니다.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        let msg = self.rx.recv().await;
        if msg.is_some() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
        msg
    }

    /// 대기 없이 큐에 있는 이벤트를 꺼냅니다.
    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        match self.rx.try_recv() {
            Ok(msg) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Some(msg)
            }
            Err(_) => None,
        }
    }
}

/// 열거 파이프라인의 이벤트 버스
///
/// 토픽별 페이로드 타입은 메서드 시그니처로 고정됩니다.
/// NEWNAME/RESOLVED/CHECKED/NEWADDR은 [`EnumRequest`],
/// OUTPUT은 [`OutputRecord`]를 나릅니다.
pub struct EventBus {
    next_id: AtomicU64,
    new_name: TopicState<EnumRequest>,
    resolved: TopicState<EnumRequest>,
    checked: TopicState<EnumRequest>,
    new_addr: TopicState<EnumRequest>,
    output: TopicState<OutputRecord>,
}

impl EventBus {
    /// 구독자 없는 버스를 생성합니다.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            new_name: TopicState::new(Topic::NewName),
            resolved: TopicState::new(Topic::Resolved),
            checked: TopicState::new(Topic::Checked),
            new_addr: TopicState::new(Topic::NewAddr),
            output: TopicState::new(Topic::Output),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// NEWNAME 토픽을 구독합니다.
    pub fn subscribe_new_name(&self) -> Subscription<EnumRequest> {
        self.new_name.subscribe(self.next_id())
    }

    /// RESOLVED 토픽을 구독합니다.
    pub fn subscribe_resolved(&self) -> Subscription<EnumRequest> {
        self.resolved.subscribe(self.next_id())
    }

    /// CHECKED 토픽을 구독합니다.
    pub fn subscribe_checked(&self) -> Subscription<EnumRequest> {
        self.checked.subscribe(self.next_id())
    }

    /// NEWADDR 토픽을 구독합니다.
    pub fn subscribe_new_addr(&self) -> Subscription<EnumRequest> {
        self.new_addr.subscribe(self.next_id())
    }

    /// OUTPUT 토픽을 구독합니다.
    pub fn subscribe_output(&self) -> Subscription<OutputRecord> {
        self.output.subscribe(self.next_id())
    }

    /// NEWNAME 이벤트를 발행합니다.
    pub async fn publish_new_name(&self, req: EnumRequest) {
        metrics::counter!(crate::metrics::BUS_EVENTS_PUBLISHED_TOTAL, "topic" => "NEWNAME")
            .increment(1);
        self.new_name.publish(req).await;
    }

    /// RESOLVED 이벤트를 발행합니다.
    pub async fn publish_resolved(&self, req: EnumRequest) {
        metrics::counter!(crate::metrics::BUS_EVENTS_PUBLISHED_TOTAL, "topic" => "RESOLVED")
            .increment(1);
        self.resolved.publish(req).await;
    }

    /// CHECKED 이벤트를 발행합니다.
    pub async fn publish_checked(&self, req: EnumRequest) {
        metrics::counter!(crate::metrics::BUS_EVENTS_PUBLISHED_TOTAL, "topic" => "CHECKED")
            .increment(1);
        self.checked.publish(req).await;
    }

    /// NEWADDR 이벤트를 발행합니다.
    pub async fn publish_new_addr(&self, req: EnumRequest) {
        metrics::counter!(crate::metrics::BUS_EVENTS_PUBLISHED_TOTAL, "topic" => "NEWADDR")
            .increment(1);
        self.new_addr.publish(req).await;
    }

    /// OUTPUT 이벤트를 발행합니다.
    pub async fn publish_output(&self, record: OutputRecord) {
        metrics::counter!(crate::metrics::BUS_EVENTS_PUBLISHED_TOTAL, "topic" => "OUTPUT")
            .increment(1);
        self.output.publish(record).await;
    }

    /// 구독을 정확히 해지합니다.
    ///
    /// # Errors
    ///
    /// 해당 (topic, id) 구독이 없으면 `BusError::SubscriptionNotFound`를
    /// 반환합니다.
    pub fn unsubscribe(&self, topic: Topic, id: u64) -> Result<(), BusError> {
        let removed = match topic {
            Topic::NewName => self.new_name.unsubscribe(id),
            Topic::Resolved => self.resolved.unsubscribe(id),
            Topic::Checked => self.checked.unsubscribe(id),
            Topic::NewAddr => self.new_addr.unsubscribe(id),
            Topic::Output => self.output.unsubscribe(id),
        };
        if removed {
            Ok(())
        } else {
            Err(BusError::SubscriptionNotFound {
                topic: topic.to_string(),
                id,
            })
        }
    }

    /// 모든 구독 큐의 미처리 이벤트 수 합계를 반환합니다.
    pub fn pending_events(&self) -> usize {
        self.new_name.pending()
            + self.resolved.pending()
            + self.checked.pending()
            + self.new_addr.pending()
            + self.output.pending()
    }

    /// 토픽의 구독자 수를 반환합니다.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        match topic {
            Topic::NewName => self.new_name.subscriber_count(),
            Topic::Resolved => self.resolved.subscriber_count(),
            Topic::Checked => self.checked.subscriber_count(),
            Topic::NewAddr => self.new_addr.subscriber_count(),
            Topic::Output => self.output.subscriber_count(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Tag;
    use std::time::Duration;

    fn name_req(name: &str) -> EnumRequest {
        EnumRequest::name(name, "example.com", Tag::Dns, "test")
    }

    #[tokio::test]
    async fn publish_reaches_single_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_new_name();

        bus.publish_new_name(name_req("a.example.com")).await;

        let msg = sub.recv().await.unwrap();
        assert_eq!(msg.name, "a.example.com");
    }

    #[tokio::test]
    async fn each_subscriber_gets_its_own_copy() {
        let bus = EventBus::new();
        let mut first = bus.subscribe_new_name();
        let mut second = bus.subscribe_new_name();

        bus.publish_new_name(name_req("a.example.com")).await;

        assert_eq!(first.recv().await.unwrap().name, "a.example.com");
        assert_eq!(second.recv().await.unwrap().name, "a.example.com");
    }

    #[tokio::test]
    async fn delivery_is_fifo_per_subscriber() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_checked();

        for i in 0..10 {
            bus.publish_checked(name_req(&format!("host{i}.example.com")))
                .await;
        }
        for i in 0..10 {
            let msg = sub.recv().await.unwrap();
            assert_eq!(msg.name, format!("host{i}.example.com"));
        }
    }

    #[tokio::test]
    async fn topics_are_isolated() {
        let bus = EventBus::new();
        let mut new_name = bus.subscribe_new_name();
        let mut new_addr = bus.subscribe_new_addr();

        bus.publish_new_addr(EnumRequest::addr("1.2.3.4", "example.com", Tag::Dns, "test"))
            .await;

        assert_eq!(new_addr.recv().await.unwrap().address, "1.2.3.4");
        assert!(new_name.try_recv().is_none());
    }

    #[tokio::test]
    async fn unsubscribe_is_exact() {
        let bus = EventBus::new();
        let first = bus.subscribe_new_name();
        let mut second = bus.subscribe_new_name();

        bus.unsubscribe(Topic::NewName, first.id()).unwrap();
        assert_eq!(bus.subscriber_count(Topic::NewName), 1);

        bus.publish_new_name(name_req("a.example.com")).await;
        assert_eq!(second.recv().await.unwrap().name, "a.example.com");

        // double unsubscribe fails
        let err = bus.unsubscribe(Topic::NewName, first.id());
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn pending_events_tracks_queue_depth() {
        let bus = EventBus::new();
        let mut sub = bus.subscribe_new_name();
        assert_eq!(bus.pending_events(), 0);

        bus.publish_new_name(name_req("a.example.com")).await;
        bus.publish_new_name(name_req("b.example.com")).await;
        assert_eq!(bus.pending_events(), 2);

        sub.recv().await.unwrap();
        assert_eq!(bus.pending_events(), 1);
        sub.recv().await.unwrap();
        assert_eq!(bus.pending_events(), 0);
    }

    #[tokio::test]
    async fn unsubscribed_queue_no_longer_counts_as_pending() {
        let bus = EventBus::new();
        let sub = bus.subscribe_new_name();
        bus.publish_new_name(name_req("a.example.com")).await;
        assert_eq!(bus.pending_events(), 1);

        bus.unsubscribe(Topic::NewName, sub.id()).unwrap();
        assert_eq!(bus.pending_events(), 0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let bus = EventBus::new();
        bus.publish_output(OutputRecord::default()).await;
        assert_eq!(bus.pending_events(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_applies_backpressure() {
        let bus = Arc::new(EventBus::new());
        let mut sub = bus.subscribe_new_name();

        // 큐를 가득 채운다
        for i in 0..SUBSCRIBER_QUEUE_CAPACITY {
            bus.publish_new_name(name_req(&format!("h{i}.example.com")))
                .await;
        }

        // 다음 publish는 구독자가 드레인할 때까지 블록되어야 한다
        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            bus.publish_new_name(name_req("overflow.example.com")),
        )
        .await;
        assert!(blocked.is_err(), "publish should block on a full queue");

        // 하나를 비우면 publish가 완료된다
        let bus2 = Arc::clone(&bus);
        let publisher = tokio::spawn(async move {
            bus2.publish_new_name(name_req("overflow.example.com")).await;
        });
        sub.recv().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), publisher)
            .await
            .expect("publish should complete after drain")
            .unwrap();
    }

    #[tokio::test]
    async fn republish_from_handler_is_safe() {
        let bus = Arc::new(EventBus::new());
        let mut checked = bus.subscribe_checked();
        let mut new_name = bus.subscribe_new_name();

        // CHECKED 핸들러가 NEWNAME을 재발행하는 구도
        let bus2 = Arc::clone(&bus);
        let handler = tokio::spawn(async move {
            let msg = checked.recv().await.unwrap();
            bus2.publish_new_name(EnumRequest::name(
                format!("cname-target.{}", msg.domain),
                msg.domain.clone(),
                Tag::Dns,
                "Forward DNS",
            ))
            .await;
        });

        bus.publish_checked(name_req("a.example.com")).await;
        handler.await.unwrap();

        let republished = new_name.recv().await.unwrap();
        assert_eq!(republished.name, "cname-target.example.com");
    }

    #[tokio::test]
    async fn dropped_subscription_is_pruned_on_next_publish() {
        let bus = EventBus::new();
        {
            let _sub = bus.subscribe_new_name();
        }
        assert_eq!(bus.subscriber_count(Topic::NewName), 1);
        bus.publish_new_name(name_req("a.example.com")).await;
        assert_eq!(bus.subscriber_count(Topic::NewName), 0);
    }
}
