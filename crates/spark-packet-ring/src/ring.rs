//! 报文环形缓冲引擎。
//!
//! # 模块定位（Why）
//! - 把 [`crate::arena`]、[`crate::framer`] 与 [`crate::policy`] 组合在一把互斥锁之后，
//!   对生产者提供零拷贝写入，对消费者提供安全拷贝读取；
//! - 所有“发现越界后是否清空”的决定都在这里做出，底层校验只返回 `Result`。
//!
//! # 并发模型（How）
//! - 每个公开方法在整个调用期间持有同一把 `parking_lot::Mutex`，不存在部分加锁或无锁快路径；
//! - 任何调用都不会等待对方线程：放不下、读不到、目标太小时立即返回失败或 0；
//! - 生产者回调与诊断接收端都在临界区内同步执行，二者都不得阻塞，也不得回调同一个缓冲。
//!
//! # 状态约定（What）
//! - 队列为空时游标归零、回绕标记清除，因此“空”只有一种表示；
//! - 报文严格按写入顺序出队，扩容、重组与驱逐都不会改变相对顺序。

use core::fmt;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::{
    arena::{Arena, PacketSlot, Placement},
    diagnostics::{DiagnosticsSink, DropReason, ResetReason, RingEvent, TracingSink},
    error::{BoundsViolation, ConfigError, RingError},
    framer::PacketHeader,
    metrics::{RingMetrics, RingStats},
    policy::{CapacityPolicy, DEFAULT_MIN_CAPACITY, GrowableLimits, GrowthPlan},
};

struct RingState {
    arena: Arena,
    queued: usize,
    policy: CapacityPolicy,
}

/// 线程安全的变长报文队列。
///
/// # 教案式说明
/// - **意图 (Why)**：USB 传输线程以突发速率写入，解码线程按帧率读取；两者共享一块连续竞技场，
///   避免每个报文一次堆分配；
/// - **契约 (What)**：
///   - 写入返回 `Result<(), RingError>`，失败时缓冲要么保持原状，要么已回到空状态；
///   - 读取返回拷贝，调用方永远拿不到指向竞技场的引用；
///   - 每次状态变化（扩容、重组、驱逐、重置、丢弃）都会送达 [`DiagnosticsSink`]；
/// - **设计权衡 (Trade-offs)**：以单锁换正确性。报文速率受媒体帧率约束，锁竞争不是瓶颈，
///   而此前零拷贝读取导致的撕裂读问题代价更高。
pub struct PacketRing {
    state: Mutex<RingState>,
    sink: Arc<dyn DiagnosticsSink>,
    metrics: RingMetrics,
}

impl fmt::Debug for PacketRing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("PacketRing")
            .field("capacity", &state.arena.capacity())
            .field("queued", &state.queued)
            .field("read", &state.arena.read_cursor())
            .field("write", &state.arena.write_cursor())
            .field("wrap_mark", &state.arena.wrap_mark())
            .field("policy", &state.policy)
            .finish()
    }
}

/// [`PacketRing`] 的装配器。
///
/// 未显式指定时使用默认可增长策略、1 MiB 初始容量与 [`TracingSink`]。
#[derive(Clone)]
pub struct PacketRingBuilder {
    initial_capacity: usize,
    policy: CapacityPolicy,
    sink: Option<Arc<dyn DiagnosticsSink>>,
}

impl Default for PacketRingBuilder {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_MIN_CAPACITY,
            policy: CapacityPolicy::default(),
            sink: None,
        }
    }
}

impl fmt::Debug for PacketRingBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketRingBuilder")
            .field("initial_capacity", &self.initial_capacity)
            .field("policy", &self.policy)
            .field("custom_sink", &self.sink.is_some())
            .finish()
    }
}

impl PacketRingBuilder {
    /// 请求的初始容量，构造时会被夹到策略边界内。
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn policy(mut self, policy: CapacityPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DiagnosticsSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 校验策略并构造缓冲。
    ///
    /// # 契约说明（What）
    /// - 策略阈值不合法时返回 [`ConfigError`]，不会分配竞技场；
    /// - 请求容量被调整时向接收端发送一次 [`RingEvent::CapacityClamped`]。
    pub fn build(self) -> Result<PacketRing, ConfigError> {
        self.policy.validate()?;
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        Ok(PacketRing::assemble(self.initial_capacity, self.policy, sink))
    }
}

impl PacketRing {
    /// 以默认可增长策略创建缓冲，诊断输出到 `tracing`。
    pub fn new(initial_capacity: usize) -> Self {
        Self::assemble(
            initial_capacity,
            CapacityPolicy::default(),
            Arc::new(TracingSink),
        )
    }

    pub fn builder() -> PacketRingBuilder {
        PacketRingBuilder::default()
    }

    fn assemble(requested: usize, policy: CapacityPolicy, sink: Arc<dyn DiagnosticsSink>) -> Self {
        let granted = policy.clamp_initial(requested);
        if granted != requested {
            sink.record(&RingEvent::CapacityClamped { requested, granted });
        }
        Self {
            state: Mutex::new(RingState {
                arena: Arena::with_capacity(granted),
                queued: 0,
                policy,
            }),
            sink,
            metrics: RingMetrics::new(),
        }
    }

    /// 零拷贝写入：预留空间、写入帧头，然后让 `fill` 直接填充竞技场中的负载区。
    ///
    /// # 契约说明（What）
    /// - `fill` 收到的切片长度恰好为 `length`，必须写满且不得把引用带出回调；
    /// - 读取方只会看到 `[skip, length)` 这一段；
    /// - `skip > length` 或 `length > u32::MAX`：返回 [`RingError::InvalidParameter`]，不修改状态；
    /// - 报文加帧头达到策略允许的最大容量：返回 [`RingError::OversizedPacket`]，不修改状态；
    /// - 放不下时按策略扩容、重组、驱逐或紧急重置，步骤次数有上限；
    /// - `fill` 若发生 panic，游标保持不变，该报文视为未写入。
    pub fn direct_write<F>(&self, length: usize, skip: usize, fill: F) -> Result<(), RingError>
    where
        F: FnOnce(&mut [u8]),
    {
        let header = match PacketHeader::new(length, skip) {
            Ok(header) => header,
            Err(err) => {
                self.metrics.on_rejected();
                self.sink
                    .record(&RingEvent::InvalidParameter { length, skip });
                return Err(err);
            }
        };

        let mut state = self.state.lock();
        let needed = header.framed_len();
        let limit = write_limit(&state);
        if needed >= limit {
            self.drop_packet(&state, length, DropReason::Oversized);
            return Err(RingError::OversizedPacket { needed, limit });
        }
        let capacity = state.arena.capacity();
        if length > capacity / 2 {
            self.sink
                .record(&RingEvent::LargePacket { length, capacity });
        }

        let placement = self.reserve(&mut state, header)?;
        if let Err(violation) = state.arena.commit(placement, header, fill) {
            return Err(self.force_empty(&mut state, violation));
        }
        state.queued += 1;
        self.metrics.on_write(length);
        Ok(())
    }

    /// 拷贝写入整段 `payload`，`skip` 为 0。
    pub fn write_packet(&self, payload: &[u8]) -> Result<(), RingError> {
        self.direct_write(payload.len(), 0, |dst| dst.copy_from_slice(payload))
    }

    /// 读取队首报文到 `target` 的前缀，返回写入的字节数。
    ///
    /// 以下情况返回 0 且不消费任何报文：队列为空、`target` 短于负载（报文保留，
    /// 可先用 [`PacketRing::next_packet_len`] 确定所需长度再重试）。
    /// 帧头损坏时缓冲被清空，同样返回 0。负载本身为空的报文也返回 0，
    /// 需要区分时请使用 [`PacketRing::read_packet`]。
    pub fn read_packet_into(&self, target: &mut [u8]) -> usize {
        self.take_next(target.len(), |payload| {
            target[..payload.len()].copy_from_slice(payload);
            payload.len()
        })
        .unwrap_or(0)
    }

    /// 取出队首报文的拷贝；没有可读报文时返回 `None`。
    pub fn read_packet(&self) -> Option<Bytes> {
        self.take_next(usize::MAX, Bytes::copy_from_slice)
    }

    /// 队首报文对消费方可见的长度，不消费报文。
    pub fn next_packet_len(&self) -> Option<usize> {
        let mut state = self.state.lock();
        if state.queued == 0 {
            return None;
        }
        match state.arena.locate_next() {
            Ok(slot) => Some(slot.header.payload_len()),
            Err(violation) => {
                self.force_empty(&mut state, violation);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().queued == 0
    }

    pub fn queued_packet_count(&self) -> usize {
        self.state.lock().queued
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().arena.capacity()
    }

    /// 已占用字节数（帧头加负载）。
    pub fn used_bytes(&self) -> usize {
        let mut state = self.state.lock();
        self.used_or_reset(&mut state)
    }

    /// 丢弃全部报文，保持当前容量。
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.arena.clear();
        state.queued = 0;
    }

    pub fn metrics(&self) -> &RingMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> RingStats {
        let mut state = self.state.lock();
        let used_bytes = self.used_or_reset(&mut state);
        RingStats {
            capacity: state.arena.capacity(),
            queued_packets: state.queued,
            used_bytes,
            counters: self.metrics.snapshot(),
        }
    }

    fn take_next<R>(&self, available: usize, copy: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if state.queued == 0 {
            self.metrics.on_underflow();
            return None;
        }
        let slot = match state.arena.locate_next() {
            Ok(slot) => slot,
            Err(violation) => {
                self.force_empty(&mut state, violation);
                return None;
            }
        };
        let needed = slot.header.payload_len();
        if available < needed {
            self.metrics.on_undersized_target();
            self.sink
                .record(&RingEvent::TargetTooSmall { needed, available });
            return None;
        }
        let out = copy(state.arena.payload(slot.payload.clone()));
        consume(&mut state, &slot);
        self.metrics.on_read(needed);
        Some(out)
    }

    /// 反复应用容量策略，直到报文能够放下。
    ///
    /// # 执行逻辑（How）
    /// - 固定策略：逐个驱逐最旧报文；队列清空后竞技场回到起点，预检已保证此时一定放得下；
    /// - 可增长策略：按 [`GrowableLimits::plan_growth`] 重组、扩容或紧急重置；
    ///   尝试次数耗尽后执行一次紧急重置，仍放不下则丢弃报文。
    fn reserve(&self, state: &mut RingState, header: PacketHeader) -> Result<Placement, RingError> {
        let length = header.length();
        let needed = header.framed_len();
        let mut attempts = 0;
        loop {
            if let Some(placement) = state.arena.place(length) {
                return Ok(placement);
            }
            let policy = state.policy;
            match policy {
                CapacityPolicy::Fixed => {
                    if state.queued == 0 {
                        self.drop_packet(state, length, DropReason::NoRoomAfterReset);
                        return Err(RingError::OversizedPacket {
                            needed,
                            limit: state.arena.capacity(),
                        });
                    }
                    self.evict_oldest(state)?;
                }
                CapacityPolicy::Growable(limits) => {
                    if attempts >= limits.max_resize_attempts {
                        self.emergency_reset(state, &limits, ResetReason::ResizeAttemptsExceeded);
                        return state.arena.place(length).ok_or_else(|| {
                            self.drop_packet(state, length, DropReason::NoRoomAfterReset);
                            RingError::OversizedPacket {
                                needed,
                                limit: state.arena.capacity(),
                            }
                        });
                    }
                    attempts += 1;
                    let capacity = state.arena.capacity();
                    let used = state
                        .arena
                        .used()
                        .map_err(|violation| self.force_empty(state, violation))?;
                    match limits.plan_growth(capacity, used, needed) {
                        GrowthPlan::Rebuild { capacity } => self.rebuild(state, capacity)?,
                        GrowthPlan::EmergencyReset => {
                            self.emergency_reset(state, &limits, ResetReason::CapacityExhausted);
                        }
                    }
                }
            }
        }
    }

    fn rebuild(&self, state: &mut RingState, capacity: usize) -> Result<(), RingError> {
        let old_capacity = state.arena.capacity();
        let read = state.arena.read_cursor();
        let write = state.arena.write_cursor();
        let next = state
            .arena
            .linearize(capacity)
            .map_err(|violation| self.force_empty(state, violation))?;
        let moved_bytes = next.write_cursor();
        state.arena = next;

        let queued = state.queued;
        if capacity == old_capacity {
            self.metrics.on_reorganize();
            self.sink.record(&RingEvent::Reorganized {
                capacity,
                moved_bytes,
                queued,
            });
        } else {
            self.metrics.on_resize();
            self.sink.record(&RingEvent::Resized {
                old_capacity,
                new_capacity: capacity,
                read,
                write,
                queued,
            });
        }
        Ok(())
    }

    fn evict_oldest(&self, state: &mut RingState) -> Result<(), RingError> {
        let slot = state
            .arena
            .locate_next()
            .map_err(|violation| self.force_empty(state, violation))?;
        consume(state, &slot);
        let length = slot.header.length();
        self.metrics.on_evicted(length);
        self.sink.record(&RingEvent::Evicted {
            length,
            queued: state.queued,
            capacity: state.arena.capacity(),
        });
        Ok(())
    }

    fn emergency_reset(&self, state: &mut RingState, limits: &GrowableLimits, reason: ResetReason) {
        let previous_capacity = state.arena.capacity();
        let dropped_packets = state.queued;
        state.arena = Arena::with_capacity(limits.min_capacity);
        state.queued = 0;
        self.metrics.on_emergency_reset(dropped_packets);
        self.sink.record(&RingEvent::EmergencyReset {
            previous_capacity,
            new_capacity: limits.min_capacity,
            dropped_packets,
            reason,
        });
    }

    fn drop_packet(&self, state: &RingState, length: usize, reason: DropReason) {
        self.metrics.on_dropped(1);
        self.sink.record(&RingEvent::PacketDropped {
            length,
            capacity: state.arena.capacity(),
            reason,
        });
    }

    /// 越界后的统一出口：清空缓冲、计数并以最高级别上报。
    fn force_empty(&self, state: &mut RingState, violation: BoundsViolation) -> RingError {
        let dropped_packets = state.queued;
        state.arena.clear();
        state.queued = 0;
        self.metrics.on_bounds_violation(dropped_packets);
        self.sink.record(&RingEvent::BoundsViolation {
            violation,
            dropped_packets,
        });
        RingError::BoundsViolation(violation)
    }

    fn used_or_reset(&self, state: &mut RingState) -> usize {
        match state.arena.used() {
            Ok(used) => used,
            Err(violation) => {
                self.force_empty(state, violation);
                0
            }
        }
    }
}

/// 固定策略的上限是当前竞技场；可增长策略的上限是 `max_capacity`。
fn write_limit(state: &RingState) -> usize {
    match state.policy {
        CapacityPolicy::Growable(limits) => limits.max_capacity,
        CapacityPolicy::Fixed => state.arena.capacity(),
    }
}

fn consume(state: &mut RingState, slot: &PacketSlot) {
    state.arena.advance_read(slot);
    state.queued -= 1;
    if state.queued == 0 {
        state.arena.clear();
    }
}
